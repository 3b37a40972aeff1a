//! A local fake model for testing purpose.

mod preset;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use mirror_agent_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    #[allow(dead_code)]
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    step: Option<PresetResponse>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };

        let Some(response) = &this.step else {
            return Poll::Ready(Err(Error {
                message: "not an assistant response step",
                kind: ErrorKind::Other,
            }));
        };
        let preset_events = &response.events;

        if let Some(sleep) = &mut this.sleep {
            let sleep = sleep.as_mut();
            ready!(sleep.poll(cx));
            this.sleep = None;

            if this.event_idx < preset_events.len() {
                let event = match &preset_events[this.event_idx] {
                    PresetEvent::MessageDelta(msg) => {
                        ModelResponseEvent::MessageDelta(msg.clone())
                    }
                    PresetEvent::ToolCall(req) => {
                        ModelResponseEvent::ToolCall(req.clone())
                    }
                };
                this.event_idx += 1;
                return Poll::Ready(Ok(Some(event)));
            } else if this.event_idx == preset_events.len() {
                this.event_idx += 1;
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    response.finish_reason(),
                ))));
            } else {
                // In case this method is called after completion.
                return Poll::Ready(Ok(None));
            }
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

#[derive(Clone)]
enum ConversationStep {
    UserInput,
    AssistantResponse(PresetResponse),
}

#[derive(Default)]
struct Journal {
    requests: Vec<ModelRequest>,
    attempts: HashMap<usize, u64>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the conversation script, which
/// is how the model should respond to a request. The added steps will be
/// selected according to the history messages in your request. If there are no
/// enough steps in the script, an error will be returned.
///
/// Every request is recorded, and the journal is shared between clones, so a
/// test can keep a clone around after handing the provider to an agent.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    conversation_script: Vec<ConversationStep>,
    delay: Option<Duration>,
    journal: Arc<Mutex<Journal>>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_assistant_turn(&mut self, preset: PresetResponse) {
        self.conversation_script
            .push(ConversationStep::AssistantResponse(preset));
    }

    #[inline]
    pub fn add_user_turn(&mut self) {
        self.conversation_script.push(ConversationStep::UserInput);
    }

    /// Adds a user turn followed by an assistant turn.
    #[inline]
    pub fn add_exchange(&mut self, preset: PresetResponse) {
        self.add_user_turn();
        self.add_assistant_turn(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.journal().requests.clone()
    }

    /// Returns how many requests have been received so far.
    pub fn request_count(&self) -> usize {
        self.journal().requests.len()
    }

    fn journal(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let step_idx = req.messages.len();
        let step = match self.conversation_script.get(step_idx) {
            Some(ConversationStep::AssistantResponse(response)) => {
                Some(response.clone())
            }
            _ => None,
        };

        let mut journal = self.journal();
        journal.requests.push(req.clone());

        if let Some(failures) = step.as_ref().and_then(|step| step.failures) {
            let attempts = journal.attempts.entry(step_idx).or_default();
            *attempts += 1;
            if failures == 0 || *attempts <= failures {
                return ready(Err(Error {
                    message: "preset failure",
                    kind: ErrorKind::RateLimitExceeded,
                }));
            }
        }

        let resp = TestModelResponse {
            step,
            event_idx: 0,
            delay: self.delay.unwrap_or(Duration::from_millis(1)),
            sleep: None,
        };
        ready(Ok(resp))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use mirror_agent_model::{
        ContentBlock, ModelFinishReason, ModelMessage, ModelRequest,
        ModelTool, ToolCallRequest,
    };
    use serde_json::json;

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Option<ToolCallRequest>, ModelFinishReason) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut tool_call = None;
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
                .unwrap();
            match event {
                ModelResponseEvent::Completed(reason) => {
                    return (msg, tool_call, reason);
                }
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.push_str(&delta);
                }
                ModelResponseEvent::ToolCall(req) => tool_call = Some(req),
            }
        }
    }

    fn user_text(text: &str) -> ModelMessage {
        ModelMessage::user(vec![ContentBlock::Text(text.to_owned())])
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_exchange(PresetResponse::with_events([
            PresetEvent::MessageDelta("I can see ".to_owned()),
            PresetEvent::MessageDelta("the home screen.".to_owned()),
        ]));
        provider.add_exchange(PresetResponse::with_events([
            PresetEvent::MessageDelta("Tapping it.".to_owned()),
            PresetEvent::tool_call("toolu_1", "click_cursor", json!({})),
        ]));

        let mut req = ModelRequest {
            system: None,
            messages: vec![user_text("Here's the initial screenshot")],
            tools: vec![ModelTool {
                name: "click_cursor".to_owned(),
                description: "Clicks at the cursor".to_owned(),
                parameters: json!({ "type": "object", "properties": {} }),
            }],
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call, reason) = collect_response(resp).await;
        assert_eq!(msg, "I can see the home screen.");
        assert!(tool_call.is_none());
        assert_eq!(reason, ModelFinishReason::Stop);

        req.messages
            .push(ModelMessage::assistant(vec![ContentBlock::Text(msg)]));
        req.messages.push(user_text("Here's the same screenshot"));
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call, reason) = collect_response(resp).await;
        assert_eq!(msg, "Tapping it.");
        assert_eq!(tool_call.unwrap().name, "click_cursor");
        assert_eq!(reason, ModelFinishReason::ToolCalls);

        assert_eq!(provider.request_count(), 2);
        assert_eq!(provider.requests()[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_exchange(PresetResponse::text("Done.").with_failures(1));

        let req = ModelRequest {
            system: None,
            messages: vec![user_text("Hi")],
            tools: vec![],
        };
        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert!(provider.send_request(&req).await.is_ok());
        assert_eq!(provider.request_count(), 2);
    }

    #[tokio::test]
    async fn test_script_exhausted() {
        let provider = TestModelProvider::default();
        let req = ModelRequest {
            system: None,
            messages: vec![user_text("Hi")],
            tools: vec![],
        };
        let resp = provider.send_request(&req).await.unwrap();
        let mut resp = pin!(resp);
        let result = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(result.is_err());
    }
}
