use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use mirror_agent_model::{
    ContentBlock, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent, ToolCallRequest,
};
use tracing::Instrument;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a model provider that provides a type-erased
/// interface for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!(
                        "sending a request with {} messages",
                        req.messages.len()
                    );
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and waits for the complete response.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_request(&self, req: ModelRequest) -> SendRequestResult {
        (self.handler_fn)(req).await
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug, Default)]
pub struct ModelClientResponse {
    /// The content of the assistant turn, in the order it was produced.
    pub content: Vec<ContentBlock>,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

impl ModelClientResponse {
    /// Returns `true` if the model stopped to have its tools run.
    #[inline]
    pub fn wants_tools(&self) -> bool {
        self.finish_reason == Some(ModelFinishReason::ToolCalls)
    }

    /// Returns all text produced by the model.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut output = ModelClientResponse::default();

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(delta) => {
                // Consecutive deltas belong to the same text block.
                if let Some(ContentBlock::Text(text)) = output.content.last_mut()
                {
                    text.push_str(&delta);
                } else {
                    output.content.push(ContentBlock::Text(delta));
                }
            }
            ModelResponseEvent::ToolCall(req) => {
                output.content.push(ContentBlock::ToolUse(req.clone()));
                output.tool_calls.push(req);
            }
            ModelResponseEvent::Completed(reason) => {
                output.finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(output)
}

#[cfg(test)]
mod tests {
    use mirror_agent_model::{ErrorKind, ModelMessage};
    use mirror_agent_test_model::{
        PresetEvent, PresetResponse, TestModelProvider,
    };
    use serde_json::json;

    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            system: None,
            messages: vec![ModelMessage::user(vec![ContentBlock::Text(
                "Open Settings".to_owned(),
            )])],
            tools: vec![],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_request() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_exchange(PresetResponse::with_events([
            PresetEvent::MessageDelta("I see ".to_owned()),
            PresetEvent::MessageDelta("the home screen.".to_owned()),
            PresetEvent::tool_call(
                "toolu_1",
                "move_cursor",
                json!({ "direction": "down", "distance": 30 }),
            ),
            PresetEvent::MessageDelta("Then click.".to_owned()),
        ]));

        let model_client = ModelClient::new(model_provider);
        let resp = model_client.send_request(request()).await.unwrap();

        assert!(resp.wants_tools());
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.content.len(), 3);
        assert_eq!(
            resp.content[0],
            ContentBlock::Text("I see the home screen.".to_owned())
        );
        assert!(matches!(resp.content[1], ContentBlock::ToolUse(_)));
        assert_eq!(resp.text(), "I see the home screen.Then click.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_handling() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_exchange(PresetResponse::text("Hi").with_failures(0));
        let model_client = ModelClient::new(model_provider);

        let err = model_client.send_request(request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    }
}
