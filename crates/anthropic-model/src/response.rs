use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use mirror_agent_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use pin_project_lite::pin_project;
use serde_json::{Map, Value};

use crate::Error;
use crate::io::Sse;
use crate::proto::{ApiError, BlockDelta, StartBlock, StreamEvent};

enum PartialBlock {
    Text,
    ToolUse {
        id: String,
        name: String,
        input_json: String,
    },
    Other,
}

struct PartialState {
    sse: Sse,
    id: Option<String>,
    // Content blocks that have started but not yet stopped, keyed by the
    // index the server assigned.
    blocks: HashMap<usize, PartialBlock>,
    // Events decoded but not yet handed out. One server event may produce
    // at most one model event, but keeping a queue makes the order of
    // delivery explicit.
    pending_events: VecDeque<ModelResponseEvent>,
    stopped: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streaming response from the Messages API.
    pub struct AnthropicResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl AnthropicResponse {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            id: None,
            blocks: Default::default(),
            pending_events: Default::default(),
            stopped: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for AnthropicResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, partial_state)) => {
                    trace!("message {:?} finished", partial_state.id);
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    loop {
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if partial_state.stopped {
            return Ok((None, partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                return Err(Error::new(
                    "stream ended before message_stop",
                    ErrorKind::Other,
                ));
            }
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");

        let event = serde_json::from_str::<StreamEvent>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        handle_stream_event(&mut partial_state, event)?;
    }
}

fn handle_stream_event(
    partial_state: &mut PartialState,
    event: StreamEvent,
) -> Result<(), Error> {
    match event {
        StreamEvent::MessageStart { message } => {
            partial_state.id = Some(message.id);
        }
        StreamEvent::ContentBlockStart {
            index,
            content_block,
        } => {
            let block = match content_block {
                StartBlock::Text { text } => {
                    if !text.is_empty() {
                        partial_state
                            .pending_events
                            .push_back(ModelResponseEvent::MessageDelta(text));
                    }
                    PartialBlock::Text
                }
                StartBlock::ToolUse { id, name } => PartialBlock::ToolUse {
                    id,
                    name,
                    input_json: String::new(),
                },
                StartBlock::Other => PartialBlock::Other,
            };
            partial_state.blocks.insert(index, block);
        }
        StreamEvent::ContentBlockDelta { index, delta } => match delta {
            BlockDelta::TextDelta { text } => {
                partial_state
                    .pending_events
                    .push_back(ModelResponseEvent::MessageDelta(text));
            }
            BlockDelta::InputJsonDelta { partial_json } => {
                match partial_state.blocks.get_mut(&index) {
                    Some(PartialBlock::ToolUse { input_json, .. }) => {
                        input_json.push_str(&partial_json);
                    }
                    _ => {
                        return Err(Error::new(
                            format!("input delta for non tool block {index}"),
                            ErrorKind::Other,
                        ));
                    }
                }
            }
            BlockDelta::Other => {}
        },
        StreamEvent::ContentBlockStop { index } => {
            // Tool calls are only surfaced once their input is complete.
            if let Some(PartialBlock::ToolUse {
                id,
                name,
                input_json,
            }) = partial_state.blocks.remove(&index)
            {
                let arguments = parse_tool_input(&input_json)?;
                partial_state.pending_events.push_back(
                    ModelResponseEvent::ToolCall(ToolCallRequest {
                        id,
                        name,
                        arguments,
                    }),
                );
            }
        }
        StreamEvent::MessageDelta { delta } => {
            if let Some(stop_reason) = delta.stop_reason {
                let finish_reason = if stop_reason == "tool_use" {
                    ModelFinishReason::ToolCalls
                } else {
                    ModelFinishReason::Stop
                };
                partial_state
                    .pending_events
                    .push_back(ModelResponseEvent::Completed(finish_reason));
            }
        }
        StreamEvent::MessageStop {} => {
            partial_state.stopped = true;
        }
        StreamEvent::Error { error } => {
            return Err(api_error(error));
        }
        StreamEvent::Ping {} | StreamEvent::Unknown => {}
    }
    Ok(())
}

#[inline]
fn parse_tool_input(input_json: &str) -> Result<Value, Error> {
    // Tools without parameters stream no input deltas at all.
    if input_json.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(input_json).map_err(|err| {
        Error::new(format!("invalid tool input: {err}"), ErrorKind::Other)
    })
}

#[inline]
fn api_error(error: ApiError) -> Error {
    let kind = match error.kind.as_str() {
        "rate_limit_error" | "overloaded_error" => ErrorKind::RateLimitExceeded,
        _ => ErrorKind::Other,
    };
    Error::new(format!("{}: {}", error.kind, error.message), kind)
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::io::Chunks;

    async fn collect_events(
        raw: &'static [u8],
    ) -> Result<Vec<ModelResponseEvent>, Error> {
        let chunks = Chunks::from_vec_deque(vec![Bytes::from_static(raw)].into());
        let mut resp = pin!(AnthropicResponse::from_sse(Sse::new(chunks)));
        let mut events = Vec::new();
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            events.push(event);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn test_tool_use_stream() {
        let events =
            collect_events(include_bytes!("../fixtures/tool_use_response.txt"))
                .await
                .unwrap();
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("I'll move ".to_owned()),
                ModelResponseEvent::MessageDelta(
                    "towards the Settings icon.".to_owned()
                ),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "toolu_01".to_owned(),
                    name: "move_cursor".to_owned(),
                    arguments: json!({ "direction": "right", "distance": 50 }),
                }),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "toolu_02".to_owned(),
                    name: "click_cursor".to_owned(),
                    arguments: json!({}),
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );
    }

    #[tokio::test]
    async fn test_overloaded_error_event() {
        let err = collect_events(
            b"event: message_start\n\
data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n\
event: error\n\
data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimitExceeded);
        assert_eq!(err.message(), "overloaded_error: Overloaded");
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let err = collect_events(
            b"data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n\
data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Other);
    }
}
