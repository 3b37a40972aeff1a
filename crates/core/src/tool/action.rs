use std::fmt::{self, Display};

use mirror_agent_model::ToolCallRequest;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{CLICK_CURSOR, DONE, Error, MOVE_CURSOR};
use crate::device::Direction;

/// Parameters of `move_cursor`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct MoveCursorParameters {
    /// The direction to move the cursor in.
    pub direction: Direction,
    /// How far to move the cursor, in pixels.
    pub distance: u32,
}

/// Parameters of `click_cursor`. The tool takes none.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct ClickCursorParameters {}

/// How a task ended, as declared by the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
#[schemars(rename_all = "lowercase", inline)]
pub enum DoneStatus {
    /// The task was accomplished.
    Completed,
    /// The task could not be accomplished.
    Failed,
}

// Anything other than "completed" counts as a failure.
impl<'de> Deserialize<'de> for DoneStatus {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let status = String::deserialize(deserializer)?;
        if status == "completed" {
            Ok(DoneStatus::Completed)
        } else {
            Ok(DoneStatus::Failed)
        }
    }
}

impl Display for DoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoneStatus::Completed => f.write_str("completed"),
            DoneStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Parameters of `done`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct DoneParameters {
    /// Whether the task was completed or failed.
    pub status: DoneStatus,
    /// Why the task ended.
    pub reason: String,
}

/// A decoded tool call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolAction {
    /// Move the cursor.
    MoveCursor {
        /// The direction to move in.
        direction: Direction,
        /// The distance in pixels.
        distance: u32,
    },
    /// Click at the cursor.
    ClickCursor,
    /// End the task.
    Done {
        /// How the task ended.
        status: DoneStatus,
        /// Why the task ended.
        reason: String,
    },
    /// A tool this agent does not know about.
    Unknown(String),
}

impl ToolAction {
    /// Decodes a tool call requested by the model.
    ///
    /// Calls to unknown tools decode successfully into
    /// [`ToolAction::Unknown`], it is up to the caller to reject them.
    pub fn decode(req: &ToolCallRequest) -> Result<Self, Error> {
        let action = match req.name.as_str() {
            MOVE_CURSOR => {
                let params: MoveCursorParameters = parse(&req.arguments)?;
                ToolAction::MoveCursor {
                    direction: params.direction,
                    distance: params.distance,
                }
            }
            CLICK_CURSOR => {
                let _: ClickCursorParameters = parse(&req.arguments)?;
                ToolAction::ClickCursor
            }
            DONE => {
                let params: DoneParameters = parse(&req.arguments)?;
                ToolAction::Done {
                    status: params.status,
                    reason: params.reason,
                }
            }
            name => ToolAction::Unknown(name.to_owned()),
        };
        Ok(action)
    }
}

#[inline]
fn parse<T: DeserializeOwned>(arguments: &Value) -> Result<T, Error> {
    serde_json::from_value(arguments.clone())
        .map_err(|err| Error::invalid_input().with_reason(format!("{err}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::ErrorKind;

    fn request(name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: "toolu_1".to_owned(),
            name: name.to_owned(),
            arguments,
        }
    }

    #[test]
    fn test_decode_actions() {
        let action = ToolAction::decode(&request(
            "move_cursor",
            json!({ "direction": "up", "distance": 120 }),
        ))
        .unwrap();
        assert_eq!(
            action,
            ToolAction::MoveCursor {
                direction: Direction::Up,
                distance: 120,
            }
        );

        let action =
            ToolAction::decode(&request("click_cursor", json!({}))).unwrap();
        assert_eq!(action, ToolAction::ClickCursor);

        let action =
            ToolAction::decode(&request("swipe", json!({ "dx": 1 }))).unwrap();
        assert_eq!(action, ToolAction::Unknown("swipe".to_owned()));
    }

    #[test]
    fn test_decode_done_status() {
        let decode = |status: &str| {
            let action = ToolAction::decode(&request(
                "done",
                json!({ "status": status, "reason": "Settings opened" }),
            ))
            .unwrap();
            match action {
                ToolAction::Done { status, reason } => {
                    assert_eq!(reason, "Settings opened");
                    status
                }
                other => panic!("expected done, got {other:?}"),
            }
        };
        assert_eq!(decode("completed"), DoneStatus::Completed);
        assert_eq!(decode("failed"), DoneStatus::Failed);
        assert_eq!(decode("gave_up"), DoneStatus::Failed);
    }

    #[test]
    fn test_decode_invalid_input() {
        let err = ToolAction::decode(&request(
            "move_cursor",
            json!({ "direction": "diagonal", "distance": 10 }),
        ))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = ToolAction::decode(&request(
            "move_cursor",
            json!({ "direction": "left", "distance": -5 }),
        ))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = ToolAction::decode(&request("done", json!({}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
