//! Tools the model can call to operate the device.
//!
//! The set of tools is closed: the cursor can be moved, it can click, and
//! the model can declare the task finished. Calls are decoded into a
//! [`ToolAction`] before anything touches the device.

mod action;
mod error;

use mirror_agent_model::ModelTool;
use schemars::{JsonSchema, schema_for};

pub use action::{
    ClickCursorParameters, DoneParameters, DoneStatus, MoveCursorParameters,
    ToolAction,
};
pub use error::{Error, ErrorKind};

/// Name of the tool that moves the cursor.
pub const MOVE_CURSOR: &str = "move_cursor";
/// Name of the tool that clicks at the cursor.
pub const CLICK_CURSOR: &str = "click_cursor";
/// Name of the tool that ends the task.
pub const DONE: &str = "done";

/// Returns the definitions of all tools, as advertised to the model.
pub fn definitions() -> Vec<ModelTool> {
    vec![
        definition::<MoveCursorParameters>(
            MOVE_CURSOR,
            "Move the cursor in a specified direction by a certain distance. \
             Use this to position the cursor over the element you want to \
             interact with.",
        ),
        definition::<ClickCursorParameters>(
            CLICK_CURSOR,
            "Click at the current cursor position.",
        ),
        definition::<DoneParameters>(
            DONE,
            "Indicate that the task is finished, either because it was \
             completed or because it cannot be completed.",
        ),
    ]
}

#[inline]
fn definition<T: JsonSchema>(name: &str, description: &str) -> ModelTool {
    ModelTool {
        name: name.to_owned(),
        description: description.to_owned(),
        parameters: schema_for!(T).to_value(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_definitions() {
        let tools = definitions();
        let names: Vec<_> = tools.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names, [MOVE_CURSOR, CLICK_CURSOR, DONE]);

        let move_cursor = &tools[0].parameters;
        assert_eq!(move_cursor["type"], "object");
        assert_eq!(move_cursor["required"], json!(["direction", "distance"]));
        assert_eq!(
            move_cursor["properties"]["direction"]["enum"],
            json!(["up", "down", "left", "right"])
        );

        let click_cursor = &tools[1].parameters;
        assert_eq!(click_cursor["type"], "object");

        let done = &tools[2].parameters;
        assert_eq!(done["required"], json!(["status", "reason"]));
        assert_eq!(
            done["properties"]["status"]["enum"],
            json!(["completed", "failed"])
        );
    }
}
