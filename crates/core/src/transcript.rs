//! The conversation a task holds with the model.

use mirror_agent_model::{ModelMessage, ModelRequest, ModelTool, Role};

/// The ordered turns of a single task.
///
/// Turns strictly alternate between the user and the assistant, starting
/// with a user turn. Content is kept exactly as it was sent or received.
#[derive(Clone, Default, Debug)]
pub struct Transcript {
    turns: Vec<ModelMessage>,
}

impl Transcript {
    /// Returns the number of turns.
    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns `true` if no turn has been recorded yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns all turns in order.
    #[inline]
    pub fn turns(&self) -> &[ModelMessage] {
        &self.turns
    }

    pub(crate) fn push(&mut self, msg: ModelMessage) {
        let expected = match self.turns.last() {
            None | Some(ModelMessage { role: Role::Assistant, .. }) => Role::User,
            Some(_) => Role::Assistant,
        };
        debug_assert_eq!(msg.role, expected, "turns must alternate");
        self.turns.push(msg);
    }

    pub(crate) fn to_request(
        &self,
        system: Option<&str>,
        tools: &[ModelTool],
    ) -> ModelRequest {
        ModelRequest {
            system: system.map(ToOwned::to_owned),
            messages: self.turns.clone(),
            tools: tools.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use mirror_agent_model::ContentBlock;

    use super::*;

    #[test]
    fn test_alternating_turns() {
        let mut transcript = Transcript::default();
        assert!(transcript.is_empty());

        transcript.push(ModelMessage::user(vec![ContentBlock::Text(
            "Open Settings".to_owned(),
        )]));
        transcript.push(ModelMessage::assistant(vec![ContentBlock::Text(
            "Looking for the icon.".to_owned(),
        )]));
        assert_eq!(transcript.len(), 2);

        let request = transcript.to_request(Some("system"), &[]);
        assert_eq!(request.system.as_deref(), Some("system"));
        assert_eq!(request.messages, transcript.turns());
    }

    #[test]
    #[should_panic(expected = "turns must alternate")]
    #[cfg(debug_assertions)]
    fn test_rejects_consecutive_user_turns() {
        let mut transcript = Transcript::default();
        transcript.push(ModelMessage::user(vec![]));
        transcript.push(ModelMessage::user(vec![]));
    }
}
