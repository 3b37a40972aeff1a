use mirror_agent_model::ErrorKind as ModelErrorKind;

use crate::device::DeviceError;
use crate::tool;

/// The reason a task ended without success.
///
/// The `Display` form of each variant is the reason string handed to the
/// completion callback.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The screen could not be captured.
    #[error("Screenshot capture failed")]
    Capture(#[source] DeviceError),

    /// The model could not be reached, or answered with an error.
    #[error("Failed to communicate with Claude")]
    Transport {
        /// What kind of failure the provider reported.
        kind: ModelErrorKind,
        /// The provider's description of the failure.
        message: String,
    },

    /// A tool call could not be decoded or executed.
    #[error("Error executing {tool}")]
    Actuation {
        /// The name of the tool as requested by the model.
        tool: String,
        /// What went wrong.
        #[source]
        source: tool::Error,
    },

    /// The transcript reached its maximum length.
    #[error(
        "Conversation exceeded maximum length of {limit} messages. Exiting task as failed."
    )]
    LimitExceeded {
        /// The configured maximum number of turns.
        limit: usize,
    },

    /// The task was cancelled by its owner.
    #[error("Task cancelled by user")]
    Cancelled,
}

impl TaskError {
    /// Returns `true` for endings that are a normal part of operation
    /// rather than faults.
    #[inline]
    pub fn is_expected(&self) -> bool {
        matches!(self, TaskError::Cancelled | TaskError::LimitExceeded { .. })
    }

    pub(crate) fn log(&self) {
        if self.is_expected() {
            warn!("task stopped: {self}");
            return;
        }
        match self {
            TaskError::Capture(err) => error!("{self}: {err}"),
            TaskError::Transport { kind, message } => {
                error!("{self} ({kind}): {message}");
            }
            TaskError::Actuation { source, .. } => error!("{self}: {source}"),
            TaskError::Cancelled | TaskError::LimitExceeded { .. } => {}
        }
    }
}
