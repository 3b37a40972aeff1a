use std::fmt::{self, Debug};
use std::sync::Arc;

use mirror_agent_model::{
    ContentBlock, ModelMessage, ToolCallRequest, ToolCallResult,
};
use tokio::select;
use tokio::sync::watch;
use tokio::time::sleep;

use super::Shared;
use super::control::{ControlFlags, TaskHandle};
use crate::device::{CursorPosition, Screenshot};
use crate::error::TaskError;
use crate::model_client::ModelClientResponse;
use crate::tool::{self, DoneStatus, ToolAction};
use crate::transcript::Transcript;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum AgentStage {
    #[default]
    Idle,
    Capturing,
    ModelThinking,
    RunningTools,
    Finished,
}

/// How the task ended when it ended on its own terms.
struct Finish {
    success: bool,
    reason: String,
}

/// What the next cycle starts from.
enum NextCycle {
    /// Capture a fresh screenshot and report these results with it.
    Capture(Vec<ToolCallResult>),
    /// Show the model the screenshot it has already seen.
    Reconsider(Screenshot),
}

enum BatchOutcome {
    Continue(Vec<ToolCallResult>),
    Finished(Finish),
}

/// The state of a single running task.
///
/// Everything here is discarded when the task ends.
pub(super) struct TaskRun {
    shared: Arc<Shared>,
    // Keeps the control channel open for as long as the task runs.
    _handle: TaskHandle,
    control: watch::Receiver<ControlFlags>,
    description: String,
    transcript: Transcript,
    stage: AgentStage,
    on_status: Box<dyn Fn(&str) + Send + Sync>,
}

impl Debug for TaskRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRun")
            .field("description", &self.description)
            .field("turns", &self.transcript.len())
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

impl TaskRun {
    pub(super) fn new(
        shared: Arc<Shared>,
        handle: TaskHandle,
        description: String,
        on_status: Box<dyn Fn(&str) + Send + Sync>,
    ) -> Self {
        let control = handle.subscribe();
        Self {
            shared,
            _handle: handle,
            control,
            description,
            transcript: Transcript::default(),
            stage: AgentStage::Idle,
            on_status,
        }
    }

    /// Drives the task to its end and returns the outcome.
    pub(super) async fn execute(mut self) -> (bool, String) {
        info!("starting task: {}", self.description);
        let result = self.drive().await;
        self.enter(AgentStage::Finished);

        match result {
            Ok(Finish { success, reason }) => {
                if success {
                    info!("task completed: {reason}");
                } else {
                    warn!("task failed: {reason}");
                }
                (success, reason)
            }
            Err(err) => {
                err.log();
                (false, err.to_string())
            }
        }
    }

    async fn drive(&mut self) -> Result<Finish, TaskError> {
        let mut next = NextCycle::Capture(Vec::new());
        loop {
            self.checkpoint().await?;

            let (screenshot, tool_results) = match next {
                NextCycle::Capture(tool_results) => {
                    self.report(if self.transcript.is_empty() {
                        "Capturing initial screenshot..."
                    } else {
                        "Capturing new screenshot after action..."
                    });
                    (self.capture().await?, tool_results)
                }
                NextCycle::Reconsider(screenshot) => (screenshot, Vec::new()),
            };

            self.report(if self.transcript.is_empty() {
                "Analyzing initial screenshot..."
            } else if !tool_results.is_empty() {
                "Analyzing new screenshot..."
            } else {
                "Analyzing current state..."
            });
            self.checkpoint().await?;

            let response = self.ask(&screenshot, tool_results).await?;
            self.checkpoint().await?;
            self.report("Received response from Claude, processing...");

            next = if response.wants_tools()
                && !response.tool_calls.is_empty()
            {
                match self.run_tools(response.tool_calls).await? {
                    BatchOutcome::Finished(finish) => return Ok(finish),
                    BatchOutcome::Continue(results) => {
                        NextCycle::Capture(results)
                    }
                }
            } else {
                debug!("no tool called, showing the same screen again");
                NextCycle::Reconsider(screenshot)
            };

            self.rest().await?;
        }
    }

    /// Waits while the task is paused, and fails if it was cancelled.
    async fn checkpoint(&mut self) -> Result<(), TaskError> {
        let mut suspended = false;
        loop {
            let flags = *self.control.borrow_and_update();
            if flags.cancelled {
                return Err(TaskError::Cancelled);
            }
            if !flags.paused {
                if suspended {
                    info!("task resumed");
                    self.report("Resumed");
                }
                return Ok(());
            }
            if !suspended {
                info!("task paused");
                self.report("Paused");
                suspended = true;
            }
            if self.control.changed().await.is_err() {
                return Err(TaskError::Cancelled);
            }
        }
    }

    /// Sleeps between two cycles. Cancellation cuts the sleep short.
    async fn rest(&mut self) -> Result<(), TaskError> {
        let mut control = self.control.clone();
        select! {
            biased;
            Ok(_) = control.wait_for(|flags| flags.cancelled) => {
                return Err(TaskError::Cancelled);
            }
            _ = sleep(self.shared.cycle_delay) => {}
        }
        self.checkpoint().await
    }

    async fn capture(&mut self) -> Result<Screenshot, TaskError> {
        self.enter(AgentStage::Capturing);
        let screenshot =
            self.shared.screen.capture().await.map_err(TaskError::Capture)?;
        debug!("screenshot captured, cursor at {}", screenshot.cursor);
        Ok(screenshot)
    }

    /// Sends the screen to the model and records both turns.
    async fn ask(
        &mut self,
        screenshot: &Screenshot,
        tool_results: Vec<ToolCallResult>,
    ) -> Result<ModelClientResponse, TaskError> {
        let limit = self.shared.max_turns;
        if self.transcript.len() >= limit {
            return Err(TaskError::LimitExceeded { limit });
        }

        let after_tools = !tool_results.is_empty();
        let mut content: Vec<_> = tool_results
            .into_iter()
            .map(ContentBlock::ToolResult)
            .collect();
        content.push(ContentBlock::Text(
            self.narrate(after_tools, screenshot.cursor),
        ));
        content.push(ContentBlock::Image(screenshot.image.clone()));
        self.transcript.push(ModelMessage::user(content));

        self.enter(AgentStage::ModelThinking);
        let request = self.transcript.to_request(
            self.shared.system_prompt.as_deref(),
            &self.shared.tools,
        );
        let response = self
            .shared
            .model_client
            .send_request(request)
            .await
            .map_err(|err| TaskError::Transport {
                kind: err.kind(),
                message: err.to_string(),
            })?;

        let text = response.text();
        if !text.is_empty() {
            info!("model: {text}");
        }
        self.transcript
            .push(ModelMessage::assistant(response.content.clone()));
        Ok(response)
    }

    fn narrate(&self, after_tools: bool, cursor: CursorPosition) -> String {
        let framing = if after_tools {
            "Here's the latest screenshot after running the tool(s) for the task"
        } else {
            "Here's the initial screenshot for the task"
        };
        format!(
            "{framing}: {}\n\
             Current cursor position: {cursor}. The cursor is represented by \
             a red circle with crosshairs on the screenshot.\n\
             Please analyze the image and suggest the next action.",
            self.description
        )
    }

    /// Carries out a batch of tool calls in order.
    ///
    /// The batch stops at the first `done` call or the first failure.
    async fn run_tools(
        &mut self,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Result<BatchOutcome, TaskError> {
        self.enter(AgentStage::RunningTools);
        let mut results = Vec::with_capacity(tool_calls.len());

        for req in tool_calls {
            let actuation_error = |source: tool::Error| TaskError::Actuation {
                tool: req.name.clone(),
                source,
            };

            let action = ToolAction::decode(&req).map_err(actuation_error)?;
            let outcome = match action {
                ToolAction::Done { status, reason } => {
                    debug!("model declared the task {status}");
                    return Ok(BatchOutcome::Finished(Finish {
                        success: status == DoneStatus::Completed,
                        reason,
                    }));
                }
                ToolAction::MoveCursor {
                    direction,
                    distance,
                } => {
                    self.report(&format!("Executing {}...", req.name));
                    self.shared.actuator.move_cursor(direction, distance).await
                }
                ToolAction::ClickCursor => {
                    self.report(&format!("Executing {}...", req.name));
                    self.shared.actuator.click().await
                }
                ToolAction::Unknown(name) => {
                    return Err(actuation_error(
                        tool::Error::unknown_tool()
                            .with_reason(format!("no tool named {name}")),
                    ));
                }
            };

            let output = outcome.map_err(|err| actuation_error(err.into()))?;
            info!("{}: {output}", req.name);
            results.push(ToolCallResult {
                id: req.id,
                content: output,
            });
        }

        Ok(BatchOutcome::Continue(results))
    }

    #[inline]
    fn enter(&mut self, stage: AgentStage) {
        if self.stage != stage {
            trace!("stage {:?} -> {:?}", self.stage, stage);
            self.stage = stage;
        }
    }

    #[inline]
    fn report(&self, status: &str) {
        debug!("status: {status}");
        (self.on_status)(status);
    }
}
