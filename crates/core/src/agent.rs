mod builder;
mod control;
mod task;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mirror_agent_model::ModelTool;
use tracing::Instrument;

use crate::device::{ActuatorObject, ScreenCaptureObject};
use crate::model_client::ModelClient;
pub use builder::{AgentBuilder, DEFAULT_CYCLE_DELAY, DEFAULT_MAX_TURNS};
pub use control::TaskHandle;
use task::TaskRun;

/// An agent that operates the mirrored device on behalf of a user.
///
/// The agent owns a model provider, a screen and an actuator. Each call to
/// [`Agent::run`] starts a task that loops over capturing the screen,
/// asking the model what to do, and carrying out the requested actions,
/// until the model declares the task done or the task fails.
///
/// Tasks share the device, so they never overlap: a task started while
/// another one is running waits until the earlier one has ended. Every
/// task begins with an empty transcript.
///
/// Cloning an agent is cheap, all clones refer to the same device.
#[derive(Clone)]
pub struct Agent {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    model_client: ModelClient,
    screen: Box<dyn ScreenCaptureObject>,
    actuator: Box<dyn ActuatorObject>,
    system_prompt: Option<String>,
    tools: Vec<ModelTool>,
    max_turns: usize,
    cycle_delay: Duration,
    // Held by the task currently driving the device.
    device_lock: tokio::sync::Mutex<()>,
    active: Mutex<Option<TaskHandle>>,
    next_task_id: AtomicU64,
}

impl Agent {
    /// Starts a task described in natural language.
    ///
    /// `on_status` receives progress messages while the task runs.
    /// `on_complete` is invoked exactly once when the task ends, with
    /// whether it succeeded and a human-readable reason.
    ///
    /// The returned handle controls this specific task, even before it has
    /// started running.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn run<S, C, U>(
        &self,
        description: S,
        on_complete: C,
        on_status: U,
    ) -> TaskHandle
    where
        S: Into<String>,
        C: FnOnce(bool, String) + Send + 'static,
        U: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.shared.next_task_id.fetch_add(1, Ordering::Relaxed);
        let handle = TaskHandle::new(id);
        let description = description.into();
        let shared = Arc::clone(&self.shared);
        let task_handle = handle.clone();

        tokio::spawn(
            async move {
                let device_guard = shared.device_lock.lock().await;
                shared.set_active(Some(task_handle.clone()));

                let run = TaskRun::new(
                    Arc::clone(&shared),
                    task_handle,
                    description,
                    Box::new(on_status),
                );
                let (success, reason) = run.execute().await;

                shared.set_active(None);
                drop(device_guard);
                on_complete(success, reason);
            }
            .instrument(info_span!("task", id)),
        );

        handle
    }

    /// Pauses the running task, if any.
    #[inline]
    pub fn pause(&self) {
        if let Some(handle) = self.shared.active() {
            handle.pause();
        }
    }

    /// Resumes the running task, if any.
    #[inline]
    pub fn resume(&self) {
        if let Some(handle) = self.shared.active() {
            handle.resume();
        }
    }

    /// Cancels the running task, if any.
    #[inline]
    pub fn cancel(&self) {
        if let Some(handle) = self.shared.active() {
            handle.cancel();
        }
    }

    /// Returns `true` if the running task is paused.
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.shared.active().is_some_and(|handle| handle.is_paused())
    }

    /// Returns `true` if the running task has been asked to cancel.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.shared
            .active()
            .is_some_and(|handle| handle.is_cancelled())
    }
}

impl Shared {
    #[inline]
    fn active(&self) -> Option<TaskHandle> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[inline]
    fn set_active(&self, handle: Option<TaskHandle>) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = handle;
    }
}
