use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mirror_agent_model::ModelProvider;

use super::{Agent, Shared};
use crate::device::{
    Actuator, ActuatorObject, AnyDevice, ScreenCapture, ScreenCaptureObject,
};
use crate::model_client::ModelClient;
use crate::tool;

/// The default maximum number of turns in a task's transcript.
pub const DEFAULT_MAX_TURNS: usize = 50;

/// The default pause between two cycles of a task.
pub const DEFAULT_CYCLE_DELAY: Duration = Duration::from_secs(1);

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    screen: Box<dyn ScreenCaptureObject>,
    actuator: Box<dyn ActuatorObject>,
    system_prompt: Option<String>,
    max_turns: usize,
    cycle_delay: Duration,
}

impl AgentBuilder {
    /// Creates a new builder with the model provider and the device the
    /// agent operates.
    #[inline]
    pub fn new<P, S, A>(provider: P, screen: S, actuator: A) -> Self
    where
        P: ModelProvider + 'static,
        S: ScreenCapture,
        A: Actuator,
    {
        Self {
            model_client: ModelClient::new(provider),
            screen: Box::new(AnyDevice(screen)),
            actuator: Box::new(AnyDevice(actuator)),
            system_prompt: None,
            max_turns: DEFAULT_MAX_TURNS,
            cycle_delay: DEFAULT_CYCLE_DELAY,
        }
    }

    /// Sets the system prompt sent with every request.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the maximum number of turns a task's transcript may hold.
    ///
    /// A task that would exceed it fails instead of calling the model.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Sets the pause between two cycles of a task.
    #[inline]
    pub fn with_cycle_delay(mut self, delay: Duration) -> Self {
        self.cycle_delay = delay;
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        let Self {
            model_client,
            screen,
            actuator,
            system_prompt,
            max_turns,
            cycle_delay,
        } = self;

        let shared = Shared {
            model_client,
            screen,
            actuator,
            system_prompt,
            tools: tool::definitions(),
            max_turns,
            cycle_delay,
            device_lock: Default::default(),
            active: Mutex::new(None),
            next_task_id: AtomicU64::new(1),
        };
        Agent {
            shared: Arc::new(shared),
        }
    }
}
