use mirror_agent_anthropic_model::AnthropicProvider;
use mirror_agent_core::device::{Actuator, ScreenCapture};
use mirror_agent_core::{Agent, AgentBuilder, TaskHandle};
use mirror_agent_model::ModelProvider;

use crate::config::Config;
use crate::screen::MacScreen;

/// The system prompt sessions use unless told otherwise.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("./system_prompt.md");

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
}

impl SessionBuilder {
    /// Creates a session builder that talks to Anthropic and drives this
    /// Mac's display, as described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let provider = AnthropicProvider::new(config.provider_config());
        let screen = MacScreen::new().with_region(config.capture_region);
        Self::with_device(provider, screen.clone(), screen)
            .with_max_turns(config.max_messages)
    }

    /// Creates a session builder with a specified model provider and
    /// device.
    pub fn with_device<M, S, A>(provider: M, screen: S, actuator: A) -> Self
    where
        M: ModelProvider + 'static,
        S: ScreenCapture,
        A: Actuator,
    {
        let agent_builder = AgentBuilder::new(provider, screen, actuator)
            .with_system_prompt(DEFAULT_SYSTEM_PROMPT);
        Self { agent_builder }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Sets the maximum number of messages in a task's conversation.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.agent_builder = self.agent_builder.with_max_turns(max_turns);
        self
    }

    /// Builds a new session.
    #[inline]
    pub fn build(self) -> Session {
        Session {
            agent: self.agent_builder.build(),
        }
    }
}

/// A session, like a window that mirrors the phone and has a task input.
///
/// The session holds a fully configured agent that you can use directly, and
/// it is basically a wrapper around [`Agent`].
#[derive(Clone)]
pub struct Session {
    agent: Agent,
}

impl Session {
    /// Starts a task. See [`Agent::run`].
    #[inline]
    pub fn run<C, U>(
        &self,
        task: &str,
        on_complete: C,
        on_status: U,
    ) -> TaskHandle
    where
        C: FnOnce(bool, String) + Send + 'static,
        U: Fn(&str) + Send + Sync + 'static,
    {
        self.agent.run(task, on_complete, on_status)
    }

    /// Pauses the running task.
    #[inline]
    pub fn pause(&self) {
        self.agent.pause();
    }

    /// Resumes the running task.
    #[inline]
    pub fn resume(&self) {
        self.agent.resume();
    }

    /// Cancels the running task.
    #[inline]
    pub fn cancel(&self) {
        self.agent.cancel();
    }

    /// Returns `true` if the running task is paused.
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.agent.is_paused()
    }

    /// Returns `true` if the running task is being cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.agent.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use mirror_agent_core::device::{
        CursorPosition, DeviceError, Direction, Screenshot,
    };
    use mirror_agent_model::{ImageFormat, ImageSource};
    use mirror_agent_test_model::{
        PresetEvent, PresetResponse, TestModelProvider,
    };
    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;

    struct StillScreen;

    impl ScreenCapture for StillScreen {
        fn capture(
            &self,
        ) -> impl Future<Output = Result<Screenshot, DeviceError>> + Send + 'static
        {
            ready(Ok(Screenshot {
                image: ImageSource {
                    format: ImageFormat::Jpeg,
                    data: "/9j/".to_owned(),
                },
                cursor: CursorPosition::new(100, 200),
            }))
        }
    }

    struct NoopActuator;

    impl Actuator for NoopActuator {
        fn move_cursor(
            &self,
            direction: Direction,
            distance: u32,
        ) -> impl Future<Output = Result<String, DeviceError>> + Send + 'static
        {
            ready(Ok(format!("Moved {direction} by {distance}")))
        }

        fn click(
            &self,
        ) -> impl Future<Output = Result<String, DeviceError>> + Send + 'static
        {
            ready(Ok("Clicked".to_owned()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_task() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_exchange(PresetResponse::with_events([
            PresetEvent::tool_call(
                "toolu_1",
                "done",
                json!({ "status": "completed", "reason": "Home screen shown" }),
            ),
        ]));

        let session = SessionBuilder::with_device(
            model_provider.clone(),
            StillScreen,
            NoopActuator,
        )
        .build();

        let (tx, rx) = oneshot::channel();
        session.run(
            "Go to the home screen",
            move |success, reason| {
                tx.send((success, reason)).unwrap();
            },
            |_| {},
        );
        assert_eq!(rx.await.unwrap(), (true, "Home screen shown".to_owned()));

        let requests = model_provider.requests();
        assert_eq!(requests[0].system.as_deref(), Some(DEFAULT_SYSTEM_PROMPT));
        assert!(!session.is_paused());
    }
}
