use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ControlFlags {
    pub paused: bool,
    pub cancelled: bool,
}

/// Controls a single task.
///
/// Pausing and cancelling are requests: the task observes them at its next
/// checkpoint, which is before capturing the screen, before calling the
/// model, after the model has answered, and after the pause between two
/// cycles. A batch of actions already being carried out always runs to
/// its end.
///
/// Handles are cheap to clone and stay valid after the task has ended.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    id: u64,
    flags: Arc<watch::Sender<ControlFlags>>,
}

impl TaskHandle {
    pub(crate) fn new(id: u64) -> Self {
        let (flags, _) = watch::channel(ControlFlags::default());
        Self {
            id,
            flags: Arc::new(flags),
        }
    }

    /// Returns the identifier of the task.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Asks the task to pause at its next checkpoint.
    pub fn pause(&self) {
        let changed = self.flags.send_if_modified(|flags| {
            let changed = !flags.paused;
            flags.paused = true;
            changed
        });
        if changed {
            info!("task {} pause requested", self.id);
        }
    }

    /// Lets a paused task continue.
    pub fn resume(&self) {
        let changed = self.flags.send_if_modified(|flags| {
            let changed = flags.paused;
            flags.paused = false;
            changed
        });
        if changed {
            info!("task {} resume requested", self.id);
        }
    }

    /// Asks the task to stop at its next checkpoint.
    ///
    /// A cancelled task ends with a failure, even if it was paused.
    pub fn cancel(&self) {
        let changed = self.flags.send_if_modified(|flags| {
            let changed = !flags.cancelled;
            flags.cancelled = true;
            changed
        });
        if changed {
            info!("task {} cancellation requested", self.id);
        }
    }

    /// Returns `true` if the task has been asked to pause.
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.flags.borrow().paused
    }

    /// Returns `true` if the task has been asked to cancel.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flags.borrow().cancelled
    }

    #[inline]
    pub(crate) fn subscribe(&self) -> watch::Receiver<ControlFlags> {
        self.flags.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let handle = TaskHandle::new(7);
        let rx = handle.subscribe();
        assert_eq!(handle.id(), 7);
        assert!(!handle.is_paused());

        handle.pause();
        handle.pause();
        assert!(handle.is_paused());
        assert!(rx.has_changed().unwrap());

        let clone = handle.clone();
        clone.resume();
        assert!(!handle.is_paused());

        handle.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(
            *rx.borrow(),
            ControlFlags {
                paused: false,
                cancelled: true,
            }
        );
    }
}
