use tokio::sync::watch;

/// Process-wide pipeline state.
///
/// Checked only at tick and claim boundaries; a stage already in flight
/// always runs to completion or timeout. `Stopping` is terminal and ends
/// the task loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Paused,
    Stopping,
}

/// Start/stop controller shared by every pipeline task.
pub struct Controller {
    tx: watch::Sender<PipelineState>,
}

impl Controller {
    pub fn new(start_paused: bool) -> Self {
        let initial = if start_paused {
            PipelineState::Paused
        } else {
            PipelineState::Running
        };
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        *self.tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    /// Toggle between running and paused. A stopping pipeline stays
    /// stopping.
    pub fn set_running(&self, running: bool) {
        self.tx.send_if_modified(|state| {
            if *state == PipelineState::Stopping {
                return false;
            }
            let next = if running {
                PipelineState::Running
            } else {
                PipelineState::Paused
            };
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    pub fn stop(&self) {
        self.tx.send_replace(PipelineState::Stopping);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_between_running_and_paused() {
        let controller = Controller::new(false);
        assert!(controller.is_running());

        controller.set_running(false);
        assert_eq!(controller.state(), PipelineState::Paused);

        controller.set_running(true);
        assert_eq!(controller.state(), PipelineState::Running);
    }

    #[test]
    fn starts_paused_when_asked() {
        let controller = Controller::new(true);
        assert_eq!(controller.state(), PipelineState::Paused);
    }

    #[test]
    fn stopping_is_terminal() {
        let controller = Controller::new(false);
        controller.stop();
        controller.set_running(true);
        assert_eq!(controller.state(), PipelineState::Stopping);
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let controller = Controller::new(false);
        let mut rx = controller.subscribe();

        controller.set_running(false);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), PipelineState::Paused);
    }
}
