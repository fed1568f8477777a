use crate::lifecycle::{SessionEvent, SupervisoryState, Supervision, TerminationReason};
use crate::transport::PeerConnectionState;
use std::time::Duration;
use tether_core::SessionId;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum MonitorControl {
    ArmDeadline,
    Shutdown,
}

/// Watches one session's transport and reports supervision.
///
/// The monitor only publishes: the latest value on a `watch` for the
/// negotiator, every change on the shared `broadcast` bus for observers. It
/// never touches negotiator state.
pub struct LifecycleMonitor {
    session_id: SessionId,
    deadline_window: Duration,
    states_rx: mpsc::Receiver<PeerConnectionState>,
    control_rx: mpsc::UnboundedReceiver<MonitorControl>,
    supervision_tx: watch::Sender<Supervision>,
    events_tx: broadcast::Sender<SessionEvent>,
    deadline: Option<Instant>,
}

/// Control side of a running `LifecycleMonitor`.
pub struct LifecycleHandle {
    control_tx: mpsc::UnboundedSender<MonitorControl>,
    supervision_rx: watch::Receiver<Supervision>,
}

impl LifecycleHandle {
    /// Starts the negotiation deadline. Only the first call counts.
    pub fn arm_deadline(&self) {
        let _ = self.control_tx.send(MonitorControl::ArmDeadline);
    }

    pub fn shutdown(&self) {
        let _ = self.control_tx.send(MonitorControl::Shutdown);
    }

    pub fn supervision(&self) -> watch::Receiver<Supervision> {
        self.supervision_rx.clone()
    }

    pub fn current(&self) -> Supervision {
        *self.supervision_rx.borrow()
    }
}

impl LifecycleMonitor {
    pub fn spawn(
        session_id: SessionId,
        deadline_window: Duration,
        states_rx: mpsc::Receiver<PeerConnectionState>,
        events_tx: broadcast::Sender<SessionEvent>,
    ) -> LifecycleHandle {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (supervision_tx, supervision_rx) =
            watch::channel(Supervision::new(SupervisoryState::Connecting));

        let monitor = Self {
            session_id,
            deadline_window,
            states_rx,
            control_rx,
            supervision_tx,
            events_tx,
            deadline: None,
        };
        tokio::spawn(monitor.run());

        LifecycleHandle {
            control_tx,
            supervision_rx,
        }
    }

    async fn run(mut self) {
        debug!(session = %self.session_id, "Lifecycle monitor started");
        let mut states_open = true;

        while !self.current().is_terminated() {
            let deadline = self.deadline;

            tokio::select! {
                state = self.states_rx.recv(), if states_open => match state {
                    Some(s) => self.observe(s),
                    None => states_open = false,
                },

                ctl = self.control_rx.recv() => match ctl {
                    Some(MonitorControl::ArmDeadline) => self.arm_deadline(),
                    Some(MonitorControl::Shutdown) | None => break,
                },

                _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                    warn!(
                        session = %self.session_id,
                        "Not connected within {:?}", self.deadline_window
                    );
                    self.deadline = None;
                    self.publish(Supervision::terminated(TerminationReason::DeadlineExceeded));
                }
            }
        }

        debug!(session = %self.session_id, "Lifecycle monitor finished");
    }

    fn current(&self) -> Supervision {
        *self.supervision_tx.borrow()
    }

    fn observe(&mut self, raw: PeerConnectionState) {
        let next = Supervision::from_transport(raw);
        if next == self.current() {
            return;
        }

        if next.state == SupervisoryState::Connected {
            self.deadline = None;
        }
        self.publish(next);
    }

    fn arm_deadline(&mut self) {
        if self.deadline.is_some() || self.current().state == SupervisoryState::Connected {
            return;
        }
        debug!(
            session = %self.session_id,
            "Negotiation deadline armed: {:?}", self.deadline_window
        );
        self.deadline = Some(Instant::now() + self.deadline_window);
    }

    fn publish(&self, next: Supervision) {
        info!(
            session = %self.session_id,
            "Supervisory state -> {:?} ({:?})", next.state, next.reason
        );
        self.supervision_tx.send_replace(next);
        let _ = self.events_tx.send(SessionEvent::Supervisory {
            session_id: self.session_id,
            supervision: next,
        });
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
