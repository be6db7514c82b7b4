//! Save-acknowledgment state machine.
//!
//! `Hidden -> Pending -> Visible(Success) -> Hidden` after the timeout, and
//! `Hidden -> Pending -> Visible(Error)` which stays until the field state
//! changes. `Pending` lasts one scheduling tick so a state that is set and
//! read back within the same pass does not flicker.
//!
//! Inputs are [`AckSignal`]s: the field state plus the number of write
//! outcomes seen for the field. Two saves that both end in `Success` differ
//! by their answer count, so the second one is acknowledged even when the
//! `Undefined` in between was never observed.

use fieldsync_core::FieldState;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPhase {
    Hidden,
    Pending(AckKind),
    Visible(AckKind),
}

/// One observation of a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckSignal {
    /// Write outcomes recorded for the field so far.
    pub answers: u64,
    pub state: FieldState,
}

impl AckSignal {
    pub fn new(answers: u64, state: FieldState) -> Self {
        Self { answers, state }
    }
}

impl From<FieldState> for AckSignal {
    fn from(state: FieldState) -> Self {
        Self::new(0, state)
    }
}

#[derive(Debug, Clone)]
pub struct SaveAcknowledgment {
    enabled: bool,
    timeout: Duration,
    phase: AckPhase,
    last: AckSignal,
    observed_at: Option<Instant>,
}

impl SaveAcknowledgment {
    pub fn new(enabled: bool, timeout: Duration) -> Self {
        Self {
            enabled,
            timeout,
            phase: AckPhase::Hidden,
            last: AckSignal::default(),
            observed_at: None,
        }
    }

    /// Feed the current field state. Repeating the same state is a no-op.
    pub fn observe(&mut self, state: FieldState, now: Instant) {
        let answers = self.last.answers;
        self.observe_signal(AckSignal::new(answers, state), now);
    }

    /// Feed a state with its answer count. A new answer restarts the
    /// acknowledgment even when the state itself is unchanged.
    pub fn observe_signal(&mut self, signal: AckSignal, now: Instant) {
        if signal == self.last {
            return;
        }
        self.last = signal;
        self.observed_at = Some(now);
        self.phase = match signal.state {
            FieldState::Success if self.enabled => AckPhase::Pending(AckKind::Success),
            FieldState::Error if self.enabled => AckPhase::Pending(AckKind::Error),
            _ => AckPhase::Hidden,
        };
    }

    /// Advance timers.
    pub fn tick(&mut self, now: Instant) {
        match self.phase {
            AckPhase::Pending(kind) => self.phase = AckPhase::Visible(kind),
            AckPhase::Visible(AckKind::Success) => {
                if self.hide_at().is_some_and(|hide_at| hide_at <= now) {
                    self.phase = AckPhase::Hidden;
                }
            }
            AckPhase::Visible(AckKind::Error) | AckPhase::Hidden => {}
        }
    }

    pub fn phase(&self) -> AckPhase {
        self.phase
    }

    pub fn is_visible(&self) -> bool {
        matches!(self.phase, AckPhase::Visible(_))
    }

    /// When [`tick`](Self::tick) next has something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            AckPhase::Pending(_) => self.observed_at,
            AckPhase::Visible(AckKind::Success) => self.hide_at(),
            AckPhase::Visible(AckKind::Error) | AckPhase::Hidden => None,
        }
    }

    fn hide_at(&self) -> Option<Instant> {
        self.observed_at.map(|at| at + self.timeout)
    }

    /// Drive the machine from a signal channel, publishing visibility.
    ///
    /// Returns when the signal sender is dropped.
    pub async fn run(
        mut self,
        mut states: watch::Receiver<AckSignal>,
        visible: watch::Sender<bool>,
    ) {
        let initial = *states.borrow_and_update();
        self.observe_signal(initial, Instant::now());
        loop {
            let shown = self.is_visible();
            visible.send_if_modified(|current| {
                let modified = *current != shown;
                *current = shown;
                modified
            });

            let deadline = self.next_deadline();
            tokio::select! {
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let signal = *states.borrow_and_update();
                    self.observe_signal(signal, Instant::now());
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.tick(Instant::now());
                }
            }
        }
        visible.send_replace(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack() -> SaveAcknowledgment {
        SaveAcknowledgment::new(true, Duration::from_millis(300))
    }

    #[test]
    fn test_initially_hidden() {
        let ack = ack();
        assert_eq!(ack.phase(), AckPhase::Hidden);
        assert!(ack.next_deadline().is_none());
    }

    #[test]
    fn test_success_shows_after_one_tick_then_hides() {
        let mut ack = ack();
        let t0 = Instant::now();
        ack.observe(FieldState::Success, t0);
        assert!(!ack.is_visible());
        ack.tick(t0);
        assert!(ack.is_visible());
        ack.tick(t0 + Duration::from_millis(299));
        assert!(ack.is_visible());
        ack.tick(t0 + Duration::from_millis(300));
        assert_eq!(ack.phase(), AckPhase::Hidden);
    }

    #[test]
    fn test_error_persists_until_state_changes() {
        let mut ack = ack();
        let t0 = Instant::now();
        ack.observe(FieldState::Error, t0);
        ack.tick(t0);
        ack.tick(t0 + Duration::from_secs(60));
        assert_eq!(ack.phase(), AckPhase::Visible(AckKind::Error));
        ack.observe(FieldState::Undefined, t0 + Duration::from_secs(61));
        assert_eq!(ack.phase(), AckPhase::Hidden);
    }

    #[test]
    fn test_disabled_never_shows() {
        let mut ack = SaveAcknowledgment::new(false, Duration::from_millis(300));
        let t0 = Instant::now();
        ack.observe(FieldState::Success, t0);
        ack.tick(t0);
        assert!(!ack.is_visible());
    }

    #[test]
    fn test_undefined_does_not_show() {
        let mut ack = ack();
        let t0 = Instant::now();
        ack.observe(FieldState::Undefined, t0);
        ack.tick(t0);
        assert!(!ack.is_visible());
    }

    #[test]
    fn test_new_answer_restarts_success() {
        let mut ack = ack();
        let t0 = Instant::now();
        ack.observe_signal(AckSignal::new(1, FieldState::Success), t0);
        ack.tick(t0);
        ack.tick(t0 + Duration::from_millis(300));
        assert_eq!(ack.phase(), AckPhase::Hidden);

        ack.observe_signal(AckSignal::new(1, FieldState::Success), t0 + Duration::from_millis(400));
        assert_eq!(ack.phase(), AckPhase::Hidden);

        let t1 = t0 + Duration::from_millis(500);
        ack.observe_signal(AckSignal::new(2, FieldState::Success), t1);
        assert_eq!(ack.phase(), AckPhase::Pending(AckKind::Success));
        ack.tick(t1);
        assert!(ack.is_visible());
        assert_eq!(ack.next_deadline(), Some(t1 + Duration::from_millis(300)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_publishes_visibility() {
        let (state_tx, state_rx) = watch::channel(AckSignal::default());
        let (visible_tx, mut visible_rx) = watch::channel(false);
        let driver = tokio::spawn(ack().run(state_rx, visible_tx));

        state_tx.send_replace(AckSignal::new(1, FieldState::Success));
        visible_rx.changed().await.unwrap();
        assert!(*visible_rx.borrow_and_update());

        let shown_at = Instant::now();
        visible_rx.changed().await.unwrap();
        assert!(!*visible_rx.borrow_and_update());
        assert!(Instant::now() - shown_at >= Duration::from_millis(299));

        drop(state_tx);
        driver.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_acknowledges_back_to_back_saves() {
        let (state_tx, state_rx) = watch::channel(AckSignal::default());
        let (visible_tx, mut visible_rx) = watch::channel(false);
        let driver = tokio::spawn(ack().run(state_rx, visible_tx));

        state_tx.send_replace(AckSignal::new(1, FieldState::Success));
        visible_rx.changed().await.unwrap();
        assert!(*visible_rx.borrow_and_update());
        visible_rx.changed().await.unwrap();
        assert!(!*visible_rx.borrow_and_update());

        // the driver only sees the last of these
        state_tx.send_replace(AckSignal::new(1, FieldState::Undefined));
        state_tx.send_replace(AckSignal::new(2, FieldState::Success));
        visible_rx.changed().await.unwrap();
        assert!(*visible_rx.borrow_and_update());

        drop(state_tx);
        driver.await.unwrap();
    }
}
