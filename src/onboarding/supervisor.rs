//! Stage timers: the race-and-cancel half of every suspend point.
//!
//! Each stage arms exactly one timer on entry. The timer is a spawned task
//! racing a sleep against an explicit disarm signal; on expiry it injects a
//! [`StageEvent::StageTimedOut`] into the session's mailbox, where the engine
//! discards it if the session has already moved on. Nothing here mutates
//! session state directly, so a lost race can never duplicate a side effect.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::ids::UserId;

use super::events::StageEvent;
use super::stage::Stage;

/// Handle to an armed stage timer.
///
/// Dropping the handle disarms the timer; [`TimerHandle::disarm`] does the
/// same explicitly. Disarming an already-fired timer (or firing an already
/// disarmed one) is a safe no-op; the oneshot resolves the race exactly once.
#[derive(Debug)]
pub struct TimerHandle {
    disarm_tx: Option<oneshot::Sender<()>>,
}

impl TimerHandle {
    pub fn disarm(mut self) {
        if let Some(tx) = self.disarm_tx.take() {
            // Err means the timer task already finished; nothing to cancel.
            let _ = tx.send(());
        }
    }
}

/// Arm a timer for `stage`. On expiry, `StageTimedOut { stage, generation }`
/// is delivered into `mailbox`; the generation ties the firing to this
/// specific arming so the engine can tell it apart from a timer armed on an
/// earlier visit of the same stage.
pub fn arm(
    applicant: UserId,
    stage: Stage,
    generation: u64,
    duration: Duration,
    mailbox: mpsc::Sender<StageEvent>,
) -> TimerHandle {
    let (disarm_tx, disarm_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                debug!(%applicant, %stage, generation, "Stage timer fired");
                if mailbox.send(StageEvent::StageTimedOut { stage, generation }).await.is_err() {
                    // Session already torn down; the timeout is moot.
                    debug!(%applicant, %stage, "Timer fired after session ended");
                }
            }
            _ = disarm_rx => {
                debug!(%applicant, %stage, "Stage timer disarmed");
            }
        }
    });

    TimerHandle {
        disarm_tx: Some(disarm_tx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_fires_into_mailbox_after_duration() {
        let (tx, mut rx) = mpsc::channel(8);
        let _handle = arm(UserId(1), Stage::Intake, 7, Duration::from_secs(600), tx);

        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(rx.try_recv().is_err(), "must not fire early");

        tokio::time::advance(Duration::from_secs(2)).await;
        // Let the timer task run.
        tokio::task::yield_now().await;
        match rx.recv().await {
            Some(StageEvent::StageTimedOut { stage, generation }) => {
                assert_eq!(stage, Stage::Intake);
                assert_eq!(generation, 7, "firing carries the arming's generation");
            }
            other => panic!("expected StageTimedOut, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_then_fire_is_a_no_op() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = arm(UserId(1), Stage::LanguageSelect, 0, Duration::from_secs(60), tx);

        handle.disarm();
        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;

        assert!(rx.try_recv().is_err(), "disarmed timer must never deliver");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_disarms() {
        let (tx, mut rx) = mpsc::channel(8);
        {
            let _handle = arm(UserId(1), Stage::Intake, 0, Duration::from_secs(60), tx);
        }
        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn fire_then_disarm_is_safe() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = arm(UserId(1), Stage::Intake, 0, Duration::from_secs(1), tx);

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(matches!(
            rx.recv().await,
            Some(StageEvent::StageTimedOut { .. })
        ));

        // The sleep already won; disarming afterwards must not panic.
        handle.disarm();
    }
}
