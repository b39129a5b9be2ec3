use std::future;
use std::pin::Pin;

use tokio::time::{Duration, Instant, Sleep, sleep_until};

/// Roughly 30 years, the same horizon tokio uses for deadlines that overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + after`, saturating to a far-future deadline instead of overflowing.
pub(crate) fn deadline_after(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// A single-shot timer slot.
///
/// At most one deadline is pending at a time: arming replaces (and thereby cancels) any
/// previously armed deadline.
#[derive(Debug, Default)]
pub(crate) struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    pub(crate) fn arm(&mut self, after: Duration) {
        self.arm_at(deadline_after(Instant::now(), after));
    }

    pub(crate) fn arm_at(&mut self, deadline: Instant) {
        self.sleep = Some(Box::pin(sleep_until(deadline)));
    }

    pub(crate) fn cancel(&mut self) {
        self.sleep = None;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Resolves with the deadline once the armed timer elapses, disarming the slot.
    /// Pends forever while disarmed.
    pub(crate) async fn fired(&mut self) -> Instant {
        let Some(sleep) = self.sleep.as_mut() else {
            return future::pending().await;
        };
        sleep.as_mut().await;
        let deadline = sleep.deadline();
        self.sleep = None;
        deadline
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::timeout;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_once_at_deadline() {
        let start = Instant::now();
        let mut timer = Timer::default();
        timer.arm(Duration::from_secs(3));

        let deadline = timer.fired().await;

        assert_eq!(deadline, start + Duration::from_secs(3));
        assert!(!timer.is_armed());
        assert!(
            timeout(Duration::from_secs(60), timer.fired()).await.is_err(),
            "disarmed timer must not fire"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_previous_deadline() {
        let start = Instant::now();
        let mut timer = Timer::default();
        timer.arm(Duration::from_secs(1));
        timer.arm(Duration::from_secs(5));

        assert_eq!(timer.fired().await, start + Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_duration_never_fires() {
        let mut timer = Timer::default();
        timer.arm(Duration::MAX);

        assert!(timer.is_armed());
        assert!(timeout(Duration::from_secs(86_400), timer.fired()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_saturates_instead_of_overflowing() {
        let start = Instant::now();

        assert_eq!(
            deadline_after(start, Duration::from_secs(2)),
            start + Duration::from_secs(2)
        );
        assert!(deadline_after(start, Duration::MAX) > start + Duration::from_secs(86_400));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let mut timer = Timer::default();
        timer.arm(Duration::from_secs(1));
        timer.cancel();

        assert!(timeout(Duration::from_secs(10), timer.fired()).await.is_err());
    }
}
