use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};

pub const TICK_PERIOD: Duration = Duration::from_millis(1000);

/// Periodic wall-clock ticker for the "running for" display.
///
/// At most one interval exists at a time. A stopped (or never started) timer
/// never completes `tick()`, so it can sit in a `select!` unconditionally.
#[derive(Debug)]
pub struct ElapsedTimer {
    period: Duration,
    interval: Option<Interval>,
}

impl Default for ElapsedTimer {
    fn default() -> Self {
        Self::new(TICK_PERIOD)
    }
}

impl ElapsedTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start ticking one period from now. No-op if already started.
    pub fn start(&mut self) -> bool {
        if self.interval.is_some() {
            tracing::debug!("elapsed timer already running");
            return false;
        }
        self.interval = Some(interval_at(Instant::now() + self.period, self.period));
        true
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => futures::future::pending::<()>().await,
        }
    }

    pub fn stop(&mut self) {
        self.interval = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_period() {
        let mut timer = ElapsedTimer::default();
        assert!(timer.start());
        let started = Instant::now();
        timer.tick().await;
        assert_eq!(started.elapsed(), TICK_PERIOD);
        timer.tick().await;
        assert_eq!(started.elapsed(), TICK_PERIOD * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_a_no_op() {
        let mut timer = ElapsedTimer::default();
        assert!(timer.start());
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(!timer.start());
        let started = Instant::now();
        timer.tick().await;
        // Still on the original schedule.
        assert_eq!(started.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_timer_never_ticks() {
        let mut timer = ElapsedTimer::default();
        timer.start();
        timer.stop();
        assert!(!timer.is_running());
        let res = tokio::time::timeout(Duration::from_secs(10), timer.tick()).await;
        assert!(res.is_err());
    }
}
