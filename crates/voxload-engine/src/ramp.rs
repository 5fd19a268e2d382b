use crate::host::VuHost;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use voxload_core::RampStage;

const DEFAULT_TICK: Duration = Duration::from_millis(500);

/// Four stages over `[0, total)`: 10% ramping to ceil(V/4), 10% to
/// ceil(V/2), 10% to V, then the remainder holding at V.
///
/// Computed in whole milliseconds so the durations always sum to `total`.
pub fn compute_stages(total: Duration, max_vus: usize) -> Vec<RampStage> {
    let ramp = Duration::from_millis((total.as_millis() / 10) as u64);
    let hold = total.saturating_sub(ramp * 3);
    let targets = [max_vus.div_ceil(4), max_vus.div_ceil(2), max_vus, max_vus];
    let durations = [ramp, ramp, ramp, hold];

    let mut start_offset = Duration::ZERO;
    targets
        .into_iter()
        .zip(durations)
        .map(|(target_vus, duration)| {
            let stage = RampStage {
                start_offset,
                duration,
                target_vus,
            };
            start_offset += duration;
            stage
        })
        .collect()
}

/// Target concurrency at `offset`, interpolated linearly from the previous
/// stage's target (0 before the first stage) and rounded down.
pub fn target_at(stages: &[RampStage], offset: Duration) -> usize {
    let mut previous = 0usize;
    for stage in stages {
        if offset < stage.end_offset() {
            let progress = offset.saturating_sub(stage.start_offset).as_secs_f64()
                / stage.duration.as_secs_f64();
            let from = previous as f64;
            let to = stage.target_vus as f64;
            return (from + (to - from) * progress).floor().max(0.0) as usize;
        }
        previous = stage.target_vus;
    }
    previous
}

/// Staged concurrency profile plus the loop that keeps a [`VuHost`] on it.
#[derive(Debug, Clone)]
pub struct RampScheduler {
    stages: Vec<RampStage>,
    total: Duration,
    tick: Duration,
}

impl RampScheduler {
    pub fn new(total: Duration, max_vus: usize) -> Self {
        Self {
            stages: compute_stages(total, max_vus),
            total,
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn stages(&self) -> &[RampStage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    pub fn target_at(&self, offset: Duration) -> usize {
        target_at(&self.stages, offset)
    }

    pub fn stage_index_at(&self, offset: Duration) -> Option<usize> {
        self.stages.iter().position(|s| offset < s.end_offset())
    }

    /// Scale `host` to the target every tick until the total duration has
    /// elapsed, then drain and shut it down.
    pub async fn run(&self, host: &mut VuHost) {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut current_stage = None;

        loop {
            ticker.tick().await;
            let offset = started.elapsed();
            if offset >= self.total {
                break;
            }

            let stage_index = self.stage_index_at(offset);
            if stage_index != current_stage {
                if let Some(index) = stage_index {
                    let stage = &self.stages[index];
                    tracing::info!(
                        stage = index + 1,
                        target_vus = stage.target_vus,
                        "entering ramp stage ({:.1}s)",
                        stage.duration.as_secs_f64()
                    );
                }
                current_stage = stage_index;
            }

            host.reap();
            host.scale_to(self.target_at(offset));
        }

        tracing::info!(
            active = host.active_count(),
            "ramp complete, retiring virtual users"
        );
        host.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_stage_targets_round_up() {
        let targets: Vec<usize> = compute_stages(secs(600), 7)
            .iter()
            .map(|s| s.target_vus)
            .collect();
        assert_eq!(targets, vec![2, 4, 7, 7]);
    }

    #[test]
    fn test_single_vu_profile() {
        let stages = compute_stages(secs(100), 1);
        assert!(stages.iter().all(|s| s.target_vus == 1));
    }

    #[test]
    fn test_short_duration_sums_exactly() {
        let total = Duration::from_millis(1234);
        let stages = compute_stages(total, 4);
        assert_eq!(stages[0].duration, Duration::from_millis(123));
        assert_eq!(stages[3].duration, Duration::from_millis(865));
        assert_eq!(stages.iter().map(|s| s.duration).sum::<Duration>(), total);
    }

    #[test]
    fn test_target_interpolates_within_stage() {
        let stages = compute_stages(secs(600), 10);
        assert_eq!(target_at(&stages, Duration::ZERO), 0);
        assert_eq!(target_at(&stages, secs(30)), 1);
        assert_eq!(target_at(&stages, secs(60)), 3);
        assert_eq!(target_at(&stages, secs(90)), 4);
        assert_eq!(target_at(&stages, secs(120)), 5);
        assert_eq!(target_at(&stages, secs(150)), 7);
        assert_eq!(target_at(&stages, secs(180)), 10);
        assert_eq!(target_at(&stages, secs(599)), 10);
    }

    #[test]
    fn test_target_past_end_holds_max() {
        let stages = compute_stages(secs(600), 10);
        assert_eq!(target_at(&stages, secs(900)), 10);
        assert_eq!(target_at(&[], secs(1)), 0);
    }

    #[test]
    fn test_stage_index_at() {
        let scheduler = RampScheduler::new(secs(600), 10);
        assert_eq!(scheduler.stage_index_at(secs(0)), Some(0));
        assert_eq!(scheduler.stage_index_at(secs(60)), Some(1));
        assert_eq!(scheduler.stage_index_at(secs(179)), Some(2));
        assert_eq!(scheduler.stage_index_at(secs(599)), Some(3));
        assert_eq!(scheduler.stage_index_at(secs(600)), None);
    }
}
