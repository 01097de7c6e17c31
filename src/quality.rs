//! Rolling signal-quality estimator (spec.md §4.7).
//!
//! One [`QualityEstimator`] lives per [`crate::monitor::Monitor`], guarded
//! by `dispatch_lock` alongside the rest of the per-channel dispatch state
//! (spec.md §5).

use std::collections::HashMap;

use crate::config::QualityWindow;
use crate::frame::{Channel, Rank};

#[derive(Debug, Default)]
pub struct QualityEstimator {
    history: HashMap<Channel, Vec<(u64, i32)>>,
}

impl QualityEstimator {
    pub fn new() -> QualityEstimator {
        QualityEstimator::default()
    }

    /// Records one admitted observation and returns the recomputed score
    /// for `channel`. `rank` should be [`Rank::Check`] only from
    /// [`Self::idle_probe`]; real observations use their dedup-assigned
    /// rank.
    pub fn record(&mut self, channel: Channel, time: u64, rank: Rank, config: &QualityWindow) -> i32 {
        let was_active = self.history.contains_key(&channel);
        let mut entries = self.history.remove(&channel).unwrap_or_default();

        purge_stale(&mut entries, time, config);

        if rank != Rank::Check {
            entries.push((time, rank.value()));
        }

        let score = score_of(&entries, config);

        if was_active || rank.value() >= Rank::High.value() {
            self.history.insert(channel, entries);
        }

        score
    }

    /// Idle-channel probe (spec.md §4.7's 90-second cadence): purges stale
    /// entries without adding a new one. Returns the new score, or `None`
    /// if `channel` isn't currently tracked. A score of zero erases the
    /// channel's state entirely, per spec.
    pub fn idle_probe(&mut self, channel: Channel, time: u64, config: &QualityWindow) -> Option<i32> {
        let mut entries = self.history.remove(&channel)?;
        purge_stale(&mut entries, time, config);

        let score = score_of(&entries, config);

        if score > 0 {
            self.history.insert(channel, entries);
        }

        Some(score)
    }

    pub fn is_tracked(&self, channel: Channel) -> bool {
        self.history.contains_key(&channel)
    }

    /// Channels with at least one unexpired observation, for the quality
    /// thread's idle-probe sweep.
    pub fn tracked_channels(&self) -> Vec<Channel> {
        self.history.keys().copied().collect()
    }
}

fn purge_stale(entries: &mut Vec<(u64, i32)>, time: u64, config: &QualityWindow) {
    let window = config.window_us as u64;
    entries.retain(|&(t, _)| t + window > time);
}

/// spec.md §4.7 step 4.
fn score_of(entries: &[(u64, i32)], config: &QualityWindow) -> i32 {
    if entries.is_empty() {
        return 0;
    }

    let sum: i32 = entries.iter().map(|&(_, rank)| rank).sum();
    let desired_count = config.window_us as f64 / config.desired_signal_rate_us as f64;
    let denom = desired_count.max(entries.len() as f64) * Rank::Best.value() as f64;
    let raw = 100.0 * sum as f64 / denom;

    raw.round().min(100.0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QualityWindow {
        QualityWindow::default()
    }

    #[test]
    fn first_high_rank_observation_starts_tracking() {
        let mut est = QualityEstimator::new();
        let score = est.record(Channel::A, 0, Rank::High, &config());
        assert!(score > 0);
        assert!(est.is_tracked(Channel::A));
    }

    #[test]
    fn low_rank_observation_on_untracked_channel_is_not_tracked() {
        let mut est = QualityEstimator::new();
        est.record(Channel::A, 0, Rank::Low, &config());
        assert!(!est.is_tracked(Channel::A));
    }

    #[test]
    fn ideal_cadence_at_best_rank_saturates_to_100() {
        let mut est = QualityEstimator::new();
        let cfg = config();
        let mut time = 0u64;
        let mut score = 0;

        for _ in 0..10 {
            score = est.record(Channel::A, time, Rank::Best, &cfg);
            time += cfg.desired_signal_rate_us as u64;
        }

        assert_eq!(score, 100);
    }

    #[test]
    fn idle_probe_decays_score_over_time_and_erases_at_zero() {
        let mut est = QualityEstimator::new();
        let cfg = config();
        est.record(Channel::A, 0, Rank::Best, &cfg);

        let far_future = cfg.window_us as u64 + 1;
        let probed = est.idle_probe(Channel::A, far_future, &cfg);
        assert_eq!(probed, Some(0));
        assert!(!est.is_tracked(Channel::A));
    }

    #[test]
    fn idle_probe_on_untracked_channel_returns_none() {
        let mut est = QualityEstimator::new();
        assert_eq!(est.idle_probe(Channel::B, 0, &config()), None);
    }
}
