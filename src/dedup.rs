//! Per-channel hold queue and duplicate-suppression policy (spec.md §4.6).
//!
//! [`HoldQueue`] picks the best of a repeat triplet before anything is
//! dispatched; [`decide_delivery`] is the separate policy that compares a
//! about-to-be-released frame against the channel's last *delivered* frame.
//! Both are pure — timers and locking live in [`crate::monitor`].

use crate::config::DedupWindow;
use crate::frame::{Channel, Rank, SensorFrame};

#[derive(Debug, Clone, Copy)]
pub struct HoldSlot {
    pub channel: Channel,
    pub frame: SensorFrame,
    pub repeats_captured: u32,
    pub started_at: u64,
}

/// At most one candidate is held at a time; a candidate for a different
/// channel forces an immediate release of whatever was held (spec.md §4.6).
#[derive(Debug, Default)]
pub struct HoldQueue {
    slot: Option<HoldSlot>,
}

/// What the caller must do after [`HoldQueue::offer`].
pub enum OfferOutcome {
    /// Merged into the existing hold for the same channel; no new timer.
    Merged,
    /// A new hold was started (arm a fresh timer for it). `evicted` is the
    /// previous hold, forced out because it was for a different channel —
    /// it must be processed exactly as if its own timer had just expired.
    Started { evicted: Option<HoldSlot> },
}

impl HoldQueue {
    pub fn new() -> HoldQueue {
        HoldQueue::default()
    }

    pub fn held_channel(&self) -> Option<Channel> {
        self.slot.map(|s| s.channel)
    }

    /// Offers a newly decoded candidate (spec.md §4.6). `repeats` is usually
    /// 1 (one direct-decoded region) but is 3 for a triplet blend, which
    /// already represents three merged repeats.
    pub fn offer(&mut self, channel: Channel, frame: SensorFrame, now: u64, repeats: u32) -> OfferOutcome {
        match &mut self.slot {
            None => {
                self.slot = Some(HoldSlot {
                    channel,
                    frame,
                    repeats_captured: repeats,
                    started_at: now,
                });
                OfferOutcome::Started { evicted: None }
            }
            Some(held) if held.channel == channel => {
                let upgrade_to_best = held.frame.rank.value() >= Rank::High.value()
                    && frame.rank.value() >= Rank::High.value()
                    && held.frame.has_same_values(&frame);

                if frame.rank.value() > held.frame.rank.value() {
                    held.frame = frame;
                }

                if upgrade_to_best {
                    held.frame.rank = Rank::Best;
                }

                held.repeats_captured += repeats;
                OfferOutcome::Merged
            }
            Some(_) => {
                let evicted = self.slot.take();
                self.slot = Some(HoldSlot {
                    channel,
                    frame,
                    repeats_captured: repeats,
                    started_at: now,
                });
                OfferOutcome::Started { evicted }
            }
        }
    }

    /// Called when the hold timer for the currently held channel expires.
    /// `None` means drop silently (rank never reached RANK_MID).
    pub fn expire(&mut self) -> Option<HoldSlot> {
        let held = self.slot.take()?;

        if held.frame.rank.value() >= Rank::Mid.value() {
            Some(held)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryDecision {
    pub deliver: bool,
    pub cache: bool,
}

/// spec.md §4.6's dedup policy against the channel's last delivered frame.
/// `now` is seconds-since-epoch, matching [`SensorFrame::collection_time`].
pub fn decide_delivery(current: &SensorFrame, last: Option<&SensorFrame>, config: &DedupWindow) -> DeliveryDecision {
    let Some(last) = last else {
        return DeliveryDecision { deliver: true, cache: true };
    };

    let within_repeat_window = current.collection_time < last.collection_time + config.repeat_suppression_secs;
    let within_reuse_window = current.collection_time < last.collection_time + config.reuse_old_data_limit_secs;

    if within_repeat_window && current.has_same_values(last) {
        return DeliveryDecision { deliver: false, cache: false };
    }

    if !current.valid_checksum && last.valid_checksum {
        let suppress = within_reuse_window && current.has_close_values(last);
        return DeliveryDecision { deliver: !suppress, cache: false };
    }

    if current.valid_checksum && !last.valid_checksum {
        return DeliveryDecision { deliver: true, cache: true };
    }

    DeliveryDecision { deliver: true, cache: true }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(channel: Channel, rank: Rank, valid: bool, collection_time: u64) -> SensorFrame {
        SensorFrame {
            channel,
            valid_checksum: valid,
            battery_low: false,
            humidity: 50,
            raw_temp: 1000,
            temp_celsius: 0.0,
            temp_fahrenheit: 32.0,
            misc1: 0,
            misc2: 0,
            misc3: 0,
            collection_time,
            repeats_captured: 0,
            rank,
            signal_quality: 0,
        }
    }

    #[test]
    fn first_candidate_starts_a_hold() {
        let mut q = HoldQueue::new();
        let outcome = q.offer(Channel::A, frame(Channel::A, Rank::High, true, 0), 0, 1);
        assert!(matches!(outcome, OfferOutcome::Started { evicted: None }));
        assert_eq!(q.held_channel(), Some(Channel::A));
    }

    #[test]
    fn higher_rank_replaces_but_keeps_repeat_count() {
        let mut q = HoldQueue::new();
        q.offer(Channel::A, frame(Channel::A, Rank::Low, true, 0), 0, 1);
        q.offer(Channel::A, frame(Channel::A, Rank::High, true, 0), 10, 1);
        let held = q.expire().unwrap();
        assert_eq!(held.frame.rank, Rank::High);
        assert_eq!(held.repeats_captured, 2);
    }

    #[test]
    fn matching_high_rank_repeats_upgrade_to_best() {
        let mut q = HoldQueue::new();
        let f = frame(Channel::A, Rank::High, true, 0);
        q.offer(Channel::A, f, 0, 1);
        q.offer(Channel::A, f, 10, 1);
        let held = q.expire().unwrap();
        assert_eq!(held.frame.rank, Rank::Best);
        assert_eq!(held.repeats_captured, 2);
    }

    #[test]
    fn different_channel_forces_immediate_release() {
        let mut q = HoldQueue::new();
        q.offer(Channel::A, frame(Channel::A, Rank::High, true, 0), 0, 1);
        let outcome = q.offer(Channel::B, frame(Channel::B, Rank::High, true, 0), 5, 1);
        let OfferOutcome::Started { evicted } = outcome else {
            panic!("expected a new hold to start");
        };
        assert_eq!(evicted.unwrap().channel, Channel::A);
        assert_eq!(q.held_channel(), Some(Channel::B));
    }

    #[test]
    fn low_rank_drops_silently_on_expire() {
        let mut q = HoldQueue::new();
        q.offer(Channel::A, frame(Channel::A, Rank::Low, true, 0), 0, 1);
        assert!(q.expire().is_none());
    }

    #[test]
    fn repeat_suppression_blocks_identical_recent_values() {
        let last = frame(Channel::A, Rank::High, true, 100);
        let current = frame(Channel::A, Rank::High, true, 130);
        let decision = decide_delivery(&current, Some(&last), &DedupWindow::default());
        assert!(!decision.deliver);
        assert!(!decision.cache);
    }

    #[test]
    fn invalid_after_valid_suppresses_cache_and_may_suppress_callback() {
        let last = frame(Channel::A, Rank::High, true, 0);
        let mut current = frame(Channel::A, Rank::High, false, 30);
        current.humidity = 51; // close but not identical
        let decision = decide_delivery(&current, Some(&last), &DedupWindow::default());
        assert!(!decision.cache);
        assert!(!decision.deliver); // within reuse window and close values
    }

    #[test]
    fn recovery_from_invalid_to_valid_always_delivers_and_caches() {
        let last = frame(Channel::A, Rank::High, false, 0);
        let current = frame(Channel::A, Rank::High, true, 5);
        let decision = decide_delivery(&current, Some(&last), &DedupWindow::default());
        assert!(decision.deliver);
        assert!(decision.cache);
    }
}
