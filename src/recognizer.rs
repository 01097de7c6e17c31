//! Frame recognizer state machine (spec.md §4.3).
//!
//! Driven one rising edge at a time by [`crate::monitor::Monitor`], which
//! owns the ring and holds `signal_lock` for the edge's duration. This type
//! only decides *what to decode next*; decode and repair live in their own
//! modules.

use crate::classify;
use crate::config::{FrameWindow, PulseTemplate};
use crate::decode::MESSAGE_BITS;
use crate::ring::PulseRing;

/// 8 short-sync edges + 2 long-sync edges precede each 112-edge (56-bit)
/// message in the nominal repeat cadence.
const SYNC_PREAMBLE_EDGES: isize = 10;
const EDGES_PER_REPEAT: isize = MESSAGE_BITS as isize * 2 + SYNC_PREAMBLE_EDGES;

/// A region ready to be handed to [`crate::decode`], possibly after
/// [`crate::repair::combine_messages`] first.
#[derive(Debug, Clone)]
pub enum Candidate {
    /// Decode directly from this anchor.
    Direct(usize),
    /// Blend these anchors (oldest first, 1 to 3 of them) before decoding
    /// the last one.
    Blend(Vec<usize>),
}

#[derive(Debug, Default)]
pub struct Recognizer {
    sequential_bits: u32,
    potential_data_index: Option<usize>,
    frame_start_time: u64,

    bad_bits: u32,
    open_region_index: Option<usize>,
    open_region_start_time: u64,

    sync_time_1: Option<u64>,
    sync_index_1: Option<usize>,
    sync_time_2: Option<u64>,
    sync_index_2: Option<usize>,
    /// Index of the most recently acquired sync, updated unconditionally
    /// (unlike `sync_index_1`/`sync_index_2`, which freeze once a pair is
    /// locked in). By the time `maybe_triplet_blend`'s deadline elapses
    /// during the third repeat's data, this already points at that third
    /// repeat's own data start — the region the blend actually needs.
    last_sync_index: Option<usize>,
}

impl Recognizer {
    pub fn new() -> Recognizer {
        Recognizer::default()
    }

    /// Call after every rising edge, once its duration has been recorded
    /// into `ring`. `now` is the wrap-extended microsecond timestamp of
    /// this edge. Returns zero or more regions to decode, in the order
    /// spec.md §4.3 generates them.
    ///
    /// Every [`Candidate::Direct`] produced by the sequential-bit run (as
    /// opposed to the sync-based open region) must be followed, before the
    /// next edge, by [`Self::report_direct_result`] — otherwise the 56-bit
    /// counter is never reset and the run never restarts.
    pub fn on_rising_edge(
        &mut self,
        ring: &PulseRing,
        frame: &FrameWindow,
        pulses: &PulseTemplate,
        now: u64,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        self.maybe_triplet_blend(ring, frame, pulses, now, &mut candidates);
        self.track_sequential_bit(ring, pulses, now, &mut candidates);
        self.track_sync(ring, frame, pulses, now, &mut candidates);
        self.check_tail_condition(ring, frame, now, &mut candidates);

        candidates
    }

    /// The caller reports back whether a [`Candidate::Direct`] it requested
    /// actually decoded to `BAD_PARITY` or better. A failure retries the
    /// same run shifted one bit later, mirroring the original's "not good
    /// data" retry (spec.md §4.3 step 2).
    pub fn report_direct_result(&mut self, ring: &PulseRing, anchor: usize, decoded_ok: bool) {
        if self.potential_data_index != Some(anchor) {
            return;
        }

        if decoded_ok {
            self.sequential_bits = 0;
            self.potential_data_index = None;
        } else {
            self.frame_start_time +=
                ring.at_anchor(anchor, 0) as u64 + ring.at_anchor(anchor, 1) as u64;
            self.potential_data_index = Some(ring.index_at_anchor(anchor, 2));
            self.sequential_bits = self.sequential_bits.saturating_sub(1);
        }
    }

    fn maybe_triplet_blend(
        &mut self,
        ring: &PulseRing,
        frame: &FrameWindow,
        pulses: &PulseTemplate,
        now: u64,
        candidates: &mut Vec<Candidate>,
    ) {
        let (Some(sync_time_2), Some(sync_index_1), Some(sync_index_2)) =
            (self.sync_time_2, self.sync_index_1, self.sync_index_2)
        else {
            return;
        };

        let deadline = sync_time_2 as i64 + frame.sync_to_sync_time_us + pulses.long_sync_tolerance_us as i64;

        if (now as i64) <= deadline {
            return;
        }

        // The third repeat's own sync should already have been recognized by
        // now (its data start precedes this deadline by exactly
        // LONG_SYNC_TOL); fall back to a forward-computed guess only if
        // something noisier than the nominal cadence kept it from tracking.
        let third_index = self
            .last_sync_index
            .filter(|&i| i != sync_index_2)
            .unwrap_or_else(|| ring.index_at_anchor(sync_index_2, EDGES_PER_REPEAT));

        log::trace!("attempting triplet blend: repeat1={sync_index_1} repeat2={sync_index_2} repeat3={third_index}");
        candidates.push(Candidate::Blend(vec![sync_index_1, sync_index_2, third_index]));

        self.sync_time_1 = None;
        self.sync_index_1 = None;
        self.sync_time_2 = None;
        self.sync_index_2 = None;
    }

    fn track_sequential_bit(
        &mut self,
        ring: &PulseRing,
        pulses: &PulseTemplate,
        now: u64,
        candidates: &mut Vec<Candidate>,
    ) {
        let t1 = ring.at_offset(0) as i64;
        let t0 = ring.at_offset(-1) as i64;

        if classify::classify_bit(pulses, t0, t1).is_some() {
            self.sequential_bits += 1;

            if self.sequential_bits == 1 {
                self.potential_data_index = Some(ring.index_at_offset(-1));
                self.frame_start_time = now - t0 as u64 - t1 as u64;
            } else if self.sequential_bits == MESSAGE_BITS as u32 {
                if let Some(anchor) = self.potential_data_index {
                    log::trace!("sequential run complete at anchor {anchor}");
                    candidates.push(Candidate::Direct(anchor));
                }
            }
        } else {
            self.sequential_bits = 0;

            if !classify::is_short_sync(pulses, t0, t1) && !classify::is_long_sync(pulses, t0, t1) {
                self.bad_bits += 1;
            }
        }
    }

    fn track_sync(
        &mut self,
        ring: &PulseRing,
        frame: &FrameWindow,
        pulses: &PulseTemplate,
        now: u64,
        candidates: &mut Vec<Candidate>,
    ) {
        if self.sequential_bits != 0 || !classify::is_sync_acquired(ring, pulses) {
            return;
        }

        if let Some(region_index) = self.open_region_index {
            let transitions = ring.distance(region_index, ring.index_at_offset(1));
            let elapsed = now - self.open_region_start_time;

            if (frame.min_transitions..=frame.max_transitions).contains(&transitions)
                && elapsed >= frame.min_message_length_us as u64
                && elapsed <= frame.max_message_length_us as u64
            {
                candidates.push(Candidate::Direct(region_index));
            }
        }

        let current_index = ring.index_at_offset(1);
        self.last_sync_index = Some(current_index);

        // Once sync_time_2 is set, a triplet-blend is pending against it
        // (see `maybe_triplet_blend`). This sync is the third repeat's own
        // preamble, which `maybe_triplet_blend` is waiting to age past its
        // deadline: leave sync_time_1/sync_time_2 alone rather than folding
        // this sync in as a fresh sync_time_1, or the pending blend would be
        // silently cancelled one edge before its own deadline could fire.
        if self.sync_time_2.is_none() {
            match self.sync_time_1 {
                Some(sync_time_1)
                    if (now as i64 - sync_time_1 as i64 - frame.sync_to_sync_time_us).abs()
                        <= pulses.long_sync_tolerance_us as i64 =>
                {
                    self.sync_time_2 = Some(now);
                    self.sync_index_2 = Some(current_index);
                }
                _ => {
                    self.sync_time_1 = Some(now);
                    self.sync_index_1 = Some(current_index);
                }
            }
        }

        self.open_region_index = Some(current_index);
        self.open_region_start_time = now;
        self.bad_bits = 0;
    }

    fn check_tail_condition(
        &mut self,
        ring: &PulseRing,
        frame: &FrameWindow,
        now: u64,
        candidates: &mut Vec<Candidate>,
    ) {
        let Some(region_index) = self.open_region_index else {
            return;
        };

        if self.bad_bits >= frame.max_bad_bits {
            return;
        }

        let elapsed = now.saturating_sub(self.open_region_start_time);
        let pad = frame.min_message_length_us as u64;

        if elapsed >= pad
            && elapsed
                <= frame.max_message_length_us as u64 + pulses_short_sync_pad(frame)
        {
            let transitions = ring.distance(region_index, ring.index_at_offset(1));

            if (frame.min_transitions..=frame.max_transitions).contains(&transitions) {
                candidates.push(Candidate::Direct(region_index));
                self.open_region_index = None;
            }
        }
    }
}

/// Short-sync pad used to give the tail condition a little slack past the
/// legal message window (spec.md §4.3 step 4).
fn pulses_short_sync_pad(frame: &FrameWindow) -> u64 {
    (frame.sync_to_sync_time_us - frame.message_length_us).max(0) as u64
}
