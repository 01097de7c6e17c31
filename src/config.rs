//! Tunable thresholds for the decoding core.
//!
//! Mirrors the teacher's `config::SystemConfig`/`ServoConfig` split: a
//! `Default` impl carries the spec's literal constants so the crate works
//! out of the box, and an optional JSON file can override individual
//! fields. All time fields are in microseconds unless the name says
//! otherwise, matching spec.md's unit (the GPIO driver hands us microsecond
//! ticks).

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PulseTemplate {
    pub short_us: i32,
    pub long_us: i32,
    pub short_sync_us: i32,
    pub pre_long_sync_us: i32,
    pub long_sync_us: i32,
    pub tolerance_us: i32,
    pub long_sync_tolerance_us: i32,
}

impl Default for PulseTemplate {
    fn default() -> Self {
        PulseTemplate {
            short_us: 210,
            long_us: 401,
            short_sync_us: 606,
            pre_long_sync_us: 207,
            long_sync_us: 2205,
            tolerance_us: 100,
            long_sync_tolerance_us: 450,
        }
    }
}

impl PulseTemplate {
    pub fn bit_length_us(&self) -> i32 {
        self.short_us + self.long_us
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FrameWindow {
    pub message_bits: usize,
    pub min_transitions: usize,
    pub ideal_transitions: usize,
    pub max_transitions: usize,
    pub max_bad_bits: u32,
    /// `MESSAGE_BITS * (short + long)`, µs.
    pub message_length_us: i64,
    pub min_message_length_us: i64,
    pub max_message_length_us: i64,
    /// Spacing between the long-sync that opens one repeat and the one that
    /// opens the next, µs.
    pub sync_to_sync_time_us: i64,
    /// How long a held candidate is aggregated before the hold queue scores
    /// and (maybe) dispatches it, µs.
    pub message_hold_time_us: i64,
}

impl FrameWindow {
    fn derive(pulses: &PulseTemplate) -> Self {
        let message_bits = 56;
        let message_length_us = message_bits as i64 * pulses.bit_length_us() as i64;
        let tol = pulses.tolerance_us as i64;
        let sync_to_sync_time_us = message_length_us
            + pulses.pre_long_sync_us as i64
            + pulses.long_sync_us as i64
            + 8 * pulses.short_sync_us as i64;

        FrameWindow {
            message_bits,
            min_transitions: 112,
            ideal_transitions: 114,
            max_transitions: 118,
            max_bad_bits: 5,
            message_length_us,
            min_message_length_us: message_length_us - tol,
            max_message_length_us: message_length_us + tol,
            sync_to_sync_time_us,
            message_hold_time_us: 3 * sync_to_sync_time_us + pulses.long_sync_tolerance_us as i64,
        }
    }
}

/// Unlike the rest of this module, these thresholds are in whole seconds —
/// they're compared directly against [`crate::frame::SensorFrame::collection_time`],
/// which is itself seconds-since-epoch (spec.md §4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DedupWindow {
    pub repeat_suppression_secs: u64,
    pub reuse_old_data_limit_secs: u64,
}

impl Default for DedupWindow {
    fn default() -> Self {
        DedupWindow {
            repeat_suppression_secs: 60,
            reuse_old_data_limit_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QualityWindow {
    pub check_rate_us: i64,
    pub window_us: i64,
    pub desired_signal_rate_us: i64,
}

impl Default for QualityWindow {
    fn default() -> Self {
        QualityWindow {
            check_rate_us: 90 * 1_000_000,
            window_us: 300 * 1_000_000,
            desired_signal_rate_us: 30 * 1_000_000,
        }
    }
}

/// All tunable thresholds for one [`crate::monitor::Monitor`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    pub pulses: PulseTemplate,
    pub frame: FrameWindow,
    pub dedup: DedupWindow,
    pub quality: QualityWindow,
    pub ring_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let pulses = PulseTemplate::default();
        let frame = FrameWindow::derive(&pulses);

        MonitorConfig {
            pulses,
            frame,
            dedup: DedupWindow::default(),
            quality: QualityWindow::default(),
            ring_capacity: 512,
        }
    }
}

impl MonitorConfig {
    /// Loads overrides from a JSON file at `path`, falling back to
    /// [`Default`] on any I/O or parse error, the same permissive behavior
    /// as the teacher's `main::load_config`. Failures are logged, never
    /// fatal — this crate has no mandatory configuration.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(err) => {
                    log::warn!("ignoring unparsable config at {}: {err}", path.display());
                    MonitorConfig::default()
                }
            },
            Err(err) => {
                log::debug!("no config file at {} ({err}), using defaults", path.display());
                MonitorConfig::default()
            }
        }
    }
}
