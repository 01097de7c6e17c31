//! Decoded-frame value types: [`SensorFrame`], [`Channel`], [`Rank`].

use serde::{Deserialize, Serialize};

/// Sentinel for "this numeric field is missing", per spec.md §3.
pub const MISSING: i32 = -999;

/// Sensor channel, decoded from the 2-bit channel code.
///
/// Preserves the original's `"?C?BA"[index + 1]` lookup verbatim (spec.md
/// §9's Open Questions): index 0 (bit pattern `01`) lands on `'?'` and is
/// never a valid channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    A,
    B,
    C,
    /// Invalid/unmapped channel code; frames with this channel are dropped
    /// before delivery or caching (spec.md §4.4).
    Unknown,
}

impl Channel {
    /// `bits` is the 2-bit channel code (bit 0 is the MSB). Mirrors the
    /// original's `"?C?BA"[index + 1]` lookup: `01` lands on `'?'` and is
    /// never a valid channel.
    pub fn from_bits(bits: i32) -> Channel {
        match bits {
            0b00 => Channel::C,
            0b10 => Channel::B,
            0b11 => Channel::A,
            _ => Channel::Unknown,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Channel::A => 'A',
            Channel::B => 'B',
            Channel::C => 'C',
            Channel::Unknown => '?',
        }
    }
}

/// Observation rank, used both to pick the best of a held repeat triplet and
/// to weight the rolling quality estimator (spec.md §3, §4.6, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rank {
    /// Synthetic rank used only by the idle quality probe; never assigned to
    /// a real observation.
    Check = 0,
    Low = 2,
    Mid = 5,
    High = 9,
    Best = 10,
}

impl Rank {
    pub fn value(self) -> i32 {
        self as i32
    }
}

/// A fully decoded sensor transmission, ready for delivery to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    pub channel: Channel,
    pub valid_checksum: bool,
    pub battery_low: bool,
    /// 0..=100, or [`MISSING`].
    pub humidity: i32,
    /// Decoded raw 12-bit temperature register value, or [`MISSING`].
    pub raw_temp: i32,
    /// Degrees Celsius, or [`MISSING`] as `f64`.
    pub temp_celsius: f64,
    /// Degrees Fahrenheit, rounded to one decimal place, or [`MISSING`].
    pub temp_fahrenheit: f64,
    pub misc1: i32,
    pub misc2: i32,
    pub misc3: i32,
    /// Seconds since epoch at which the frame finished arriving.
    pub collection_time: u64,
    pub repeats_captured: u32,
    pub rank: Rank,
    pub signal_quality: i32,
}

impl SensorFrame {
    /// spec.md §4.6 / §8: same channel, battery state, humidity, and raw
    /// temperature. Derived fields (`temp_celsius`/`temp_fahrenheit`) are
    /// assumed consistent with `raw_temp` and are not compared again.
    pub fn has_same_values(&self, other: &SensorFrame) -> bool {
        self.channel == other.channel
            && self.battery_low == other.battery_low
            && self.humidity == other.humidity
            && self.raw_temp == other.raw_temp
    }

    /// spec.md §4.6: same channel and battery state, humidity within 3,
    /// raw temperature within 30.
    pub fn has_close_values(&self, other: &SensorFrame) -> bool {
        self.channel == other.channel
            && self.battery_low == other.battery_low
            && (self.humidity - other.humidity).abs() < 3
            && (self.raw_temp - other.raw_temp).abs() < 30
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_bit_mapping_matches_spec() {
        assert_eq!(Channel::from_bits(0b00), Channel::C);
        assert_eq!(Channel::from_bits(0b10), Channel::B);
        assert_eq!(Channel::from_bits(0b11), Channel::A);
        assert_eq!(Channel::from_bits(0b01), Channel::Unknown);
    }

    fn base_frame() -> SensorFrame {
        SensorFrame {
            channel: Channel::A,
            valid_checksum: true,
            battery_low: false,
            humidity: 50,
            raw_temp: 1020,
            temp_celsius: 2.0,
            temp_fahrenheit: 35.6,
            misc1: 0,
            misc2: 0,
            misc3: 0,
            collection_time: 1000,
            repeats_captured: 1,
            rank: Rank::High,
            signal_quality: 100,
        }
    }

    #[test]
    fn same_values_ignores_collection_time_and_rank() {
        let a = base_frame();
        let mut b = base_frame();
        b.collection_time += 30;
        b.rank = Rank::Best;
        assert!(a.has_same_values(&b));
    }

    #[test]
    fn same_values_sensitive_to_humidity() {
        let a = base_frame();
        let mut b = base_frame();
        b.humidity = 51;
        assert!(!a.has_same_values(&b));
    }

    #[test]
    fn close_values_tolerates_small_drift() {
        let a = base_frame();
        let mut b = base_frame();
        b.humidity += 2;
        b.raw_temp += 29;
        assert!(a.has_close_values(&b));
    }

    #[test]
    fn close_values_rejects_large_drift() {
        let a = base_frame();
        let mut b = base_frame();
        b.raw_temp += 30;
        assert!(!a.has_close_values(&b));
    }

    #[test]
    fn serde_round_trip() {
        let frame = base_frame();
        let json = serde_json::to_string(&frame).unwrap();
        let restored: SensorFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, restored);
    }
}
