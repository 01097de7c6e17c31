//! Deterministic transmission synthesis, for tests and the `simulate`
//! diagnostic binary (spec.md §8's end-to-end scenarios).
//!
//! [`SimFrame`] builds the same bit layout [`crate::decode`] expects and
//! [`SimDriver`] plays it back as a [`crate::gpio::GpioDriver`], so a test
//! can drive a real [`crate::monitor::Monitor`] through its public GPIO
//! boundary instead of poking internals. Mirrors the teacher's
//! `tests/simulation_e2e.rs` physics-engine harness: a fake collaborator
//! implementing the real trait, fed by hand instead of real hardware.

use std::sync::{Arc, Mutex};

use crate::config::PulseTemplate;
use crate::decode::MESSAGE_BITS;
use crate::frame::Channel;
use crate::gpio::{Edge, EdgeSink, GpioDriver, Level, PinBusyError};

/// One transmission's worth of field values, in the units [`crate::decode`]
/// produces them (raw register values, not engineering units).
#[derive(Debug, Clone, Copy)]
pub struct SimFrame {
    pub channel: Channel,
    pub battery_low: bool,
    pub humidity: u8,
    pub raw_temp: u16,
    pub misc1: u16,
    pub misc2: u8,
    pub misc3: u8,
}

impl SimFrame {
    /// 56 bits, MSB-first, with correct parity (bytes 3..5) and checksum
    /// (byte 6) already filled in. Same field layout as
    /// `decode::tests::good_frame_bytes`, generalized to arbitrary values.
    pub fn bits(&self) -> [u8; MESSAGE_BITS] {
        bytes_to_bits(&self.encode_bytes())
    }

    fn encode_bytes(&self) -> [u8; 7] {
        let channel_bits = match self.channel {
            Channel::A => 0b11u8,
            Channel::B => 0b10u8,
            Channel::C => 0b00u8,
            Channel::Unknown => 0b01u8,
        };

        let mut bytes = [0u8; 7];
        bytes[0] = (channel_bits << 6) | ((self.misc1 >> 8) as u8 & 0x3F);
        bytes[1] = (self.misc1 & 0xFF) as u8;
        bytes[2] = ((self.battery_low as u8) << 7) | (self.misc2 & 0x7F);

        let humidity_bits = self.humidity & 0x7F;
        let parity3 = humidity_bits.count_ones() % 2;
        bytes[3] = ((parity3 as u8) << 7) | humidity_bits;

        let temp_top4 = ((self.raw_temp >> 7) & 0x0F) as u8;
        let temp_low7 = (self.raw_temp & 0x7F) as u8;
        let byte4_payload = ((self.misc3 & 0x07) << 4) | temp_top4;
        let parity4 = byte4_payload.count_ones() % 2;
        bytes[4] = ((parity4 as u8) << 7) | byte4_payload;

        let parity5 = temp_low7.count_ones() % 2;
        bytes[5] = ((parity5 as u8) << 7) | temp_low7;

        let checksum: u32 = bytes[0..6].iter().map(|&b| b as u32).sum();
        bytes[6] = (checksum & 0xFF) as u8;

        bytes
    }
}

fn bytes_to_bits(bytes: &[u8; 7]) -> [u8; MESSAGE_BITS] {
    let mut bits = [0u8; MESSAGE_BITS];
    for (byte_idx, byte) in bytes.iter().enumerate() {
        for bit_idx in 0..8 {
            bits[byte_idx * 8 + bit_idx] = (byte >> (7 - bit_idx)) & 1;
        }
    }
    bits
}

/// Flips `bits[index]` in place, for synthesizing the single-bad-repeat
/// scenario a triplet blend is meant to repair.
pub fn flip_bit(bits: &mut [u8; MESSAGE_BITS], index: usize) {
    bits[index] = 1 - bits[index];
}

/// One repeat's raw edge durations: 4 short-sync pairs, 1 long-sync pair,
/// then 56 bit pairs (spec.md §4.2). Exactly [`crate::config::FrameWindow`]'s
/// `sync_to_sync_time_us` worth of signal.
pub fn repeat_durations(pulses: &PulseTemplate, bits: &[u8; MESSAGE_BITS]) -> Vec<u32> {
    let mut out = Vec::with_capacity(10 + MESSAGE_BITS * 2);

    for _ in 0..4 {
        out.push(pulses.short_sync_us as u32);
        out.push(pulses.short_sync_us as u32);
    }
    out.push(pulses.pre_long_sync_us as u32);
    out.push(pulses.long_sync_us as u32);

    for &bit in bits {
        if bit == 0 {
            out.push(pulses.short_us as u32);
            out.push(pulses.long_us as u32);
        } else {
            out.push(pulses.long_us as u32);
            out.push(pulses.short_us as u32);
        }
    }

    out
}

/// Concatenates one repeat's durations per entry of `repeats`, back to back,
/// the way a real sensor repeats its transmission 3 times per cycle.
pub fn transmission_durations(pulses: &PulseTemplate, repeats: &[[u8; MESSAGE_BITS]]) -> Vec<u32> {
    repeats.iter().flat_map(|bits| repeat_durations(pulses, bits)).collect()
}

/// A [`GpioDriver`] that plays back a precomputed duration list instead of
/// reading real hardware. `play` feeds each duration as one edge, alternating
/// level, exactly as a real OOK receiver's interrupt handler would.
///
/// Cheaply `Clone`: keep one handle to hand to [`crate::monitor::Monitor::init`]
/// and another to call [`Self::play`] on afterwards, the way the `simulate`
/// binary does.
#[derive(Clone, Default)]
pub struct SimDriver {
    sink: Arc<Mutex<Option<Arc<dyn EdgeSink>>>>,
}

impl SimDriver {
    pub fn new() -> SimDriver {
        SimDriver::default()
    }

    /// Feeds `durations` as alternating-level edges starting at `start_tick`,
    /// wrapping the tick counter the way a real 32-bit hardware timer would.
    /// Returns the tick after the last edge, for chaining multiple `play`
    /// calls across a test.
    pub fn play(&self, durations: &[u32], start_tick: u32) -> u32 {
        let sink = self.sink.lock().unwrap().clone();
        let Some(sink) = sink else {
            return start_tick;
        };

        let mut tick = start_tick;
        let mut level = Level::Low;

        for &duration in durations {
            tick = tick.wrapping_add(duration);
            level = match level {
                Level::Low => Level::High,
                Level::High => Level::Low,
            };
            sink.on_edge(Edge { level, tick });
        }

        tick
    }
}

impl GpioDriver for SimDriver {
    fn attach(&mut self, _bcm_pin: i32, sink: Arc<dyn EdgeSink>) -> anyhow::Result<()> {
        let mut current = self.sink.lock().unwrap();
        if current.is_some() {
            return Err(PinBusyError.into());
        }
        *current = Some(sink);
        Ok(())
    }

    fn detach(&mut self) -> anyhow::Result<()> {
        *self.sink.lock().unwrap() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{DataIntegrity, FrameRegion};
    use crate::ring::PulseRing;

    fn sample() -> SimFrame {
        SimFrame {
            channel: Channel::A,
            battery_low: false,
            humidity: 50,
            raw_temp: 1020,
            misc1: 0,
            misc2: 0,
            misc3: 0,
        }
    }

    #[test]
    fn repeat_durations_round_trip_through_decode() {
        let pulses = PulseTemplate::default();
        let bits = sample().bits();
        let durations = repeat_durations(&pulses, &bits);

        let mut ring = PulseRing::new(256);
        for _ in 0..8 {
            ring.record(0); // pad so anchor math near index 0 stays in range
        }
        let data_index = ring.write_index() + 10; // skip the synthesized preamble
        for &d in &durations {
            ring.record(d);
        }

        let region = FrameRegion::new(&ring, &pulses, data_index);
        assert_eq!(region.check_integrity(), DataIntegrity::Good);

        let frame = region.decode(DataIntegrity::Good, 0, crate::frame::Rank::High, 100);
        assert_eq!(frame.channel, Channel::A);
        assert_eq!(frame.humidity, 50);
        assert_eq!(frame.raw_temp, 1020);
    }

    #[test]
    fn flip_bit_changes_exactly_one_bit() {
        let mut bits = sample().bits();
        let original = bits;
        flip_bit(&mut bits, 20);

        let mismatches = bits.iter().zip(original.iter()).filter(|(a, b)| a != b).count();
        assert_eq!(mismatches, 1);
    }

    #[test]
    fn sim_driver_forwards_every_edge_in_order() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingSink(AtomicUsize);
        impl EdgeSink for CountingSink {
            fn on_edge(&self, _edge: Edge) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut driver = SimDriver::new();
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        driver.attach(4, sink.clone()).unwrap();

        let durations = vec![100u32, 200, 300];
        let end_tick = driver.play(&durations, 0);

        assert_eq!(end_tick, 600);
        assert_eq!(sink.0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn attaching_twice_without_detach_is_rejected() {
        struct NullSink;
        impl EdgeSink for NullSink {
            fn on_edge(&self, _edge: Edge) {}
        }

        let mut driver = SimDriver::new();
        driver.attach(4, Arc::new(NullSink)).unwrap();

        let err = driver.attach(4, Arc::new(NullSink)).expect_err("already attached");
        assert!(err.downcast_ref::<PinBusyError>().is_some());

        driver.detach().unwrap();
        driver.attach(4, Arc::new(NullSink)).expect("re-attach after detach should succeed");
    }
}
