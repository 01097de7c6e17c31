//! Top-level orchestration: the three locks, the hold and quality threads,
//! and the public API (spec.md §5, §6).
//!
//! Lock order is `queue_lock` → `dispatch_lock`; `signal_lock` is never held
//! while acquiring either of the others (spec.md §5). `signal_lock` covers
//! [`EdgeState`] (the ring, clock, and recognizer) and is only ever taken
//! from the GPIO driver's edge callback. `queue_lock` covers the single-slot
//! [`HoldQueue`]. `dispatch_lock` covers the listener registry, the
//! per-channel last-delivered-frame cache, and the quality estimator — all
//! three are read and written together at hold-release time, so one lock
//! covers them rather than three.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::decode::{DataIntegrity, FrameRegion};
use crate::dedup::{self, HoldQueue, HoldSlot, OfferOutcome};
use crate::dispatch::{Dispatch, Listener};
use crate::error::InitError;
use crate::frame::{Channel, Rank, SensorFrame, MISSING};
use crate::gpio::{Edge, EdgeSink, GpioDriver, Level, PinBusyError};
use crate::pins::{self, PinSystem};
use crate::quality::QualityEstimator;
use crate::recognizer::{Candidate, Recognizer};
use crate::repair;
use crate::ring::{PulseRing, WrapClock};

/// A `Condvar`-backed wait that can be tripped once, early, from any thread.
/// Shared by the quality thread and every hold thread so tearing a
/// [`Monitor`] down wakes all of them at once instead of waiting out
/// whatever timer each happened to be on.
struct CancelTimer {
    cancelled: Mutex<bool>,
    cv: Condvar,
}

impl CancelTimer {
    fn new() -> CancelTimer {
        CancelTimer {
            cancelled: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Sleeps up to `dur`. Returns `true` if `dur` elapsed naturally, `false`
    /// if [`Self::cancel`] fired first.
    fn wait(&self, dur: Duration) -> bool {
        let guard = self.cancelled.lock().unwrap();
        let (_guard, result) = self.cv.wait_timeout_while(guard, dur, |cancelled| !*cancelled).unwrap();
        result.timed_out()
    }

    fn cancel(&self) {
        *self.cancelled.lock().unwrap() = true;
        self.cv.notify_all();
    }
}

struct EdgeState {
    ring: PulseRing,
    clock: WrapClock,
    recognizer: Recognizer,
    last_level: Option<Level>,
    last_edge_time: u64,
}

impl EdgeState {
    fn new(ring_capacity: usize) -> EdgeState {
        EdgeState {
            ring: PulseRing::new(ring_capacity),
            clock: WrapClock::new(),
            recognizer: Recognizer::new(),
            last_level: None,
            last_edge_time: 0,
        }
    }
}

#[derive(Default)]
struct DispatchState {
    listeners: Dispatch,
    last_frames: HashMap<Channel, SensorFrame>,
    quality: QualityEstimator,
}

struct Inner {
    self_weak: Weak<Inner>,
    config: MonitorConfig,
    gpio: Mutex<Box<dyn GpioDriver>>,
    bcm_pin: AtomicI32,
    debug_output: AtomicBool,
    signal: Mutex<EdgeState>,
    queue: Mutex<HoldQueue>,
    hold_epoch: AtomicU64,
    dispatch: Mutex<DispatchState>,
    shutdown: CancelTimer,
    last_edge_time_us: AtomicU64,
    quality_thread: Mutex<Option<JoinHandle<()>>>,
}

impl EdgeSink for Inner {
    fn on_edge(&self, edge: Edge) {
        self.handle_edge(edge);
    }
}

impl Inner {
    fn attach(self: &Arc<Self>, bcm_pin: i32) -> anyhow::Result<()> {
        let sink: Arc<dyn EdgeSink> = self.clone();
        self.gpio.lock().unwrap().attach(bcm_pin, sink)
    }

    /// Called once per GPIO edge. Everything that touches the ring or the
    /// recognizer happens under `signal_lock`; any decoded candidates are
    /// collected and handed off to [`Self::offer_candidate`] only after the
    /// lock is released (spec.md §5).
    fn handle_edge(&self, edge: Edge) {
        let mut pending: Vec<(SensorFrame, u32)> = Vec::new();
        let now;

        {
            let mut state = self.signal.lock().unwrap();

            if state.last_level == Some(edge.level) {
                return;
            }
            state.last_level = Some(edge.level);

            let absolute = state.clock.advance(edge.tick);
            let duration = absolute.saturating_sub(state.last_edge_time) as u32;
            state.last_edge_time = absolute;
            state.ring.record(duration);
            now = absolute;

            if edge.level == Level::High {
                let candidates =
                    state
                        .recognizer
                        .on_rising_edge(&state.ring, &self.config.frame, &self.config.pulses, now);

                for candidate in candidates {
                    self.handle_candidate(&mut state, candidate, now, &mut pending);
                }
            }
        }

        self.last_edge_time_us.store(now, Ordering::Relaxed);

        for (frame, repeats) in pending {
            self.offer_candidate(frame, repeats, now);
        }
    }

    fn handle_candidate(
        &self,
        state: &mut EdgeState,
        candidate: Candidate,
        now: u64,
        pending: &mut Vec<(SensorFrame, u32)>,
    ) {
        let debug = self.debug_output.load(Ordering::Relaxed);

        match candidate {
            Candidate::Direct(anchor) => {
                let mut integrity = FrameRegion::new(&state.ring, &self.config.pulses, anchor).check_integrity();

                // Single-region repair, attempted once before falling back to the
                // recognizer's shift-by-one-bit retry (spec.md §7; `processMessage`'s
                // attempt-0 `tryToCleanUpSignal` call in the grounding source).
                if matches!(integrity, DataIntegrity::BadBits | DataIntegrity::BadParity)
                    && repair::combine_messages(&mut state.ring, &self.config.pulses, &[anchor])
                {
                    integrity = FrameRegion::new(&state.ring, &self.config.pulses, anchor).check_integrity();
                }

                let decoded_ok = integrity != DataIntegrity::BadBits;

                if decoded_ok {
                    let region = FrameRegion::new(&state.ring, &self.config.pulses, anchor);
                    if debug {
                        log::debug!("direct candidate bits: {}", region.bits_as_string());
                    }
                    let mut frame = region.decode(integrity, now, Rank::Low, 0);
                    frame.rank = rank_for(integrity, &frame);
                    pending.push((frame, 1));
                }

                state.recognizer.report_direct_result(&state.ring, anchor, decoded_ok);
            }
            Candidate::Blend(anchors) => {
                let write_anchor = *anchors.last().expect("blend carries at least one anchor");

                if repair::combine_messages(&mut state.ring, &self.config.pulses, &anchors) {
                    let region = FrameRegion::new(&state.ring, &self.config.pulses, write_anchor);
                    let integrity = region.check_integrity();

                    if integrity != DataIntegrity::BadBits {
                        if debug {
                            log::debug!("blended candidate bits: {}", region.bits_as_string());
                        }
                        let mut frame = region.decode(integrity, now, Rank::Low, 0);
                        frame.rank = rank_for(integrity, &frame);
                        pending.push((frame, anchors.len() as u32));
                    }
                } else {
                    log::trace!("triplet blend left two or more bits unrecoverable");
                }
            }
        }
    }

    /// Runs outside `signal_lock`. Offers the candidate to the hold queue,
    /// finalizing whatever it evicts and arming a fresh hold timer for
    /// whatever it started.
    fn offer_candidate(&self, frame: SensorFrame, repeats: u32, now: u64) {
        if frame.channel == Channel::Unknown {
            log::trace!("dropping candidate with an unmapped channel code");
            return;
        }

        let outcome = self.queue.lock().unwrap().offer(frame.channel, frame, now, repeats);

        match outcome {
            OfferOutcome::Merged => {}
            OfferOutcome::Started { evicted } => {
                let epoch = self.hold_epoch.fetch_add(1, Ordering::SeqCst) + 1;

                if let Some(evicted) = evicted {
                    self.finalize_hold(evicted, now);
                }

                self.spawn_hold_timer(epoch, now);
            }
        }
    }

    fn spawn_hold_timer(&self, epoch: u64, started_at: u64) {
        let Some(inner) = self.self_weak.upgrade() else {
            return;
        };
        let hold_time = Duration::from_micros(self.config.frame.message_hold_time_us.max(0) as u64);

        thread::spawn(move || {
            if !inner.shutdown.wait(hold_time) {
                return; // monitor torn down before the hold matured
            }

            if inner.hold_epoch.load(Ordering::SeqCst) != epoch {
                return; // a different channel forced this hold out already
            }

            if let Some(slot) = inner.queue.lock().unwrap().expire() {
                inner.finalize_hold(slot, started_at + hold_time.as_micros() as u64);
            }
        });
    }

    /// Records `slot`'s rank against the quality estimator, then applies the
    /// dedup policy and dispatches if it says to (spec.md §4.6, §4.7).
    fn finalize_hold(&self, slot: HoldSlot, now: u64) {
        let mut dispatch = self.dispatch.lock().unwrap();
        let quality = dispatch
            .quality
            .record(slot.channel, now, slot.frame.rank, &self.config.quality);

        if slot.frame.rank.value() < Rank::Mid.value() {
            log::trace!("channel {:?} hold dropped below RANK_MID", slot.channel);
            return;
        }

        let mut frame = slot.frame;
        frame.repeats_captured = slot.repeats_captured;
        frame.signal_quality = quality;

        let last = dispatch.last_frames.get(&slot.channel).copied();
        let decision = dedup::decide_delivery(&frame, last.as_ref(), &self.config.dedup);

        if decision.cache {
            dispatch.last_frames.insert(slot.channel, frame);
        }

        if decision.deliver {
            log::info!(
                "channel {} humidity={} temp_c={:.1} quality={}",
                frame.channel.as_char(),
                frame.humidity,
                frame.temp_celsius,
                frame.signal_quality
            );
            dispatch.listeners.dispatch(&frame);
        }
    }

    fn run_quality_loop(&self) {
        let check_rate = Duration::from_micros(self.config.quality.check_rate_us.max(0) as u64);

        loop {
            if !self.shutdown.wait(check_rate) {
                break;
            }
            self.run_idle_probe();
        }
    }

    /// spec.md §4.7's idle-probe sweep: for every tracked channel whose last
    /// delivery is older than the check rate, recompute its score with
    /// RANK_CHECK. If the score changed, re-dispatch the cached last frame
    /// with the new `signal_quality`; at zero, erase the channel's state.
    fn run_idle_probe(&self) {
        let now = self.last_edge_time_us.load(Ordering::Relaxed);
        let mut dispatch = self.dispatch.lock().unwrap();
        let channels = dispatch.quality.tracked_channels();

        for channel in channels {
            let last_delivery_us = dispatch.last_frames.get(&channel).map(|f| f.collection_time * 1_000_000);

            if let Some(last_us) = last_delivery_us {
                if now.saturating_sub(last_us) < self.config.quality.check_rate_us.max(0) as u64 {
                    continue;
                }
            }

            let Some(score) = dispatch.quality.idle_probe(channel, now, &self.config.quality) else {
                continue;
            };

            let Some(cached) = dispatch.last_frames.get_mut(&channel) else {
                continue;
            };

            if cached.signal_quality == score {
                continue;
            }

            cached.signal_quality = score;
            let frame = *cached;

            log::debug!("channel {channel:?} idle quality now {score}");
            dispatch.listeners.dispatch(&frame);

            if score == 0 {
                log::info!("channel {channel:?} signal presumed lost");
                dispatch.last_frames.remove(&channel);
            }
        }
    }
}

/// spec.md §4.4's RANK_HIGH/RANK_MID/RANK_LOW assignment, generalized to
/// every integrity past `BadBits` rather than special-cased per caller.
fn rank_for(integrity: DataIntegrity, frame: &SensorFrame) -> Rank {
    match integrity {
        DataIntegrity::BadBits => unreachable!("caller only reaches rank_for past BadBits"),
        DataIntegrity::BadParity => Rank::Low,
        DataIntegrity::BadChecksum => Rank::Mid,
        DataIntegrity::Good => {
            if frame.humidity != MISSING && frame.raw_temp != MISSING {
                Rank::High
            } else {
                Rank::Mid
            }
        }
    }
}

/// Owns one GPIO pin's worth of Acu-Rite decoding. Construct with
/// [`Monitor::init`]; dropping it detaches the pin and tears down its
/// threads.
pub struct Monitor {
    inner: Arc<Inner>,
}

impl Monitor {
    /// Converts `pin_number` (expressed under `pin_system`) to BCM, attaches
    /// `driver` to it, and starts the quality thread. `driver` must not
    /// already be attached elsewhere.
    pub fn init(
        pin_number: i32,
        pin_system: PinSystem,
        driver: Box<dyn GpioDriver>,
        config: MonitorConfig,
    ) -> Result<Monitor, InitError> {
        let revision = pins::detect_revision();
        let bcm_pin = pins::convert_to_gpio(pin_number, pin_system, revision);

        if bcm_pin < 0 {
            return Err(InitError::InvalidPin { pin: pin_number });
        }

        let ring_capacity = config.ring_capacity;

        let inner = Arc::new_cyclic(|weak| Inner {
            self_weak: weak.clone(),
            config,
            gpio: Mutex::new(driver),
            bcm_pin: AtomicI32::new(bcm_pin),
            debug_output: AtomicBool::new(false),
            signal: Mutex::new(EdgeState::new(ring_capacity)),
            queue: Mutex::new(HoldQueue::new()),
            hold_epoch: AtomicU64::new(0),
            dispatch: Mutex::new(DispatchState::default()),
            shutdown: CancelTimer::new(),
            last_edge_time_us: AtomicU64::new(0),
            quality_thread: Mutex::new(None),
        });

        inner.attach(bcm_pin).map_err(|err| {
            if err.downcast_ref::<PinBusyError>().is_some() {
                InitError::PinBusy { pin: bcm_pin }
            } else {
                InitError::GpioInitFailed(err.to_string())
            }
        })?;

        let quality_worker = inner.clone();
        let handle = thread::spawn(move || quality_worker.run_quality_loop());
        *inner.quality_thread.lock().unwrap() = Some(handle);

        Ok(Monitor { inner })
    }

    /// Registers `listener`, returning an id usable with [`Self::remove_listener`].
    pub fn add_listener(&self, listener: Listener) -> u32 {
        self.inner.dispatch.lock().unwrap().listeners.add(listener)
    }

    pub fn remove_listener(&self, id: u32) {
        self.inner.dispatch.lock().unwrap().listeners.remove(id);
    }

    /// Toggles `bits_as_string` logging of every candidate region at `debug`
    /// level (spec.md §9's supplemented debug aid).
    pub fn enable_debug_output(&self, enabled: bool) {
        self.inner.debug_output.store(enabled, Ordering::Relaxed);
    }

    pub fn data_pin(&self) -> i32 {
        self.inner.bcm_pin.load(Ordering::Relaxed)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Err(err) = self.inner.gpio.lock().unwrap().detach() {
            log::warn!("error detaching GPIO driver during teardown: {err}");
        }

        self.inner.shutdown.cancel();

        if let Some(handle) = self.inner.quality_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::MockGpioDriver;
    use std::sync::atomic::AtomicUsize;

    fn attaching_mock() -> MockGpioDriver {
        let mut mock = MockGpioDriver::new();
        mock.expect_attach().returning(|_, _| Ok(()));
        mock.expect_detach().returning(|| Ok(()));
        mock
    }

    #[test]
    fn init_converts_pin_and_attaches() {
        let monitor = Monitor::init(4, PinSystem::Gpio, Box::new(attaching_mock()), MonitorConfig::default())
            .expect("init should succeed");
        assert_eq!(monitor.data_pin(), 4);
    }

    #[test]
    fn invalid_pin_is_rejected_before_attaching() {
        let mut mock = MockGpioDriver::new();
        mock.expect_attach().times(0);
        let err = Monitor::init(999, PinSystem::Phys, Box::new(mock), MonitorConfig::default())
            .expect_err("out-of-range physical pin should fail");
        assert!(matches!(err, InitError::InvalidPin { .. }));
    }

    #[test]
    fn busy_pin_is_reported_as_pin_busy() {
        let mut mock = MockGpioDriver::new();
        mock.expect_attach().returning(|_, _| Err(crate::gpio::PinBusyError.into()));
        let err = Monitor::init(4, PinSystem::Gpio, Box::new(mock), MonitorConfig::default())
            .expect_err("an already-attached pin should fail init");
        assert!(matches!(err, InitError::PinBusy { pin: 4 }));
    }

    #[test]
    fn listeners_can_be_added_and_removed() {
        let monitor = Monitor::init(4, PinSystem::Gpio, Box::new(attaching_mock()), MonitorConfig::default())
            .expect("init should succeed");

        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        let id = monitor.add_listener(Box::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.inner.dispatch.lock().unwrap().listeners.dispatch(&sample_frame());
        monitor.remove_listener(id);
        monitor.inner.dispatch.lock().unwrap().listeners.dispatch(&sample_frame());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_detaches_and_joins_quality_thread() {
        let monitor = Monitor::init(4, PinSystem::Gpio, Box::new(attaching_mock()), MonitorConfig::default())
            .expect("init should succeed");
        drop(monitor);
    }

    fn sample_frame() -> SensorFrame {
        SensorFrame {
            channel: Channel::A,
            valid_checksum: true,
            battery_low: false,
            humidity: 50,
            raw_temp: 1000,
            temp_celsius: 0.0,
            temp_fahrenheit: 32.0,
            misc1: 0,
            misc2: 0,
            misc3: 0,
            collection_time: 0,
            repeats_captured: 1,
            rank: Rank::High,
            signal_quality: 100,
        }
    }
}
