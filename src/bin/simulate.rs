//! Diagnostic CLI: plays a synthesized Acu-Rite transmission through a real
//! [`Monitor`] and prints whatever gets delivered. Useful for exercising the
//! decoding core without real hardware.

use std::time::Duration;

use clap::Parser;

use acurite_signal_core::config::MonitorConfig;
use acurite_signal_core::frame::Channel;
use acurite_signal_core::monitor::Monitor;
use acurite_signal_core::pins::PinSystem;
use acurite_signal_core::sim::{flip_bit, transmission_durations, SimDriver, SimFrame};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value_t = 50)]
    humidity: u8,

    #[arg(long, default_value_t = 1020)]
    raw_temp: u16,

    #[arg(long, default_value_t = false)]
    battery_low: bool,

    /// Channel to transmit on: a, b, or c.
    #[arg(long, default_value = "a")]
    channel: String,

    /// Number of repeats to send (the real sensor sends 3 per cycle).
    #[arg(long, default_value_t = 3)]
    repeats: u32,

    /// Flip one bit of the middle repeat, to exercise the triplet-blend
    /// repair path.
    #[arg(long, default_value_t = false)]
    corrupt_one_repeat: bool,

    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn parse_channel(s: &str) -> Channel {
    match s.to_ascii_lowercase().as_str() {
        "a" => Channel::A,
        "b" => Channel::B,
        "c" => Channel::C,
        _ => Channel::Unknown,
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let driver = SimDriver::new();
    let config = MonitorConfig::default();

    let monitor = Monitor::init(4, PinSystem::Gpio, Box::new(driver.clone()), config)
        .expect("simulated GPIO driver always attaches");
    monitor.enable_debug_output(args.debug);

    monitor.add_listener(Box::new(|frame| {
        println!(
            "channel={:?} valid={} battery_low={} humidity={} temp_c={:.1} quality={} repeats={}",
            frame.channel,
            frame.valid_checksum,
            frame.battery_low,
            frame.humidity,
            frame.temp_celsius,
            frame.signal_quality,
            frame.repeats_captured
        );
    }));

    let frame = SimFrame {
        channel: parse_channel(&args.channel),
        battery_low: args.battery_low,
        humidity: args.humidity,
        raw_temp: args.raw_temp,
        misc1: 0,
        misc2: 0,
        misc3: 0,
    };

    let repeats: Vec<_> = (0..args.repeats.max(1))
        .map(|i| {
            let mut bits = frame.bits();
            if args.corrupt_one_repeat && i == args.repeats / 2 {
                flip_bit(&mut bits, 20);
            }
            bits
        })
        .collect();

    let durations = transmission_durations(&config.pulses, &repeats);
    driver.play(&durations, 0);

    std::thread::sleep(Duration::from_micros(
        config.frame.message_hold_time_us.max(0) as u64 + 50_000,
    ));
}
