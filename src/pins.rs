//! Pin-numbering conversion between the GPIO (BCM), physical-header, and
//! WiringPi numbering conventions.
//!
//! This is pure lookup-table plumbing external to the decoding core (see
//! spec.md §1): it exists only so [`crate::monitor::Monitor::init`] can hand
//! the [`crate::gpio::GpioDriver`] collaborator a BCM pin number regardless
//! of which convention the caller used. Tables and revision-selection logic
//! are ported from `pin-conversions.cpp` in the original implementation.

use std::fs;

/// Pin-numbering convention a caller may express a pin number in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinSystem {
    Gpio,
    Phys,
    WiringPi,
    /// Whatever `init` previously locked in for this process (matches the
    /// original's implicit "already initialized" behavior).
    Default,
}

/// Raspberry Pi GPIO header layout revision, auto-detected from
/// `/proc/cpuinfo` or defaulted when that can't be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    /// Model A/B rev 1, 1.1.
    Rev1,
    /// Everything since rev 2 (A2, B2, A+, B+, CM, Pi 2/3/4, Zero, ...).
    Rev2,
}

#[rustfmt::skip]
const WPI_TO_GPIO_R1: [i32; 32] = [
    17, 18, 21, 22, 23, 24, 25, 4,
     0,  1,
     8,  7,
    10,  9, 11,
    14, 15,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
];

#[rustfmt::skip]
const WPI_TO_GPIO_R2: [i32; 32] = [
    17, 18, 27, 22, 23, 24, 25, 4,
     2,  3,
     8,  7,
    10,  9, 11,
    14, 15,
    28, 29, 30, 31,
     5,  6, 13, 19, 26,
    12, 16, 20, 21,
     0,  1,
];

#[rustfmt::skip]
const PHYS_TO_GPIO_R1: [i32; 27] = [
    -1,
    -1, -1,
     0, -1,
     1, -1,
     4, 14,
    -1, 15,
    17, 18,
    21, -1,
    22, 23,
    -1, 24,
    10, -1,
     9, 25,
    11,  8,
    -1,  7,
];

#[rustfmt::skip]
const PHYS_TO_GPIO_R2: [i32; 41] = [
    -1,
    -1, -1,
     2, -1,
     3, -1,
     4, 14,
    -1, 15,
    17, 18,
    27, -1,
    22, 23,
    -1, 24,
    10, -1,
     9, 25,
    11,  8,
    -1,  7,
     0,  1,
     5, -1,
     6, 12,
    13, -1,
    19, 16,
    26, 20,
    -1, 21,
];

fn wpi_to_gpio_table(rev: Revision) -> &'static [i32] {
    match rev {
        Revision::Rev1 => &WPI_TO_GPIO_R1,
        Revision::Rev2 => &WPI_TO_GPIO_R2,
    }
}

fn phys_to_gpio_table(rev: Revision) -> &'static [i32] {
    match rev {
        Revision::Rev1 => &PHYS_TO_GPIO_R1,
        Revision::Rev2 => &PHYS_TO_GPIO_R2,
    }
}

/// Reads `/proc/cpuinfo` looking for a `Revision:` line and classifies the
/// board. Per spec.md's Open Questions this is purely a table-selection
/// optimization; any I/O or parse failure defaults to the newer [`Revision::Rev2`]
/// table rather than failing `init`.
pub fn detect_revision() -> Revision {
    detect_revision_from(&fs::read_to_string("/proc/cpuinfo").unwrap_or_default())
}

fn detect_revision_from(cpuinfo: &str) -> Revision {
    for line in cpuinfo.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        if key.trim() != "Revision" {
            continue;
        }

        let value = value.trim();

        if value.len() >= 4 {
            match &value[value.len() - 4..] {
                "0002" | "0003" => return Revision::Rev1,
                _ => return Revision::Rev2,
            }
        }
    }

    Revision::Rev2
}

fn gpio_to_wpi(gpio: i32, rev: Revision) -> i32 {
    wpi_to_gpio_table(rev)
        .iter()
        .position(|&g| g == gpio)
        .map(|i| i as i32)
        .unwrap_or(-1)
}

fn gpio_to_phys(gpio: i32, rev: Revision) -> i32 {
    phys_to_gpio_table(rev)
        .iter()
        .position(|&g| g == gpio)
        .map(|i| i as i32)
        .unwrap_or(-1)
}

/// Converts `pin_number`, expressed under `from`, to the BCM GPIO numbering
/// convention, using `rev` to select the lookup table. Returns `-1` (mirroring
/// the original's sentinel) if the pin is out of range or unmapped.
pub fn convert_to_gpio(pin_number: i32, from: PinSystem, rev: Revision) -> i32 {
    if pin_number < 0 {
        return -1;
    }

    match from {
        PinSystem::Gpio | PinSystem::Default => pin_number,
        PinSystem::WiringPi => {
            let table = wpi_to_gpio_table(rev);
            if (pin_number as usize) < table.len() {
                table[pin_number as usize]
            } else {
                -1
            }
        }
        PinSystem::Phys => {
            let table = phys_to_gpio_table(rev);
            if (pin_number as usize) < table.len() {
                table[pin_number as usize]
            } else {
                -1
            }
        }
    }
}

/// General conversion between any two numbering systems, via BCM GPIO as the
/// common intermediate representation.
pub fn convert_pin(pin_number: i32, from: PinSystem, to: PinSystem, rev: Revision) -> i32 {
    let gpio = convert_to_gpio(pin_number, from, rev);

    if gpio < 0 {
        return -1;
    }

    match to {
        PinSystem::Gpio | PinSystem::Default => gpio,
        PinSystem::WiringPi => gpio_to_wpi(gpio, rev),
        PinSystem::Phys => gpio_to_phys(gpio, rev),
    }
}
