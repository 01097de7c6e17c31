//! Frame repair: blending 1–3 repeated transmissions of the same frame and
//! correcting a single wrong bit via a place-value checksum cross-check
//! (spec.md §4.5, `combineMessages` in the original).

use crate::config::PulseTemplate;
use crate::decode::MESSAGE_BITS;
use crate::ring::PulseRing;

const SUB_BITS_PER_BIT: usize = 3;
const TOTAL_SUB_BITS: usize = MESSAGE_BITS * SUB_BITS_PER_BIT;
/// Safety cap on edges consumed per region; a well-formed 56-bit region is
/// exactly `MESSAGE_BITS * 2` edges, but corrupted regions may run a little
/// long before the sub-bit budget is exhausted.
const MAX_EDGES_PER_REGION: usize = MESSAGE_BITS * 4;

/// Walks one region's raw edge durations and resamples them into
/// `TOTAL_SUB_BITS` signed energy values: positive while the line is high,
/// negative while low, one value per `bit_length / 3` time slice. The first
/// edge out of a region is always high (sync has just completed).
fn sub_bit_weights(ring: &PulseRing, pulses: &PulseTemplate, anchor: usize) -> Vec<f64> {
    let sub_bit_duration = pulses.bit_length_us() as f64 / 3.0;

    let mut weights = Vec::with_capacity(TOTAL_SUB_BITS);
    let mut high_low: i32 = -1;
    let mut edge_offset: isize = 0;
    let mut edges_consumed = 0usize;
    let mut available_time = 0.0f64;
    let mut accumulated_time = 0.0f64;
    let mut accumulated_weight = 0.0f64;

    while weights.len() < TOTAL_SUB_BITS {
        if available_time < 0.01 {
            if edges_consumed >= MAX_EDGES_PER_REGION {
                weights.push(accumulated_weight);
                break;
            }
            available_time = ring.at_anchor(anchor, edge_offset) as f64;
            edge_offset += 1;
            edges_consumed += 1;
            high_low *= -1;
        }

        let next_chunk = available_time.min(sub_bit_duration - accumulated_time);
        accumulated_time += next_chunk;
        accumulated_weight += next_chunk * high_low as f64;
        available_time -= next_chunk;

        if (accumulated_time - sub_bit_duration).abs() < 0.01 {
            weights.push(accumulated_weight);
            accumulated_time = 0.0;
            accumulated_weight = 0.0;
        }
    }

    weights
}

/// Blends `anchors` (1 to 3 region start indices, oldest first) into the
/// region at `anchors.last()`, attempting to recover a single corrupted
/// bit. Returns `true` if the blended region is internally consistent
/// (the place-value checksum cross-check agrees, or no bit was ambiguous);
/// the caller should re-run [`crate::decode`] over the write anchor only
/// when this returns `true`.
pub fn combine_messages(ring: &mut PulseRing, pulses: &PulseTemplate, anchors: &[usize]) -> bool {
    assert!(!anchors.is_empty() && anchors.len() <= 3, "1 to 3 regions only");
    let write_anchor = *anchors.last().unwrap();

    let mut combined = vec![0.0f64; TOTAL_SUB_BITS];
    for &anchor in anchors {
        for (slot, weight) in combined.iter_mut().zip(sub_bit_weights(ring, pulses, anchor)) {
            *slot += weight;
        }
    }

    let mut checksum1: i32 = 0;
    let mut checksum2: i32 = 0;
    let mut bad_bit: i32 = -1;

    for bit_index in 0..MESSAGE_BITS {
        let s0 = combined[bit_index * 3];
        let s1 = combined[bit_index * 3 + 1];
        let s2 = combined[bit_index * 3 + 2];

        if s0 > 0.0 && s1 > 0.0 && s2 < 0.0 {
            write_bit(ring, write_anchor, bit_index, pulses.long_us as u32, pulses.short_us as u32);
            let place_value = 1i32 << (7 - bit_index % 8);
            if bit_index < 48 {
                checksum1 += place_value;
            } else {
                checksum2 += place_value;
            }
        } else if s0 > 0.0 && s1 < 0.0 && s2 < 0.0 {
            write_bit(ring, write_anchor, bit_index, pulses.short_us as u32, pulses.long_us as u32);
        } else {
            write_bit(ring, write_anchor, bit_index, 0, 0);

            if bad_bit < 0 {
                bad_bit = bit_index as i32;
            } else {
                return false; // two or more indeterminate bits; unrecoverable
            }
        }
    }

    if bad_bit < 0 {
        return true;
    }

    let bad_bit = bad_bit as usize;
    let place_value = 1i32 << (7 - bad_bit % 8);

    if checksum1 == checksum2 {
        write_bit(ring, write_anchor, bad_bit, pulses.short_us as u32, pulses.long_us as u32);
        return true;
    }

    if bad_bit < 48 {
        checksum1 += place_value;
    } else {
        checksum2 += place_value;
    }

    if checksum1 == checksum2 {
        write_bit(ring, write_anchor, bad_bit, pulses.long_us as u32, pulses.short_us as u32);
        true
    } else {
        false
    }
}

fn write_bit(ring: &mut PulseRing, anchor: usize, bit_index: usize, t0: u32, t1: u32) {
    ring.set_at_anchor(anchor, (bit_index * 2) as isize, t0);
    ring.set_at_anchor(anchor, (bit_index * 2 + 1) as isize, t1);
}
