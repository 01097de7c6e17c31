//! Pure pulse-template predicates (spec.md §4.2).
//!
//! Every predicate here is a stateless comparison of one or two consecutive
//! pulse durations against the configured templates; the only state this
//! module touches is read-only access to the ring for [`is_sync_acquired`].

use crate::config::PulseTemplate;
use crate::ring::PulseRing;

fn within(value: i64, center: i64, tolerance: i64) -> bool {
    (value - center).abs() < tolerance
}

pub fn is_zero_bit(t: &PulseTemplate, t0: i64, t1: i64) -> bool {
    within(t0, t.short_us as i64, t.tolerance_us as i64) && within(t1, t.long_us as i64, t.tolerance_us as i64)
}

pub fn is_one_bit(t: &PulseTemplate, t0: i64, t1: i64) -> bool {
    within(t0, t.long_us as i64, t.tolerance_us as i64) && within(t1, t.short_us as i64, t.tolerance_us as i64)
}

pub fn is_short_sync(t: &PulseTemplate, t0: i64, t1: i64) -> bool {
    within(t0, t.short_sync_us as i64, t.tolerance_us as i64)
        && within(t1, t.short_sync_us as i64, t.tolerance_us as i64)
}

pub fn is_long_sync(t: &PulseTemplate, t0: i64, t1: i64) -> bool {
    within(t0, t.pre_long_sync_us as i64, t.tolerance_us as i64)
        && within(t1, t.long_sync_us as i64, t.long_sync_tolerance_us as i64)
}

/// Classifies a bit from two consecutive durations. `Some(0)`/`Some(1)` for
/// a recognized bit, `None` for neither (spec.md §4.4's "indeterminate").
pub fn classify_bit(t: &PulseTemplate, t0: i64, t1: i64) -> Option<u8> {
    if is_zero_bit(t, t0, t1) {
        Some(0)
    } else if is_one_bit(t, t0, t1) {
        Some(1)
    } else {
        None
    }
}

/// spec.md §4.2: over the last 10 edges, each of (-9,-8),(-7,-6),(-5,-4),(-3,-2)
/// forms a short sync and (-1,0) forms a long sync — the four short-sync
/// pairs lead, the long sync trails immediately before the data region.
pub fn is_sync_acquired(ring: &PulseRing, t: &PulseTemplate) -> bool {
    for i in (2..=8).step_by(2) {
        let t1 = ring.at_offset(-i) as i64;
        let t0 = ring.at_offset(-i - 1) as i64;
        if !is_short_sync(t, t0, t1) {
            return false;
        }
    }

    let t0 = ring.at_offset(-1) as i64;
    let t1 = ring.at_offset(0) as i64;
    is_long_sync(t, t0, t1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> PulseTemplate {
        PulseTemplate::default()
    }

    #[test]
    fn recognizes_zero_bit_within_tolerance() {
        let t = template();
        assert!(is_zero_bit(&t, 210, 401));
        assert!(is_zero_bit(&t, 150, 320));
        assert!(!is_zero_bit(&t, 401, 210));
    }

    #[test]
    fn recognizes_one_bit_within_tolerance() {
        let t = template();
        assert!(is_one_bit(&t, 401, 210));
        assert!(!is_one_bit(&t, 210, 401));
    }

    #[test]
    fn rejects_out_of_tolerance_pulses() {
        let t = template();
        assert!(!is_zero_bit(&t, 210, 700));
        assert!(!is_one_bit(&t, 700, 210));
    }

    #[test]
    fn recognizes_short_sync_pair() {
        let t = template();
        assert!(is_short_sync(&t, 606, 606));
        assert!(!is_short_sync(&t, 606, 210));
    }

    #[test]
    fn recognizes_long_sync_pair() {
        let t = template();
        assert!(is_long_sync(&t, 207, 2205));
        assert!(is_long_sync(&t, 207, 2205 + 400));
        assert!(!is_long_sync(&t, 207, 2205 + 500));
    }

    #[test]
    fn classify_bit_returns_none_for_garbage() {
        let t = template();
        assert_eq!(classify_bit(&t, 1000, 1000), None);
    }

    #[test]
    fn sync_acquired_requires_all_ten_edges_to_match() {
        let t = template();
        let mut ring = PulseRing::new(512);
        for _ in 0..4 {
            ring.record(606);
            ring.record(606);
        }
        ring.record(207);
        ring.record(2205);
        assert!(is_sync_acquired(&ring, &t));
    }

    #[test]
    fn sync_not_acquired_if_any_short_sync_pair_is_off() {
        let t = template();
        let mut ring = PulseRing::new(512);
        ring.record(606);
        ring.record(210); // breaks the short-sync pattern
        for _ in 0..3 {
            ring.record(606);
            ring.record(606);
        }
        ring.record(207);
        ring.record(2205);
        assert!(!is_sync_acquired(&ring, &t));
    }
}
