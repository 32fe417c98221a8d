//! Intermediate pacing-mark generation.
//!
//! Between two checkpoints the audio-cue generator wants a handful of
//! intermediate announcements so the team can hold its cadence without
//! staring at the sheet. Given the whole-step count of the interval this
//! module computes the step offsets at which to announce: a few tight marks
//! while settling into pace, regular marks while cruising, then countdown
//! marks approaching the next checkpoint.
//!
//! The schedule is a pure function of the step count: identical inputs always
//! produce identical marks. All parameters live in [`WaypointPolicy`] so a
//! different schedule can be swapped in wholesale; earlier revisions of the
//! cooldown rounding disagreed, and the parametrized end-mark form is the one
//! implemented here.

use serde::Serialize;

/// Parameters of the pacing-mark schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaypointPolicy {
    /// Intervals shorter than this get no marks at all.
    pub minimum_steps: u32,
    /// Warm-up candidates, emitted in order while below half the interval.
    pub warmup: Vec<u32>,
    /// Spacing of cruise marks.
    pub stride: u32,
    /// Cruise marks stop this many steps before the interval end.
    pub end_margin: u32,
    /// Cooldown end-mark pairs `(outer, inner)`, tried in order; each
    /// candidate is the rounded interval length minus the inner mark.
    pub end_marks: Vec<(u32, u32)>,
    /// The interval length is rounded to the nearest multiple of this before
    /// computing cooldown candidates.
    pub rounding: u32,
}

impl Default for WaypointPolicy {
    fn default() -> Self {
        WaypointPolicy {
            minimum_steps: 10,
            warmup: vec![5, 10, 20, 30],
            stride: 10,
            end_margin: 5,
            end_marks: vec![(30, 20), (20, 10), (10, 5)],
            rounding: 5,
        }
    }
}

impl WaypointPolicy {
    /// Step offsets at which to announce, strictly increasing, all inside
    /// `(0, total_steps)`.
    pub fn positions(&self, total_steps: u32) -> Vec<u32> {
        let s = total_steps;
        if s < self.minimum_steps {
            return Vec::new();
        }

        let mut marks: Vec<u32> = Vec::new();

        // Warm-up: stop at the first candidate reaching half the interval.
        for &candidate in &self.warmup {
            if 2 * candidate < s {
                marks.push(candidate);
            } else {
                break;
            }
        }

        // Cruise: regular stride from the last warm-up mark.
        let mut next = marks.last().copied().unwrap_or(0) + self.stride;
        while next + self.end_margin < s {
            marks.push(next);
            next += self.stride;
        }

        // Cooldown: countdown marks measured back from the rounded end.
        let rounded = (s + self.rounding / 2) / self.rounding * self.rounding;
        for &(outer, inner) in &self.end_marks {
            let gap = (outer - inner) as i64;
            let candidate = rounded as i64 - inner as i64;
            let last = marks.last().copied().unwrap_or(0) as i64;
            if candidate > 0 && candidate < s as i64 && 2 * candidate > 2 * last + gap {
                marks.push(candidate as u32);
            }
        }

        marks
    }
}

/// Pacing marks for an interval of `total_steps` whole steps, under the
/// default policy.
pub fn partial_positions(total_steps: u32) -> Vec<u32> {
    WaypointPolicy::default().positions(total_steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_intervals_have_no_marks() {
        for s in 0..10 {
            assert!(partial_positions(s).is_empty(), "steps = {}", s);
        }
    }

    #[test]
    fn test_marks_are_strictly_increasing_and_interior() {
        for s in 10..400 {
            let marks = partial_positions(s);
            for pair in marks.windows(2) {
                assert!(pair[0] < pair[1], "steps = {}: {:?}", s, marks);
            }
            for &m in &marks {
                assert!(m > 0 && m < s, "steps = {}: {:?}", s, marks);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(partial_positions(137), partial_positions(137));
    }

    #[test]
    fn test_custom_policy_is_honored() {
        let policy = WaypointPolicy {
            minimum_steps: 50,
            ..WaypointPolicy::default()
        };
        assert!(policy.positions(40).is_empty());
        assert!(!policy.positions(60).is_empty());
    }
}
