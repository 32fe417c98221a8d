//! Timeline building: one running state threaded across the event stream.
//!
//! The builder owns the only live [`TimelineState`] of a run. Every processed
//! event yields a fresh immutable snapshot (a clone) paired with the final
//! [`RouteEvent`]; that pairing is the entire public output contract, and
//! downstream consumers may hold historical snapshots forever without seeing
//! later mutation.
//!
//! Numeric cross-checks happen here: elapsed time must not run backwards,
//! the sheet-reported cumulative distance is reconciled against the running
//! total, and the measured pace of each leg is compared against the declared
//! segment speed within a half-meter / half-second tolerance band.

use crate::sheet::error::StructuralError;
use crate::sheet::event::{
    Checkpoint, NeutralInterval, RouteEvent, SegmentChange, SheetEvent, SyntheticWaypoint,
    STRIDE_M,
};
use crate::sheet::page::Page;
use crate::sheet::report::{DiagnosticKind, Reporter, Severity};
use crate::sheet::waypoints::WaypointPolicy;
use serde::Serialize;
use std::sync::Arc;

/// Decides whether a disagreeing sheet-reported cumulative distance is an
/// intentional counter reset rather than a data error. Best-effort: a page
/// that legitimately opens at a nonzero total equal to its first leg's
/// length will misfire, which is why the heuristic is swappable.
pub trait ResetPolicy {
    fn is_reset(&self, reported_m: u32, relative_m: u32, tracked_total_m: u32) -> bool;
}

/// Default heuristic: the reported total restarted from exactly the
/// relative delta.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaEqualsReset;

impl ResetPolicy for DeltaEqualsReset {
    fn is_reset(&self, reported_m: u32, relative_m: u32, _tracked_total_m: u32) -> bool {
        reported_m == relative_m
    }
}

/// Running totals and the last-seen context, snapshotted after every event.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineState {
    /// Authoritative cumulative distance: the sum of all relative deltas.
    pub distance_m: f64,
    /// Absolute time of day of the last timed event, in seconds.
    pub time_s: u32,
    /// Distance covered in the current segment.
    pub segment_distance_m: f64,
    /// Moving time spent in the current segment (neutral intervals advance
    /// the clock but are excluded here).
    pub segment_time_s: i64,
    /// Last assigned sequential index.
    pub index: u32,
    /// Current segment number, 0 before the first marker.
    pub segment: u32,
    /// Declared speed of the current segment, m/min.
    pub speed_m_min: Option<u32>,
    /// Cadence implied by the declared speed, steps/min.
    pub cadence: Option<f64>,
    /// Sheet-reported cumulative distance tracker. Check-only; reset
    /// detection rewrites it, the authoritative total never looks at it.
    pub reported_total_m: u32,
    /// The last processed event.
    pub last_event: Option<Arc<RouteEvent>>,
}

impl TimelineState {
    fn initial() -> Self {
        TimelineState {
            distance_m: 0.0,
            time_s: 0,
            segment_distance_m: 0.0,
            segment_time_s: 0,
            index: 0,
            segment: 0,
            speed_m_min: None,
            cadence: None,
            reported_total_m: 0,
            last_event: None,
        }
    }
}

/// Converts meters-per-second style quantities to meters per minute.
fn per_minute(meters: f64, seconds: f64) -> f64 {
    meters / seconds * 60.0
}

/// Threads the run's single live state across events, validating and
/// deriving as it goes. Produces `(snapshot, event)` pairs; synthesizes
/// intermediate waypoints between checkpoints when enabled.
pub struct TimelineBuilder {
    state: TimelineState,
    partial_waypoints: bool,
    waypoint_policy: WaypointPolicy,
    reset_policy: Box<dyn ResetPolicy>,
    /// Last checkpoint or neutral interval, bracketing the next waypoint run.
    previous_anchor: Option<Arc<RouteEvent>>,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        TimelineBuilder {
            state: TimelineState::initial(),
            partial_waypoints: true,
            waypoint_policy: WaypointPolicy::default(),
            reset_policy: Box::new(DeltaEqualsReset),
            previous_anchor: None,
        }
    }

    pub fn with_partial_waypoints(mut self, enabled: bool) -> Self {
        self.partial_waypoints = enabled;
        self
    }

    pub fn with_waypoint_policy(mut self, policy: WaypointPolicy) -> Self {
        self.waypoint_policy = policy;
        self
    }

    pub fn with_reset_policy(mut self, policy: Box<dyn ResetPolicy>) -> Self {
        self.reset_policy = policy;
        self
    }

    /// The live state. Downstream code gets snapshots from [`process`];
    /// this accessor exists for the pipeline's own bookkeeping.
    ///
    /// [`process`]: TimelineBuilder::process
    pub fn state(&self) -> &TimelineState {
        &self.state
    }

    /// Process one raw event from `page`, returning the `(snapshot, event)`
    /// pairs it produced, waypoints first. Only an out-of-sequence segment
    /// marker is fatal.
    pub fn process(
        &mut self,
        page: &mut Page,
        reporter: &mut Reporter,
        event: SheetEvent,
    ) -> Result<Vec<(TimelineState, RouteEvent)>, StructuralError> {
        match event {
            SheetEvent::Checkpoint {
                line,
                relative_m,
                time_s,
                reported_total_m,
                tags,
            } => Ok(self.process_checkpoint(
                page,
                reporter,
                line,
                relative_m,
                time_s,
                reported_total_m,
                tags,
            )),
            SheetEvent::Neutral { line, time_s } => {
                Ok(self.process_neutral(line, time_s))
            }
            SheetEvent::SegmentChange {
                line,
                number,
                speed_m_min,
                cadence,
            } => self.process_segment(page, reporter, line, number, speed_m_min, cadence),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_checkpoint(
        &mut self,
        page: &mut Page,
        reporter: &mut Reporter,
        line: usize,
        relative_m: u32,
        time_s: u32,
        reported_total_m: u32,
        tags: std::collections::BTreeSet<String>,
    ) -> Vec<(TimelineState, RouteEvent)> {
        let abs_line = page.sheet_offset() + line;
        let previous_time = self.state.time_s;
        let previous_distance = self.state.distance_m;
        let elapsed = time_s as i64 - previous_time as i64;
        let index = self.state.index + 1;
        let steps = relative_m as f64 / STRIDE_M;

        if elapsed < 0 {
            reporter.report(
                page,
                abs_line,
                Severity::Error,
                DiagnosticKind::NonMonotonicTime,
                format!(
                    "time runs backwards: {}s after {}s",
                    time_s, previous_time
                ),
            );
        }

        self.reconcile_reported_total(page, reporter, abs_line, relative_m, reported_total_m);
        self.annotate_pace(page, reporter, abs_line, relative_m, elapsed, steps);

        let checkpoint = Arc::new(RouteEvent::Checkpoint(Checkpoint {
            index,
            line,
            relative_m,
            time_s,
            reported_total_m,
            steps,
            tags,
        }));

        let mut pairs = Vec::new();
        if self.partial_waypoints && relative_m > 0 && elapsed > 0 {
            if let Some(previous) = self.previous_anchor.clone() {
                self.synthesize_waypoints(
                    &mut pairs,
                    previous,
                    Arc::clone(&checkpoint),
                    previous_distance,
                    previous_time,
                    relative_m,
                    elapsed,
                    steps,
                );
            }
        }

        self.state.distance_m += relative_m as f64;
        self.state.time_s = time_s;
        self.state.segment_distance_m += relative_m as f64;
        self.state.segment_time_s += elapsed;
        self.state.index = index;
        self.state.last_event = Some(Arc::clone(&checkpoint));
        self.previous_anchor = Some(Arc::clone(&checkpoint));

        pairs.push((self.state.clone(), (*checkpoint).clone()));
        pairs
    }

    /// Check the printed cumulative distance against the tracked one. The
    /// authoritative total is not touched here; only the check tracker is.
    fn reconcile_reported_total(
        &mut self,
        page: &mut Page,
        reporter: &mut Reporter,
        abs_line: usize,
        relative_m: u32,
        reported_total_m: u32,
    ) {
        let expected = self.state.reported_total_m + relative_m;
        if reported_total_m == expected {
            self.state.reported_total_m = reported_total_m;
        } else if self
            .reset_policy
            .is_reset(reported_total_m, relative_m, self.state.reported_total_m)
        {
            reporter.report(
                page,
                abs_line,
                Severity::Info,
                DiagnosticKind::CounterReset,
                format!("distance counter reset, restarting at {}m", reported_total_m),
            );
            self.state.reported_total_m = reported_total_m;
        } else {
            reporter.report(
                page,
                abs_line,
                Severity::Error,
                DiagnosticKind::DistanceMismatch,
                format!(
                    "reported total {}m does not match {}m",
                    reported_total_m, expected
                ),
            );
            // resync so one typo does not cascade down the page
            self.state.reported_total_m = reported_total_m;
        }
    }

    /// Side notes for a leg: measured speed with its admissible band on the
    /// time line, step count on the total line. A declared speed outside the
    /// band is flagged, not fatal.
    fn annotate_pace(
        &mut self,
        page: &mut Page,
        reporter: &mut Reporter,
        abs_line: usize,
        relative_m: u32,
        elapsed: i64,
        steps: f64,
    ) {
        if relative_m > 0 && elapsed > 0 {
            let t = elapsed as f64;
            let d = relative_m as f64;
            let speed = per_minute(d, t);
            let band_low = per_minute(d - 0.5, t + 0.5);
            let band_high = per_minute(d + 0.5, t - 0.5);
            let mut note = format!(
                "speed: {:.1} m/min ({:.1} ~ {:.1})",
                speed, band_low, band_high
            );
            let out_of_band = self
                .state
                .speed_m_min
                .map(|v| (v as f64) < band_low || (v as f64) > band_high)
                .unwrap_or(false);
            let note_line = abs_line.saturating_sub(1);
            if out_of_band {
                note.push_str(" *** DIFFERS FROM SEGMENT");
                reporter.report(
                    page,
                    note_line,
                    Severity::Warning,
                    DiagnosticKind::SpeedOutOfBand,
                    note,
                );
            } else {
                reporter.annotate(page, note_line, note);
            }
        }
        if relative_m > 0 {
            reporter.annotate(page, abs_line, format!("steps: {:.1}", steps));
        }
    }

    /// Distance-proportional interpolation of the pacing marks between two
    /// anchors. Each waypoint carries its own snapshot, the same shape as a
    /// real checkpoint snapshot.
    #[allow(clippy::too_many_arguments)]
    fn synthesize_waypoints(
        &self,
        pairs: &mut Vec<(TimelineState, RouteEvent)>,
        previous: Arc<RouteEvent>,
        next: Arc<RouteEvent>,
        previous_distance: f64,
        previous_time: u32,
        relative_m: u32,
        elapsed: i64,
        steps: f64,
    ) {
        let total_steps = steps.round() as u32;
        for offset in self.waypoint_policy.positions(total_steps) {
            let relative_distance_m = offset as f64 * STRIDE_M;
            let fraction = relative_distance_m / relative_m as f64;
            let relative_time_s = fraction * elapsed as f64;
            let time_s = (previous_time as f64 + relative_time_s).round() as u32;
            let waypoint = Arc::new(RouteEvent::Waypoint(SyntheticWaypoint {
                step_offset: offset,
                time_s,
                distance_m: previous_distance + relative_distance_m,
                relative_time_s,
                relative_distance_m,
                previous: Arc::clone(&previous),
                next: Arc::clone(&next),
            }));
            let mut snapshot = self.state.clone();
            snapshot.distance_m = previous_distance + relative_distance_m;
            snapshot.time_s = time_s;
            snapshot.last_event = Some(Arc::clone(&waypoint));
            pairs.push((snapshot, (*waypoint).clone()));
        }
    }

    fn process_neutral(&mut self, line: usize, time_s: u32) -> Vec<(TimelineState, RouteEvent)> {
        // A neutral interval is a zero-distance checkpoint. The same
        // timestamp may legitimately repeat, so no monotonicity check; the
        // clock advances but segment moving time does not. Sheets restart
        // the printed distance counter at a neutralization.
        let index = self.state.index + 1;
        let neutral = Arc::new(RouteEvent::Neutral(NeutralInterval {
            index,
            line,
            time_s,
        }));
        self.state.time_s = time_s;
        self.state.index = index;
        self.state.reported_total_m = 0;
        self.state.last_event = Some(Arc::clone(&neutral));
        self.previous_anchor = Some(Arc::clone(&neutral));
        vec![(self.state.clone(), (*neutral).clone())]
    }

    fn process_segment(
        &mut self,
        page: &mut Page,
        reporter: &mut Reporter,
        line: usize,
        number: u32,
        speed_m_min: u32,
        cadence: f64,
    ) -> Result<Vec<(TimelineState, RouteEvent)>, StructuralError> {
        let expected = self.state.segment + 1;
        if number != expected {
            return Err(StructuralError::SegmentSequence {
                page: page.number().to_string(),
                line: page.sheet_offset() + line,
                expected,
                found: number,
            });
        }
        let abs_line = page.sheet_offset() + line;
        reporter.annotate(
            page,
            abs_line,
            format!("{:.1} steps/min ({:.1} BPM)", cadence, cadence * 2.0),
        );
        self.state.segment = number;
        self.state.speed_m_min = Some(speed_m_min);
        self.state.cadence = Some(cadence);
        self.state.segment_distance_m = 0.0;
        self.state.segment_time_s = 0;
        let event = Arc::new(RouteEvent::Segment(SegmentChange {
            line,
            number,
            speed_m_min,
            cadence,
        }));
        self.state.last_event = Some(Arc::clone(&event));
        Ok(vec![(self.state.clone(), (*event).clone())])
    }
}

impl Default for TimelineBuilder {
    fn default() -> Self {
        TimelineBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::page::PageNumber;
    use std::collections::BTreeSet;

    fn test_page() -> Page {
        Page::from_lines(
            PageNumber::new("", 1),
            (0..40).map(|_| String::new()).collect(),
        )
    }

    fn checkpoint(line: usize, relative_m: u32, time_s: u32, total: u32) -> SheetEvent {
        SheetEvent::Checkpoint {
            line,
            relative_m,
            time_s,
            reported_total_m: total,
            tags: BTreeSet::new(),
        }
    }

    #[test]
    fn test_indices_increase_across_kinds() {
        let mut builder = TimelineBuilder::new().with_partial_waypoints(false);
        let mut page = test_page();
        let mut reporter = Reporter::new();
        let a = builder
            .process(&mut page, &mut reporter, checkpoint(0, 0, 0, 0))
            .unwrap();
        let b = builder
            .process(
                &mut page,
                &mut reporter,
                SheetEvent::Neutral {
                    line: 3,
                    time_s: 600,
                },
            )
            .unwrap();
        let c = builder
            .process(&mut page, &mut reporter, checkpoint(6, 100, 700, 100))
            .unwrap();
        assert_eq!(a[0].1.index(), Some(1));
        assert_eq!(b[0].1.index(), Some(2));
        assert_eq!(c[0].1.index(), Some(3));
    }

    #[test]
    fn test_segment_sequence_violation_is_fatal() {
        let mut builder = TimelineBuilder::new();
        let mut page = test_page();
        let mut reporter = Reporter::new();
        let err = builder
            .process(
                &mut page,
                &mut reporter,
                SheetEvent::SegmentChange {
                    line: 0,
                    number: 2,
                    speed_m_min: 80,
                    cadence: 0.0,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StructuralError::SegmentSequence {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_counter_reset_is_informational() {
        let mut builder = TimelineBuilder::new().with_partial_waypoints(false);
        let mut page = test_page();
        let mut reporter = Reporter::new();
        builder
            .process(&mut page, &mut reporter, checkpoint(0, 150, 60, 150))
            .unwrap();
        // reported total restarts at exactly the relative delta
        builder
            .process(&mut page, &mut reporter, checkpoint(3, 200, 180, 200))
            .unwrap();
        let kinds: Vec<_> = reporter.diagnostics().iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&DiagnosticKind::CounterReset));
        assert!(!kinds.contains(&DiagnosticKind::DistanceMismatch));
        // the authoritative total still sums the deltas
        assert!((builder.state().distance_m - 350.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_mismatch_is_an_error() {
        let mut builder = TimelineBuilder::new().with_partial_waypoints(false);
        let mut page = test_page();
        let mut reporter = Reporter::new();
        builder
            .process(&mut page, &mut reporter, checkpoint(0, 150, 60, 150))
            .unwrap();
        builder
            .process(&mut page, &mut reporter, checkpoint(3, 200, 180, 420))
            .unwrap();
        assert!(reporter
            .diagnostics()
            .iter()
            .any(|d| d.kind == DiagnosticKind::DistanceMismatch));
    }

    #[test]
    fn test_backwards_time_is_logged_not_fatal() {
        let mut builder = TimelineBuilder::new().with_partial_waypoints(false);
        let mut page = test_page();
        let mut reporter = Reporter::new();
        builder
            .process(&mut page, &mut reporter, checkpoint(0, 100, 600, 100))
            .unwrap();
        let pairs = builder
            .process(&mut page, &mut reporter, checkpoint(3, 100, 300, 200))
            .unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(reporter
            .diagnostics()
            .iter()
            .any(|d| d.kind == DiagnosticKind::NonMonotonicTime));
    }

    #[test]
    fn test_speed_out_of_band_is_flagged() {
        let mut builder = TimelineBuilder::new().with_partial_waypoints(false);
        let mut page = test_page();
        let mut reporter = Reporter::new();
        builder
            .process(
                &mut page,
                &mut reporter,
                SheetEvent::SegmentChange {
                    line: 0,
                    number: 1,
                    speed_m_min: 200,
                    cadence: 0.0,
                },
            )
            .unwrap();
        // 120m in 120s is 60 m/min, nowhere near the declared 200
        builder
            .process(&mut page, &mut reporter, checkpoint(2, 120, 120, 120))
            .unwrap();
        assert!(reporter
            .diagnostics()
            .iter()
            .any(|d| d.kind == DiagnosticKind::SpeedOutOfBand));
    }

    #[test]
    fn test_waypoints_precede_their_checkpoint() {
        let mut builder = TimelineBuilder::new();
        let mut page = test_page();
        let mut reporter = Reporter::new();
        builder
            .process(&mut page, &mut reporter, checkpoint(0, 0, 0, 0))
            .unwrap();
        // 140m = 100 steps, 100s leg
        let pairs = builder
            .process(&mut page, &mut reporter, checkpoint(3, 140, 100, 140))
            .unwrap();
        let offsets: Vec<u32> = pairs
            .iter()
            .filter_map(|(_, e)| match e {
                RouteEvent::Waypoint(w) => Some(w.step_offset),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, vec![5, 10, 20, 30, 40, 50, 60, 70, 80, 90, 95]);
        assert!(matches!(pairs.last().unwrap().1, RouteEvent::Checkpoint(_)));

        // distance-proportional interpolation: 50 steps = 70m = half the leg
        let half = pairs
            .iter()
            .find_map(|(_, e)| match e {
                RouteEvent::Waypoint(w) if w.step_offset == 50 => Some(w.time_s),
                _ => None,
            })
            .unwrap();
        assert_eq!(half, 50);
    }

    #[test]
    fn test_waypoint_snapshots_interpolate_totals() {
        let mut builder = TimelineBuilder::new();
        let mut page = test_page();
        let mut reporter = Reporter::new();
        builder
            .process(&mut page, &mut reporter, checkpoint(0, 0, 0, 0))
            .unwrap();
        let pairs = builder
            .process(&mut page, &mut reporter, checkpoint(3, 140, 100, 140))
            .unwrap();
        let (snapshot, event) = &pairs[0];
        match event {
            RouteEvent::Waypoint(w) => {
                assert_eq!(w.step_offset, 5);
                assert!((snapshot.distance_m - 7.0).abs() < 1e-9);
                assert_eq!(snapshot.time_s, w.time_s);
            }
            other => panic!("expected waypoint, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshots_are_independent_of_later_mutation() {
        let mut builder = TimelineBuilder::new().with_partial_waypoints(false);
        let mut page = test_page();
        let mut reporter = Reporter::new();
        let first = builder
            .process(&mut page, &mut reporter, checkpoint(0, 100, 60, 100))
            .unwrap();
        let snapshot = first[0].0.clone();
        builder
            .process(&mut page, &mut reporter, checkpoint(3, 200, 180, 300))
            .unwrap();
        assert!((snapshot.distance_m - 100.0).abs() < 1e-9);
        assert!((builder.state().distance_m - 300.0).abs() < 1e-9);
    }
}
