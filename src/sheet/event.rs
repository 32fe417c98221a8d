//! Route event model.
//!
//! Two layers of events exist. [`SheetEvent`] is what the tokenizer reads off
//! a page: only sheet-derived fields plus the source line index. The final
//! [`RouteEvent`] union adds everything the timeline builder derives
//! (sequential index, step counts, interpolated waypoints). Keeping the two
//! apart lets every `RouteEvent` variant stay immutable from the moment it is
//! constructed: the builder assigns indices at construction time instead of
//! patching events after the fact.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Meters covered by one step.
pub const STRIDE_M: f64 = 1.4;

/// Steps per minute implied by a declared speed in meters per minute.
pub fn cadence_from_speed(speed_m_min: u32) -> f64 {
    speed_m_min as f64 / STRIDE_M
}

/// Raw event read off a page by the tokenizer. `line` is the index of the
/// line that completed the event, relative to the page's data region.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetEvent {
    Checkpoint {
        line: usize,
        relative_m: u32,
        time_s: u32,
        reported_total_m: u32,
        tags: BTreeSet<String>,
    },
    Neutral {
        line: usize,
        time_s: u32,
    },
    SegmentChange {
        line: usize,
        number: u32,
        speed_m_min: u32,
        cadence: f64,
    },
}

/// A timed, distance-tagged reference marker on the route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkpoint {
    /// Sequential index, strictly increasing from 1 across the whole run.
    pub index: u32,
    pub line: usize,
    /// Distance since the previous checkpoint, in meters.
    pub relative_m: u32,
    /// Absolute time of day, in seconds.
    pub time_s: u32,
    /// Cumulative distance as printed on the sheet (check-only, the builder
    /// keeps its own authoritative total).
    pub reported_total_m: u32,
    /// Step count for the relative distance, at [`STRIDE_M`] per step.
    pub steps: f64,
    /// Canonical keyword tags extracted from the reference text.
    pub tags: BTreeSet<String>,
}

/// A paused period: timestamped, zero distance, excluded from pace checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeutralInterval {
    pub index: u32,
    pub line: usize,
    pub time_s: u32,
}

/// Start of a stretch with one declared pace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentChange {
    pub line: usize,
    pub number: u32,
    pub speed_m_min: u32,
    /// Steps per minute implied by the declared speed.
    pub cadence: f64,
}

/// A computed intermediate pacing mark between two checkpoints. Never read
/// off the sheet; produced only by the waypoint generator.
#[derive(Debug, Clone, Serialize)]
pub struct SyntheticWaypoint {
    /// Step offset into the bracketing interval.
    pub step_offset: u32,
    /// Interpolated absolute time of day, in seconds.
    pub time_s: u32,
    /// Absolute distance from the start of the route, in meters.
    pub distance_m: f64,
    /// Time since the previous checkpoint, in seconds.
    pub relative_time_s: f64,
    /// Distance since the previous checkpoint, in meters.
    pub relative_distance_m: f64,
    /// The checkpoint or neutral interval opening the bracket.
    pub previous: Arc<RouteEvent>,
    /// The checkpoint closing the bracket.
    pub next: Arc<RouteEvent>,
}

/// Closed union of everything the timeline emits. Variants are immutable
/// once constructed.
#[derive(Debug, Clone, Serialize)]
pub enum RouteEvent {
    Checkpoint(Checkpoint),
    Neutral(NeutralInterval),
    Segment(SegmentChange),
    Waypoint(SyntheticWaypoint),
}

impl RouteEvent {
    /// Sequential index, for the variants that carry one.
    pub fn index(&self) -> Option<u32> {
        match self {
            RouteEvent::Checkpoint(c) => Some(c.index),
            RouteEvent::Neutral(n) => Some(n.index),
            RouteEvent::Segment(_) | RouteEvent::Waypoint(_) => None,
        }
    }

    /// Absolute time of day in seconds, for the variants that carry one.
    pub fn time_s(&self) -> Option<u32> {
        match self {
            RouteEvent::Checkpoint(c) => Some(c.time_s),
            RouteEvent::Neutral(n) => Some(n.time_s),
            RouteEvent::Waypoint(w) => Some(w.time_s),
            RouteEvent::Segment(_) => None,
        }
    }

    /// Whether this event anchors a pacing interval (checkpoints and neutral
    /// intervals do, segment changes and waypoints do not).
    pub fn is_anchor(&self) -> bool {
        matches!(self, RouteEvent::Checkpoint(_) | RouteEvent::Neutral(_))
    }
}
