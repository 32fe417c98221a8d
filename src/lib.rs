//! # routesheet
//!
//! A parser for trekking-race route sheets.
//!
//! The input is the plain-text rendering of a tabular route sheet; the
//! output is a validated timeline of checkpoints, neutralized intervals,
//! segment changes and synthetic pacing waypoints, each paired with an
//! immutable snapshot of the running state. See the [sheet] module for the
//! processing stages.

pub mod sheet;
