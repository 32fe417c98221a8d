//! Route sheet processing.
//!
//! Turns a plain-text rendering of a trekking-race route sheet (distances,
//! time checkpoints, reference markers, neutralized intervals, segment speed
//! changes) into a validated, strictly ordered timeline.
//!
//! Processing stages, leaf first:
//!
//! - [`page`] splits the flat line stream into logical pages and recovers
//!   column bounds from whitespace gutters;
//! - [`tokenizer`] runs a per-page state machine over column-scoped lines,
//!   producing typed sheet events;
//! - [`timeline`] threads one running state across the event stream,
//!   validates it, derives step counts and pace bands, and synthesizes
//!   intermediate pacing waypoints ([`waypoints`]);
//! - [`pipeline`] glues the stages into one lazy stream of
//!   `(TimelineState, RouteEvent)` pairs, the interface consumed by the
//!   renderers and the audio-cue generator.
//!
//! Structural layout problems are fatal ([`error`]); hand-entry noise is
//! reported and annotated inline ([`report`]) while processing continues.

pub mod error;
pub mod event;
pub mod keywords;
pub mod page;
pub mod pipeline;
pub mod report;
pub mod timeline;
pub mod tokenizer;
pub mod waypoints;

pub use error::StructuralError;
pub use event::{RouteEvent, SheetEvent, STRIDE_M};
pub use page::{segment_pages, Page, PageNumber};
pub use pipeline::{SheetReport, Timeline, TimelineOptions};
pub use report::{Diagnostic, DiagnosticKind, Reporter, Severity};
pub use timeline::{TimelineBuilder, TimelineState};
pub use tokenizer::SheetTokenizer;
pub use waypoints::{partial_positions, WaypointPolicy};
