//! End-to-end pipeline: raw lines in, `(snapshot, event)` pairs out.
//!
//! Segmentation runs eagerly at construction so that layout problems surface
//! before anyone starts consuming the stream. Tokenization and timeline
//! building then proceed page by page in a single forward pass: instruction
//! pages are skipped, each data page is tokenized and its events threaded
//! through the one [`TimelineBuilder`] of the run, one event per step. A
//! structural error ends the stream, but pairs finalized before it have
//! already been handed out; data-level problems land in the report and the
//! stream continues.
//!
//! After the stream is exhausted, [`Timeline::into_report`] hands back the
//! annotated pages and the collected diagnostics for audit rendering.

use crate::sheet::error::StructuralError;
use crate::sheet::event::{RouteEvent, SheetEvent};
use crate::sheet::page::{segment_pages, Page};
use crate::sheet::report::{Diagnostic, Reporter};
use crate::sheet::timeline::{ResetPolicy, TimelineBuilder, TimelineState};
use crate::sheet::tokenizer::SheetTokenizer;
use crate::sheet::waypoints::WaypointPolicy;
use std::collections::VecDeque;

/// Run-wide options, applied at construction.
pub struct TimelineOptions {
    /// Generate intermediate pacing waypoints between checkpoints.
    pub partial_waypoints: bool,
    pub waypoint_policy: WaypointPolicy,
    pub reset_policy: Box<dyn ResetPolicy>,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        TimelineOptions {
            partial_waypoints: true,
            waypoint_policy: WaypointPolicy::default(),
            reset_policy: Box::new(crate::sheet::timeline::DeltaEqualsReset),
        }
    }
}

/// Annotated pages and diagnostics left over after a run.
#[derive(Debug)]
pub struct SheetReport {
    pub pages: Vec<Page>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SheetReport {
    /// Audit view: every page rendered with its inline annotations.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for page in &self.pages {
            out.push_str(&page.render());
        }
        out
    }
}

/// Lazy stream of `(snapshot, event)` pairs over a whole sheet.
pub struct Timeline {
    pages: Vec<Page>,
    reporter: Reporter,
    builder: TimelineBuilder,
    next_page: usize,
    /// Raw events of the current page, not yet through the builder.
    pending: VecDeque<SheetEvent>,
    queue: VecDeque<(TimelineState, RouteEvent)>,
    failed: bool,
}

impl Timeline {
    /// Segment `lines` into pages and prepare the stream. Fails on layout
    /// errors (page sequence, column gutters).
    pub fn new(lines: &[String], options: TimelineOptions) -> Result<Self, StructuralError> {
        let pages = segment_pages(lines)?;
        log::debug!("{} pages segmented", pages.len());
        Ok(Timeline {
            pages,
            reporter: Reporter::new(),
            builder: TimelineBuilder::new()
                .with_partial_waypoints(options.partial_waypoints)
                .with_waypoint_policy(options.waypoint_policy)
                .with_reset_policy(options.reset_policy),
            next_page: 0,
            pending: VecDeque::new(),
            queue: VecDeque::new(),
            failed: false,
        })
    }

    /// Convenience: split `text` into lines and build the stream.
    pub fn from_text(text: &str, options: TimelineOptions) -> Result<Self, StructuralError> {
        let lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
        Timeline::new(&lines, options)
    }

    /// Advance until the queue holds pairs or pages run out. Raw events go
    /// through the builder one at a time, so pairs already finalized have
    /// been handed out before a later event on the same page can fail.
    fn refill(&mut self) -> Result<bool, StructuralError> {
        let Timeline {
            pages,
            reporter,
            builder,
            next_page,
            pending,
            queue,
            ..
        } = self;
        while queue.is_empty() {
            if let Some(event) = pending.pop_front() {
                let page = &mut pages[*next_page - 1];
                queue.extend(builder.process(page, reporter, event)?);
                continue;
            }
            let Some(page) = pages.get_mut(*next_page) else {
                return Ok(false);
            };
            *next_page += 1;
            if page.number().is_instruction() {
                log::debug!("skipping instruction page {}", page.number());
                continue;
            }
            pending.extend(SheetTokenizer::new(page, reporter)?);
        }
        Ok(true)
    }

    /// The annotated pages and diagnostics gathered so far. Meant to be
    /// called after the stream is exhausted.
    pub fn into_report(self) -> SheetReport {
        SheetReport {
            pages: self.pages,
            diagnostics: self.reporter.into_diagnostics(),
        }
    }
}

impl Iterator for Timeline {
    type Item = Result<(TimelineState, RouteEvent), StructuralError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.queue.is_empty() {
            match self.refill() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        self.queue.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::page::FORM_FEED;

    /// Compose two side-by-side logical pages into one physical group.
    /// `left` occupies columns 0..34, `right` starts at column 34; the
    /// boundary line carries both page tokens.
    fn group(left: &[&str], right: &[&str], ids: (&str, &str)) -> Vec<String> {
        let rows = left.len().max(right.len());
        let mut lines = Vec::new();
        for i in 0..rows {
            let l = left.get(i).copied().unwrap_or("");
            let r = right.get(i).copied().unwrap_or("");
            lines.push(format!("{:<34}{}", l, r));
        }
        lines.push(format!(
            "{:<34}{}",
            format!("                    Page {}", ids.0),
            format!("                    Page {}", ids.1)
        ));
        lines
    }

    fn data_page() -> Vec<&'static str> {
        vec![
            "  TREKKERS",
            "",
            "  Distance   Reference   Notes",
            "",
            "  SEGMENT 1",
            "  Average speed 75",
            "  000        START",
            "  000",
            "  150        LEFT at GATE",
            "  00:02:00",
            "  150",
        ]
    }

    fn instruction_page() -> Vec<&'static str> {
        vec!["  read these instructions", "  carefully before the race"]
    }

    #[test]
    fn test_full_pipeline_order_and_pages() {
        let mut lines = group(&instruction_page(), &data_page(), ("A1", "1"));
        let mut second = group(
            &[
                "  TREKKERS",
                "",
                "  Distance   Reference   Notes",
                "",
                "  200        RIGHT at BRIDGE",
                "  00:04:40",
                "  350",
            ],
            &instruction_page(),
            ("2", "A3"),
        );
        // every group after the first opens with a form feed
        second[0] = format!("{}{}", FORM_FEED, second[0]);
        lines.extend(second);

        let timeline = Timeline::new(&lines, TimelineOptions::default()).unwrap();
        let pairs: Vec<_> = timeline.collect::<Result<Vec<_>, _>>().unwrap();
        let kinds: Vec<&str> = pairs
            .iter()
            .map(|(_, e)| match e {
                RouteEvent::Segment(_) => "segment",
                RouteEvent::Checkpoint(_) => "checkpoint",
                RouteEvent::Neutral(_) => "neutral",
                RouteEvent::Waypoint(_) => "waypoint",
            })
            .collect();
        // segment change, two checkpoints on page 1, waypoints + checkpoint
        // on page 2; instruction pages contribute nothing
        assert_eq!(kinds[0], "segment");
        assert!(kinds.contains(&"checkpoint"));
        assert!(kinds.contains(&"waypoint"));
        let indices: Vec<u32> = pairs.iter().filter_map(|(_, e)| e.index()).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        let last_state = &pairs.last().unwrap().0;
        assert!((last_state.distance_m - 350.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_carries_annotations() {
        let lines = group(&data_page(), &instruction_page(), ("1", "A2"));
        let mut timeline = Timeline::new(&lines, TimelineOptions::default()).unwrap();
        for item in &mut timeline {
            item.unwrap();
        }
        let report = timeline.into_report();
        assert_eq!(report.pages.len(), 2);
        let rendered = report.render();
        assert!(rendered.contains("steps:"));
        assert!(rendered.contains("steps/min"));
    }
}
