//! Per-page tokenizer: turns column-scoped lines into typed sheet events.
//!
//! The sheet is hand-entered, so a checkpoint's three numbers (relative
//! distance, time of day, cumulative distance) arrive on separate lines in
//! loose order, interleaved with reference text, segment markers and
//! organizer boilerplate. The tokenizer is a small state machine that buffers
//! a partial checkpoint record across lines and emits an event the moment the
//! record completes. Column-scoped text (the distance column) is consulted
//! first; phrase matches run against the full line.
//!
//! The iterator is lazy, finite and single-pass: one tokenizer per page,
//! restartable per page, never reentrant across pages. Unclassifiable lines
//! produce warning diagnostics and processing continues; only a missing table
//! header is fatal, because without the header the column bounds are unknown.

use crate::sheet::error::StructuralError;
use crate::sheet::event::{cadence_from_speed, SheetEvent};
use crate::sheet::keywords;
use crate::sheet::page::{char_slice, Page};
use crate::sheet::report::{DiagnosticKind, Reporter, Severity};
use once_cell::sync::Lazy;
use regex::Regex;

static BLANK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ *$").unwrap());
static LONE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ *([0-9]{3}) *$").unwrap());
static LONE_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ *([0-9]{2}):([0-9]{2}):([0-9]{2}) *$").unwrap());
static TIME_ANYWHERE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]{2}):([0-9]{2}):([0-9]{2})").unwrap());
static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ *(Distance) +(Reference) +(Notes) *$").unwrap());
static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ *SEGMENT +([0-9]+) *$").unwrap());
static SPEED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Average speed +([0-9]+)").unwrap());
static NEUTRAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ *NEUTRALIZED FROM ").unwrap());

/// Organizer banner lines skipped ahead of the table header.
static BANNER_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"^ *TREKKERS *$", r"^ *TRAIL TREK ADVENTURE *$"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

/// Known boilerplate tolerated silently anywhere in the table body.
static SKIP_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^ *WHEN +YOUR +CHRONOMETER",
        r"DISPLACEMENT",
        r"PINES +WITH +TAPES",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// End-of-table markers: tokenization of the page stops here.
static END_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"END +OF +ROUTE", r"GOOD +LUCK"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

/// Lazy per-page event stream. See the module docs for the line rules.
pub struct SheetTokenizer<'a> {
    page: &'a mut Page,
    reporter: &'a mut Reporter,
    lines: Vec<String>,
    col_end: usize,
    pos: usize,
    pending_relative: Option<u32>,
    pending_time: Option<u32>,
    pending_total: Option<u32>,
    buffered: Vec<String>,
    last_field_line: usize,
    awaiting_neutral: bool,
    pending_segment: Option<u32>,
    queued: Option<SheetEvent>,
    done: bool,
}

impl<'a> SheetTokenizer<'a> {
    /// Consume the page header and position the tokenizer at the start of
    /// the data region. Fails when the three-column header is missing.
    pub fn new(page: &'a mut Page, reporter: &'a mut Reporter) -> Result<Self, StructuralError> {
        let all = page.lines().to_vec();
        let mut pos = 0;
        while pos < all.len()
            && (BLANK_RE.is_match(&all[pos]) || BANNER_RES.iter().any(|re| re.is_match(&all[pos])))
        {
            pos += 1;
        }
        let header = all
            .get(pos)
            .and_then(|l| HEADER_RE.captures(l))
            .ok_or_else(|| StructuralError::HeaderNotFound {
                page: page.number().to_string(),
            })?;
        // The end of the "Distance" capture fixes the first column's bound.
        let first_col_end = header.get(1).map(|m| m.end()).unwrap_or(0);
        let col_end = all[pos][..first_col_end].chars().count() + 1;
        pos += 1;
        while pos < all.len() && BLANK_RE.is_match(&all[pos]) {
            pos += 1;
        }
        page.set_sheet_offset(pos);
        let lines = all[pos..].to_vec();
        log::debug!(
            "page {}: data region starts at line {}, column bound {}",
            page.number(),
            pos,
            col_end
        );
        Ok(SheetTokenizer {
            page,
            reporter,
            lines,
            col_end,
            pos: 0,
            pending_relative: None,
            pending_time: None,
            pending_total: None,
            buffered: Vec::new(),
            last_field_line: 0,
            awaiting_neutral: false,
            pending_segment: None,
            queued: None,
            done: false,
        })
    }

    fn in_checkpoint(&self) -> bool {
        self.pending_relative.is_some()
            || self.pending_time.is_some()
            || self.pending_total.is_some()
            || !self.buffered.is_empty()
    }

    fn buffer_field_line(&mut self, line: usize, text: &str) {
        self.last_field_line = line;
        self.buffered.push(text.to_string());
    }

    fn reset_pending(&mut self) {
        self.pending_relative = None;
        self.pending_time = None;
        self.pending_total = None;
        self.buffered.clear();
    }

    fn warn(&mut self, line: usize, kind: DiagnosticKind, message: String) {
        let abs = self.page.sheet_offset() + line;
        self.reporter
            .report(self.page, abs, Severity::Warning, kind, message);
    }

    /// Complete the pending checkpoint if its three fields are set. A
    /// cumulative distance of zero implies time zero when no time was seen
    /// (page starts restart the counters together).
    fn try_finalize(&mut self) -> Option<SheetEvent> {
        if self.pending_total == Some(0) && self.pending_time.is_none() {
            self.pending_time = Some(0);
        }
        if let (Some(relative_m), Some(time_s), Some(reported_total_m)) =
            (self.pending_relative, self.pending_time, self.pending_total)
        {
            let tags = keywords::extract_tags(&self.buffered);
            let line = self.last_field_line;
            self.reset_pending();
            return Some(SheetEvent::Checkpoint {
                line,
                relative_m,
                time_s,
                reported_total_m,
                tags,
            });
        }
        None
    }

    /// Finalize the pending checkpoint: emit it when complete, warn and
    /// discard it when a phrase or the page end interrupted it halfway.
    fn flush_pending(&mut self) -> Option<SheetEvent> {
        if let Some(event) = self.try_finalize() {
            return Some(event);
        }
        if self.in_checkpoint() {
            let line = self.last_field_line;
            self.warn(
                line,
                DiagnosticKind::IncompleteCheckpoint,
                format!(
                    "incomplete checkpoint dropped (distance {:?}, time {:?}, total {:?})",
                    self.pending_relative, self.pending_time, self.pending_total
                ),
            );
            self.reset_pending();
        }
        None
    }

    /// Emit `event`, preceded by the flushed pending checkpoint if any.
    fn emit(&mut self, event: SheetEvent) -> Option<SheetEvent> {
        match self.flush_pending() {
            Some(checkpoint) => {
                self.queued = Some(event);
                Some(checkpoint)
            }
            None => Some(event),
        }
    }
}

impl Iterator for SheetTokenizer<'_> {
    type Item = SheetEvent;

    fn next(&mut self) -> Option<SheetEvent> {
        loop {
            if let Some(event) = self.queued.take() {
                return Some(event);
            }
            if self.done {
                return None;
            }
            if self.pos >= self.lines.len() {
                self.done = true;
                match self.flush_pending() {
                    Some(event) => return Some(event),
                    None => return None,
                }
            }

            let i = self.pos;
            self.pos += 1;
            let full = self.lines[i].clone();
            let col = char_slice(&full, 0, self.col_end);
            log::debug!("line {}: col {:?} full {:?}", i, col, full);

            // An armed neutralization grabs the next timestamp wherever it
            // appears on the line.
            if self.awaiting_neutral {
                if let Some(c) = TIME_ANYWHERE_RE.captures(&full) {
                    let (h, m, s) = (parse_u32(&c[1]), parse_u32(&c[2]), parse_u32(&c[3]));
                    if m >= 60 || s >= 60 {
                        self.warn(
                            i,
                            DiagnosticKind::InvalidTimestamp,
                            format!("invalid timestamp {:02}:{:02}:{:02}", h, m, s),
                        );
                        continue;
                    }
                    self.awaiting_neutral = false;
                    let event = SheetEvent::Neutral {
                        line: i,
                        time_s: h * 3600 + m * 60 + s,
                    };
                    return self.emit(event);
                }
            }

            if self.pending_relative.is_none() {
                if let Some(c) = LONE_NUMBER_RE.captures(&col) {
                    self.pending_relative = Some(parse_u32(&c[1]));
                    self.buffer_field_line(i, &full);
                    continue;
                }
            }

            if self.pending_time.is_none() {
                if let Some(c) = LONE_TIME_RE.captures(&col) {
                    let (h, m, s) = (parse_u32(&c[1]), parse_u32(&c[2]), parse_u32(&c[3]));
                    if m >= 60 || s >= 60 {
                        self.warn(
                            i,
                            DiagnosticKind::InvalidTimestamp,
                            format!("invalid timestamp {:02}:{:02}:{:02}", h, m, s),
                        );
                        continue;
                    }
                    self.pending_time = Some(h * 3600 + m * 60 + s);
                    self.buffer_field_line(i, &full);
                    if let Some(event) = self.try_finalize() {
                        return Some(event);
                    }
                    continue;
                }
            }

            // The cumulative distance only completes a record that already
            // has its relative distance, and a time unless the relative
            // distance is zero (a fresh counter).
            if self.pending_relative.is_some()
                && (self.pending_time.is_some() || self.pending_relative == Some(0))
                && self.pending_total.is_none()
            {
                if let Some(c) = LONE_NUMBER_RE.captures(&col) {
                    self.pending_total = Some(parse_u32(&c[1]));
                    self.buffer_field_line(i, &full);
                    if let Some(event) = self.try_finalize() {
                        return Some(event);
                    }
                    continue;
                }
            }

            if let Some(c) = SEGMENT_RE.captures(&full) {
                self.pending_segment = Some(parse_u32(&c[1]));
                match self.flush_pending() {
                    Some(event) => return Some(event),
                    None => continue,
                }
            }

            if let Some(c) = SPEED_RE.captures(&full) {
                // Only meaningful while a SEGMENT marker is armed; otherwise
                // the line falls through to the warning arm below.
                if let Some(number) = self.pending_segment.take() {
                    let speed_m_min = parse_u32(&c[1]);
                    let event = SheetEvent::SegmentChange {
                        line: i,
                        number,
                        speed_m_min,
                        cadence: cadence_from_speed(speed_m_min),
                    };
                    return self.emit(event);
                }
            }

            if NEUTRAL_RE.is_match(&full) {
                self.awaiting_neutral = true;
                match self.flush_pending() {
                    Some(event) => return Some(event),
                    None => continue,
                }
            }

            if END_RES.iter().any(|re| re.is_match(&full)) {
                self.done = true;
                match self.flush_pending() {
                    Some(event) => return Some(event),
                    None => return None,
                }
            }

            if SKIP_RES.iter().any(|re| re.is_match(&full)) {
                match self.flush_pending() {
                    Some(event) => return Some(event),
                    None => continue,
                }
            }

            if BLANK_RE.is_match(&col) {
                if BLANK_RE.is_match(&full) {
                    continue;
                }
                if self.in_checkpoint() {
                    // reference text belonging to the checkpoint in progress
                    self.buffered.push(full);
                } else if keywords::contains_keyword(&full) {
                    self.warn(
                        i,
                        DiagnosticKind::OrphanKeyword,
                        format!("keyword outside any checkpoint: {:?}", full.trim()),
                    );
                }
                continue;
            }

            let kind = if !self.in_checkpoint() && keywords::contains_keyword(&full) {
                DiagnosticKind::OrphanKeyword
            } else {
                DiagnosticKind::UnexpectedLine
            };
            self.warn(i, kind, format!("unexpected line: {:?}", col.trim_end()));
            match self.flush_pending() {
                Some(event) => return Some(event),
                None => continue,
            }
        }
    }
}

fn parse_u32(digits: &str) -> u32 {
    digits.parse().unwrap_or(0)
}
