//! Page model and page segmentation.
//!
//! A route sheet arrives as a flat stream of text lines extracted from the
//! original document. Physical pages are separated by a form-feed character
//! and carry two or three `Page <id>` tokens on one boundary line, one per
//! logical page laid out side by side. Segmentation groups the lines between
//! boundaries, checks that the page identifiers continue the expected
//! sequence, and then recovers the column gutters that separate the logical
//! pages, so that every page ends up with its own vertical slice of the
//! group's lines.
//!
//! All offsets in this module are character offsets, not byte offsets; sheet
//! text is Unicode and the layout logic works in terms of visual columns.

use crate::sheet::error::StructuralError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// Form feed, emitted by the text extractor between physical pages.
pub const FORM_FEED: char = '\u{000C}';

/// Candidate gutter offsets probed to the right of a page-number token,
/// in the order they are tried.
const GUTTER_PROBES: &[usize] = &[5, 6, 4, 7, 3, 8, 2, 9];

/// Extra blank columns appended when padding a group to uniform width, so
/// that gutter probes past the rightmost page always find blank space.
const PAD_SLACK: usize = 3;

static PAGE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Page +([A-Z]*)([0-9]+)").unwrap());

/// Identifier of a logical page: an optional letter prefix plus a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNumber {
    pub letter: String,
    pub number: u32,
}

impl PageNumber {
    pub fn new(letter: impl Into<String>, number: u32) -> Self {
        PageNumber {
            letter: letter.into(),
            number,
        }
    }

    /// Instruction pages (letter prefix `A`) carry no route data and are
    /// excluded from tokenization.
    pub fn is_instruction(&self) -> bool {
        self.letter.starts_with('A')
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, self.number)
    }
}

/// One logical page: identifier, column bounds within its group, the
/// column-sliced lines, and diagnostic annotations keyed by line index.
///
/// Identifier and bounds are fixed at creation. The line list is only read
/// after segmentation (the tokenizer works on its own copy); annotations are
/// the only mutation, via [`Page::annotate`].
#[derive(Debug, Clone)]
pub struct Page {
    number: PageNumber,
    min_right: usize,
    left: usize,
    right: usize,
    lines: Vec<String>,
    annotations: BTreeMap<usize, Vec<String>>,
    sheet_offset: usize,
}

impl Page {
    fn new(number: PageNumber, min_right: usize) -> Self {
        Page {
            number,
            min_right,
            left: 0,
            right: 0,
            lines: Vec::new(),
            annotations: BTreeMap::new(),
            sheet_offset: 0,
        }
    }

    /// Build a page directly from already column-sliced lines. Used by tests
    /// and by callers that obtain per-page text from elsewhere.
    pub fn from_lines(number: PageNumber, lines: Vec<String>) -> Self {
        let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        Page {
            number,
            min_right: 0,
            left: 0,
            right: width,
            lines,
            annotations: BTreeMap::new(),
            sheet_offset: 0,
        }
    }

    pub fn number(&self) -> &PageNumber {
        &self.number
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn width(&self) -> usize {
        self.right - self.left
    }

    /// Number of header lines the tokenizer consumed before the data region.
    /// Event line indices are relative to the data region; add this offset to
    /// get a page line index.
    pub fn sheet_offset(&self) -> usize {
        self.sheet_offset
    }

    pub(crate) fn set_sheet_offset(&mut self, offset: usize) {
        self.sheet_offset = offset;
    }

    /// Attach a diagnostic note to a page line.
    pub fn annotate(&mut self, line: usize, note: impl Into<String>) {
        let note = note.into();
        log::debug!("page {}, note at line {}: {}", self.number, line, note);
        self.annotations.entry(line).or_default().push(note);
    }

    pub fn annotations(&self) -> &BTreeMap<usize, Vec<String>> {
        &self.annotations
    }

    /// Render the page with its annotations beside the original text, for
    /// audit output.
    pub fn render(&self) -> String {
        let width = self.width();
        let rule = format!("+{}+", "-".repeat(width));
        let mut out = String::new();
        out.push_str(&rule);
        out.push('\n');
        for (i, line) in self.lines.iter().enumerate() {
            let padded: String = pad_to(line, width);
            match self.annotations.get(&i) {
                Some(notes) => {
                    out.push_str(&format!("|{}| {}\n", padded, notes.join(" / ")));
                }
                None => out.push_str(&format!("|{}|\n", padded)),
            }
        }
        out.push_str(&rule);
        out.push('\n');
        out
    }
}

/// A run of lines between two page boundaries, holding the logical pages
/// found on its boundary line. Internal to segmentation.
struct Group {
    lines: Vec<String>,
    pages: Vec<Page>,
}

impl Group {
    /// Pad every line to the widest line plus slack, and remember the
    /// unpadded width for gutter probing.
    fn find_width(&mut self) -> usize {
        let width = self
            .lines
            .iter()
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0);
        for line in &mut self.lines {
            *line = pad_to(line, width + PAD_SLACK);
        }
        width
    }

    /// Assign `[left, right)` bounds to every page by probing for a blank
    /// gutter to the right of each page-number token, then hand each page
    /// its column slice of the group's lines. A probe qualifies when the
    /// column is blank on every line of the group (offsets at or beyond the
    /// unpadded width always qualify).
    fn find_page_limits(&mut self) -> Result<(), StructuralError> {
        let width = self.find_width();
        let mut previous = 0;
        for page in &mut self.pages {
            let mut accepted = None;
            for probe in GUTTER_PROBES {
                let end = page.min_right + probe;
                if self.lines.iter().all(|l| {
                    end >= width || l.chars().nth(end).map_or(true, |c| c == ' ')
                }) {
                    accepted = Some(end);
                    break;
                }
            }
            let end = accepted.ok_or_else(|| StructuralError::ColumnBounds {
                page: page.number.to_string(),
                probed_from: page.min_right,
            })?;
            page.left = previous;
            page.right = end;
            previous = end;
        }
        for page in &mut self.pages {
            page.lines = self
                .lines
                .iter()
                .map(|l| char_slice(l, page.left, page.right))
                .collect();
        }
        Ok(())
    }
}

/// Split a flat line stream into logical pages.
///
/// Boundary lines carry 2-3 `Page <id>` tokens; every group after the first
/// must open with a form feed. The first token on a boundary line must either
/// start a new letter sequence at 1 or continue the current letter sequence
/// by 1; the last token seeds the check for the next boundary.
pub fn segment_pages(lines: &[String]) -> Result<Vec<Page>, StructuralError> {
    let mut groups: Vec<Group> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut last_letter: Option<String> = None;
    let mut last_number: u32 = 0;

    for raw in lines {
        let mut line = raw.clone();
        if current.is_empty() && !groups.is_empty() {
            if !line.starts_with(FORM_FEED) {
                return Err(StructuralError::PageSequence {
                    detail: format!("missing page separator before {:?}", line),
                });
            }
            line = line.replace(FORM_FEED, "");
        }
        current.push(line.clone());

        let matches: Vec<_> = PAGE_NUMBER_RE.captures_iter(&line).collect();
        if matches.len() < 2 {
            continue;
        }
        if matches.len() > 3 {
            return Err(StructuralError::PageSequence {
                detail: format!("{} page-number tokens on one line", matches.len()),
            });
        }

        let letter = matches[0][1].to_string();
        let number: u32 = matches[0][2].parse().unwrap_or(0);
        let starts_sequence = last_letter.as_deref() != Some(&letter) && number == 1;
        let continues_sequence =
            last_letter.as_deref() == Some(&letter) && number == last_number + 1;
        if !starts_sequence && !continues_sequence {
            return Err(StructuralError::PageSequence {
                detail: format!(
                    "page {}{} does not follow {}{}",
                    letter,
                    number,
                    last_letter.as_deref().unwrap_or(""),
                    last_number
                ),
            });
        }

        let mut pages = Vec::new();
        for m in &matches {
            let token_end = m.get(0).map(|g| g.end()).unwrap_or(0);
            let min_right = line[..token_end].chars().count();
            let id = PageNumber::new(&m[1], m[2].parse().unwrap_or(0));
            log::debug!("found page {} (token ends at column {})", id, min_right);
            pages.push(Page::new(id, min_right));
        }
        groups.push(Group {
            lines: std::mem::take(&mut current),
            pages,
        });

        let last = &matches[matches.len() - 1];
        last_letter = Some(last[1].to_string());
        last_number = last[2].parse().unwrap_or(0);
    }

    if groups.is_empty() {
        return Err(StructuralError::PageSequence {
            detail: "no page-number boundary found".to_string(),
        });
    }

    let mut pages = Vec::new();
    for mut group in groups {
        group.find_page_limits()?;
        pages.extend(group.pages);
    }
    Ok(pages)
}

fn pad_to(line: &str, width: usize) -> String {
    let len = line.chars().count();
    if len >= width {
        line.to_string()
    } else {
        let mut s = line.to_string();
        s.extend(std::iter::repeat(' ').take(width - len));
        s
    }
}

/// Slice a string by character offsets.
pub(crate) fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    /// Two logical pages side by side: content in columns 0..28, gutter,
    /// content from column 34 on. The boundary line is the last group line.
    fn two_page_group() -> Vec<String> {
        strings(&[
            "  left page text                  right page text",
            "  more text                       more text",
            "                    Page 1                            Page 2",
        ])
    }

    #[test]
    fn test_segment_two_pages() {
        let pages = segment_pages(&two_page_group()).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number().to_string(), "1");
        assert_eq!(pages[1].number().to_string(), "2");
        assert_eq!(pages[0].lines().len(), 3);
        assert!(pages[0].lines()[0].contains("left page text"));
        assert!(!pages[0].lines()[0].contains("right"));
        assert!(pages[1].lines()[0].contains("right page text"));
    }

    #[test]
    fn test_bounds_are_contiguous() {
        let pages = segment_pages(&two_page_group()).unwrap();
        assert_eq!(pages[0].left, 0);
        assert_eq!(pages[0].right, pages[1].left);
    }

    #[test]
    fn test_second_group_requires_form_feed() {
        let mut lines = two_page_group();
        lines.push("  next group".to_string());
        lines.push("                    Page 3                            Page 4".to_string());
        let err = segment_pages(&lines).unwrap_err();
        assert!(matches!(err, StructuralError::PageSequence { .. }));
    }

    #[test]
    fn test_sequence_continues_across_groups() {
        let mut lines = two_page_group();
        lines.push(format!("{}  next group", FORM_FEED));
        lines.push("                    Page 3                            Page 4".to_string());
        let pages = segment_pages(&lines).unwrap();
        assert_eq!(pages.len(), 4);
        assert_eq!(pages[3].number().to_string(), "4");
    }

    #[test]
    fn test_broken_sequence_is_fatal() {
        let mut lines = two_page_group();
        lines.push(format!("{}  next group", FORM_FEED));
        // jumps from 2 to 5
        lines.push("                    Page 5                            Page 6".to_string());
        let err = segment_pages(&lines).unwrap_err();
        assert!(matches!(err, StructuralError::PageSequence { .. }));
    }

    #[test]
    fn test_new_letter_sequence_restarts_at_one() {
        let mut lines = two_page_group();
        lines.push(format!("{}  instructions", FORM_FEED));
        lines.push("                    Page A1                           Page A2".to_string());
        let pages = segment_pages(&lines).unwrap();
        assert_eq!(pages[2].number().to_string(), "A1");
        assert!(pages[2].number().is_instruction());
        assert!(!pages[0].number().is_instruction());
    }

    #[test]
    fn test_single_page_token_is_not_a_boundary() {
        let lines = strings(&["  some text", "  Page 1", "  more text"]);
        let err = segment_pages(&lines).unwrap_err();
        assert!(matches!(err, StructuralError::PageSequence { .. }));
    }

    #[test]
    fn test_no_gutter_is_fatal() {
        // A solid run of text right of the first page token leaves no blank
        // column at any probe offset.
        let lines = strings(&[
            "  xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx",
            "  Page 1xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx  Page 2",
        ]);
        let err = segment_pages(&lines).unwrap_err();
        assert!(matches!(err, StructuralError::ColumnBounds { .. }));
    }

    #[test]
    fn test_annotations_accumulate_in_order() {
        let mut page = Page::from_lines(PageNumber::new("", 1), strings(&["a", "b"]));
        page.annotate(1, "first");
        page.annotate(1, "second");
        assert_eq!(page.annotations()[&1], vec!["first", "second"]);
        let rendered = page.render();
        assert!(rendered.contains("first / second"));
    }
}
