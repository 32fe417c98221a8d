//! Reference-text vocabulary and keyword tag extraction.
//!
//! Checkpoint reference descriptions are free text, but the organizers draw
//! from a small set of direction, terrain and hazard terms. Scanning a
//! finalized checkpoint's buffered lines against this vocabulary yields the
//! canonical tag set that downstream consumers (the audio-cue generator in
//! particular) key their announcements on.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Canonical direction/terrain/hazard terms, matched case-insensitively as
/// whole words.
pub const VOCABULARY: &[&str] = &[
    "LEFT",
    "RIGHT",
    "STRAIGHT",
    "UPHILL",
    "DOWNHILL",
    "CLIMB",
    "DESCENT",
    "BRIDGE",
    "CREEK",
    "RIVER",
    "FORD",
    "GATE",
    "FENCE",
    "BARBED",
    "WIRE",
    "TRAIL",
    "ROAD",
    "CROSSING",
    "ROCKS",
    "MUD",
    "SWAMP",
    "PASTURE",
    "WOODS",
    "PINES",
    "TAPE",
];

static KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    let alternatives = VOCABULARY.join("|");
    Regex::new(&format!(r"(?i)\b({})\b", alternatives)).unwrap()
});

/// Collect the deduplicated set of vocabulary tags found in `lines`,
/// uppercased to canonical form.
pub fn extract_tags(lines: &[String]) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    for line in lines {
        for m in KEYWORD_RE.find_iter(line) {
            tags.insert(m.as_str().to_uppercase());
        }
    }
    tags
}

/// Whether `text` contains at least one vocabulary term.
pub fn contains_keyword(text: &str) -> bool {
    KEYWORD_RE.is_match(text)
}
