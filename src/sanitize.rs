#![forbid(unsafe_code)]

//! Turns video titles into names that are safe to use as a file stem on
//! Linux, macOS and Windows alike.

use unicode_normalization::UnicodeNormalization;
use unicode_properties::{GeneralCategory, UnicodeGeneralCategory};

/// Upper bound for a sanitized stem, in characters.
pub const MAX_FILENAME_CHARS: usize = 150;

/// Stem used when nothing printable survives sanitizing.
pub const FALLBACK_FILENAME: &str = "audio";

const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Folds stylised glyphs (mathematical bold, full-width, ligatures) into
/// their plain equivalents and drops nonspacing marks, then collapses
/// whitespace. Used for display as well as file names.
pub fn normalize_visible_text(text: &str) -> String {
    let plain: String = text
        .nfkd()
        .filter(|c| c.general_category() != GeneralCategory::NonspacingMark)
        .collect();
    collapse_whitespace(&plain)
}

/// Builds a file stem from a title. Total and deterministic; distinct titles
/// may map to the same stem.
pub fn sanitize_filename(title: &str) -> String {
    let visible = normalize_visible_text(title);

    let replaced: String = visible
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();

    let mut stem = trim_stem(&collapse_whitespace(&replaced)).to_string();

    if stem.chars().count() > MAX_FILENAME_CHARS {
        let truncated: String = stem.chars().take(MAX_FILENAME_CHARS).collect();
        stem = trim_stem(&truncated).to_string();
    }

    if stem.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        stem
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// Trailing dots are rejected by Windows; strip them together with any space
// they expose.
fn trim_stem(text: &str) -> &str {
    text.trim()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
}
