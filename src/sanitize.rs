//! Filename stem normalization.
//!
//! `normalize` fixes up the messy names downloads arrive with: emoji and
//! decorative symbols are dropped, characters that are unsafe on common
//! filesystems are removed, runs of whitespace collapse to a single space,
//! and trailing separator characters are trimmed. Lower-casing is not done
//! here; the rename executor normalizes case on every destination it writes.
//!
//! The rules are heuristics tuned for media collections, not a general
//! transliteration layer: non-Latin scripts pass through untouched.

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid whitespace pattern"));

/// Characters that are rejected by at least one mainstream filesystem.
const UNSAFE_CHARACTERS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Normalizes a filename stem.
///
/// The extension must not be part of the input; callers split it off first
/// and reattach it afterwards.
///
/// # Examples
///
/// ```
/// use mediatidy::sanitize::normalize;
///
/// assert_eq!(normalize("beach   day\u{1F600}"), "beach day");
/// assert_eq!(normalize("set_04___"), "set_04");
/// assert_eq!(normalize("what?!"), "what!");
/// ```
pub fn normalize(stem: &str) -> String {
    let stem = strip_emoji(stem);
    let stem = strip_unsafe_characters(&stem);
    let stem = collapse_whitespace(&stem);
    trim_trailing_separators(&stem)
}

/// Drops emoji, pictographs, and the joiner/variation codepoints that glue
/// them together.
fn strip_emoji(stem: &str) -> String {
    stem.chars().filter(|c| !is_emoji_component(*c)).collect()
}

fn is_emoji_component(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF   // emoticons, pictographs, transport, supplemental
        | 0x2600..=0x27BF   // miscellaneous symbols and dingbats
        | 0x2B00..=0x2BFF   // arrows and stars used as decorations
        | 0xFE00..=0xFE0F   // variation selectors
        | 0x200D            // zero-width joiner
        | 0x20E3            // combining enclosing keycap
    )
}

/// Removes control characters and characters some filesystems reject.
fn strip_unsafe_characters(stem: &str) -> String {
    stem.chars()
        .filter(|c| !c.is_control() && !UNSAFE_CHARACTERS.contains(c))
        .collect()
}

/// Collapses every whitespace run to a single space and trims the ends.
fn collapse_whitespace(stem: &str) -> String {
    WHITESPACE.replace_all(stem, " ").trim().to_string()
}

/// Trims trailing `.`, `_`, `-`, and spaces; a bare dot or dash at the end
/// of a stem is download debris.
fn trim_trailing_separators(stem: &str) -> String {
    stem.trim_end_matches(['.', '_', '-', ' ']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_runs() {
        assert_eq!(normalize("a  b\t\tc"), "a b c");
        assert_eq!(normalize("  padded  "), "padded");
    }

    #[test]
    fn test_strips_emoji() {
        assert_eq!(normalize("party\u{1F389}\u{1F389} set"), "party set");
        assert_eq!(normalize("\u{2B50}starred\u{2B50}"), "starred");
        assert_eq!(normalize("fire\u{1F525}\u{FE0F}"), "fire");
    }

    #[test]
    fn test_strips_unsafe_characters() {
        assert_eq!(normalize("a/b\\c"), "abc");
        assert_eq!(normalize("who?what*when"), "whowhatwhen");
        assert_eq!(normalize("quote\"d"), "quoted");
    }

    #[test]
    fn test_trims_trailing_separators() {
        assert_eq!(normalize("name..."), "name");
        assert_eq!(normalize("name_-_"), "name");
        assert_eq!(normalize("name - "), "name");
    }

    #[test]
    fn test_keeps_interior_dots_and_dashes() {
        assert_eq!(normalize("a.b-c_d"), "a.b-c_d");
    }

    #[test]
    fn test_non_latin_scripts_pass_through() {
        assert_eq!(normalize("写真セット"), "写真セット");
        assert_eq!(normalize("фото 01"), "фото 01");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for input in ["messy\u{1F600}  name__", "clean name", "a?b*c..."] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_empty_and_all_junk_stems() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("\u{1F600}\u{1F600}"), "");
        assert_eq!(normalize("..."), "");
    }
}
