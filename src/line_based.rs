use std::borrow::Cow;

use diffy_imara::{Algorithm, ConflictStyle, MergeOptions};

use crate::merge_result::MergeResult;
use crate::output::OutputBuilder;
use crate::settings::{DisplaySettings, with_final_newline};

pub const LINE_BASED_METHOD: &str = "line_based";

/// A piece of a textually merged file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MergedChunk {
    /// Content on which all revisions agree (or a change from one side only)
    Resolved(String),
    /// A region where both sides changed the base in incompatible ways.
    /// Each side's text ends with a newline unless it is empty.
    Conflict {
        base: String,
        left: String,
        right: String,
    },
}

/// Merges the three revisions textually with the diff3 algorithm and cuts
/// the result into resolved and conflicting chunks.
pub fn merge_chunks(
    contents_base: &str,
    contents_left: &str,
    contents_right: &str,
    settings: &DisplaySettings,
) -> Vec<MergedChunk> {
    let merged = MergeOptions::new()
        .set_conflict_marker_length(settings.marker_size)
        // always request the base sections, so that they can be re-rendered
        // according to the display settings later on
        .set_conflict_style(ConflictStyle::Diff3)
        .set_algorithm(Algorithm::Histogram)
        .merge(contents_base, contents_left, contents_right);
    let merged_contents = match merged {
        Ok(contents) | Err(contents) => contents,
    };
    parse_marked_text(&merged_contents, settings.marker_size)
}

/// Perform a whole-file textual merge with the diff3 algorithm, rendering
/// the conflict markers according to the display settings.
pub fn line_based_merge(
    contents_base: &str,
    contents_left: &str,
    contents_right: &str,
    settings: &DisplaySettings,
) -> MergeResult {
    let chunks = merge_chunks(contents_base, contents_left, contents_right, settings);
    let mut output = OutputBuilder::new(settings);
    for chunk in &chunks {
        match chunk {
            MergedChunk::Resolved(contents) => output.push(contents),
            MergedChunk::Conflict { base, left, right } => {
                output.push_sides(left, base, right);
            }
        }
    }
    let contents = with_final_newline(Cow::from(output.finish())).into_owned();
    MergeResult::new(contents, LINE_BASED_METHOD, settings)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Left,
    Base,
    Middle,
    Right,
}

/// Recognize a conflict marker line, with or without a revision label.
fn marker_kind(line: &str, marker_size: usize) -> Option<MarkerKind> {
    let trimmed = line.trim_end_matches('\n');
    let (prefix, kind) = [
        ("<", MarkerKind::Left),
        ("|", MarkerKind::Base),
        ("=", MarkerKind::Middle),
        (">", MarkerKind::Right),
    ]
    .into_iter()
    .find(|(c, _)| trimmed.starts_with(*c))?;
    let marker = prefix.repeat(marker_size);
    if !trimmed.starts_with(&marker) {
        return None;
    }
    let rest = &trimmed[marker_size..];
    if rest.is_empty() || rest.starts_with(' ') {
        Some(kind)
    } else {
        None
    }
}

/// Splits text containing conflict markers back into chunks. Text without
/// any markers yields a single resolved chunk.
pub fn parse_marked_text(text: &str, marker_size: usize) -> Vec<MergedChunk> {
    #[derive(PartialEq)]
    enum State {
        Resolved,
        Left,
        Base,
        Right,
    }

    let mut chunks = Vec::new();
    let mut state = State::Resolved;
    let mut resolved = String::new();
    let mut left = String::new();
    let mut base = String::new();
    let mut right = String::new();

    for line in text.split_inclusive('\n') {
        match (marker_kind(line, marker_size), &state) {
            (Some(MarkerKind::Left), State::Resolved) => {
                if !resolved.is_empty() {
                    chunks.push(MergedChunk::Resolved(std::mem::take(&mut resolved)));
                }
                state = State::Left;
            }
            (Some(MarkerKind::Base), State::Left) => state = State::Base,
            (Some(MarkerKind::Middle), State::Left | State::Base) => state = State::Right,
            (Some(MarkerKind::Right), State::Right) => {
                chunks.push(MergedChunk::Conflict {
                    base: std::mem::take(&mut base),
                    left: std::mem::take(&mut left),
                    right: std::mem::take(&mut right),
                });
                state = State::Resolved;
            }
            (_, State::Resolved) => resolved.push_str(line),
            (_, State::Left) => left.push_str(line),
            (_, State::Base) => base.push_str(line),
            (_, State::Right) => right.push_str(line),
        }
    }
    if !resolved.is_empty() {
        chunks.push(MergedChunk::Resolved(resolved));
    }
    chunks
}

/// Count the conflicts of a rendered merge, along with the total size of
/// the conflicting regions.
pub fn count_conflicts(contents: &str, marker_size: usize) -> (usize, usize) {
    let mut count = 0;
    let mut mass = 0;
    for chunk in parse_marked_text(contents, marker_size) {
        if let MergedChunk::Conflict { base, left, right } = chunk {
            count += 1;
            mass += base.len() + left.len() + right.len();
        }
    }
    (count, mass)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn fully_diverging_contents_conflict() {
        let settings = DisplaySettings::default();
        let merge = line_based_merge("a\n", "b\n", "c\n", &settings);
        assert_eq!(
            merge.contents,
            "<<<<<<< LEFT\nb\n||||||| BASE\na\n=======\nc\n>>>>>>> RIGHT\n"
        );
        assert_eq!(merge.conflict_count, 1);
        assert_eq!(merge.method, LINE_BASED_METHOD);
    }

    #[test]
    fn disjoint_edits_merge_cleanly() {
        let base = "one\ntwo\nthree\nfour\nfive\n";
        let left = "ONE\ntwo\nthree\nfour\nfive\n";
        let right = "one\ntwo\nthree\nfour\nFIVE\n";
        let settings = DisplaySettings::default();
        let merge = line_based_merge(base, left, right, &settings);
        assert_eq!(merge.contents, "ONE\ntwo\nthree\nfour\nFIVE\n");
        assert_eq!(merge.conflict_count, 0);
    }

    #[test]
    fn two_way_style_omits_base_section() {
        let settings = DisplaySettings::default_two_way();
        let merge = line_based_merge("a\n", "b\n", "c\n", &settings);
        assert_eq!(
            merge.contents,
            "<<<<<<< LEFT\nb\n=======\nc\n>>>>>>> RIGHT\n"
        );
    }

    #[test]
    fn marker_round_trip() {
        let text = "intro\n<<<<<<< LEFT\nl1\nl2\n||||||| BASE\nb1\n=======\nr1\n>>>>>>> RIGHT\noutro\n";
        let chunks = parse_marked_text(text, 7);
        assert_eq!(
            chunks,
            vec![
                MergedChunk::Resolved("intro\n".to_owned()),
                MergedChunk::Conflict {
                    base: "b1\n".to_owned(),
                    left: "l1\nl2\n".to_owned(),
                    right: "r1\n".to_owned(),
                },
                MergedChunk::Resolved("outro\n".to_owned()),
            ]
        );
        assert_eq!(count_conflicts(text, 7), (1, 12));
    }

    #[test]
    fn markers_without_labels_are_recognized() {
        let text = "<<<<<<<\nl\n=======\nr\n>>>>>>>\n";
        let chunks = parse_marked_text(text, 7);
        assert_eq!(
            chunks,
            vec![MergedChunk::Conflict {
                base: String::new(),
                left: "l\n".to_owned(),
                right: "r\n".to_owned(),
            }]
        );
    }

    #[test]
    fn text_without_markers_is_a_single_chunk() {
        let chunks = parse_marked_text("a\nb", 7);
        assert_eq!(chunks, vec![MergedChunk::Resolved("a\nb".to_owned())]);
    }
}
