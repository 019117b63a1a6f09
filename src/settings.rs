use std::borrow::Cow;

use crate::revision::Revision;

/// Parameters controlling how the merged output should be rendered.
///
/// The marker labels default to the upper-cased names of the three input
/// revisions; a merge driver can override them with whatever its caller
/// passed (branch names, commit ids).
pub struct DisplaySettings {
    /// Whether conflicts show the base revision between the two sides
    /// (true by default)
    pub diff3: bool,
    /// How many glyphs make up a conflict marker line (7 by default)
    pub marker_size: usize,
    /// The label naming the left revision in conflict markers
    pub left_label: String,
    /// The label naming the base revision in conflict markers
    pub base_label: String,
    /// The label naming the right revision in conflict markers
    pub right_label: String,
}

impl DisplaySettings {
    /// Settings whose marker labels name the supplied revisions.
    pub fn for_revisions(left: &Revision, base: &Revision, right: &Revision) -> Self {
        Self {
            diff3: true,
            marker_size: 7,
            left_label: left.name().to_uppercase(),
            base_label: base.name().to_uppercase(),
            right_label: right.name().to_uppercase(),
        }
    }

    /// Settings for a two-way merge, where no base section is shown.
    pub fn default_two_way() -> Self {
        Self {
            diff3: false,
            ..Self::default()
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self::for_revisions(&Revision::Left, &Revision::Base, &Revision::Right)
    }
}

/// Normalize all line endings to plain LF, so that the merge algorithms
/// only ever see `\n`.
pub fn normalize_to_lf(contents: &str) -> Cow<'_, str> {
    if contents.contains('\r') {
        Cow::from(contents.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::from(contents)
    }
}

/// Make sure the rendered output ends with a newline, like any
/// well-formed source file.
pub fn with_final_newline(contents: Cow<'_, str>) -> Cow<'_, str> {
    if contents.is_empty() || contents.ends_with('\n') {
        contents
    } else {
        Cow::from(contents.into_owned() + "\n")
    }
}
