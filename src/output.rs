use crate::settings::DisplaySettings;

/// Assembles the rendered text of a merge, one fragment at a time.
///
/// Fragments on which all revisions agree accumulate in a single pending
/// line; completed lines are written out immediately. When the revisions
/// diverge, the pending prefix is replicated into one buffer per revision
/// and subsequent shared fragments feed all of them, so that by the time
/// every buffer reaches a line break the disagreement covers whole lines
/// and can be written out between conflict markers.
pub(crate) struct OutputBuilder<'s> {
    settings: &'s DisplaySettings,
    rendered: String,
    /// the unfinished line of shared text; empty while revisions diverge
    pending: String,
    left: String,
    base: String,
    right: String,
    diverged: bool,
    wrote_conflict: bool,
    /// marker labels of the conflict being assembled, when they differ
    /// from the configured ones
    labels: Option<(String, String)>,
}

impl<'s> OutputBuilder<'s> {
    pub(crate) fn new(settings: &'s DisplaySettings) -> Self {
        Self {
            settings,
            rendered: String::new(),
            pending: String::new(),
            left: String::new(),
            base: String::new(),
            right: String::new(),
            diverged: false,
            wrote_conflict: false,
            labels: None,
        }
    }

    /// Append text on which all revisions agree.
    pub(crate) fn push(&mut self, text: &str) {
        if self.diverged {
            // shared text keeps feeding the open conflict until a line
            // break lets it close
            match text.find('\n') {
                Some(newline) => {
                    let (head, tail) = text.split_at(newline + 1);
                    self.push_to_all(head);
                    self.write_conflict();
                    self.push(tail);
                }
                None => self.push_to_all(text),
            }
        } else {
            self.pending.push_str(text);
            if let Some(newline) = self.pending.rfind('\n') {
                self.rendered.push_str(&self.pending[..=newline]);
                self.pending.drain(..=newline);
            }
        }
    }

    /// Append a region on which the revisions disagree, labelled with the
    /// configured revision names.
    pub(crate) fn push_sides(&mut self, left: &str, base: &str, right: &str) {
        self.push_labelled_sides(left, base, right, None);
    }

    /// Append a disagreeing region whose markers carry their own labels.
    /// A region already being assembled keeps the labels it opened with.
    pub(crate) fn push_labelled_sides(
        &mut self,
        left: &str,
        base: &str,
        right: &str,
        labels: Option<(&str, &str)>,
    ) {
        if left == right {
            // the sides agree after all, so there is nothing to fight over
            self.push(left);
            return;
        }
        if !self.diverged {
            self.diverged = true;
            self.labels = labels.map(|(l, r)| (l.to_owned(), r.to_owned()));
            let prefix = std::mem::take(&mut self.pending);
            self.left.clone_from(&prefix);
            self.base.clone_from(&prefix);
            self.right = prefix;
        }
        self.left.push_str(left);
        self.base.push_str(base);
        self.right.push_str(right);
        let at_boundary = |side: &String| side.ends_with('\n') || side.trim().is_empty();
        if at_boundary(&self.left) && at_boundary(&self.base) && at_boundary(&self.right) {
            self.write_conflict();
        }
    }

    fn push_to_all(&mut self, text: &str) {
        for side in [&mut self.left, &mut self.base, &mut self.right] {
            side.push_str(text);
        }
    }

    /// Write the gathered disagreement between marker lines. Blank sides
    /// contribute no lines of their own.
    fn write_conflict(&mut self) {
        let (left_label, right_label) = self.labels.take().unwrap_or_else(|| {
            (
                self.settings.left_label.clone(),
                self.settings.right_label.clone(),
            )
        });
        let base_label = self.settings.base_label.clone();
        let left = std::mem::take(&mut self.left);
        let base = std::mem::take(&mut self.base);
        let right = std::mem::take(&mut self.right);

        self.marker('<', Some(&left_label));
        self.side(&left);
        if self.settings.diff3 {
            self.marker('|', Some(&base_label));
            self.side(&base);
        }
        self.marker('=', None);
        self.side(&right);
        self.marker('>', Some(&right_label));
        self.diverged = false;
        self.wrote_conflict = true;
    }

    fn marker(&mut self, glyph: char, label: Option<&str>) {
        self.rendered
            .extend(std::iter::repeat_n(glyph, self.settings.marker_size));
        if let Some(label) = label {
            self.rendered.push(' ');
            self.rendered.push_str(label);
        }
        self.rendered.push('\n');
    }

    fn side(&mut self, content: &str) {
        if content.trim().is_empty() {
            return;
        }
        self.rendered.push_str(content);
        if !self.rendered.ends_with('\n') {
            self.rendered.push('\n');
        }
    }

    /// The full rendered text.
    pub(crate) fn finish(mut self) -> String {
        if self.diverged {
            self.write_conflict();
        } else {
            self.rendered.push_str(&self.pending);
        }
        self.rendered
    }

    /// The rendered text, provided no conflict was ever written. Used for
    /// parts of the output which may not contain conflicts, such as the
    /// alternatives of an enclosing conflict.
    pub(crate) fn finish_plain(self) -> Option<String> {
        if self.wrote_conflict || self.diverged {
            return None;
        }
        let mut rendered = self.rendered;
        rendered.push_str(&self.pending);
        Some(rendered)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn shared_text_passes_through() {
        let settings = DisplaySettings::default();
        let mut out = OutputBuilder::new(&settings);
        out.push("class A {\n");
        out.push("    int x;\n}");
        assert_eq!(out.finish(), "class A {\n    int x;\n}");
    }

    #[test]
    fn whole_line_disagreement_becomes_a_marker_block() {
        let settings = DisplaySettings::default();
        let mut out = OutputBuilder::new(&settings);
        out.push("class A {\n");
        out.push_sides("    int x;\n", "", "    int y;\n");
        out.push("}\n");
        assert_eq!(
            out.finish(),
            "class A {\n<<<<<<< LEFT\n    int x;\n||||||| BASE\n=======\n    int y;\n>>>>>>> RIGHT\n}\n"
        );
    }

    #[test]
    fn disagreements_expand_to_whole_lines() {
        let settings = DisplaySettings::default();
        let mut out = OutputBuilder::new(&settings);
        out.push("    x = ");
        out.push_sides("a", "b", "c");
        out.push(";\n");
        assert_eq!(
            out.finish(),
            "<<<<<<< LEFT\n    x = a;\n||||||| BASE\n    x = b;\n=======\n    x = c;\n>>>>>>> RIGHT\n"
        );
    }

    #[test]
    fn several_divergences_on_one_line_share_a_conflict() {
        let settings = DisplaySettings::default();
        let mut out = OutputBuilder::new(&settings);
        out.push("int ");
        out.push_sides("a", "x", "b");
        out.push(" = ");
        out.push_sides("1", "0", "2");
        out.push(";\n");
        assert_eq!(
            out.finish(),
            "<<<<<<< LEFT\nint a = 1;\n||||||| BASE\nint x = 0;\n=======\nint b = 2;\n>>>>>>> RIGHT\n"
        );
    }

    #[test]
    fn agreeing_sides_are_not_a_conflict() {
        let settings = DisplaySettings::default();
        let mut out = OutputBuilder::new(&settings);
        out.push("x = ");
        out.push_sides("1", "0", "1");
        out.push(";\n");
        assert_eq!(out.finish(), "x = 1;\n");
    }

    #[test]
    fn two_way_blocks_omit_the_base_section() {
        let settings = DisplaySettings::default_two_way();
        let mut out = OutputBuilder::new(&settings);
        out.push_sides("a\n", "b\n", "c\n");
        assert_eq!(
            out.finish(),
            "<<<<<<< LEFT\na\n=======\nc\n>>>>>>> RIGHT\n"
        );
    }

    #[test]
    fn markers_can_carry_their_own_labels() {
        let settings = DisplaySettings::default();
        let mut out = OutputBuilder::new(&settings);
        out.push_labelled_sides("a\n", "b\n", "c\n", Some(("mine", "theirs")));
        assert_eq!(
            out.finish(),
            "<<<<<<< mine\na\n||||||| BASE\nb\n=======\nc\n>>>>>>> theirs\n"
        );
    }

    #[test]
    fn unterminated_disagreement_is_closed_at_the_end() {
        let settings = DisplaySettings::default();
        let mut out = OutputBuilder::new(&settings);
        out.push_sides("a", "b", "c");
        assert_eq!(
            out.finish(),
            "<<<<<<< LEFT\na\n||||||| BASE\nb\n=======\nc\n>>>>>>> RIGHT\n"
        );
    }

    #[test]
    fn plain_rendering_refuses_conflicts() {
        let settings = DisplaySettings::default();
        let mut out = OutputBuilder::new(&settings);
        out.push("x = 1;\n");
        assert_eq!(out.finish_plain().as_deref(), Some("x = 1;\n"));

        let mut out = OutputBuilder::new(&settings);
        out.push_sides("a\n", "b\n", "c\n");
        assert_eq!(out.finish_plain(), None);
    }
}
