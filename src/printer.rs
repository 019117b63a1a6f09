use crate::artifact::{Artifact, Variant};
use crate::error::MergeError;
use crate::grammar::GrammarNode;
use crate::line_based::{MergedChunk, parse_marked_text};
use crate::output::OutputBuilder;
use crate::settings::DisplaySettings;

/// One level of indentation in rendered output.
pub const INDENT: &str = "    ";

/// The layout knowledge of a concrete language: how to turn one regular
/// node back into source text. Children are rendered by calling back into
/// the printer, which takes care of conflict, choice and opaque nodes
/// wherever they appear.
pub trait LayoutRules<T: GrammarNode> {
    fn render_node<'a>(
        &self,
        artifact: &'a Artifact<'a, T>,
        printer: &mut Printer<'_, T>,
    ) -> Result<(), MergeError>;

    /// The annotation line introducing one gated variant of a choice node.
    fn variant_annotation(&self, condition: &str) -> String {
        format!("// variant: {condition}")
    }
}

/// Walks an artifact tree and streams its textual rendering into an
/// [`OutputBuilder`], which takes care of growing conflicts to whole
/// lines. Conflict pseudo-nodes supply their own marker labels, as
/// recorded by the conflict operation that created them.
pub struct Printer<'s, T: GrammarNode> {
    rules: &'s dyn LayoutRules<T>,
    settings: &'s DisplaySettings,
    out: OutputBuilder<'s>,
    indent: usize,
    at_line_start: bool,
    in_alternative: bool,
}

impl<'s, T: GrammarNode> Printer<'s, T> {
    fn new(
        rules: &'s dyn LayoutRules<T>,
        settings: &'s DisplaySettings,
        indent: usize,
        at_line_start: bool,
        in_alternative: bool,
    ) -> Self {
        Self {
            rules,
            settings,
            out: OutputBuilder::new(settings),
            indent,
            at_line_start,
            in_alternative,
        }
    }

    /// Emit a fragment of text on the current line. The fragment must not
    /// contain newlines; line breaks go through [`Self::newline`].
    pub fn text(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        if self.at_line_start {
            self.out.push(&INDENT.repeat(self.indent));
            self.at_line_start = false;
        }
        self.out.push(fragment);
    }

    /// Break the current line.
    pub fn newline(&mut self) {
        self.out.push("\n");
        self.at_line_start = true;
    }

    /// Run the supplied rendering one indentation level deeper.
    pub fn indented(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), MergeError>,
    ) -> Result<(), MergeError> {
        self.indent += 1;
        let result = f(self);
        self.indent -= 1;
        result
    }

    /// Render a child artifact at the current position, whatever its
    /// variant.
    pub fn child<'a>(&mut self, artifact: &'a Artifact<'a, T>) -> Result<(), MergeError> {
        match &artifact.variant {
            Variant::Normal(_) if artifact.is_opaque() => {
                self.render_opaque(artifact);
                Ok(())
            }
            Variant::Normal(_) => {
                let rules = self.rules;
                rules.render_node(artifact, self)
            }
            Variant::Conflict {
                left,
                base,
                right,
                left_name,
                right_name,
            } => {
                if self.in_alternative {
                    return Err(MergeError::Reconstruction {
                        node: artifact.id,
                        message: "conflict nested inside a conflict alternative".to_owned(),
                    });
                }
                let left_text = self.render_alternative(*left)?;
                let base_text = self.render_alternative(*base)?;
                let right_text = self.render_alternative(*right)?;
                self.out.push_labelled_sides(
                    &left_text,
                    &base_text,
                    &right_text,
                    Some((left_name.as_str(), right_name.as_str())),
                );
                // whatever follows continues the line the conflict is on
                self.at_line_start = false;
                Ok(())
            }
            Variant::Choice { variants } => {
                for (condition, variant) in variants {
                    let annotation = self.rules.variant_annotation(condition);
                    self.text(&annotation);
                    self.newline();
                    self.child(*variant)?;
                    self.newline();
                }
                Ok(())
            }
        }
    }

    /// Render all children, separated by a fragment of text.
    pub fn children_separated<'a>(
        &mut self,
        children: &[&'a Artifact<'a, T>],
        separator: &str,
    ) -> Result<(), MergeError> {
        for (index, &child) in children.iter().enumerate() {
            if index > 0 {
                self.text(separator);
            }
            self.child(child)?;
        }
        Ok(())
    }

    /// Render one side of a conflict into plain text, in the same
    /// indentation context as the conflict itself.
    fn render_alternative<'a>(
        &self,
        artifact: Option<&'a Artifact<'a, T>>,
    ) -> Result<String, MergeError> {
        let Some(artifact) = artifact else {
            return Ok(String::new());
        };
        let mut sub = Self::new(
            self.rules,
            self.settings,
            self.indent,
            self.at_line_start,
            true,
        );
        sub.child(artifact)?;
        sub.out.finish_plain().ok_or(MergeError::Reconstruction {
            node: artifact.id,
            message: "conflict alternative rendered with nested conflicts".to_owned(),
        })
    }

    /// Render a node whose subtree has been flattened to opaque text,
    /// possibly containing conflict markers from a textual merge.
    fn render_opaque<'a>(&mut self, artifact: &'a Artifact<'a, T>) {
        let content = artifact.content().unwrap_or_default();
        let chunks = parse_marked_text(&content, self.settings.marker_size);
        let indentation = INDENT.repeat(self.indent);
        let mut at_line_start = self.at_line_start;
        for chunk in &chunks {
            match chunk {
                MergedChunk::Resolved(text) => {
                    self.out.push(&reindent(text, &indentation, at_line_start));
                    if !text.is_empty() {
                        at_line_start = text.ends_with('\n');
                    }
                }
                MergedChunk::Conflict { base, left, right } => {
                    self.out.push_sides(
                        &reindent(left, &indentation, true),
                        &reindent(base, &indentation, true),
                        &reindent(right, &indentation, true),
                    );
                    at_line_start = true;
                }
            }
        }
        self.at_line_start = content.ends_with('\n');
    }
}

/// Prefix every line of a pre-rendered block with the given indentation.
/// The first line only gets it when it opens a fresh line of output.
fn reindent(text: &str, indentation: &str, indent_first: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            out.push('\n');
        }
        if !line.is_empty() && (index > 0 || indent_first) {
            out.push_str(indentation);
        }
        out.push_str(line);
    }
    out
}

/// Render a whole artifact tree to text, expanding conflict markers
/// according to the display settings.
pub fn render_tree<'a, T: GrammarNode>(
    root: &'a Artifact<'a, T>,
    rules: &dyn LayoutRules<T>,
    settings: &DisplaySettings,
) -> Result<String, MergeError> {
    let mut printer = Printer::new(rules, settings, 0, true, false);
    printer.child(root)?;
    Ok(printer.out.finish())
}

/// Render a subtree that is known to be conflict-free, such as a freshly
/// parsed revision.
pub fn render_plain<'a, T: GrammarNode>(
    root: &'a Artifact<'a, T>,
    rules: &dyn LayoutRules<T>,
    settings: &DisplaySettings,
) -> Result<String, MergeError> {
    let mut printer = Printer::new(rules, settings, 0, true, true);
    printer.child(root)?;
    printer.out.finish_plain().ok_or(MergeError::Reconstruction {
        node: root.id,
        message: "unexpected conflict in a pristine tree".to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reindenting_spares_the_continued_first_line() {
        assert_eq!(
            reindent("{\n    x = 1;\n}", "    ", false),
            "{\n        x = 1;\n    }"
        );
        assert_eq!(reindent("}", "    ", true), "    }");
        assert_eq!(reindent("a\n\nb", "  ", true), "  a\n\n  b");
    }
}
