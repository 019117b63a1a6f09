use tree_sitter::{Node as TSNode, Parser as TSParser};

use crate::artifact::{Artifact, ArtifactStore};
use crate::error::MergeError;
use crate::grammar::GrammarNode;
use crate::lang_profile::{LabelSource, LangProfile};
use crate::printer::{LayoutRules, Printer, render_plain};
use crate::revision::Revision;
use crate::settings::DisplaySettings;

/// A syntax-tree node as the merge engine sees it: the grammar kind, the
/// identifying label, and the merge knowledge derived from the language
/// profile at parse time. The tree structure itself lives in the
/// artifacts wrapping these nodes.
#[derive(Debug, Clone)]
pub struct SynNode {
    kind: &'static str,
    label: Option<String>,
    content: Option<String>,
    ordered: bool,
    unique_labels: bool,
    arity: Option<usize>,
}

impl GrammarNode for SynNode {
    fn kind(&self) -> &str {
        self.kind
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    fn set_content(&mut self, text: String) {
        self.content = Some(text);
    }

    fn is_ordered(&self) -> bool {
        self.ordered
    }

    fn has_unique_labels(&self) -> bool {
        self.unique_labels
    }

    fn fixed_arity(&self) -> Option<usize> {
        self.arity
    }
}

/// Parse a source text into an artifact tree for the given revision.
///
/// With `opaque_bodies`, the bodies of methods and constructors are
/// pretty-printed and stored as opaque text leaves instead of subtrees,
/// which is how semistructured merging sees them.
pub fn parse_artifact<'a>(
    store: &ArtifactStore<'a, SynNode>,
    profile: &LangProfile,
    source: &str,
    revision: Revision,
    opaque_bodies: bool,
) -> Result<&'a Artifact<'a, SynNode>, MergeError> {
    let mut parser = TSParser::new();
    parser
        .set_language(&profile.language)
        .map_err(|err| MergeError::Parse {
            revision: revision.name().to_owned(),
            message: format!("error loading {} grammar: {err}", profile.name),
        })?;
    let tree = parser.parse(source, None).ok_or_else(|| MergeError::Parse {
        revision: revision.name().to_owned(),
        message: "the parser did not produce a tree".to_owned(),
    })?;
    if tree.root_node().has_error() {
        let position = first_error(tree.root_node())
            .map(|node| node.start_position())
            .unwrap_or_default();
        return Err(MergeError::Parse {
            revision: revision.name().to_owned(),
            message: format!("syntax error at {}:{}", position.row + 1, position.column + 1),
        });
    }
    let builder = Builder {
        store,
        profile,
        source,
        revision: revision.clone(),
        opaque_bodies,
    };
    let root = builder.build(tree.root_node())?;
    store.finalize(root);
    Ok(root)
}

fn first_error(node: TSNode) -> Option<TSNode> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<TSNode> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

struct Builder<'a, 'b, 's> {
    store: &'b ArtifactStore<'a, SynNode>,
    profile: &'b LangProfile,
    source: &'s str,
    revision: Revision,
    opaque_bodies: bool,
}

impl<'a> Builder<'a, '_, '_> {
    fn build(&self, node: TSNode) -> Result<&'a Artifact<'a, SynNode>, MergeError> {
        let kind = node.kind();
        let artifact = self
            .store
            .create(self.revision.clone(), self.syn_node(node, kind));

        if !self.profile.is_atomic_node_type(kind) {
            let opaque_body = if self.opaque_bodies && self.profile.is_opaque_body_parent(kind) {
                node.child_by_field_name("body").map(|body| body.id())
            } else {
                None
            };
            let mut cursor = node.walk();
            let children: Vec<TSNode> = node.named_children(&mut cursor).collect();
            for child in children {
                if self.profile.is_extra(child.kind()) {
                    continue;
                }
                if opaque_body == Some(child.id()) {
                    artifact.add_child(self.build_opaque(child)?);
                } else {
                    artifact.add_child(self.build(child)?);
                }
            }
        }
        Ok(artifact)
    }

    /// Build a body subtree, print it back to text and keep only the text.
    fn build_opaque(&self, node: TSNode) -> Result<&'a Artifact<'a, SynNode>, MergeError> {
        let subtree = self.build(node)?;
        let text = render_plain(subtree, &JavaLayout, &DisplaySettings::default())?;
        let mut syn = self.syn_node(node, node.kind());
        syn.set_content(text);
        Ok(self.store.create(self.revision.clone(), syn))
    }

    fn syn_node(&self, node: TSNode, kind: &'static str) -> SynNode {
        SynNode {
            kind,
            label: self.extract_label(node, kind),
            content: None,
            ordered: !self.profile.is_unordered_parent(kind),
            unique_labels: self.profile.has_unique_labels(kind),
            arity: self.profile.fixed_arity(kind),
        }
    }

    fn node_text(&self, node: TSNode) -> String {
        self.source[node.byte_range()].trim().to_owned()
    }

    fn extract_label(&self, node: TSNode, kind: &str) -> Option<String> {
        match self.profile.label_source(kind) {
            Some(LabelSource::Field(field)) => {
                node.child_by_field_name(field).map(|n| self.node_text(n))
            }
            Some(LabelSource::Path(fields)) => {
                let mut current = node;
                for field in fields {
                    current = current.child_by_field_name(field)?;
                }
                Some(self.node_text(current))
            }
            Some(LabelSource::OwnText) => Some(self.node_text(node)),
            None => {
                // tokens are identified by their own text; an empty file's
                // root is not a token even though it has no children
                let is_leaf = kind != "program"
                    && (self.profile.is_atomic_node_type(kind) || node.named_child_count() == 0);
                is_leaf.then(|| self.node_text(node))
            }
        }
    }
}

/// The kinds which play the role of a type in a declaration header.
fn is_type_kind(kind: &str) -> bool {
    matches!(
        kind,
        "void_type"
            | "integral_type"
            | "floating_point_type"
            | "boolean_type"
            | "type_identifier"
            | "generic_type"
            | "array_type"
            | "scoped_type_identifier"
    )
}

/// How Java artifacts are laid out when printed back to source text.
pub struct JavaLayout;

impl LayoutRules<SynNode> for JavaLayout {
    fn render_node<'a>(
        &self,
        artifact: &'a Artifact<'a, SynNode>,
        p: &mut Printer<'_, SynNode>,
    ) -> Result<(), MergeError> {
        let children = artifact.children();
        let kind = artifact.kind().unwrap_or_default();
        match kind.as_str() {
            "program" => {
                for &child in &children {
                    p.child(child)?;
                    p.newline();
                }
            }
            "class_declaration" | "interface_declaration" => {
                let keyword = if kind == "interface_declaration" {
                    "interface "
                } else {
                    "class "
                };
                for &child in &children {
                    match child.kind().as_deref() {
                        Some("modifiers") => {
                            p.child(child)?;
                            p.text(" ");
                        }
                        Some("identifier") => {
                            p.text(keyword);
                            p.child(child)?;
                        }
                        _ => {
                            p.text(" ");
                            p.child(child)?;
                        }
                    }
                }
            }
            "class_body" | "interface_body" | "block" | "constructor_body" => {
                p.text("{");
                p.newline();
                p.indented(|p| {
                    for &child in &children {
                        p.child(child)?;
                        p.newline();
                    }
                    Ok(())
                })?;
                p.text("}");
            }
            "superclass" => {
                p.text("extends ");
                p.children_separated(&children, " ")?;
            }
            "field_declaration" | "local_variable_declaration" => {
                p.children_separated(&children, " ")?;
                p.text(";");
            }
            "variable_declarator" => {
                if let [name, value] = children[..] {
                    p.child(name)?;
                    p.text(" = ");
                    p.child(value)?;
                } else {
                    p.children_separated(&children, " = ")?;
                }
            }
            "method_declaration" | "constructor_declaration" => {
                for &child in &children {
                    match child.kind().as_deref() {
                        Some("modifiers") => {
                            p.child(child)?;
                            p.text(" ");
                        }
                        Some(k) if is_type_kind(k) => {
                            p.child(child)?;
                            p.text(" ");
                        }
                        Some("identifier") => p.child(child)?,
                        Some("formal_parameters") => {
                            p.child(child)?;
                            p.text(" ");
                        }
                        _ => p.child(child)?,
                    }
                }
            }
            "formal_parameters" | "argument_list" => {
                p.text("(");
                p.children_separated(&children, ", ")?;
                p.text(")");
            }
            "formal_parameter" => p.children_separated(&children, " ")?,
            "expression_statement" => {
                p.children_separated(&children, " ")?;
                p.text(";");
            }
            "return_statement" => {
                p.text("return");
                if !children.is_empty() {
                    p.text(" ");
                    p.children_separated(&children, " ")?;
                }
                p.text(";");
            }
            "if_statement" => {
                p.text("if ");
                if let [condition, rest @ ..] = &children[..] {
                    p.child(*condition)?;
                    for (index, &child) in rest.iter().enumerate() {
                        p.text(if index == 0 { " " } else { " else " });
                        p.child(child)?;
                    }
                }
            }
            "while_statement" => {
                p.text("while ");
                p.children_separated(&children, " ")?;
            }
            "parenthesized_expression" => {
                p.text("(");
                p.children_separated(&children, " ")?;
                p.text(")");
            }
            "binary_expression" | "assignment_expression" => {
                let operator = artifact.label().unwrap_or_default();
                if let [lhs, rhs] = children[..] {
                    p.child(lhs)?;
                    p.text(&format!(" {operator} "));
                    p.child(rhs)?;
                } else {
                    p.children_separated(&children, &format!(" {operator} "))?;
                }
            }
            "unary_expression" => {
                p.text(&artifact.label().unwrap_or_default());
                p.children_separated(&children, " ")?;
            }
            "ternary_expression" => {
                if let [condition, consequence, alternative] = children[..] {
                    p.child(condition)?;
                    p.text(" ? ");
                    p.child(consequence)?;
                    p.text(" : ");
                    p.child(alternative)?;
                } else {
                    p.children_separated(&children, " ")?;
                }
            }
            "method_invocation" => {
                if let [object, name, arguments] = children[..] {
                    p.child(object)?;
                    p.text(".");
                    p.child(name)?;
                    p.child(arguments)?;
                } else if let [name, arguments] = children[..] {
                    p.child(name)?;
                    p.child(arguments)?;
                } else {
                    p.children_separated(&children, " ")?;
                }
            }
            "field_access" => p.children_separated(&children, ".")?,
            "object_creation_expression" => {
                p.text("new ");
                p.children_separated(&children, "")?;
            }
            _ if children.is_empty() => p.text(&artifact.label().unwrap_or_default()),
            _ => p.children_separated(&children, " ")?,
        }
        Ok(())
    }
}
