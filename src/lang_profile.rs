use tree_sitter::Language;

/// Where the identifying label of a node kind comes from.
#[derive(Debug, Clone, Copy)]
pub enum LabelSource {
    /// The text of the child at the given grammar field (which may be an
    /// anonymous token, like an operator)
    Field(&'static str),
    /// The text of the node reached by following a chain of grammar fields
    Path(&'static [&'static str]),
    /// The node's own source text
    OwnText,
}

/// Language-dependent settings to influence how merging is done.
/// All these settings are declarative, except for the tree-sitter parser
/// which is imported from the corresponding crate.
pub struct LangProfile {
    /// a name that identifies the language
    pub name: &'static str,
    /// the file extensions of files in this language
    pub extensions: &'static [&'static str],
    /// tree-sitter parser
    pub language: Language,
    /// node types which should be treated as leaves (atomic parts of the
    /// syntax tree), labelled by their own source text
    atomic_nodes: &'static [&'static str],
    /// node types whose child order does not matter
    unordered_parents: &'static [&'static str],
    /// node types whose siblings can never collide, so that they must be
    /// matched by label
    unique_label_nodes: &'static [&'static str],
    /// node types with a grammar-imposed child count
    fixed_arities: &'static [(&'static str, usize)],
    /// how to extract the label identifying a node of a given type
    label_sources: &'static [(&'static str, LabelSource)],
    /// node types whose body is flattened to opaque text when merging
    /// semistructured
    opaque_body_parents: &'static [&'static str],
    /// node types to skip entirely when building trees
    extras: &'static [&'static str],
}

impl LangProfile {
    pub fn java() -> Self {
        Self {
            name: "Java",
            extensions: &[".java"],
            language: tree_sitter_java::LANGUAGE.into(),
            atomic_nodes: &["modifiers", "string_literal", "import_declaration"],
            unordered_parents: &["program", "class_body", "interface_body"],
            unique_label_nodes: &[
                "import_declaration",
                "class_declaration",
                "interface_declaration",
                "method_declaration",
                "constructor_declaration",
                "field_declaration",
            ],
            fixed_arities: &[
                ("assignment_expression", 2),
                ("binary_expression", 2),
                ("ternary_expression", 3),
                ("field_access", 2),
                ("parenthesized_expression", 1),
            ],
            label_sources: &[
                ("class_declaration", LabelSource::Field("name")),
                ("interface_declaration", LabelSource::Field("name")),
                ("method_declaration", LabelSource::Field("name")),
                ("constructor_declaration", LabelSource::Field("name")),
                (
                    "field_declaration",
                    LabelSource::Path(&["declarator", "name"]),
                ),
                (
                    "local_variable_declaration",
                    LabelSource::Path(&["declarator", "name"]),
                ),
                ("variable_declarator", LabelSource::Field("name")),
                ("formal_parameter", LabelSource::Field("name")),
                ("binary_expression", LabelSource::Field("operator")),
                ("assignment_expression", LabelSource::Field("operator")),
                ("unary_expression", LabelSource::Field("operator")),
                ("import_declaration", LabelSource::OwnText),
            ],
            opaque_body_parents: &["method_declaration", "constructor_declaration"],
            extras: &["line_comment", "block_comment"],
        }
    }

    /// Detects the language of a file based on its filename.
    pub fn detect_from_filename(filename: &str) -> Option<Self> {
        let supported = [Self::java()];
        supported.into_iter().find(|lang_profile| {
            lang_profile
                .extensions
                .iter()
                .any(|extension| filename.ends_with(extension))
        })
    }

    /// Should this node type be treated as atomic?
    pub fn is_atomic_node_type(&self, node_type: &str) -> bool {
        self.atomic_nodes.contains(&node_type)
    }

    /// Do the children of this node type commute?
    pub fn is_unordered_parent(&self, node_type: &str) -> bool {
        self.unordered_parents.contains(&node_type)
    }

    /// Must siblings of this node type be matched by label?
    pub fn has_unique_labels(&self, node_type: &str) -> bool {
        self.unique_label_nodes.contains(&node_type)
    }

    /// The child count the grammar imposes on this node type, if any.
    pub fn fixed_arity(&self, node_type: &str) -> Option<usize> {
        self.fixed_arities
            .iter()
            .find(|(kind, _)| *kind == node_type)
            .map(|(_, arity)| *arity)
    }

    pub fn label_source(&self, node_type: &str) -> Option<LabelSource> {
        self.label_sources
            .iter()
            .find(|(kind, _)| *kind == node_type)
            .map(|(_, source)| *source)
    }

    /// Does this node type hide its body in semistructured mode?
    pub fn is_opaque_body_parent(&self, node_type: &str) -> bool {
        self.opaque_body_parents.contains(&node_type)
    }

    pub fn is_extra(&self, node_type: &str) -> bool {
        self.extras.contains(&node_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_by_extension() {
        assert_eq!(
            LangProfile::detect_from_filename("Bag.java").map(|p| p.name),
            Some("Java")
        );
        assert!(LangProfile::detect_from_filename("main.rs").is_none());
    }

    #[test]
    fn java_merge_knowledge() {
        let java = LangProfile::java();
        assert!(java.is_unordered_parent("class_body"));
        assert!(!java.is_unordered_parent("block"));
        assert!(java.has_unique_labels("import_declaration"));
        assert_eq!(java.fixed_arity("ternary_expression"), Some(3));
        assert_eq!(java.fixed_arity("block"), None);
        assert!(java.is_atomic_node_type("modifiers"));
        assert!(java.is_opaque_body_parent("method_declaration"));
    }
}
