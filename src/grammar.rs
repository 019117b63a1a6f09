/// The capabilities the merge engine needs from a concrete syntax-tree
/// node. The engine is generic over this trait: it never inspects the
/// grammar itself, only the per-node answers below, which the tree
/// library derives from its grammar.
pub trait GrammarNode: Clone + std::fmt::Debug {
    /// The grammar type of this node.
    fn kind(&self) -> &str;

    /// The textual form that identifies this node at its own level:
    /// the token text of a leaf, the name of a declaration, the operator
    /// of an expression. `None` for nodes identified by kind alone.
    fn label(&self) -> Option<&str>;

    /// The opaque text carried by this node instead of children, when the
    /// subtree has been flattened to a text leaf.
    fn content(&self) -> Option<&str>;

    /// Replace this node's opaque text.
    fn set_content(&mut self, text: String);

    /// Structural equality at this level only, ignoring children:
    /// same kind, and same label where the kind carries one.
    fn matches(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.label() == other.label()
    }

    /// Is the order of this node's children semantically significant?
    fn is_ordered(&self) -> bool;

    /// Can two siblings of this node's kind never collide, so that they
    /// must be matched by label?
    fn has_unique_labels(&self) -> bool;

    /// The child count the grammar imposes on this kind of node, if any.
    fn fixed_arity(&self) -> Option<usize>;
}
