use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};

use itertools::Itertools;
use rustc_hash::FxHashMap;
use typed_arena::Arena;

use crate::error::MergeError;
use crate::grammar::GrammarNode;
use crate::revision::Revision;

/// A cross-revision correspondence stored on an artifact: the matched
/// counterpart in some other revision, together with the matching score.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactLink<'a, T: GrammarNode> {
    pub other: &'a Artifact<'a, T>,
    pub score: u32,
}

/// The discriminator between regular artifacts and the pseudo-nodes
/// synthesized during merging. Conflict and choice are distinct variants,
/// never both.
pub enum Variant<'a, T: GrammarNode> {
    /// A node taken from one of the parsed revisions (or built for the
    /// target from such a node).
    Normal(RefCell<T>),
    /// Both alternatives of an unresolved conflict, as full clones of the
    /// original subtrees. A side can be absent when that revision deleted
    /// the element.
    Conflict {
        left: Option<&'a Artifact<'a, T>>,
        base: Option<&'a Artifact<'a, T>>,
        right: Option<&'a Artifact<'a, T>>,
        left_name: String,
        right_name: String,
    },
    /// Alternative subtrees gated by a condition string.
    Choice {
        variants: Vec<(String, &'a Artifact<'a, T>)>,
    },
}

/// A node of a revision tree, wrapping a syntax-tree node with the
/// metadata the merge needs: provenance, stable numbering, match links to
/// the other revisions and the processing flags of the merge itself.
///
/// Artifacts are arena-allocated and linked by shared references; the
/// child sequence owns the structure, the parent link is a back-reference
/// for lookup only.
pub struct Artifact<'a, T: GrammarNode> {
    /// Identifier unique across all trees of one merge session
    pub id: usize,
    pub revision: Revision,
    number: Cell<usize>,
    hash: Cell<u64>,
    size: Cell<usize>,
    merged: Cell<bool>,
    parent: Cell<Option<&'a Artifact<'a, T>>>,
    children: RefCell<Vec<&'a Artifact<'a, T>>>,
    matches: RefCell<FxHashMap<Revision, ArtifactLink<'a, T>>>,
    pub variant: Variant<'a, T>,
}

impl<'a, T: GrammarNode> Artifact<'a, T> {
    /// The pre-order index of this node within its revision tree.
    /// Synthesized nodes carry a number from the session-wide counter
    /// until their tree is renumbered.
    pub fn number(&self) -> usize {
        self.number.get()
    }

    /// The isomorphism hash of the subtree rooted here. Two subtrees with
    /// equal structure, kinds, labels and contents have equal hashes.
    pub fn tree_hash(&self) -> u64 {
        self.hash.get()
    }

    /// Number of nodes in the subtree rooted here.
    pub fn size(&self) -> usize {
        self.size.get()
    }

    pub fn parent(&self) -> Option<&'a Artifact<'a, T>> {
        self.parent.get()
    }

    /// A snapshot of the (shared) children sequence.
    pub fn children(&self) -> Vec<&'a Artifact<'a, T>> {
        self.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.borrow().is_empty()
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.variant, Variant::Conflict { .. })
    }

    pub fn is_choice(&self) -> bool {
        matches!(self.variant, Variant::Choice { .. })
    }

    /// The wrapped syntax-tree node. Pseudo-nodes wrap none.
    pub fn node(&self) -> Option<Ref<'_, T>> {
        match &self.variant {
            Variant::Normal(node) => Some(node.borrow()),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<String> {
        self.node().map(|n| n.kind().to_owned())
    }

    pub fn label(&self) -> Option<String> {
        self.node().and_then(|n| n.label().map(str::to_owned))
    }

    pub fn content(&self) -> Option<String> {
        self.node().and_then(|n| n.content().map(str::to_owned))
    }

    pub fn set_content(&self, text: String) {
        if let Variant::Normal(node) = &self.variant {
            node.borrow_mut().set_content(text);
        }
    }

    /// Does this node carry opaque text instead of structure?
    pub fn is_opaque(&self) -> bool {
        self.node().is_some_and(|n| n.content().is_some())
    }

    /// Structural equality with another artifact at this level only.
    /// Pseudo-nodes never match anything.
    pub fn matches_level(&self, other: &Self) -> bool {
        match (&self.variant, &other.variant) {
            (Variant::Normal(a), Variant::Normal(b)) => a.borrow().matches(&b.borrow()),
            _ => false,
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.node().is_none_or(|n| n.is_ordered())
    }

    pub fn has_unique_labels(&self) -> bool {
        self.node().is_some_and(|n| n.has_unique_labels())
    }

    pub fn fixed_arity(&self) -> Option<usize> {
        self.node().and_then(|n| n.fixed_arity())
    }

    pub fn is_merged(&self) -> bool {
        self.merged.get()
    }

    /// Flag this node as consumed by the merge, so that it is never
    /// processed twice within one session.
    pub fn set_merged(&self) {
        self.merged.set(true);
    }

    /// Record a link to the corresponding artifact in another revision.
    /// The caller is responsible for storing the reciprocal link, keeping
    /// the relation symmetric.
    pub fn add_match(&self, rev: Revision, link: ArtifactLink<'a, T>) {
        self.matches.borrow_mut().insert(rev, link);
    }

    /// The artifact this one corresponds to in the given revision, if any.
    pub fn match_in(&self, rev: &Revision) -> Option<&'a Artifact<'a, T>> {
        self.matches.borrow().get(rev).map(|link| link.other)
    }

    pub fn match_score(&self, rev: &Revision) -> Option<u32> {
        self.matches.borrow().get(rev).map(|link| link.score)
    }

    /// Append a child, maintaining its parent back-link.
    pub fn add_child(&'a self, child: &'a Artifact<'a, T>) {
        child.parent.set(Some(self));
        self.children.borrow_mut().push(child);
    }

    /// Splice a child in at the given position.
    pub fn insert_child(&'a self, index: usize, child: &'a Artifact<'a, T>) {
        child.parent.set(Some(self));
        self.children.borrow_mut().insert(index, child);
    }

    /// Detach a child; its subtree is left intact.
    pub fn remove_child(&self, child: &Artifact<'a, T>) {
        let mut children = self.children.borrow_mut();
        if let Some(pos) = children.iter().position(|c| c.id == child.id) {
            let removed = children.remove(pos);
            removed.parent.set(None);
        }
    }

    /// The subtree in pre-order, this node first.
    pub fn dfs(&'a self) -> Vec<&'a Artifact<'a, T>> {
        let mut out = Vec::with_capacity(self.size.get().max(1));
        self.collect_dfs(&mut out);
        out
    }

    fn collect_dfs(&'a self, out: &mut Vec<&'a Artifact<'a, T>>) {
        out.push(self);
        for child in self.children.borrow().iter() {
            child.collect_dfs(out);
        }
    }

    /// Check the invariants that must hold before the merged tree can be
    /// printed back to source text: fixed-arity nodes carry exactly their
    /// grammar-imposed child count, and every conflict still has at least
    /// one alternative. A violation is a bug in the engine or in the tree
    /// library, reported with the offending node.
    pub fn validate_reconstruction(&'a self) -> Result<(), MergeError> {
        match &self.variant {
            Variant::Normal(_) => {
                if !self.is_leaf() {
                    if let Some(arity) = self.fixed_arity() {
                        let actual = self.child_count();
                        if actual != arity {
                            return Err(MergeError::Reconstruction {
                                node: self.id,
                                message: format!(
                                    "{} node has {actual} children, grammar expects {arity}",
                                    self.kind().unwrap_or_default()
                                ),
                            });
                        }
                    }
                }
                for child in self.children() {
                    child.validate_reconstruction()?;
                }
                Ok(())
            }
            Variant::Conflict { left, right, .. } => {
                if left.is_none() && right.is_none() {
                    return Err(MergeError::Reconstruction {
                        node: self.id,
                        message: "conflict node lost both of its alternatives".to_owned(),
                    });
                }
                for side in [left, right].into_iter().flatten() {
                    side.validate_reconstruction()?;
                }
                Ok(())
            }
            Variant::Choice { variants } => {
                for (_, variant) in variants {
                    variant.validate_reconstruction()?;
                }
                Ok(())
            }
        }
    }
}

impl<T: GrammarNode> PartialEq for Artifact<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: GrammarNode> Eq for Artifact<'_, T> {}

impl<T: GrammarNode> Hash for Artifact<'_, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: GrammarNode> fmt::Debug for Artifact<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Variant::Normal(node) => write!(
                f,
                "Artifact({}:{} {} #{})",
                self.revision,
                self.number.get(),
                node.borrow().kind(),
                self.id
            ),
            Variant::Conflict { .. } => write!(f, "Artifact(conflict #{})", self.id),
            Variant::Choice { .. } => write!(f, "Artifact(choice #{})", self.id),
        }
    }
}

/// Allocates and finalizes the artifacts of one merge session. All trees
/// taking part in a merge (the three revisions and the target) share one
/// store, which also hands out the session-wide virtual numbering for
/// synthesized nodes.
pub struct ArtifactStore<'a, T: GrammarNode> {
    arena: &'a Arena<Artifact<'a, T>>,
    next_id: Cell<usize>,
    next_virtual_number: Cell<usize>,
}

impl<'a, T: GrammarNode> ArtifactStore<'a, T> {
    pub fn new(arena: &'a Arena<Artifact<'a, T>>) -> Self {
        Self {
            arena,
            next_id: Cell::new(0),
            next_virtual_number: Cell::new(0),
        }
    }

    fn alloc(&self, revision: Revision, variant: Variant<'a, T>) -> &'a Artifact<'a, T> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let number = self.next_virtual_number.get();
        self.next_virtual_number.set(number + 1);
        self.arena.alloc(Artifact {
            id,
            revision,
            number: Cell::new(number),
            hash: Cell::new(0),
            size: Cell::new(1),
            merged: Cell::new(false),
            parent: Cell::new(None),
            children: RefCell::new(Vec::new()),
            matches: RefCell::new(FxHashMap::default()),
            variant,
        })
    }

    /// Create a childless artifact wrapping a syntax-tree node.
    pub fn create(&self, revision: Revision, node: T) -> &'a Artifact<'a, T> {
        self.alloc(revision, Variant::Normal(RefCell::new(node)))
    }

    /// Deep-clone a subtree, preserving its revision and node data but
    /// with fresh identifiers and virtual numbers. Match links and the
    /// merged flag are not carried over.
    pub fn clone_subtree(&self, artifact: &'a Artifact<'a, T>) -> &'a Artifact<'a, T> {
        let clone = match &artifact.variant {
            Variant::Normal(node) => self.create(artifact.revision.clone(), node.borrow().clone()),
            Variant::Conflict {
                left,
                base,
                right,
                left_name,
                right_name,
            } => self.alloc(
                Revision::Conflict,
                Variant::Conflict {
                    left: left.map(|a| self.clone_subtree(a)),
                    base: base.map(|a| self.clone_subtree(a)),
                    right: right.map(|a| self.clone_subtree(a)),
                    left_name: left_name.clone(),
                    right_name: right_name.clone(),
                },
            ),
            Variant::Choice { variants } => self.alloc(
                Revision::Choice,
                Variant::Choice {
                    variants: variants
                        .iter()
                        .map(|(cond, a)| (cond.clone(), self.clone_subtree(a)))
                        .collect(),
                },
            ),
        };
        for child in artifact.children() {
            clone.add_child(self.clone_subtree(child));
        }
        clone.hash.set(artifact.tree_hash());
        clone.size.set(artifact.size());
        clone
    }

    /// Create a conflict pseudo-node carrying full clones of the supplied
    /// alternatives.
    pub fn create_conflict(
        &self,
        left: Option<&'a Artifact<'a, T>>,
        base: Option<&'a Artifact<'a, T>>,
        right: Option<&'a Artifact<'a, T>>,
        left_name: &str,
        right_name: &str,
    ) -> &'a Artifact<'a, T> {
        self.alloc(
            Revision::Conflict,
            Variant::Conflict {
                left: left.map(|a| self.clone_subtree(a)),
                base: base.map(|a| self.clone_subtree(a)),
                right: right.map(|a| self.clone_subtree(a)),
                left_name: left_name.to_owned(),
                right_name: right_name.to_owned(),
            },
        )
    }

    /// Create a choice pseudo-node over condition-gated variants.
    pub fn create_choice(
        &self,
        variants: Vec<(String, &'a Artifact<'a, T>)>,
    ) -> &'a Artifact<'a, T> {
        self.alloc(
            Revision::Choice,
            Variant::Choice {
                variants: variants
                    .into_iter()
                    .map(|(cond, a)| (cond, self.clone_subtree(a)))
                    .collect(),
            },
        )
    }

    /// Finish the construction of a revision tree: set parent links,
    /// assign pre-order numbers and compute isomorphism hashes and sizes
    /// bottom-up.
    pub fn finalize(&self, root: &'a Artifact<'a, T>) {
        Self::renumber(root);
        Self::compute_hashes(root);
    }

    /// Re-assign strictly increasing pre-order numbers below this root.
    pub fn renumber(root: &'a Artifact<'a, T>) {
        let mut counter = 0;
        Self::renumber_from(root, &mut counter);
    }

    fn renumber_from(artifact: &'a Artifact<'a, T>, counter: &mut usize) {
        artifact.number.set(*counter);
        *counter += 1;
        for child in artifact.children() {
            child.parent.set(Some(artifact));
            Self::renumber_from(child, counter);
        }
    }

    fn compute_hashes(artifact: &'a Artifact<'a, T>) -> (u64, usize) {
        let mut size = 1;
        let child_hashes = artifact
            .children()
            .into_iter()
            .map(|child| {
                let (child_hash, child_size) = Self::compute_hashes(child);
                size += child_size;
                child_hash
            })
            .collect_vec();
        let mut hasher = crate::fxhasher();
        match &artifact.variant {
            Variant::Normal(node) => {
                let node = node.borrow();
                node.kind().hash(&mut hasher);
                node.label().hash(&mut hasher);
                node.content().hash(&mut hasher);
            }
            Variant::Conflict { .. } => "\0conflict".hash(&mut hasher),
            Variant::Choice { .. } => "\0choice".hash(&mut hasher),
        }
        child_hashes.hash(&mut hasher);
        let hash = hasher.finish();
        artifact.hash.set(hash);
        artifact.size.set(size);
        (hash, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ctx;

    #[test]
    fn preorder_numbering_is_strictly_increasing() {
        let ctx = ctx();
        let tree = ctx.parse_java("class A { int x; void f() { x = 1; } }");
        let numbers: Vec<usize> = tree.dfs().iter().map(|a| a.number()).collect();
        for window in numbers.windows(2) {
            assert!(window[0] < window[1]);
        }
        assert_eq!(numbers[0], 0);
        assert_eq!(*numbers.last().unwrap(), numbers.len() - 1);
    }

    #[test]
    fn children_know_their_parent() {
        let ctx = ctx();
        let tree = ctx.parse_java("class A { int x; }");
        for node in tree.dfs() {
            for child in node.children() {
                assert_eq!(child.parent().unwrap().id, node.id);
            }
        }
    }

    #[test]
    fn isomorphic_subtrees_share_hashes() {
        let ctx = ctx();
        let one = ctx.parse_java("class A { int x; }");
        let two = ctx.parse_java("class A { int x; }");
        let other = ctx.parse_java("class A { int y; }");
        assert_eq!(one.tree_hash(), two.tree_hash());
        assert_ne!(one.tree_hash(), other.tree_hash());
    }

    #[test]
    fn clone_preserves_structure_with_fresh_ids() {
        let ctx = ctx();
        let tree = ctx.parse_java("class A { int x; }");
        let clone = ctx.store().clone_subtree(tree);
        assert_eq!(clone.tree_hash(), tree.tree_hash());
        assert_eq!(clone.size(), tree.size());
        assert_ne!(clone.id, tree.id);
        assert_eq!(clone.revision, tree.revision);
    }

    #[test]
    fn conflict_without_alternatives_fails_validation() {
        let ctx = ctx();
        let tree = ctx.parse_java("class A { }");
        let conflict = ctx
            .store()
            .create_conflict(None, Some(tree), None, "L", "R");
        assert!(matches!(
            conflict.validate_reconstruction(),
            Err(MergeError::Reconstruction { .. })
        ));
        let ok = ctx.store().create_conflict(Some(tree), None, None, "L", "R");
        assert!(ok.validate_reconstruction().is_ok());
    }

    #[test]
    fn children_can_be_spliced_and_removed() {
        let ctx = ctx();
        let tree = ctx.parse_java("class A {\n    int x;\n    int y;\n}\n");
        let body = tree
            .dfs()
            .into_iter()
            .find(|a| a.kind().as_deref() == Some("class_body"))
            .unwrap();
        let x = body.children()[0];
        let z = ctx.store().clone_subtree(x);
        body.insert_child(1, z);
        assert_eq!(body.child_count(), 3);
        assert_eq!(body.children()[1].id, z.id);
        assert_eq!(z.parent().unwrap().id, body.id);

        body.remove_child(z);
        assert_eq!(body.child_count(), 2);
        assert!(z.parent().is_none());
    }

    #[test]
    fn merged_flag_and_match_links() {
        let ctx = ctx();
        let left = ctx.parse_java("class A { }");
        let right = ctx.parse_java("class A { }");
        assert!(!left.is_merged());
        left.set_merged();
        assert!(left.is_merged());

        left.add_match(
            Revision::Right,
            ArtifactLink {
                other: right,
                score: 3,
            },
        );
        assert_eq!(left.match_in(&Revision::Right).unwrap().id, right.id);
        assert_eq!(left.match_score(&Revision::Right), Some(3));
        assert!(left.match_in(&Revision::Base).is_none());
    }
}
