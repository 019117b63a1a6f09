use crate::artifact::{Artifact, ArtifactStore};
use crate::context::MergeContext;
use crate::error::MergeError;
use crate::grammar::GrammarNode;
use crate::line_based::{MergedChunk, merge_chunks};
use crate::matching::MergeScenario;
use crate::operations::Operation;
use crate::output::OutputBuilder;
use crate::revision::Revision;
use crate::settings::DisplaySettings;

/// Drives the merge of a scenario into a target tree, dispatching between
/// the ordered and unordered child-merging engines and applying the
/// operations they emit.
pub struct Merger<'a, 's, T: GrammarNode> {
    pub store: &'s ArtifactStore<'a, T>,
    pub context: &'s MergeContext,
    pub settings: &'s DisplaySettings,
}

/// How a child that only one side still carries relates to the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChildClass {
    /// Present in the base with an unchanged subtree: the other side
    /// deleted it.
    Deletion,
    /// Present in the base but changed on this side, while the other side
    /// deleted it.
    DeletedModified,
    /// Absent from the base: an insertion of this side.
    Insertion,
}

impl<'a, T: GrammarNode> Merger<'a, '_, T> {
    /// Merge a whole scenario, returning the root of the target tree.
    pub fn merge(
        &self,
        scenario: MergeScenario<'a, T>,
    ) -> Result<&'a Artifact<'a, T>, MergeError> {
        let root = self.merge_node(scenario, None, None)?;
        ArtifactStore::renumber(root);
        Ok(root)
    }

    /// Merge one matched pair of nodes (plus their base counterpart) into
    /// a fresh target node attached to `parent`.
    pub(crate) fn merge_node(
        &self,
        scenario: MergeScenario<'a, T>,
        parent: Option<&'a Artifact<'a, T>>,
        position: Option<usize>,
    ) -> Result<&'a Artifact<'a, T>, MergeError> {
        self.context.check_cancelled()?;
        let left = scenario.left;
        let right = scenario.right;
        let base = scenario.base;

        // sides that fully agree, or where only one side changed anything,
        // are copied through without walking their subtrees
        if left.tree_hash() == right.tree_hash() {
            return self.copy_through(left, &[Some(right), base], parent, position);
        }
        if let Some(base_node) = base {
            if right.tree_hash() == base_node.tree_hash() {
                return self.copy_through(left, &[Some(right), base], parent, position);
            }
            if left.tree_hash() == base_node.tree_hash() {
                return self.copy_through(right, &[Some(left), base], parent, position);
            }
        }

        // both sides changed this subtree from here on
        if self.fixed_arity_mismatch(left, right) {
            return self.apply_conflict(Some(left), base, Some(right), parent, position);
        }

        if left.is_opaque() || right.is_opaque() {
            return self.merge_opaque(scenario, parent, position);
        }

        let resolved = self.resolve_node(left, base, right);
        let Some(node) = resolved else {
            return self.apply_conflict(Some(left), base, Some(right), parent, position);
        };

        let target = self.store.create(Revision::Target, node);
        self.attach(target, parent, position);

        if target.is_ordered() {
            self.merge_ordered(left, base, right, target)?;
        } else {
            self.merge_unordered(left, base, right, target)?;
        }

        left.set_merged();
        right.set_merged();
        if let Some(base_node) = base {
            base_node.set_merged();
        }
        Ok(target)
    }

    /// The safety preflight for nodes whose child count is imposed by the
    /// grammar: when both sides changed such a node and their children no
    /// longer line up kind by kind, merging the children would reconstruct
    /// an ill-typed tree.
    fn fixed_arity_mismatch(&self, left: &'a Artifact<'a, T>, right: &'a Artifact<'a, T>) -> bool {
        if left.fixed_arity().is_none() && right.fixed_arity().is_none() {
            return false;
        }
        let left_children = left.children();
        let right_children = right.children();
        left_children.len() != right_children.len()
            || left_children
                .iter()
                .zip(&right_children)
                .any(|(l, r)| l.kind() != r.kind())
    }

    /// Decide the syntax-tree node carried by the merged artifact, or
    /// `None` when the two sides disagree at this level in a way the base
    /// cannot arbitrate.
    fn resolve_node(
        &self,
        left: &'a Artifact<'a, T>,
        base: Option<&'a Artifact<'a, T>>,
        right: &'a Artifact<'a, T>,
    ) -> Option<T> {
        if left.matches_level(right) {
            return left.node().map(|n| n.clone());
        }
        if base.is_some_and(|b| b.matches_level(left)) {
            // the left side kept the base node, the right side updated it
            return right.node().map(|n| n.clone());
        }
        if base.is_some_and(|b| b.matches_level(right)) {
            return left.node().map(|n| n.clone());
        }
        None
    }

    /// Merge two opaque text leaves, delegating diverging contents to the
    /// textual merge algorithm.
    fn merge_opaque(
        &self,
        scenario: MergeScenario<'a, T>,
        parent: Option<&'a Artifact<'a, T>>,
        position: Option<usize>,
    ) -> Result<&'a Artifact<'a, T>, MergeError> {
        let left = scenario.left;
        let right = scenario.right;
        if !left.is_opaque() || !right.is_opaque() {
            return Err(MergeError::LineBased(
                "only one side of a matched pair carries opaque text".to_owned(),
            ));
        }
        let left_text = left.content().unwrap_or_default();
        let right_text = right.content().unwrap_or_default();
        let base_text = scenario
            .base
            .and_then(|b| b.content())
            .unwrap_or_default();

        let merged = if left_text == right_text {
            left_text
        } else if right_text == base_text {
            left_text
        } else if left_text == base_text {
            right_text
        } else {
            let with_newline = |text: &str| {
                if text.is_empty() || text.ends_with('\n') {
                    text.to_owned()
                } else {
                    format!("{text}\n")
                }
            };
            let chunks = merge_chunks(
                &with_newline(&base_text),
                &with_newline(&left_text),
                &with_newline(&right_text),
                self.settings,
            );
            let mut output = OutputBuilder::new(self.settings);
            for chunk in &chunks {
                match chunk {
                    MergedChunk::Resolved(text) => output.push(text),
                    MergedChunk::Conflict { base, left, right } => {
                        output.push_sides(left, base, right);
                    }
                }
            }
            let rendered = output.finish();
            rendered.strip_suffix('\n').unwrap_or(&rendered).to_owned()
        };

        let node = self.resolve_node(left, scenario.base, right);
        let Some(mut node) = node else {
            return self.apply_conflict(Some(left), scenario.base, Some(right), parent, position);
        };
        node.set_content(merged);
        let target = self.store.create(Revision::Target, node);
        self.attach(target, parent, position);
        left.set_merged();
        right.set_merged();
        if let Some(base_node) = scenario.base {
            base_node.set_merged();
        }
        Ok(target)
    }

    /// One side's subtree wins without further inspection. The losing
    /// counterparts are flagged as consumed.
    fn copy_through(
        &self,
        winner: &'a Artifact<'a, T>,
        others: &[Option<&'a Artifact<'a, T>>],
        parent: Option<&'a Artifact<'a, T>>,
        position: Option<usize>,
    ) -> Result<&'a Artifact<'a, T>, MergeError> {
        let clone = self.store.clone_subtree(winner);
        self.attach(clone, parent, position);
        winner.set_merged();
        for other in others.iter().flatten() {
            other.set_merged();
        }
        Ok(clone)
    }

    pub(crate) fn attach(
        &self,
        node: &'a Artifact<'a, T>,
        parent: Option<&'a Artifact<'a, T>>,
        position: Option<usize>,
    ) {
        if let Some(parent) = parent {
            match position {
                Some(index) => parent.insert_child(index, node),
                None => parent.add_child(node),
            }
        }
    }

    /// Shorthand for emitting and applying a conflict operation.
    pub(crate) fn apply_conflict(
        &self,
        left: Option<&'a Artifact<'a, T>>,
        base: Option<&'a Artifact<'a, T>>,
        right: Option<&'a Artifact<'a, T>>,
        parent: Option<&'a Artifact<'a, T>>,
        position: Option<usize>,
    ) -> Result<&'a Artifact<'a, T>, MergeError> {
        let created = self.apply(Operation::Conflict {
            left,
            base,
            right,
            parent,
            position,
            left_name: self.settings.left_label.clone(),
            right_name: self.settings.right_label.clone(),
        })?;
        created.ok_or(MergeError::Reconstruction {
            node: left.or(right).map(|a| a.id).unwrap_or_default(),
            message: "conflict operation did not produce a node".to_owned(),
        })
    }

    /// How a one-sided child relates to the base revision.
    pub(crate) fn classify(
        &self,
        child: &'a Artifact<'a, T>,
        base_revision: Option<&Revision>,
    ) -> ChildClass {
        match base_revision.and_then(|rev| child.match_in(rev)) {
            Some(base_child) if base_child.tree_hash() == child.tree_hash() => ChildClass::Deletion,
            Some(_) => ChildClass::DeletedModified,
            None => ChildClass::Insertion,
        }
    }

    /// The counterpart of `child` in the other revision, provided it is an
    /// unconsumed sibling of the list currently being merged.
    pub(crate) fn sibling_partner(
        &self,
        child: &'a Artifact<'a, T>,
        other_revision: &Revision,
        siblings: &[&'a Artifact<'a, T>],
    ) -> Option<&'a Artifact<'a, T>> {
        let partner = child.match_in(other_revision)?;
        (siblings.iter().any(|s| s.id == partner.id) && !partner.is_merged()).then_some(partner)
    }

    pub(crate) fn base_of(
        &self,
        child: &'a Artifact<'a, T>,
        base_revision: Option<&Revision>,
    ) -> Option<&'a Artifact<'a, T>> {
        base_revision.and_then(|rev| child.match_in(rev))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::test_utils::merge_java;

    #[test]
    fn one_sided_label_update_is_taken_over() {
        let merged = merge_java(
            "class A {\n    void f() {\n        x = a + b;\n    }\n}\n",
            "class A {\n    void f() {\n        x = a + b;\n    }\n}\n",
            "class A {\n    void f() {\n        x = a * b;\n    }\n}\n",
        );
        assert_eq!(
            merged,
            "class A {\n    void f() {\n        x = a * b;\n    }\n}\n"
        );
    }

    #[test]
    fn fixed_arity_node_rebuilt_differently_on_both_sides_conflicts() {
        let merged = merge_java(
            "class A {\n    void f() {\n        x = a + b;\n    }\n}\n",
            "class A {\n    void f() {\n        x = a - b;\n    }\n}\n",
            "class A {\n    void f() {\n        x = g(a, b);\n    }\n}\n",
        );
        assert_eq!(
            merged,
            "class A {\n    void f() {\n<<<<<<< LEFT\n        x = a - b;\n||||||| BASE\n        x = a + b;\n=======\n        x = g(a, b);\n>>>>>>> RIGHT\n    }\n}\n"
        );
    }

    #[test]
    fn diverging_operator_updates_conflict() {
        let merged = merge_java(
            "class A {\n    void f() {\n        x = a + b;\n    }\n}\n",
            "class A {\n    void f() {\n        x = a - b;\n    }\n}\n",
            "class A {\n    void f() {\n        x = a * b;\n    }\n}\n",
        );
        assert_eq!(
            merged,
            "class A {\n    void f() {\n<<<<<<< LEFT\n        x = a - b;\n||||||| BASE\n        x = a + b;\n=======\n        x = a * b;\n>>>>>>> RIGHT\n    }\n}\n"
        );
    }
}
