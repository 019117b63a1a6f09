use rustc_hash::{FxHashMap, FxHashSet};

use crate::artifact::Artifact;
use crate::error::MergeError;
use crate::grammar::GrammarNode;
use crate::matching::MergeScenario;
use crate::nway_merge::{ChildClass, Merger};
use crate::operations::Operation;

/// Merging of children whose order carries no meaning (class member sets,
/// import lists): sibling groups are treated as sets keyed by match
/// identity. Members are emitted in the order of the side that
/// contributed them, left before right; insertions from the right are
/// spliced in next to their neighbours rather than appended.
impl<'a, T: GrammarNode> Merger<'a, '_, T> {
    pub(crate) fn merge_unordered(
        &self,
        left: &'a Artifact<'a, T>,
        base: Option<&'a Artifact<'a, T>>,
        right: &'a Artifact<'a, T>,
        target: &'a Artifact<'a, T>,
    ) -> Result<(), MergeError> {
        self.context.check_cancelled()?;
        let right_children = right.children();
        let right_revision = &right.revision;
        let base_revision = base.map(|b| &b.revision);

        // target node ids of members that are insertions, so that a run
        // of insertions can be kept in label order
        let mut inserted: FxHashSet<usize> = FxHashSet::default();
        // source child id -> id of the target node it ended up in
        let mut placed: FxHashMap<usize, usize> = FxHashMap::default();
        let place = |placed: &mut FxHashMap<usize, usize>,
                     source: &Artifact<'a, T>,
                     target_node: Option<&'a Artifact<'a, T>>| {
            if let Some(target_node) = target_node {
                placed.insert(source.id, target_node.id);
            }
        };

        for lc in left.children() {
            if lc.is_merged() {
                continue;
            }
            match self.sibling_partner(lc, right_revision, &right_children) {
                Some(rc) => {
                    let created = if lc.tree_hash() == rc.tree_hash() {
                        let clone = self.apply(Operation::Add {
                            artifact: lc,
                            parent: Some(target),
                            position: None,
                        })?;
                        rc.set_merged();
                        if let Some(base_child) = self.base_of(lc, base_revision) {
                            base_child.set_merged();
                        }
                        clone
                    } else {
                        let base_child = self
                            .base_of(lc, base_revision)
                            .or_else(|| self.base_of(rc, base_revision));
                        self.apply(Operation::Merge {
                            scenario: MergeScenario {
                                left: lc,
                                base: base_child,
                                right: rc,
                            },
                            parent: Some(target),
                        })?
                    };
                    place(&mut placed, lc, created);
                    place(&mut placed, rc, created);
                }
                None => match self.classify(lc, base_revision) {
                    ChildClass::Deletion => {
                        self.apply(Operation::Delete { artifact: lc })?;
                    }
                    ChildClass::DeletedModified => {
                        let created = self.apply_conflict(
                            Some(lc),
                            self.base_of(lc, base_revision),
                            None,
                            Some(target),
                            None,
                        )?;
                        place(&mut placed, lc, Some(created));
                    }
                    ChildClass::Insertion => {
                        let created = self.apply(Operation::Add {
                            artifact: lc,
                            parent: Some(target),
                            position: None,
                        })?;
                        if let Some(created) = created {
                            inserted.insert(created.id);
                        }
                        place(&mut placed, lc, created);
                    }
                },
            }
        }

        for (index, rc) in right_children.iter().copied().enumerate() {
            if rc.is_merged() {
                continue;
            }
            match self.classify(rc, base_revision) {
                ChildClass::Deletion => {
                    self.apply(Operation::Delete { artifact: rc })?;
                }
                class => {
                    let position =
                        self.insertion_position(rc, &right_children[..index], &placed, &inserted, target);
                    match class {
                        ChildClass::DeletedModified => {
                            let created = self.apply_conflict(
                                None,
                                self.base_of(rc, base_revision),
                                Some(rc),
                                Some(target),
                                Some(position),
                            )?;
                            place(&mut placed, rc, Some(created));
                        }
                        _ => {
                            let created = self.apply(Operation::Add {
                                artifact: rc,
                                parent: Some(target),
                                position: Some(position),
                            })?;
                            if let Some(created) = created {
                                inserted.insert(created.id);
                            }
                            place(&mut placed, rc, created);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Where to splice a right-side member into the target: right after
    /// the last preceding right sibling that made it into the target.
    /// Within a contiguous run of insertions, members with unique labels
    /// are kept in label order and left insertions win ties.
    fn insertion_position(
        &self,
        member: &'a Artifact<'a, T>,
        preceding: &[&'a Artifact<'a, T>],
        placed: &FxHashMap<usize, usize>,
        inserted: &FxHashSet<usize>,
        target: &'a Artifact<'a, T>,
    ) -> usize {
        let target_children = target.children();
        let anchor = preceding
            .iter()
            .rev()
            .find_map(|sibling| placed.get(&sibling.id))
            .and_then(|target_id| target_children.iter().position(|c| c.id == *target_id));
        let mut position = anchor.map_or(0, |index| index + 1);
        let member_label = member.label();
        while let Some(existing) = target_children.get(position) {
            if !inserted.contains(&existing.id) {
                break;
            }
            if member.has_unique_labels() && existing.label() > member_label {
                break;
            }
            position += 1;
        }
        position
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::test_utils::merge_java;

    #[test]
    fn members_added_on_both_sides_are_interleaved() {
        let merged = merge_java(
            "class Bag {\n    int size;\n    int size() {\n        return size;\n    }\n}\n",
            "class Bag {\n    int size;\n    int size() {\n        return size;\n    }\n    void clear() {\n        size = 0;\n    }\n}\n",
            "class Bag {\n    int size;\n    int capacity;\n    int size() {\n        return size;\n    }\n}\n",
        );
        assert_eq!(
            merged,
            "class Bag {\n    int size;\n    int capacity;\n    int size() {\n        return size;\n    }\n    void clear() {\n        size = 0;\n    }\n}\n"
        );
    }

    #[test]
    fn same_member_added_on_both_sides_appears_once() {
        let merged = merge_java(
            "import java.util.List;\nclass A {\n}\n",
            "import java.util.List;\nimport java.util.Set;\nclass A {\n}\n",
            "import java.util.List;\nimport java.util.Set;\nclass A {\n}\n",
        );
        assert_eq!(
            merged,
            "import java.util.List;\nimport java.util.Set;\nclass A {\n}\n"
        );
    }

    #[test]
    fn import_insertions_stay_sorted_without_duplicates() {
        let merged = merge_java(
            "import java.util.List;\nclass A {\n}\n",
            "import java.util.List;\nimport java.util.ArrayList;\nimport java.util.Set;\nclass A {\n}\n",
            "import java.util.List;\nimport java.util.Map;\nimport java.util.Set;\nclass A {\n}\n",
        );
        assert_eq!(
            merged,
            "import java.util.List;\nimport java.util.ArrayList;\nimport java.util.Map;\nimport java.util.Set;\nclass A {\n}\n"
        );
    }

    #[test]
    fn deletion_against_modification_conflicts() {
        let merged = merge_java(
            "class Bag {\n    int size;\n    void clear() {\n        size = 0;\n    }\n}\n",
            "class Bag {\n    int size;\n}\n",
            "class Bag {\n    int size;\n    void clear() {\n        size = 1;\n    }\n}\n",
        );
        assert_eq!(
            merged,
            "class Bag {\n    int size;\n<<<<<<< LEFT\n||||||| BASE\n    void clear() {\n        size = 0;\n    }\n=======\n    void clear() {\n        size = 1;\n    }\n>>>>>>> RIGHT\n}\n"
        );
    }
}
