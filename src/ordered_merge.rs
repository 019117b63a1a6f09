use crate::artifact::Artifact;
use crate::error::MergeError;
use crate::grammar::GrammarNode;
use crate::matching::MergeScenario;
use crate::nway_merge::{ChildClass, Merger};
use crate::operations::Operation;
use crate::revision::Revision;

/// When the cursors sit on two unmatched changes, neither of them knows
/// its base counterpart. The next base child that no side claims and
/// whose kind fits is the element both sides rewrote.
fn positional_base<'a, T: GrammarNode>(
    base_children: &[&'a Artifact<'a, T>],
    left_revision: &Revision,
    right_revision: &Revision,
    l: &'a Artifact<'a, T>,
    r: &'a Artifact<'a, T>,
) -> Option<&'a Artifact<'a, T>> {
    base_children
        .iter()
        .copied()
        .find(|bc| !bc.is_merged())
        .filter(|bc| {
            bc.match_in(left_revision).is_none() && bc.match_in(right_revision).is_none()
        })
        .filter(|bc| bc.kind() == l.kind() || bc.kind() == r.kind())
}

/// Merging of children whose declaration order is semantically
/// significant (statement lists, argument lists): two cursors walk the
/// left and right child sequences in lockstep.
impl<'a, T: GrammarNode> Merger<'a, '_, T> {
    pub(crate) fn merge_ordered(
        &self,
        left: &'a Artifact<'a, T>,
        base: Option<&'a Artifact<'a, T>>,
        right: &'a Artifact<'a, T>,
        target: &'a Artifact<'a, T>,
    ) -> Result<(), MergeError> {
        self.context.check_cancelled()?;
        let left_children = left.children();
        let right_children = right.children();
        let base_children = base.map(|b| b.children()).unwrap_or_default();
        let left_revision = &left.revision;
        let right_revision = &right.revision;
        let base_revision = base.map(|b| &b.revision);

        let mut li = 0;
        let mut ri = 0;
        loop {
            // consumed nodes are never processed again
            while left_children.get(li).is_some_and(|c| c.is_merged()) {
                li += 1;
            }
            while right_children.get(ri).is_some_and(|c| c.is_merged()) {
                ri += 1;
            }
            let lc = left_children.get(li).copied();
            let rc = right_children.get(ri).copied();
            if lc.is_none() && rc.is_none() {
                break;
            }
            let lc_partner =
                lc.and_then(|c| self.sibling_partner(c, right_revision, &right_children));
            let rc_partner =
                rc.and_then(|c| self.sibling_partner(c, left_revision, &left_children));

            match (lc, rc) {
                // the current left child has no counterpart on the right
                (Some(l), _) if lc_partner.is_none() => {
                    match self.classify(l, base_revision) {
                        ChildClass::Deletion => {
                            self.apply(Operation::Delete { artifact: l })?;
                            if let Some(base_child) = self.base_of(l, base_revision) {
                                base_child.set_merged();
                            }
                            li += 1;
                        }
                        left_class => {
                            // is the right cursor also sitting on a change?
                            let right_change = rc.filter(|_| rc_partner.is_none());
                            match right_change.map(|r| self.classify(r, base_revision)) {
                                Some(ChildClass::Deletion) => {
                                    let r = right_change.expect("classified above");
                                    self.apply(Operation::Delete { artifact: r })?;
                                    if let Some(base_child) = self.base_of(r, base_revision) {
                                        base_child.set_merged();
                                    }
                                    ri += 1;
                                }
                                Some(_) => {
                                    // simultaneous changes at the same position
                                    let r = right_change.expect("classified above");
                                    let base_child = self
                                        .base_of(l, base_revision)
                                        .or_else(|| self.base_of(r, base_revision))
                                        .or_else(|| {
                                            positional_base(&base_children, left_revision, right_revision, l, r)
                                        });
                                    self.apply_conflict(
                                        Some(l),
                                        base_child,
                                        Some(r),
                                        Some(target),
                                        None,
                                    )?;
                                    li += 1;
                                    ri += 1;
                                }
                                None => {
                                    match left_class {
                                        ChildClass::Insertion => {
                                            self.apply(Operation::Add {
                                                artifact: l,
                                                parent: Some(target),
                                                position: None,
                                            })?;
                                        }
                                        _ => {
                                            // left modified what the right side deleted
                                            self.apply_conflict(
                                                Some(l),
                                                self.base_of(l, base_revision),
                                                None,
                                                Some(target),
                                                None,
                                            )?;
                                        }
                                    }
                                    li += 1;
                                }
                            }
                        }
                    }
                }
                // the current right child has no counterpart on the left
                (_, Some(r)) if rc_partner.is_none() => {
                    match self.classify(r, base_revision) {
                        ChildClass::Deletion => {
                            self.apply(Operation::Delete { artifact: r })?;
                            if let Some(base_child) = self.base_of(r, base_revision) {
                                base_child.set_merged();
                            }
                        }
                        ChildClass::DeletedModified => {
                            self.apply_conflict(
                                None,
                                self.base_of(r, base_revision),
                                Some(r),
                                Some(target),
                                None,
                            )?;
                        }
                        ChildClass::Insertion => {
                            self.apply(Operation::Add {
                                artifact: r,
                                parent: Some(target),
                                position: None,
                            })?;
                        }
                    }
                    ri += 1;
                }
                (Some(l), Some(r)) => {
                    if lc_partner.is_some_and(|p| p.id == r.id) {
                        let base_child = self
                            .base_of(l, base_revision)
                            .or_else(|| self.base_of(r, base_revision));
                        self.apply(Operation::Merge {
                            scenario: MergeScenario {
                                left: l,
                                base: base_child,
                                right: r,
                            },
                            parent: Some(target),
                        })?;
                    } else {
                        // both sides moved different elements here
                        let base_child = self
                            .base_of(l, base_revision)
                            .or_else(|| self.base_of(r, base_revision))
                            .or_else(|| {
                                positional_base(&base_children, left_revision, right_revision, l, r)
                            });
                        self.apply_conflict(Some(l), base_child, Some(r), Some(target), None)?;
                    }
                    li += 1;
                    ri += 1;
                }
                // one cursor is exhausted while the other points at a node
                // whose counterpart was already consumed elsewhere
                (Some(l), None) => {
                    match self.classify(l, base_revision) {
                        ChildClass::Deletion => self.apply(Operation::Delete { artifact: l })?,
                        _ => self.apply(Operation::Add {
                            artifact: l,
                            parent: Some(target),
                            position: None,
                        })?,
                    };
                    li += 1;
                }
                (None, Some(r)) => {
                    match self.classify(r, base_revision) {
                        ChildClass::Deletion => self.apply(Operation::Delete { artifact: r })?,
                        _ => self.apply(Operation::Add {
                            artifact: r,
                            parent: Some(target),
                            position: None,
                        })?,
                    };
                    ri += 1;
                }
                (None, None) => break,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::test_utils::merge_java;

    #[test]
    fn statement_changed_on_one_side_only() {
        let merged = merge_java(
            "class A {\n    void f() {\n        a = 0;\n        b = 0;\n    }\n}\n",
            "class A {\n    void f() {\n        a = 1;\n        b = 0;\n    }\n}\n",
            "class A {\n    void f() {\n        a = 0;\n        b = 2;\n    }\n}\n",
        );
        assert_eq!(
            merged,
            "class A {\n    void f() {\n        a = 1;\n        b = 2;\n    }\n}\n"
        );
    }

    #[test]
    fn statement_deleted_on_one_side() {
        let merged = merge_java(
            "class A {\n    void f() {\n        a = 0;\n        b = 0;\n    }\n}\n",
            "class A {\n    void f() {\n        b = 0;\n    }\n}\n",
            "class A {\n    void f() {\n        a = 0;\n        b = 0;\n    }\n}\n",
        );
        assert_eq!(merged, "class A {\n    void f() {\n        b = 0;\n    }\n}\n");
    }

    #[test]
    fn insertions_at_the_same_position_conflict() {
        let merged = merge_java(
            "class A {\n    void f() {\n        a = 0;\n    }\n}\n",
            "class A {\n    void f() {\n        a = 0;\n        b = 1;\n    }\n}\n",
            "class A {\n    void f() {\n        a = 0;\n        c = 2;\n    }\n}\n",
        );
        assert_eq!(
            merged,
            "class A {\n    void f() {\n        a = 0;\n<<<<<<< LEFT\n        b = 1;\n||||||| BASE\n=======\n        c = 2;\n>>>>>>> RIGHT\n    }\n}\n"
        );
    }

    #[test]
    fn leaf_update_against_deletion_conflicts() {
        let merged = merge_java(
            "class A {\n    void f() {\n        a = 0;\n        b = 0;\n    }\n}\n",
            "class A {\n    void f() {\n        b = 0;\n    }\n}\n",
            "class A {\n    void f() {\n        a = 5;\n        b = 0;\n    }\n}\n",
        );
        assert_eq!(
            merged,
            "class A {\n    void f() {\n<<<<<<< LEFT\n||||||| BASE\n        a = 0;\n=======\n        a = 5;\n>>>>>>> RIGHT\n        b = 0;\n    }\n}\n"
        );
    }
}
