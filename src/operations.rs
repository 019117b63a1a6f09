use std::fmt::{self, Display};

use log::debug;

use crate::artifact::Artifact;
use crate::error::MergeError;
use crate::grammar::GrammarNode;
use crate::matching::MergeScenario;
use crate::nway_merge::Merger;

/// The operations a merge engine emits against the target tree. They are
/// plain values; applying an operation twice with the same input state has
/// no further effect, which the applier enforces through the `merged`
/// flags.
pub enum Operation<'a, T: GrammarNode> {
    /// Deep-clone an artifact (keeping its revision) into the target.
    Add {
        artifact: &'a Artifact<'a, T>,
        parent: Option<&'a Artifact<'a, T>>,
        position: Option<usize>,
    },
    /// Exclude an artifact from the target. The source trees are not
    /// touched beyond the consumption flag.
    Delete { artifact: &'a Artifact<'a, T> },
    /// Recursively merge a scenario into a fresh target node.
    Merge {
        scenario: MergeScenario<'a, T>,
        parent: Option<&'a Artifact<'a, T>>,
    },
    /// Record an unresolvable difference as a conflict pseudo-node
    /// carrying clones of both alternatives.
    Conflict {
        left: Option<&'a Artifact<'a, T>>,
        base: Option<&'a Artifact<'a, T>>,
        right: Option<&'a Artifact<'a, T>>,
        parent: Option<&'a Artifact<'a, T>>,
        position: Option<usize>,
        left_name: String,
        right_name: String,
    },
}

impl<T: GrammarNode> Display for Operation<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { artifact, .. } => write!(f, "add {artifact:?}"),
            Self::Delete { artifact } => write!(f, "delete {artifact:?}"),
            Self::Merge { scenario, .. } => write!(
                f,
                "merge {:?} <- {:?} -> {:?}",
                scenario.left, scenario.base, scenario.right
            ),
            Self::Conflict { left, right, .. } => {
                write!(f, "conflict {left:?} vs {right:?}")
            }
        }
    }
}

impl<'a, T: GrammarNode> Merger<'a, '_, T> {
    /// Execute one operation against the target tree, returning the
    /// target node it created, if any.
    pub(crate) fn apply(
        &self,
        operation: Operation<'a, T>,
    ) -> Result<Option<&'a Artifact<'a, T>>, MergeError> {
        self.context.check_cancelled()?;
        debug!("applying: {operation}");
        match operation {
            Operation::Add {
                artifact,
                parent,
                position,
            } => {
                if artifact.is_merged() {
                    return Ok(None);
                }
                let clone = self.store.clone_subtree(artifact);
                self.attach(clone, parent, position);
                artifact.set_merged();
                Ok(Some(clone))
            }
            Operation::Delete { artifact } => {
                artifact.set_merged();
                Ok(None)
            }
            Operation::Merge { scenario, parent } => {
                self.merge_node(scenario, parent, None).map(Some)
            }
            Operation::Conflict {
                left,
                base,
                right,
                parent,
                position,
                left_name,
                right_name,
            } => {
                if left.or(right).is_some_and(Artifact::is_merged) {
                    return Ok(None);
                }
                let conflict = self
                    .store
                    .create_conflict(left, base, right, &left_name, &right_name);
                self.attach(conflict, parent, position);
                for side in [left, base, right].into_iter().flatten() {
                    side.set_merged();
                }
                Ok(Some(conflict))
            }
        }
    }
}
