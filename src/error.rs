use thiserror::Error;

use crate::matching::ScenarioKind;

/// Errors that abort a merge. Structural conflicts are not errors: they are
/// recorded in the output as conflict regions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    /// One of the revisions could not be parsed.
    #[error("parse error in {revision} revision: {message}")]
    Parse { revision: String, message: String },

    /// The merged tree violates a reconstruction invariant, such as a
    /// fixed-arity node ending up with the wrong number of children.
    /// This signals a bug in the merge engine or in the tree library.
    #[error("reconstruction of node {node} failed: {message}")]
    Reconstruction { node: usize, message: String },

    /// The selected strategy cannot serve this kind of scenario.
    #[error("unsupported merge scenario: {0}")]
    UnsupportedScenario(ScenarioKind),

    /// The line-based strategy failed on a subtree it was delegated.
    #[error("line-based merge failed: {0}")]
    LineBased(String),

    /// The cancellation token was triggered. The target tree built so far
    /// must be discarded.
    #[error("merge was cancelled")]
    Cancelled,
}
