use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::MergeError;

/// The merging technique to apply to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Fully syntax-aware merging of the parsed revisions.
    #[default]
    Structured,
    /// Plain textual merging with the diff3 algorithm.
    LineBased,
    /// Syntax-aware merging, but with method and constructor bodies
    /// treated as opaque text and merged textually.
    Semistructured,
    /// Line-based first; structured merging takes over when the textual
    /// merge has conflicts.
    Combined,
}

/// Which tree matcher to use to align the revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatcherChoice {
    /// The two-pass matcher: isomorphic subtree detection followed by a
    /// dynamic program over children (sequence alignment for ordered
    /// nodes, assignment for unordered ones).
    #[default]
    Classic,
    /// The matcher that searches for the matching minimizing a weighted
    /// cost over renamings, ancestry violations and sibling breakups.
    CostModel,
}

/// Weights of the cost-model matcher. All weights must be non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostWeights {
    /// Cost of leaving a node unmatched
    pub wn: f64,
    /// Cost of matching two nodes which disagree on their own label
    pub wr: f64,
    /// Cost per child whose counterpart ends up under a different parent
    pub wa: f64,
    /// Cost of scattering a sibling group over several parents
    pub ws: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            wn: 1.0,
            wr: 0.4,
            wa: 0.4,
            ws: 0.2,
        }
    }
}

/// A token that lets the caller abort a long-running merge. It is checked
/// at node boundaries; after cancellation the partially built target is
/// discarded.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// All the knobs of a single merge invocation. There is no global state:
/// two merges with separate contexts are fully independent.
#[derive(Debug, Clone, Default)]
pub struct MergeContext {
    pub strategy: MergeStrategy,
    pub matcher: MatcherChoice,
    /// Suppress informational output about the merge
    pub quiet: bool,
    /// Compute the merge but do not render its output
    pub pretend: bool,
    pub weights: CostWeights,
    /// How many levels below a mismatching node the matcher keeps
    /// looking for corresponding subtrees
    pub look_ahead: u32,
    pub cancellation: CancellationToken,
}

impl MergeContext {
    /// Bail out if the caller has cancelled this merge.
    pub(crate) fn check_cancelled(&self) -> Result<(), MergeError> {
        if self.cancellation.is_cancelled() {
            Err(MergeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_round_trip() {
        let ctx = MergeContext::default();
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancellation.cancel();
        assert_eq!(ctx.check_cancelled(), Err(MergeError::Cancelled));
    }
}
