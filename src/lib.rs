//! Structure-aware merging of diverging source files
//!
//! ## Overview
//!
//! This crate takes three revisions of a source file (base, left and
//! right) and produces a fourth version combining the changes from base
//! to left and from base to right. Instead of comparing lines, it parses
//! the revisions into syntax trees, matches the trees against each other
//! and replays both sides' changes on the matched elements, so that
//! edits which merely touch neighbouring lines don't collide.
//!
//! Where the two sides genuinely disagree, the output carries ordinary
//! conflict markers. A plain textual merge is available as a strategy of
//! its own and as a fallback, and the semistructured strategy merges
//! method bodies textually while treating declarations structurally.

pub mod artifact;
pub mod context;
pub(crate) mod cost_model;
pub mod error;
pub mod grammar;
pub mod lang_profile;
pub mod line_based;
pub(crate) mod matcher;
pub mod matching;
mod merge;
pub mod merge_result;
pub(crate) mod nway_merge;
pub(crate) mod operations;
pub(crate) mod ordered_merge;
pub(crate) mod output;
pub mod printer;
pub mod revision;
pub mod settings;
pub mod structured;
pub mod syntax;
#[cfg(test)]
pub(crate) mod test_utils;
pub(crate) mod unordered_merge;

pub use context::{CancellationToken, CostWeights, MatcherChoice, MergeContext, MergeStrategy};
pub use error::MergeError;
pub use lang_profile::LangProfile;
pub use line_based::line_based_merge;
pub use merge::merge_revisions;
pub use merge_result::MergeResult;
pub use revision::Revision;
pub use settings::DisplaySettings;
pub use structured::structured_merge;

pub(crate) fn fxhasher() -> rustc_hash::FxHasher {
    use std::hash::BuildHasher;
    rustc_hash::FxBuildHasher.build_hasher()
}
