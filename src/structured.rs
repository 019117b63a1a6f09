use std::borrow::Cow;
use std::time::Instant;

use log::debug;
use typed_arena::Arena;

use crate::artifact::ArtifactStore;
use crate::context::{MatcherChoice, MergeContext, MergeStrategy};
use crate::cost_model::CostModelMatcher;
use crate::error::MergeError;
use crate::lang_profile::LangProfile;
use crate::matcher::TreeMatcher;
use crate::matching::{MergeScenario, ScenarioKind};
use crate::merge_result::MergeResult;
use crate::nway_merge::Merger;
use crate::printer::render_tree;
use crate::revision::Revision;
use crate::settings::{DisplaySettings, with_final_newline};
use crate::syntax::{JavaLayout, parse_artifact};

pub const STRUCTURED_METHOD: &str = "structured";
pub const SEMISTRUCTURED_METHOD: &str = "semistructured";

/// Performs a fully structured merge: parses the three revisions, matches
/// the trees pairwise, merges them and prints the target tree back to
/// source text.
///
/// An empty base turns the scenario into a two-way merge. Fails on parse
/// errors and on violated reconstruction invariants; structural conflicts
/// are not failures and end up as conflict markers in the output.
pub fn structured_merge(
    contents_base: &str,
    contents_left: &str,
    contents_right: &str,
    settings: &DisplaySettings,
    context: &MergeContext,
    lang_profile: &LangProfile,
) -> Result<MergeResult, MergeError> {
    let arena = Arena::new();
    let store = ArtifactStore::new(&arena);
    let opaque_bodies = context.strategy == MergeStrategy::Semistructured;

    let start = Instant::now();
    let base = parse_artifact(
        &store,
        lang_profile,
        contents_base,
        Revision::Base,
        opaque_bodies,
    )?;
    let left = parse_artifact(
        &store,
        lang_profile,
        contents_left,
        Revision::Left,
        opaque_bodies,
    )?;
    let right = parse_artifact(
        &store,
        lang_profile,
        contents_right,
        Revision::Right,
        opaque_bodies,
    )?;
    debug!("parsing all three revisions took {:?}", start.elapsed());

    let scenario = if contents_base.trim().is_empty() {
        MergeScenario::two_way(left, right)
    } else {
        MergeScenario::three_way(left, base, right)
    };

    let start = Instant::now();
    match context.matcher {
        MatcherChoice::Classic => {
            let matcher = TreeMatcher {
                look_ahead: context.look_ahead,
            };
            if scenario.kind() == ScenarioKind::ThreeWay {
                matcher.match_trees(left, base).store_on_artifacts();
                matcher.match_trees(right, base).store_on_artifacts();
            }
            matcher.match_trees(left, right).store_on_artifacts();
        }
        MatcherChoice::CostModel => {
            // the cost model scores ancestry against a common ancestor;
            // without one the scenario cannot be served
            if scenario.kind() == ScenarioKind::TwoWay {
                return Err(MergeError::UnsupportedScenario(ScenarioKind::TwoWay));
            }
            let matcher = CostModelMatcher {
                weights: context.weights,
            };
            matcher.match_trees(left, base).store_on_artifacts();
            matcher.match_trees(right, base).store_on_artifacts();
            matcher.match_trees(left, right).store_on_artifacts();
        }
    }
    debug!("matching the revisions took {:?}", start.elapsed());

    let merger = Merger {
        store: &store,
        context,
        settings,
    };
    let target = merger.merge(scenario)?;
    target.validate_reconstruction()?;

    let rendered = render_tree(target, &JavaLayout, settings)?;
    let contents = with_final_newline(Cow::from(rendered)).into_owned();
    let method = if opaque_bodies {
        SEMISTRUCTURED_METHOD
    } else {
        STRUCTURED_METHOD
    };
    Ok(MergeResult::new(contents, method, settings))
}
