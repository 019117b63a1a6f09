//! The strategy layer: picks between textual and structured merging.

use log::{debug, info};

use crate::context::{MergeContext, MergeStrategy};
use crate::error::MergeError;
use crate::lang_profile::LangProfile;
use crate::line_based::line_based_merge;
use crate::merge_result::MergeResult;
use crate::settings::{DisplaySettings, normalize_to_lf};
use crate::structured::structured_merge;

/// Merge three revisions of a file with the strategy selected in the
/// context.
///
/// The combined strategy merges textually first and keeps that result
/// when it is conflict-free; otherwise the structured merge takes over,
/// falling back to the textual result if it fails with an error.
pub fn merge_revisions(
    contents_base: &str,
    contents_left: &str,
    contents_right: &str,
    settings: &DisplaySettings,
    context: &MergeContext,
    lang_profile: &LangProfile,
) -> Result<MergeResult, MergeError> {
    let base = normalize_to_lf(contents_base);
    let left = normalize_to_lf(contents_left);
    let right = normalize_to_lf(contents_right);

    let result = match context.strategy {
        MergeStrategy::LineBased => line_based_merge(&base, &left, &right, settings),
        MergeStrategy::Structured | MergeStrategy::Semistructured => {
            structured_merge(&base, &left, &right, settings, context, lang_profile)?
        }
        MergeStrategy::Combined => {
            let textual = line_based_merge(&base, &left, &right, settings);
            if !textual.has_conflicts() {
                textual
            } else {
                let structured_context = MergeContext {
                    strategy: MergeStrategy::Structured,
                    ..context.clone()
                };
                match structured_merge(
                    &base,
                    &left,
                    &right,
                    settings,
                    &structured_context,
                    lang_profile,
                ) {
                    Ok(structured) => structured,
                    Err(err) => {
                        debug!("structured merge failed ({err}), keeping the textual merge");
                        textual
                    }
                }
            }
        }
    };

    if !context.quiet {
        info!(
            "merged with {}: {} conflict(s), mass {}",
            result.method, result.conflict_count, result.conflict_mass
        );
    }
    if context.pretend {
        Ok(result.without_contents())
    } else {
        Ok(result)
    }
}
