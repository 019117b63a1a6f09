use std::cell::OnceCell;

use typed_arena::Arena;

use crate::artifact::{Artifact, ArtifactStore};
use crate::context::MergeContext;
use crate::lang_profile::LangProfile;
use crate::printer::render_tree;
use crate::revision::Revision;
use crate::settings::DisplaySettings;
use crate::structured::structured_merge;
use crate::syntax::{JavaLayout, SynNode, parse_artifact};

/// Provides a set of utilities to help write concise tests
pub(crate) struct TestContext<'a> {
    arena: Arena<Artifact<'a, SynNode>>,
    store: OnceCell<ArtifactStore<'a, SynNode>>,
    profile: LangProfile,
}

pub(crate) fn ctx<'a>() -> TestContext<'a> {
    TestContext {
        arena: Arena::new(),
        store: OnceCell::new(),
        profile: LangProfile::java(),
    }
}

impl<'a> TestContext<'a> {
    pub(crate) fn store(&'a self) -> &'a ArtifactStore<'a, SynNode> {
        self.store.get_or_init(|| ArtifactStore::new(&self.arena))
    }

    pub(crate) fn parse_java_rev(
        &'a self,
        source: &str,
        revision: Revision,
    ) -> &'a Artifact<'a, SynNode> {
        parse_artifact(self.store(), &self.profile, source, revision, false)
            .expect("syntax error in test source")
    }

    pub(crate) fn parse_java(&'a self, source: &str) -> &'a Artifact<'a, SynNode> {
        self.parse_java_rev(source, Revision::Left)
    }

    pub(crate) fn parse_java_opaque(&'a self, source: &str) -> &'a Artifact<'a, SynNode> {
        parse_artifact(self.store(), &self.profile, source, Revision::Left, true)
            .expect("syntax error in test source")
    }

    pub(crate) fn reprint(&self, artifact: &'a Artifact<'a, SynNode>) -> String {
        render_tree(artifact, &JavaLayout, &DisplaySettings::default())
            .expect("rendering test tree failed")
    }
}

/// Structurally merge three Java sources with default settings.
pub(crate) fn merge_java(base: &str, left: &str, right: &str) -> String {
    let profile = LangProfile::java();
    let settings = DisplaySettings::default();
    let context = MergeContext::default();
    structured_merge(base, left, right, &settings, &context, &profile)
        .expect("structured merge failed")
        .contents
}
