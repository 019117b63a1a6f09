use std::fmt::{self, Display};

use rustc_hash::FxHashMap;

use crate::artifact::{Artifact, ArtifactLink};
use crate::grammar::GrammarNode;

/// A single correspondence between two artifacts of different revisions,
/// weighted by how much of their subtrees agrees.
#[derive(Debug)]
pub struct Matching<'a, T: GrammarNode> {
    pub left: &'a Artifact<'a, T>,
    pub right: &'a Artifact<'a, T>,
    pub score: u32,
}

impl<'a, T: GrammarNode> Clone for Matching<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T: GrammarNode> Copy for Matching<'a, T> {}

/// The set of correspondences between two revision trees. Every node
/// appears in at most one matching.
pub struct Matchings<'a, T: GrammarNode> {
    by_left: FxHashMap<usize, Matching<'a, T>>,
    by_right: FxHashMap<usize, Matching<'a, T>>,
}

impl<'a, T: GrammarNode> Matchings<'a, T> {
    pub fn new() -> Self {
        Self {
            by_left: FxHashMap::default(),
            by_right: FxHashMap::default(),
        }
    }

    /// Record a correspondence. A node that is already part of a matching
    /// keeps its existing one: the matchers only propose each node once.
    pub fn add(&mut self, left: &'a Artifact<'a, T>, right: &'a Artifact<'a, T>, score: u32) {
        if self.by_left.contains_key(&left.id) || self.by_right.contains_key(&right.id) {
            return;
        }
        let matching = Matching { left, right, score };
        self.by_left.insert(left.id, matching);
        self.by_right.insert(right.id, matching);
    }

    pub fn get_from_left(&self, left: &Artifact<'a, T>) -> Option<&'a Artifact<'a, T>> {
        self.by_left.get(&left.id).map(|m| m.right)
    }

    pub fn get_from_right(&self, right: &Artifact<'a, T>) -> Option<&'a Artifact<'a, T>> {
        self.by_right.get(&right.id).map(|m| m.left)
    }

    pub fn are_matched(&self, left: &Artifact<'a, T>, right: &Artifact<'a, T>) -> bool {
        self.by_left
            .get(&left.id)
            .is_some_and(|m| m.right.id == right.id)
    }

    pub fn len(&self) -> usize {
        self.by_left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_left.is_empty()
    }

    /// The sum of the scores of all matchings in the set.
    pub fn total_score(&self) -> u64 {
        self.by_left.values().map(|m| u64::from(m.score)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Matching<'a, T>> {
        self.by_left.values()
    }

    /// Write every matching onto both of its artifacts, so that the merge
    /// engines can navigate from a node to its counterparts. The stored
    /// relation is symmetric by construction.
    pub fn store_on_artifacts(&self) {
        for matching in self.by_left.values() {
            matching.left.add_match(
                matching.right.revision.clone(),
                ArtifactLink {
                    other: matching.right,
                    score: matching.score,
                },
            );
            matching.right.add_match(
                matching.left.revision.clone(),
                ArtifactLink {
                    other: matching.left,
                    score: matching.score,
                },
            );
        }
    }
}

impl<T: GrammarNode> Default for Matchings<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a merge scenario disposes of a common ancestor or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    TwoWay,
    ThreeWay,
}

impl Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TwoWay => write!(f, "two-way"),
            Self::ThreeWay => write!(f, "three-way"),
        }
    }
}

/// A (left, base, right) triple of artifacts to merge. The base is absent
/// in two-way scenarios.
#[derive(Debug, Clone, Copy)]
pub struct MergeScenario<'a, T: GrammarNode> {
    pub left: &'a Artifact<'a, T>,
    pub base: Option<&'a Artifact<'a, T>>,
    pub right: &'a Artifact<'a, T>,
}

impl<'a, T: GrammarNode> MergeScenario<'a, T> {
    pub fn three_way(
        left: &'a Artifact<'a, T>,
        base: &'a Artifact<'a, T>,
        right: &'a Artifact<'a, T>,
    ) -> Self {
        Self {
            left,
            base: Some(base),
            right,
        }
    }

    pub fn two_way(left: &'a Artifact<'a, T>, right: &'a Artifact<'a, T>) -> Self {
        Self {
            left,
            base: None,
            right,
        }
    }

    pub fn kind(&self) -> ScenarioKind {
        if self.base.is_some() {
            ScenarioKind::ThreeWay
        } else {
            ScenarioKind::TwoWay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::Revision;
    use crate::test_utils::ctx;

    #[test]
    fn each_node_matches_at_most_once() {
        let ctx = ctx();
        let left = ctx.parse_java_rev("class A { }", Revision::Left);
        let right = ctx.parse_java_rev("class A { }", Revision::Right);
        let other = ctx.parse_java_rev("class B { }", Revision::Right);

        let mut matchings = Matchings::new();
        matchings.add(left, right, 5);
        matchings.add(left, other, 7);
        assert_eq!(matchings.len(), 1);
        assert_eq!(matchings.get_from_left(left).unwrap().id, right.id);
        assert_eq!(matchings.total_score(), 5);
        assert!(matchings.are_matched(left, right));
        assert!(!matchings.are_matched(left, other));
    }

    #[test]
    fn stored_links_are_symmetric() {
        let ctx = ctx();
        let left = ctx.parse_java_rev("class A { }", Revision::Left);
        let right = ctx.parse_java_rev("class A { }", Revision::Right);

        let mut matchings = Matchings::new();
        matchings.add(left, right, 2);
        matchings.store_on_artifacts();

        assert_eq!(left.match_in(&Revision::Right).unwrap().id, right.id);
        assert_eq!(right.match_in(&Revision::Left).unwrap().id, left.id);
        assert_eq!(
            left.match_score(&Revision::Right),
            right.match_score(&Revision::Left)
        );
    }

    #[test]
    fn scenario_kinds() {
        let ctx = ctx();
        let left = ctx.parse_java_rev("class A { }", Revision::Left);
        let base = ctx.parse_java_rev("class A { }", Revision::Base);
        let right = ctx.parse_java_rev("class A { }", Revision::Right);

        assert_eq!(
            MergeScenario::three_way(left, base, right).kind(),
            ScenarioKind::ThreeWay
        );
        assert_eq!(
            MergeScenario::two_way(left, right).kind(),
            ScenarioKind::TwoWay
        );
    }
}
