use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::artifact::Artifact;
use crate::context::CostWeights;
use crate::grammar::GrammarNode;
use crate::matcher::TreeMatcher;
use crate::matching::Matchings;

/// Above this product of tree sizes, the exhaustive search is skipped and
/// the seed matching is returned as-is.
const SEARCH_LIMIT: usize = 4096;

const EPS: f64 = 1e-9;

/// The matcher that evaluates whole matchings by a weighted cost over
/// renamings, ancestry violations and sibling-group breakups, and
/// searches for the cheapest one with branch-and-bound.
///
/// Unlike the two-pass matcher, it can match nodes whose labels disagree,
/// paying the renaming weight instead of two no-match weights.
#[derive(Debug, Clone, Copy)]
pub struct CostModelMatcher {
    pub weights: CostWeights,
}

impl CostModelMatcher {
    pub fn match_trees<'a, T: GrammarNode>(
        &self,
        left: &'a Artifact<'a, T>,
        right: &'a Artifact<'a, T>,
    ) -> Matchings<'a, T> {
        let left_nodes = left.dfs();
        let right_nodes = right.dfs();
        let evaluator = Evaluator {
            weights: self.weights,
            normalization: (left_nodes.len() + right_nodes.len()) as f64,
            max_right_degree: right_nodes.iter().map(|r| r.child_count()).max().unwrap_or(0),
        };

        // seed the search with the matching of the two-pass matcher, so
        // that the result is never worse than it
        let seed = TreeMatcher { look_ahead: 0 }.match_trees(left, right);
        let mut seed_assignment = PartialMatching::new();
        for &l in &left_nodes {
            seed_assignment.assign(l, seed.get_from_left(l));
        }
        let seed_cost = evaluator.cost(&seed_assignment, &left_nodes, &right_nodes);
        debug!("cost of the seed matching: {seed_cost}");

        let mut best = Best {
            cost: seed_cost,
            assignment: seed_assignment.snapshot(),
        };

        if left_nodes.len() * right_nodes.len() <= SEARCH_LIMIT {
            let candidates = candidate_table(&left_nodes, &right_nodes);
            let mut partial = PartialMatching::new();
            evaluator.search(
                0,
                &left_nodes,
                &right_nodes,
                &candidates,
                &mut partial,
                &mut best,
            );
            debug!("cost of the best matching found: {}", best.cost);
        } else {
            debug!(
                "trees too large for cost-model search ({} x {} nodes), keeping the seed matching",
                left_nodes.len(),
                right_nodes.len()
            );
        }

        let right_by_id: FxHashMap<usize, &'a Artifact<'a, T>> =
            right_nodes.iter().map(|r| (r.id, *r)).collect();
        let mut matchings = Matchings::new();
        for &l in &left_nodes {
            if let Some(Some(rid)) = best.assignment.get(&l.id)
                && let Some(&r) = right_by_id.get(rid)
            {
                matchings.add(l, r, l.size().min(r.size()) as u32);
            }
        }
        matchings
    }
}

/// For each left node, the right nodes it could be assigned to: nodes of
/// the same kind, cheapest candidates first, then by number for
/// determinism.
fn candidate_table<'a, T: GrammarNode>(
    left_nodes: &[&'a Artifact<'a, T>],
    right_nodes: &[&'a Artifact<'a, T>],
) -> FxHashMap<usize, Vec<&'a Artifact<'a, T>>> {
    left_nodes
        .iter()
        .map(|l| {
            let mut candidates: Vec<&'a Artifact<'a, T>> = right_nodes
                .iter()
                .copied()
                .filter(|r| l.kind() == r.kind())
                .collect();
            candidates.sort_by_key(|r| (!l.matches_level(r), r.number()));
            (l.id, candidates)
        })
        .collect()
}

/// One record per left node: matched to a right node, or a no-match.
/// Both directions are indexed, keeping image lookups constant-time.
struct PartialMatching<'a, T: GrammarNode> {
    left: FxHashMap<usize, Option<&'a Artifact<'a, T>>>,
    right: FxHashMap<usize, Option<&'a Artifact<'a, T>>>,
}

impl<'a, T: GrammarNode> PartialMatching<'a, T> {
    fn new() -> Self {
        Self {
            left: FxHashMap::default(),
            right: FxHashMap::default(),
        }
    }

    fn assign(&mut self, l: &'a Artifact<'a, T>, r: Option<&'a Artifact<'a, T>>) {
        self.left.insert(l.id, r);
        if let Some(r) = r {
            self.right.insert(r.id, Some(l));
        }
    }

    fn unassign(&mut self, l: &Artifact<'a, T>, r: Option<&Artifact<'a, T>>) {
        self.left.remove(&l.id);
        if let Some(r) = r {
            self.right.remove(&r.id);
        }
    }

    /// The record of a node, on whichever side it lives.
    /// `None` means the node is still undecided.
    fn record(&self, node: &Artifact<'a, T>, from_left: bool) -> Option<Option<&'a Artifact<'a, T>>> {
        if from_left {
            self.left.get(&node.id).copied()
        } else {
            self.right.get(&node.id).copied()
        }
    }

    fn is_right_assigned(&self, r: &Artifact<'a, T>) -> bool {
        self.right.contains_key(&r.id)
    }

    fn snapshot(&self) -> FxHashMap<usize, Option<usize>> {
        self.left
            .iter()
            .map(|(lid, r)| (*lid, r.map(|r| r.id)))
            .collect()
    }
}

struct Best {
    cost: f64,
    assignment: FxHashMap<usize, Option<usize>>,
}

/// Which flavour of the cost to compute for a partial matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundKind {
    Exact,
    Lower,
    Upper,
}

/// Some record already assigns `child` to something which is neither a
/// no-match nor a child of the opposite node (an any-match over the
/// records).
fn definite_ancestry_violation<T: GrammarNode>(
    record: Option<Option<&Artifact<'_, T>>>,
    opposite_children: &FxHashSet<usize>,
) -> bool {
    match record {
        Some(Some(image)) => !opposite_children.contains(&image.id),
        Some(None) | None => false,
    }
}

/// No record assigns `child` to a child of the opposite node or to a
/// no-match. This is the negation of the previous any-match, so an
/// undecided child still counts as a potential violation.
fn possible_ancestry_violation<T: GrammarNode>(
    record: Option<Option<&Artifact<'_, T>>>,
    opposite_children: &FxHashSet<usize>,
) -> bool {
    match record {
        Some(Some(image)) => !opposite_children.contains(&image.id),
        Some(None) => false,
        None => true,
    }
}

struct Evaluator {
    weights: CostWeights,
    normalization: f64,
    max_right_degree: usize,
}

impl Evaluator {
    /// The cost of one matched record, under the requested bound flavour.
    fn pair_cost<'a, T: GrammarNode>(
        &self,
        l: &'a Artifact<'a, T>,
        r: &'a Artifact<'a, T>,
        g: &PartialMatching<'a, T>,
        bound: BoundKind,
    ) -> f64 {
        let renaming = if l.matches_level(r) { 0.0 } else { 1.0 };
        let ancestry = self.ancestry_violations(l, r, g, true, bound)
            + self.ancestry_violations(r, l, g, false, bound);
        let sibling =
            self.sibling_score(l, r, g, true, bound) + self.sibling_score(r, l, g, false, bound);
        self.weights.wr * renaming + self.weights.wa * ancestry + self.weights.ws * sibling
    }

    /// How many children of `node` have their image outside the children
    /// of `opposite`.
    fn ancestry_violations<'a, T: GrammarNode>(
        &self,
        node: &'a Artifact<'a, T>,
        opposite: &'a Artifact<'a, T>,
        g: &PartialMatching<'a, T>,
        from_left: bool,
        bound: BoundKind,
    ) -> f64 {
        let opposite_children: FxHashSet<usize> =
            opposite.children().iter().map(|c| c.id).collect();
        node.children()
            .into_iter()
            .filter(|child| {
                let record = g.record(child, from_left);
                match bound {
                    BoundKind::Exact | BoundKind::Lower => {
                        definite_ancestry_violation(record, &opposite_children)
                    }
                    BoundKind::Upper => possible_ancestry_violation(record, &opposite_children),
                }
            })
            .count() as f64
    }

    /// How badly matching `node` with `opposite` scatters the siblings of
    /// `node` over several parents on the other side.
    fn sibling_score<'a, T: GrammarNode>(
        &self,
        node: &'a Artifact<'a, T>,
        opposite: &'a Artifact<'a, T>,
        g: &PartialMatching<'a, T>,
        from_left: bool,
        bound: BoundKind,
    ) -> f64 {
        let Some(parent) = node.parent() else {
            return 0.0;
        };
        let opposite_parent = opposite.parent().map(|p| p.id);
        let siblings: Vec<_> = parent
            .children()
            .into_iter()
            .filter(|s| s.id != node.id)
            .collect();
        if siblings.is_empty() {
            return 0.0;
        }
        let mut divergent = 0usize;
        let mut invariant = 0usize;
        let mut undecided = 0usize;
        let mut families: FxHashSet<Option<usize>> = FxHashSet::default();
        for sibling in &siblings {
            match g.record(sibling, from_left) {
                Some(Some(image)) => {
                    let family = image.parent().map(|p| p.id);
                    families.insert(family);
                    if family == opposite_parent {
                        invariant += 1;
                    } else {
                        divergent += 1;
                    }
                }
                Some(None) => {}
                None => undecided += 1,
            }
        }
        match bound {
            BoundKind::Exact => divergent as f64 / (invariant + families.len()).max(1) as f64,
            // the denominator can never exceed twice the sibling count,
            // and the definite divergences can only grow
            BoundKind::Lower => divergent as f64 / (2 * siblings.len()) as f64,
            BoundKind::Upper => {
                (divergent + undecided) as f64 / (invariant + families.len()).max(1) as f64
            }
        }
    }

    /// The exact cost of a complete matching.
    fn cost<'a, T: GrammarNode>(
        &self,
        g: &PartialMatching<'a, T>,
        left_nodes: &[&'a Artifact<'a, T>],
        right_nodes: &[&'a Artifact<'a, T>],
    ) -> f64 {
        let mut total = 0.0;
        for &l in left_nodes {
            total += match g.record(l, true) {
                Some(Some(r)) => self.pair_cost(l, r, g, BoundKind::Exact),
                Some(None) | None => self.weights.wn,
            };
        }
        let unmatched_right = right_nodes
            .iter()
            .filter(|r| !g.is_right_assigned(r))
            .count();
        total += self.weights.wn * unmatched_right as f64;
        total / self.normalization
    }

    /// A cost that no completion of the partial matching can go below.
    fn lower_bound<'a, T: GrammarNode>(&self, g: &PartialMatching<'a, T>) -> f64 {
        let mut total = 0.0;
        for record in g.left.values() {
            total += match *record {
                Some(r) => {
                    let l = g.record(r, false).flatten().expect("asymmetric record");
                    self.pair_cost(l, r, g, BoundKind::Lower)
                }
                None => self.weights.wn,
            };
        }
        total / self.normalization
    }

    /// A cost that no completion of the partial matching can exceed.
    fn upper_bound<'a, T: GrammarNode>(
        &self,
        g: &PartialMatching<'a, T>,
        left_nodes: &[&'a Artifact<'a, T>],
        right_nodes: &[&'a Artifact<'a, T>],
    ) -> f64 {
        let mut total = 0.0;
        for &l in left_nodes {
            total += match g.record(l, true) {
                Some(Some(r)) => self.pair_cost(l, r, g, BoundKind::Upper),
                Some(None) => self.weights.wn,
                None => self.worst_record_cost(l),
            };
        }
        let undecided_right = right_nodes
            .iter()
            .filter(|r| !g.is_right_assigned(r))
            .count();
        total += self.weights.wn * undecided_right as f64;
        total / self.normalization
    }

    /// The most a record for this left node could ever cost.
    fn worst_record_cost<T: GrammarNode>(&self, l: &Artifact<'_, T>) -> f64 {
        let worst_pair = self.weights.wr
            + self.weights.wa * (l.child_count() + self.max_right_degree) as f64
            + self.weights.ws * 2.0;
        self.weights.wn.max(worst_pair)
    }

    #[allow(clippy::too_many_arguments)]
    fn search<'a, T: GrammarNode>(
        &self,
        index: usize,
        left_nodes: &[&'a Artifact<'a, T>],
        right_nodes: &[&'a Artifact<'a, T>],
        candidates: &FxHashMap<usize, Vec<&'a Artifact<'a, T>>>,
        partial: &mut PartialMatching<'a, T>,
        best: &mut Best,
    ) {
        if self.lower_bound(partial) >= best.cost - EPS {
            return;
        }
        if index == left_nodes.len() {
            let cost = self.cost(partial, left_nodes, right_nodes);
            if cost < best.cost - EPS {
                best.cost = cost;
                best.assignment = partial.snapshot();
            }
            return;
        }
        let l = left_nodes[index];
        for r in candidates[&l.id].iter().copied() {
            if partial.is_right_assigned(r) {
                continue;
            }
            partial.assign(l, Some(r));
            self.search(index + 1, left_nodes, right_nodes, candidates, partial, best);
            partial.unassign(l, Some(r));
        }
        partial.assign(l, None);
        self.search(index + 1, left_nodes, right_nodes, candidates, partial, best);
        partial.unassign(l, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::Revision;
    use crate::test_utils::ctx;

    fn cm() -> CostModelMatcher {
        CostModelMatcher {
            weights: CostWeights::default(),
        }
    }

    #[test]
    fn identical_trees_cost_nothing() {
        let ctx = ctx();
        let source = "class A {\n    int x;\n}\n";
        let left = ctx.parse_java_rev(source, Revision::Left);
        let right = ctx.parse_java_rev(source, Revision::Right);

        let matchings = cm().match_trees(left, right);
        assert_eq!(matchings.len(), left.size());

        let evaluator = Evaluator {
            weights: CostWeights::default(),
            normalization: (left.size() + right.size()) as f64,
            max_right_degree: 3,
        };
        let mut g = PartialMatching::new();
        for l in left.dfs() {
            g.assign(l, matchings.get_from_left(l));
        }
        let cost = evaluator.cost(&g, &left.dfs(), &right.dfs());
        assert!(cost.abs() < EPS);
    }

    #[test]
    fn renamed_nodes_are_still_matched() {
        let ctx = ctx();
        let left = ctx.parse_java_rev(
            "class A {\n    int size() {\n        return 1;\n    }\n}\n",
            Revision::Left,
        );
        let right = ctx.parse_java_rev(
            "class A {\n    int getSize() {\n        return 1;\n    }\n}\n",
            Revision::Right,
        );

        let matchings = cm().match_trees(left, right);
        let left_method = left
            .dfs()
            .into_iter()
            .find(|a| a.kind().as_deref() == Some("method_declaration"))
            .unwrap();
        let matched = matchings.get_from_left(left_method).unwrap();
        assert_eq!(matched.kind().as_deref(), Some("method_declaration"));
        assert_eq!(matched.label().as_deref(), Some("getSize"));
    }

    #[test]
    fn indicator_polarity_differs_on_undecided_nodes() {
        let ctx = ctx();
        let left = ctx.parse_java_rev("class A {\n    int x;\n}\n", Revision::Left);
        let g: PartialMatching<'_, crate::syntax::SynNode> = PartialMatching::new();
        let child = left.children()[0];
        let record = g.record(child, true);
        let opposite_children = FxHashSet::default();
        assert!(!definite_ancestry_violation(record, &opposite_children));
        assert!(possible_ancestry_violation(record, &opposite_children));
    }

    #[test]
    fn bounds_bracket_the_cost_monotonically() {
        let ctx = ctx();
        let left = ctx.parse_java_rev("class A {\n    int x;\n    int y;\n}\n", Revision::Left);
        let right = ctx.parse_java_rev("class A {\n    int x;\n    int z;\n}\n", Revision::Right);
        let left_nodes = left.dfs();
        let right_nodes = right.dfs();
        let evaluator = Evaluator {
            weights: CostWeights::default(),
            normalization: (left_nodes.len() + right_nodes.len()) as f64,
            max_right_degree: right_nodes.iter().map(|r| r.child_count()).max().unwrap(),
        };

        // a complete, sensible assignment to extend towards
        let full = TreeMatcher { look_ahead: 0 }.match_trees(left, right);

        let mut small = PartialMatching::new();
        small.assign(left_nodes[0], full.get_from_left(left_nodes[0]));
        let lower_small = evaluator.lower_bound(&small);
        let upper_small = evaluator.upper_bound(&small, &left_nodes, &right_nodes);

        let mut large = PartialMatching::new();
        large.assign(left_nodes[0], full.get_from_left(left_nodes[0]));
        large.assign(left_nodes[1], full.get_from_left(left_nodes[1]));
        let lower_large = evaluator.lower_bound(&large);

        let mut complete = PartialMatching::new();
        for &l in &left_nodes {
            complete.assign(l, full.get_from_left(l));
        }
        let cost = evaluator.cost(&complete, &left_nodes, &right_nodes);
        let lower_complete = evaluator.lower_bound(&complete);

        assert!(lower_small <= lower_large + EPS);
        assert!(lower_large <= lower_complete + EPS);
        assert!(lower_complete <= cost + EPS);
        assert!(cost <= upper_small + EPS);
    }
}
