use log::debug;
use rustc_hash::FxHashMap;

use crate::artifact::Artifact;
use crate::grammar::GrammarNode;
use crate::matching::Matchings;

/// The classical two-pass tree matcher.
///
/// Isomorphic subtrees are recognized in constant time through the
/// precomputed subtree hashes (the top-down fast path covering unchanged
/// regions). For the remaining pairs, a memoized dynamic program aligns
/// children: ordered nodes by weighted longest-common-subsequence,
/// unordered nodes by maximum-weight bipartite assignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeMatcher {
    /// How many levels below a mismatching pair the scorer keeps looking
    /// for corresponding subtrees.
    pub look_ahead: u32,
}

impl TreeMatcher {
    pub fn match_trees<'a, T: GrammarNode>(
        &self,
        left: &'a Artifact<'a, T>,
        right: &'a Artifact<'a, T>,
    ) -> Matchings<'a, T> {
        let mut scorer = Scorer::new(self.look_ahead);
        let mut matchings = Matchings::new();
        scorer.collect(left, right, &mut matchings);
        debug!(
            "matched {} node pairs between {} and {} (total score {})",
            matchings.len(),
            left.revision,
            right.revision,
            matchings.total_score()
        );
        matchings
    }
}

struct Scorer<'a, T: GrammarNode> {
    look_ahead: u32,
    memo: FxHashMap<(usize, usize), u32>,
    _phantom: std::marker::PhantomData<&'a T>,
}

impl<'a, T: GrammarNode> Scorer<'a, T> {
    fn new(look_ahead: u32) -> Self {
        Self {
            look_ahead,
            memo: FxHashMap::default(),
            _phantom: std::marker::PhantomData,
        }
    }

    /// How much of the subtrees of `l` and `r` can be brought into
    /// correspondence. Zero means the pair cannot be matched at all.
    ///
    /// A compatible pair of inner ordered nodes only scores when their
    /// children share something: two structurally similar statements with
    /// no common token are better treated as unrelated than force-matched.
    /// Leaves and unordered containers are exempt, since replacing a
    /// leaf's text and merging member sets are meaningful regardless.
    fn score(&mut self, l: &'a Artifact<'a, T>, r: &'a Artifact<'a, T>) -> u32 {
        if l.tree_hash() == r.tree_hash() {
            return l.size() as u32;
        }
        if !l.matches_level(r) {
            return self.look_around(l, r, self.look_ahead);
        }
        if let Some(&cached) = self.memo.get(&(l.id, r.id)) {
            return cached;
        }
        let (children_score, _) = self.align_children(l, r);
        let groundable =
            children_score > 0 || !l.is_ordered() || l.is_leaf() || r.is_leaf();
        let score = if groundable { children_score + 1 } else { 0 };
        self.memo.insert((l.id, r.id), score);
        score
    }

    /// After a mismatch, keep descending for a bounded number of levels,
    /// so that subtrees wrapped into new constructs still contribute to
    /// their ancestors' scores.
    fn look_around(&mut self, l: &'a Artifact<'a, T>, r: &'a Artifact<'a, T>, budget: u32) -> u32 {
        if budget == 0 {
            return 0;
        }
        let down_left = l
            .children()
            .into_iter()
            .map(|c| self.bounded_score(c, r, budget - 1))
            .max()
            .unwrap_or(0);
        let down_right = r
            .children()
            .into_iter()
            .map(|c| self.bounded_score(l, c, budget - 1))
            .max()
            .unwrap_or(0);
        down_left.max(down_right)
    }

    fn bounded_score(
        &mut self,
        l: &'a Artifact<'a, T>,
        r: &'a Artifact<'a, T>,
        budget: u32,
    ) -> u32 {
        if l.tree_hash() == r.tree_hash() || l.matches_level(r) {
            self.score(l, r)
        } else {
            self.look_around(l, r, budget)
        }
    }

    /// The best alignment of the children of a compatible pair, following
    /// the parent's ordering semantics.
    fn align_children(
        &mut self,
        l: &'a Artifact<'a, T>,
        r: &'a Artifact<'a, T>,
    ) -> (u32, Vec<(&'a Artifact<'a, T>, &'a Artifact<'a, T>)>) {
        let left_children = l.children();
        let right_children = r.children();
        if left_children.is_empty() || right_children.is_empty() {
            return (0, Vec::new());
        }
        let weights: Vec<Vec<u32>> = left_children
            .iter()
            .map(|&lc| {
                right_children
                    .iter()
                    .map(|&rc| self.score(lc, rc))
                    .collect()
            })
            .collect();
        let pairs = if l.is_ordered() {
            sequence_alignment(&weights)
        } else {
            assignment(&weights)
        };
        let total = pairs.iter().map(|&(i, j)| weights[i][j]).sum();
        let matched = pairs
            .into_iter()
            .map(|(i, j)| (left_children[i], right_children[j]))
            .collect();
        (total, matched)
    }

    /// Record the matching between two compatible subtrees, walking the
    /// alignment top-down.
    fn collect(
        &mut self,
        l: &'a Artifact<'a, T>,
        r: &'a Artifact<'a, T>,
        matchings: &mut Matchings<'a, T>,
    ) {
        if l.tree_hash() == r.tree_hash() {
            for (dl, dr) in l.dfs().into_iter().zip(r.dfs()) {
                matchings.add(dl, dr, dl.size() as u32);
            }
            return;
        }
        if !l.matches_level(r) {
            return;
        }
        let score = self.score(l, r);
        if score == 0 {
            return;
        }
        matchings.add(l, r, score);
        let (_, pairs) = self.align_children(l, r);
        for (cl, cr) in pairs {
            self.collect(cl, cr, matchings);
        }
    }
}

/// Weighted longest-common-subsequence over two child sequences: the
/// matched pairs preserve their relative order on both sides.
fn sequence_alignment(weights: &[Vec<u32>]) -> Vec<(usize, usize)> {
    let n = weights.len();
    let m = weights.first().map_or(0, Vec::len);
    let mut dp = vec![vec![0u64; m + 1]; n + 1];
    for i in 1..=n {
        for j in 1..=m {
            let pair = if weights[i - 1][j - 1] > 0 {
                dp[i - 1][j - 1] + u64::from(weights[i - 1][j - 1])
            } else {
                0
            };
            dp[i][j] = pair.max(dp[i - 1][j]).max(dp[i][j - 1]);
        }
    }
    // walk the table back, preferring matched pairs over skips so that
    // ties resolve towards the earliest pairs on both sides
    let mut pairs = Vec::new();
    let (mut i, mut j) = (n, m);
    while i > 0 && j > 0 {
        let pair = if weights[i - 1][j - 1] > 0 {
            dp[i - 1][j - 1] + u64::from(weights[i - 1][j - 1])
        } else {
            0
        };
        if pair > 0 && dp[i][j] == pair {
            pairs.push((i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if dp[i][j] == dp[i - 1][j] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    pairs.reverse();
    pairs
}

/// Maximum-weight bipartite assignment between two child sets, for
/// unordered parents. Runs the Hungarian algorithm on the complement
/// costs; pairs with zero weight are discarded from the result.
fn assignment(weights: &[Vec<u32>]) -> Vec<(usize, usize)> {
    let n = weights.len();
    let m = weights.first().map_or(0, Vec::len);
    if n == 0 || m == 0 {
        return Vec::new();
    }
    let transpose = n > m;
    let (rows, cols) = if transpose { (m, n) } else { (n, m) };
    let weight_at = |i: usize, j: usize| -> i64 {
        if transpose {
            i64::from(weights[j][i])
        } else {
            i64::from(weights[i][j])
        }
    };
    let max_weight = (0..rows)
        .flat_map(|i| (0..cols).map(move |j| (i, j)))
        .map(|(i, j)| weight_at(i, j))
        .max()
        .unwrap_or(0);

    // Hungarian algorithm over the cost matrix (max_weight - weight),
    // with 1-based potentials
    const INF: i64 = i64::MAX / 2;
    let mut u = vec![0i64; rows + 1];
    let mut v = vec![0i64; cols + 1];
    let mut p = vec![0usize; cols + 1];
    let mut way = vec![0usize; cols + 1];
    for i in 1..=rows {
        p[0] = i;
        let mut j0 = 0;
        let mut minv = vec![INF; cols + 1];
        let mut used = vec![false; cols + 1];
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = INF;
            let mut j1 = 0;
            for j in 1..=cols {
                if used[j] {
                    continue;
                }
                let cur = (max_weight - weight_at(i0 - 1, j - 1)) - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=cols {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut pairs = Vec::new();
    for j in 1..=cols {
        let i = p[j];
        if i != 0 && weight_at(i - 1, j - 1) > 0 {
            if transpose {
                pairs.push((j - 1, i - 1));
            } else {
                pairs.push((i - 1, j - 1));
            }
        }
    }
    pairs.sort_unstable();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use crate::revision::Revision;
    use crate::syntax::SynNode;
    use crate::test_utils::ctx;

    fn matcher() -> TreeMatcher {
        TreeMatcher { look_ahead: 0 }
    }

    #[test]
    fn identical_trees_are_fully_matched() {
        let ctx = ctx();
        let source = "class A {\n    int x;\n    int f() {\n        return x;\n    }\n}\n";
        let left = ctx.parse_java_rev(source, Revision::Left);
        let right = ctx.parse_java_rev(source, Revision::Right);

        let matchings = matcher().match_trees(left, right);
        assert_eq!(matchings.len(), left.size());
        assert_eq!(matchings.get_from_left(left).unwrap().id, right.id);
    }

    #[test]
    fn renamed_method_is_not_matched_but_its_class_is() {
        let ctx = ctx();
        let left = ctx.parse_java_rev(
            "class A {\n    int size() {\n        return 1;\n    }\n}\n",
            Revision::Left,
        );
        let right = ctx.parse_java_rev(
            "class A {\n    int getSize() {\n        return 1;\n    }\n}\n",
            Revision::Right,
        );

        let matchings = matcher().match_trees(left, right);
        let left_class = left.children()[0];
        let right_class = right.children()[0];
        assert_eq!(
            matchings.get_from_left(left_class).unwrap().id,
            right_class.id
        );
        let left_method = left_class
            .dfs()
            .into_iter()
            .find(|a| a.kind().as_deref() == Some("method_declaration"))
            .unwrap();
        assert_eq!(matchings.get_from_left(left_method), None);
    }

    #[test]
    fn reordered_members_match_by_label() {
        let ctx = ctx();
        let left = ctx.parse_java_rev(
            "class A {\n    int x;\n    int y;\n}\n",
            Revision::Left,
        );
        let right = ctx.parse_java_rev(
            "class A {\n    int y;\n    int x;\n}\n",
            Revision::Right,
        );

        let matchings = matcher().match_trees(left, right);
        fn field_id<'a>(tree: &'a Artifact<'a, SynNode>, name: &str) -> usize {
            tree.dfs()
                .into_iter()
                .find(|a| {
                    a.kind().as_deref() == Some("field_declaration")
                        && a.label().as_deref() == Some(name)
                })
                .unwrap()
                .id
        }
        let lx = field_id(left, "x");
        let rx = field_id(right, "x");
        let matched = left
            .dfs()
            .into_iter()
            .find(|a| a.id == lx)
            .and_then(|a| matchings.get_from_left(a))
            .unwrap();
        assert_eq!(matched.id, rx);
    }

    #[test]
    fn matching_is_deterministic() {
        let ctx = ctx();
        let left = ctx.parse_java_rev(
            "class A {\n    int x;\n    void f() {\n        x = 1;\n    }\n}\n",
            Revision::Left,
        );
        let right = ctx.parse_java_rev(
            "class A {\n    int x;\n    void f() {\n        x = 2;\n    }\n}\n",
            Revision::Right,
        );

        let first: Vec<(usize, usize)> = {
            let mut ids: Vec<_> = matcher()
                .match_trees(left, right)
                .iter()
                .map(|m| (m.left.id, m.right.id))
                .collect();
            ids.sort_unstable();
            ids
        };
        let second: Vec<(usize, usize)> = {
            let mut ids: Vec<_> = matcher()
                .match_trees(left, right)
                .iter()
                .map(|m| (m.left.id, m.right.id))
                .collect();
            ids.sort_unstable();
            ids
        };
        assert_eq!(first, second);
    }

    #[test]
    fn look_ahead_sees_through_wrapping() {
        let ctx = ctx();
        let left = ctx.parse_java_rev(
            "class A {\n    void f() {\n        x = a + b;\n    }\n}\n",
            Revision::Left,
        );
        let right = ctx.parse_java_rev(
            "class A {\n    void f() {\n        x = g(a + b);\n    }\n}\n",
            Revision::Right,
        );

        let blind = TreeMatcher { look_ahead: 0 }.match_trees(left, right);
        let sighted = TreeMatcher { look_ahead: 2 }.match_trees(left, right);
        assert!(sighted.total_score() > blind.total_score());
    }

    #[test]
    fn sequence_alignment_prefers_heavier_pairs() {
        // left child 0 can pair with either right child, but pairing with
        // right child 1 is heavier; left child 1 only pairs with right 0
        let weights = vec![vec![1, 5], vec![3, 0]];
        assert_eq!(sequence_alignment(&weights), vec![(0, 1)]);
    }

    #[test]
    fn assignment_maximizes_total_weight() {
        // the greedy choice (0->0 with weight 5) is suboptimal
        let weights = vec![vec![5, 4], vec![5, 0]];
        assert_eq!(assignment(&weights), vec![(0, 1), (1, 0)]);
    }
}
