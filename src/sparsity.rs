//! Structural sparsity patterns and the graph algorithms built on them.
//!
//! A [`SparsityPattern`] lists the positions of a matrix that may hold non-zero
//! values. Besides the usual queries it provides the three structural tools the
//! rootfinder needs:
//!
//! - [`structural_rank`](SparsityPattern::structural_rank): size of a maximum
//!   bipartite matching between rows and columns. A square pattern with rank
//!   below its order is singular for every numeric assignment.
//! - [`BlockTriangular`]: matching plus diagonal blocks of a square pattern,
//!   computed once and then used for the boolean shadow of a linear solve,
//!   propagating dependency lanes through `J·x = b` or `Jᵀ·x = b` in `O(nnz)`.
//! - [`column_coloring`](SparsityPattern::column_coloring): greedy coloring of the
//!   column-intersection graph, so structurally orthogonal columns can share one
//!   forward sweep when a Jacobian is compressed.

use std::ops::Range;

use crate::bits::Bvec;

/// Sparsity pattern of an `nrow × ncol` matrix in COO format.
///
/// Entries are sorted column-major, i.e. by `(col, row)`, without duplicates.
/// Numeric data attached to a pattern (Jacobian values, oracle inputs) is stored
/// in the same order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SparsityPattern {
    /// Number of rows.
    pub nrow: usize,
    /// Number of columns.
    pub ncol: usize,
    /// Row index of each entry.
    pub rows: Vec<u32>,
    /// Column index of each entry.
    pub cols: Vec<u32>,
}

impl SparsityPattern {
    /// Build a pattern from `(row, col)` positions in any order. Duplicates are merged.
    ///
    /// # Panics
    ///
    /// Panics if a position lies outside `nrow × ncol`.
    pub fn new(nrow: usize, ncol: usize, entries: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut keyed: Vec<(u32, u32)> = entries
            .into_iter()
            .map(|(r, c)| {
                assert!(
                    r < nrow && c < ncol,
                    "entry ({}, {}) outside {}x{} pattern",
                    r,
                    c,
                    nrow,
                    ncol
                );
                (c as u32, r as u32)
            })
            .collect();
        keyed.sort_unstable();
        keyed.dedup();

        SparsityPattern {
            nrow,
            ncol,
            rows: keyed.iter().map(|&(_, r)| r).collect(),
            cols: keyed.iter().map(|&(c, _)| c).collect(),
        }
    }

    /// Fully dense pattern.
    pub fn dense(nrow: usize, ncol: usize) -> Self {
        Self::new(
            nrow,
            ncol,
            (0..ncol).flat_map(|c| (0..nrow).map(move |r| (r, c))),
        )
    }

    /// Dense column vector of length `n`.
    pub fn column(n: usize) -> Self {
        Self::dense(n, 1)
    }

    /// Pattern without entries.
    pub fn empty(nrow: usize, ncol: usize) -> Self {
        SparsityPattern {
            nrow,
            ncol,
            rows: Vec::new(),
            cols: Vec::new(),
        }
    }

    /// Square diagonal pattern of order `n`.
    pub fn diagonal(n: usize) -> Self {
        Self::new(n, n, (0..n).map(|i| (i, i)))
    }

    /// Number of structural non-zeros.
    pub fn nnz(&self) -> usize {
        self.rows.len()
    }

    /// Whether the pattern has no entries.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether every position is structurally non-zero.
    pub fn is_dense(&self) -> bool {
        self.nnz() == self.nrow * self.ncol
    }

    /// Whether the matrix has exactly one column.
    pub fn is_column(&self) -> bool {
        self.ncol == 1
    }

    pub fn is_square(&self) -> bool {
        self.nrow == self.ncol
    }

    /// Iterate over `(row, col)` positions in storage order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows
            .iter()
            .zip(self.cols.iter())
            .map(|(&r, &c)| (r as usize, c as usize))
    }

    /// Storage index of position `(row, col)`, if present.
    pub fn find(&self, row: usize, col: usize) -> Option<usize> {
        let key = (col as u32, row as u32);
        let mut lo = 0usize;
        let mut hi = self.nnz();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let k = (self.cols[mid], self.rows[mid]);
            if k < key {
                lo = mid + 1;
            } else if k > key {
                hi = mid;
            } else {
                return Some(mid);
            }
        }
        None
    }

    /// Whether position `(row, col)` is structurally non-zero.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.find(row, col).is_some()
    }

    /// Column indices present in each row.
    pub fn row_lists(&self) -> Vec<Vec<usize>> {
        let mut lists = vec![Vec::new(); self.nrow];
        for (r, c) in self.entries() {
            lists[r].push(c);
        }
        lists
    }

    /// Row indices present in each column.
    pub fn col_lists(&self) -> Vec<Vec<usize>> {
        let mut lists = vec![Vec::new(); self.ncol];
        for (r, c) in self.entries() {
            lists[c].push(r);
        }
        lists
    }

    /// Transposed pattern, plus `map[k]` = storage index in `self` of entry `k` of the result.
    pub fn transpose(&self) -> (SparsityPattern, Vec<usize>) {
        let mut keyed: Vec<(u32, u32, usize)> = self
            .rows
            .iter()
            .zip(self.cols.iter())
            .enumerate()
            .map(|(k, (&r, &c))| (r, c, k))
            .collect();
        // Column-major order of the transpose is row-major order of self.
        keyed.sort_unstable();

        let pattern = SparsityPattern {
            nrow: self.ncol,
            ncol: self.nrow,
            rows: keyed.iter().map(|&(_, c, _)| c).collect(),
            cols: keyed.iter().map(|&(r, _, _)| r).collect(),
        };
        let map = keyed.iter().map(|&(_, _, k)| k).collect();
        (pattern, map)
    }

    /// Extract the sub-block `rows × cols`, re-indexed from zero.
    ///
    /// Returns the block and `map[k]` = storage index in `self` of block entry `k`.
    pub fn block(&self, rows: Range<usize>, cols: Range<usize>) -> (SparsityPattern, Vec<usize>) {
        let mut out_rows = Vec::new();
        let mut out_cols = Vec::new();
        let mut map = Vec::new();
        for (k, (r, c)) in self.entries().enumerate() {
            if rows.contains(&r) && cols.contains(&c) {
                out_rows.push((r - rows.start) as u32);
                out_cols.push((c - cols.start) as u32);
                map.push(k);
            }
        }
        // Column-major order is preserved by the filter.
        let pattern = SparsityPattern {
            nrow: rows.len(),
            ncol: cols.len(),
            rows: out_rows,
            cols: out_cols,
        };
        (pattern, map)
    }

    /// Maximum bipartite matching between rows and columns.
    ///
    /// Returns `matched[r] = Some(c)` for each matched row. Each row first takes
    /// any free column it has; only rows without one search an augmenting path.
    pub fn matching(&self) -> Vec<Option<usize>> {
        max_matching(self.nrow, self.ncol, &self.row_lists())
    }

    /// Structural rank: the size of a maximum matching.
    pub fn structural_rank(&self) -> usize {
        self.matching().iter().filter(|m| m.is_some()).count()
    }

    /// Whether no numeric assignment can make this pattern an invertible matrix.
    pub fn is_singular(&self) -> bool {
        !self.is_square() || self.structural_rank() < self.nrow
    }

    /// Boolean shadow of a linear solve.
    ///
    /// Builds a [`BlockTriangular`] form and solves once with it; callers that
    /// solve repeatedly with one pattern should keep the form instead.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is not square or the slices do not have its order.
    pub fn spsolve(&self, rhs: &[Bvec], sol: &mut [Bvec], transpose: bool) {
        BlockTriangular::new(self).solve(rhs, sol, transpose);
    }

    /// Greedy coloring of the column-intersection graph.
    ///
    /// Two columns conflict when they share a row; columns of one color can be
    /// seeded together in a single forward sweep and their entries recovered
    /// without cancellation. Columns are visited in decreasing-degree order.
    ///
    /// Returns `(colors, num_colors)` where `colors[c]` is the color of column `c`.
    pub fn column_coloring(&self) -> (Vec<u32>, u32) {
        let n = self.ncol;
        if n == 0 {
            return (Vec::new(), 0);
        }
        let by_row = self.row_lists();
        let by_col = self.col_lists();

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| by_col[b].len().cmp(&by_col[a].len()));

        let mut colors = vec![u32::MAX; n];
        let mut num_colors = 0u32;
        let mut used: Vec<bool> = Vec::new();

        for &c in &order {
            used.clear();
            used.resize(num_colors as usize + 1, false);
            for &r in &by_col[c] {
                for &other in &by_row[r] {
                    let k = colors[other];
                    if k != u32::MAX {
                        used[k as usize] = true;
                    }
                }
            }
            let color = used.iter().position(|&u| !u).unwrap_or(used.len()) as u32;
            colors[c] = color;
            num_colors = num_colors.max(color + 1);
        }

        (colors, num_colors)
    }
}

/// Maximum matching on the bipartite row/column graph given by `adj`.
fn max_matching(nrow: usize, ncol: usize, adj: &[Vec<usize>]) -> Vec<Option<usize>> {
    let mut col_owner: Vec<Option<usize>> = vec![None; ncol];
    // Columns before `lookahead[r]` in `adj[r]` are known to be matched
    let mut lookahead = vec![0usize; nrow];
    // `visited[c] == r` marks column `c` as seen by the search rooted at row `r`
    let mut visited = vec![usize::MAX; ncol];
    let mut stack: Vec<Frame> = Vec::new();

    for r in 0..nrow {
        augment(r, adj, &mut lookahead, &mut visited, &mut col_owner, &mut stack);
    }

    let mut matched = vec![None; nrow];
    for (c, owner) in col_owner.iter().enumerate() {
        if let Some(r) = *owner {
            matched[r] = Some(c);
        }
    }
    matched
}

/// A row on the current augmenting path.
struct Frame {
    row: usize,
    /// Next position in `adj[row]` to search through.
    next: usize,
    /// Column through which the search entered this row.
    via: usize,
}

/// Search an augmenting path from row `root` depth-first with an explicit stack,
/// flipping it into the matching when found.
fn augment(
    root: usize,
    adj: &[Vec<usize>],
    lookahead: &mut [usize],
    visited: &mut [usize],
    col_owner: &mut [Option<usize>],
    stack: &mut Vec<Frame>,
) -> bool {
    stack.clear();
    stack.push(Frame {
        row: root,
        next: 0,
        via: usize::MAX,
    });

    while let Some(top) = stack.len().checked_sub(1) {
        let r = stack[top].row;

        // Cheap assignment: a free column ends the path here
        let mut free = None;
        while lookahead[r] < adj[r].len() {
            let c = adj[r][lookahead[r]];
            lookahead[r] += 1;
            if col_owner[c].is_none() {
                free = Some(c);
                break;
            }
        }
        if let Some(c) = free {
            col_owner[c] = Some(r);
            for k in (1..stack.len()).rev() {
                col_owner[stack[k].via] = Some(stack[k - 1].row);
            }
            return true;
        }

        let mut descend = None;
        while stack[top].next < adj[r].len() {
            let c = adj[r][stack[top].next];
            stack[top].next += 1;
            if visited[c] != root {
                visited[c] = root;
                if let Some(owner) = col_owner[c] {
                    descend = Some((owner, c));
                    break;
                }
            }
        }
        match descend {
            Some((owner, c)) => stack.push(Frame {
                row: owner,
                next: 0,
                via: c,
            }),
            None => {
                stack.pop();
            }
        }
    }
    false
}

/// Block triangular form of a square pattern, for repeated structural solves.
///
/// A perfect matching σ pairs every row `r` with the unknown `σ(r)` it
/// determines. Row `r` then depends on the rows matched to the other unknowns
/// it contains. The strongly connected components of that row graph are the
/// diagonal blocks; listed in dependency order they make the permuted pattern
/// block lower triangular. Solving walks the blocks once, giving every member
/// of a block the union of the block's inputs, so a solve costs `O(nnz)`.
///
/// A structurally singular pattern has no such form; its solve sends the
/// union of all inputs to every output.
#[derive(Clone, Debug)]
pub struct BlockTriangular {
    n: usize,
    rank: usize,
    /// Columns of each row.
    by_row: Vec<Vec<usize>>,
    /// Rows of each column.
    by_col: Vec<Vec<usize>>,
    /// Matched column of each row; empty when singular.
    row_to_col: Vec<usize>,
    /// Matched row of each column; empty when singular.
    col_to_row: Vec<usize>,
    /// Diagonal blocks (rows), each listed after every block it depends on.
    blocks: Vec<Vec<usize>>,
}

impl BlockTriangular {
    /// # Panics
    ///
    /// Panics if `pattern` is not square.
    pub fn new(pattern: &SparsityPattern) -> Self {
        assert!(pattern.is_square(), "block triangular form requires a square pattern");
        let n = pattern.nrow;
        let by_row = pattern.row_lists();
        let by_col = pattern.col_lists();
        let matched = max_matching(n, n, &by_row);
        let rank = matched.iter().filter(|m| m.is_some()).count();

        let mut form = BlockTriangular {
            n,
            rank,
            by_row,
            by_col,
            row_to_col: Vec::new(),
            col_to_row: Vec::new(),
            blocks: Vec::new(),
        };
        if rank == n {
            form.row_to_col = matched.into_iter().flatten().collect();
            form.col_to_row = vec![0; n];
            for (r, &c) in form.row_to_col.iter().enumerate() {
                form.col_to_row[c] = r;
            }
            form.blocks = strong_components(&form.by_row, &form.col_to_row);
        }
        form
    }

    /// Order of the pattern.
    pub fn order(&self) -> usize {
        self.n
    }

    pub fn structural_rank(&self) -> usize {
        self.rank
    }

    pub fn is_singular(&self) -> bool {
        self.rank < self.n
    }

    /// Number of diagonal blocks, 0 when singular.
    pub fn nblocks(&self) -> usize {
        self.blocks.len()
    }

    /// Boolean shadow of a linear solve.
    ///
    /// With `transpose == false`, `rhs` is indexed by rows and `sol` by columns
    /// and lanes propagate through `J·sol = rhs`; with `transpose == true` the
    /// roles swap for `Jᵀ·sol = rhs`. Lanes in `sol` are overwritten.
    ///
    /// # Panics
    ///
    /// Panics if the slices do not have the pattern's order.
    pub fn solve(&self, rhs: &[Bvec], sol: &mut [Bvec], transpose: bool) {
        assert_eq!(rhs.len(), self.n, "rhs length must equal pattern order");
        assert_eq!(sol.len(), self.n, "sol length must equal pattern order");

        if self.is_singular() {
            let all = rhs.iter().fold(0, |acc, &b| acc | b);
            sol.iter_mut().for_each(|s| *s = all);
            return;
        }

        // Lanes per row; rows of unvisited blocks still hold zero
        let mut val: Vec<Bvec> = vec![0; self.n];
        if !transpose {
            for block in &self.blocks {
                let mut acc = 0;
                for &r in block {
                    acc |= rhs[r];
                    for &c in &self.by_row[r] {
                        acc |= val[self.col_to_row[c]];
                    }
                }
                for &r in block {
                    val[r] = acc;
                }
            }
            for (r, &v) in val.iter().enumerate() {
                sol[self.row_to_col[r]] = v;
            }
        } else {
            for block in self.blocks.iter().rev() {
                let mut acc = 0;
                for &r in block {
                    let c = self.row_to_col[r];
                    acc |= rhs[c];
                    for &other in &self.by_col[c] {
                        acc |= val[other];
                    }
                }
                for &r in block {
                    val[r] = acc;
                }
            }
            sol.copy_from_slice(&val);
        }
    }
}

/// Strongly connected components of the row graph `r -> col_to_row[c]` for
/// `c` in `by_row[r]`, by Tarjan's algorithm without recursion.
///
/// Components come out in reverse topological order: every component follows
/// all components reachable from it.
fn strong_components(by_row: &[Vec<usize>], col_to_row: &[usize]) -> Vec<Vec<usize>> {
    let n = by_row.len();
    let unvisited = usize::MAX;
    let mut index = vec![unvisited; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut call: Vec<(usize, usize)> = Vec::new();
    let mut next_index = 0;
    let mut blocks = Vec::new();

    for root in 0..n {
        if index[root] != unvisited {
            continue;
        }
        index[root] = next_index;
        low[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        call.push((root, 0));

        while let Some(top) = call.len().checked_sub(1) {
            let (v, k) = call[top];
            if k < by_row[v].len() {
                call[top].1 += 1;
                let w = col_to_row[by_row[v][k]];
                if index[w] == unvisited {
                    index[w] = next_index;
                    low[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    call.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }

            call.pop();
            if let Some(&(u, _)) = call.last() {
                low[u] = low[u].min(low[v]);
            }
            if low[v] == index[v] {
                let mut block = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    block.push(w);
                    if w == v {
                        break;
                    }
                }
                blocks.push(block);
            }
        }
    }
    blocks
}
