//! Maximum-weight bipartite assignment.
//!
//! Rows are stored members, columns current members. A cell holds the
//! integer weight of a permitted pairing or nothing. [`assign`] finds a
//! maximum total weight (Kuhn-Munkres), then fixes rows in order to the
//! earliest column that still attains that optimum, which makes the result
//! the lexicographically first optimal assignment.

/// Rectangular matrix of optional pairing weights.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<Option<i64>>,
}

impl WeightMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![None; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Permit pairing `row` with `col` at `weight` (must be positive).
    pub fn set(&mut self, row: usize, col: usize, weight: i64) {
        debug_assert!(weight > 0);
        self.cells[row * self.cols + col] = Some(weight);
    }

    pub fn get(&self, row: usize, col: usize) -> Option<i64> {
        self.cells[row * self.cols + col]
    }
}

/// A row whose optimal choice was not unique.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tie {
    pub row: usize,
    pub chosen: Option<usize>,
    pub alternatives: Vec<Option<usize>>,
}

/// Result of [`assign`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub total: i64,
    /// Column assigned to each row.
    pub pairs: Vec<Option<usize>>,
    /// Rows with equally good alternatives; only filled when requested.
    pub ties: Vec<Tie>,
}

/// Lexicographically first maximum-weight assignment of `matrix`.
///
/// Each row tries its candidates in column order and re-solves the
/// remaining rows, so the worst case is `O(rows * cols * n^3)`. Candidates
/// that cannot reach the optimum even with every later row at its row
/// maximum are rejected without solving.
pub fn assign(matrix: &WeightMatrix, detect_ties: bool) -> Assignment {
    let best = optimum(matrix, 0, &vec![false; matrix.cols]);
    let bounds = row_bounds(matrix);
    let mut used = vec![false; matrix.cols];
    let mut fixed_total = 0i64;
    let mut pairs = vec![None; matrix.rows];
    let mut ties = Vec::new();

    for row in 0..matrix.rows {
        let candidates: Vec<(Option<usize>, i64)> = (0..matrix.cols)
            .filter(|&col| !used[col])
            .filter_map(|col| matrix.get(row, col).map(|w| (Some(col), w)))
            .chain(std::iter::once((None, 0)))
            .collect();

        let mut chosen: Option<(Option<usize>, i64)> = None;
        let mut alternatives = Vec::new();
        for (candidate, weight) in candidates {
            if fixed_total + weight + bounds[row + 1] < best {
                continue;
            }
            if let Some(col) = candidate {
                used[col] = true;
            }
            let rest = optimum(matrix, row + 1, &used);
            if let Some(col) = candidate {
                used[col] = false;
            }
            if fixed_total + weight + rest == best {
                if chosen.is_none() {
                    chosen = Some((candidate, weight));
                    if !detect_ties {
                        break;
                    }
                } else {
                    alternatives.push(candidate);
                }
            }
        }

        let (choice, weight) = chosen.unwrap_or((None, 0));
        if let Some(col) = choice {
            used[col] = true;
        }
        fixed_total += weight;
        pairs[row] = choice;
        if !alternatives.is_empty() {
            ties.push(Tie {
                row,
                chosen: choice,
                alternatives,
            });
        }
    }

    Assignment {
        total: fixed_total,
        pairs,
        ties,
    }
}

/// `bounds[r]` is the sum of the row maxima of rows `r..`; `bounds[rows]` is 0.
fn row_bounds(matrix: &WeightMatrix) -> Vec<i64> {
    let mut bounds = vec![0i64; matrix.rows + 1];
    for row in (0..matrix.rows).rev() {
        let max = (0..matrix.cols)
            .filter_map(|col| matrix.get(row, col))
            .max()
            .unwrap_or(0);
        bounds[row] = bounds[row + 1] + max;
    }
    bounds
}

/// Maximum total weight over rows `first_row..` and the unused columns.
fn optimum(matrix: &WeightMatrix, first_row: usize, used: &[bool]) -> i64 {
    let rows: Vec<usize> = (first_row..matrix.rows).collect();
    let cols: Vec<usize> = (0..matrix.cols).filter(|&c| !used[c]).collect();
    if rows.is_empty() || cols.is_empty() {
        return 0;
    }
    let weight = |r: usize, c: usize| -> i64 {
        match (rows.get(r), cols.get(c)) {
            (Some(&row), Some(&col)) => matrix.get(row, col).unwrap_or(0),
            _ => 0,
        }
    };
    let n = rows.len().max(cols.len());
    let max_weight = (0..rows.len())
        .flat_map(|r| (0..cols.len()).map(move |c| (r, c)))
        .map(|(r, c)| weight(r, c))
        .max()
        .unwrap_or(0);

    let matched = hungarian(n, |r, c| max_weight - weight(r, c));
    matched
        .iter()
        .enumerate()
        .map(|(r, &c)| weight(r, c))
        .sum()
}

/// Minimum-cost perfect matching on an `n x n` cost function.
///
/// Returns the column matched to each row.
fn hungarian(n: usize, cost: impl Fn(usize, usize) -> i64) -> Vec<usize> {
    const INF: i64 = i64::MAX / 4;
    // 1-based potentials and matching; column 0 is a sentinel.
    let mut u = vec![0i64; n + 1];
    let mut v = vec![0i64; n + 1];
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![INF; n + 1];
        let mut visited = vec![false; n + 1];
        loop {
            visited[j0] = true;
            let i0 = p[j0];
            let mut delta = INF;
            let mut j1 = 0usize;
            for j in 1..=n {
                if visited[j] {
                    continue;
                }
                let cur = cost(i0 - 1, j - 1) - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if visited[j] {
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

    let mut row_to_col = vec![0usize; n];
    for j in 1..=n {
        if p[j] > 0 {
            row_to_col[p[j] - 1] = j - 1;
        }
    }
    row_to_col
}
