//! Minimum-cost bipartite assignment (Hungarian algorithm, potentials
//! formulation, O(n^2 * m)).

/// Solves the minimum-cost assignment for a rectangular cost matrix.
///
/// Returns, for each row, the column it was assigned to (every row gets a
/// column when `rows <= cols`; otherwise the cheapest `cols` rows win and
/// the rest return `None`).
pub fn minimum_cost_assignment(cost: &[Vec<f64>]) -> Vec<Option<usize>> {
    let rows = cost.len();
    if rows == 0 {
        return Vec::new();
    }
    let cols = cost[0].len();
    if cols == 0 {
        return vec![None; rows];
    }

    if rows <= cols {
        solve(cost, rows, cols)
    } else {
        // Transpose so the row count is the smaller side, then invert.
        let transposed: Vec<Vec<f64>> = (0..cols)
            .map(|j| (0..rows).map(|i| cost[i][j]).collect())
            .collect();
        let by_col = solve(&transposed, cols, rows);
        let mut result = vec![None; rows];
        for (col, row) in by_col.into_iter().enumerate() {
            if let Some(row) = row {
                result[row] = Some(col);
            }
        }
        result
    }
}

/// Classic potentials algorithm over a `rows x cols` matrix, `rows <= cols`.
/// Indices are 1-based internally; column 0 is the virtual source.
fn solve(cost: &[Vec<f64>], rows: usize, cols: usize) -> Vec<Option<usize>> {
    let mut u = vec![0.0f64; rows + 1];
    let mut v = vec![0.0f64; cols + 1];
    // p[j] = row currently assigned to column j (0 = unassigned).
    let mut p = vec![0usize; cols + 1];
    let mut way = vec![0usize; cols + 1];

    for i in 1..=rows {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; cols + 1];
        let mut used = vec![false; cols + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=cols {
                if used[j] {
                    continue;
                }
                let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
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

        // Augment along the alternating path back to the source.
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![None; rows];
    for j in 1..=cols {
        if p[j] != 0 {
            assignment[p[j] - 1] = Some(j - 1);
        }
    }
    assignment
}
