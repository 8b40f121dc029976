//! Partitioning of the unknowns into aggregates.
//!
//! Two unknowns are strongly connected when
//! `|a_ij| >= eps_strong * sqrt(|a_ii * a_jj|)`. Aggregates are grown greedily
//! on the graph of strong connections: the unassigned vertex with the most
//! unassigned strong neighbours becomes a seed and takes all of those
//! neighbours with it. Vertices left over once no seed with free neighbours
//! remains join the aggregate of their strongest assigned neighbour.
//!
//! Everything is deterministic, ties always go to the lowest index, so
//! building twice from the same matrix produces the same partition.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::fmt;

use crate::params::{AggregationParams, IsolatedPolicy};
use crate::CsrMatrix;

/// Result of the aggregation of one level.
#[derive(Clone, PartialEq, Eq)]
pub struct Aggregates {
    /// Aggregate of every fine unknown, `None` when it is left out of the
    /// coarse space.
    pub id: Vec<Option<usize>>,
    /// Number of aggregates.
    pub count: usize,
}

impl fmt::Debug for Aggregates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unaggregated = self.id.iter().filter(|id| id.is_none()).count();
        f.debug_struct("Aggregates")
            .field("rows", &self.id.len())
            .field("count", &self.count)
            .field("unaggregated", &unaggregated)
            .finish()
    }
}

impl Aggregates {
    /// Aggregate the rows of `mat`.
    pub fn new(mat: &CsrMatrix, params: &AggregationParams) -> Self {
        let n = mat.rows();
        let strong = strong_connections(mat, params.eps_strong);

        let mut id: Vec<Option<usize>> = vec![None; n];
        let mut assigned = vec![false; n];
        let mut count = 0;

        for (i, neighbors) in strong.iter().enumerate() {
            if neighbors.is_empty() {
                assigned[i] = true;
                if params.isolated == IsolatedPolicy::Singleton {
                    id[i] = Some(count);
                    count += 1;
                }
            }
        }

        // Unassigned vertices keyed by (most free neighbours, lowest index).
        let mut free: Vec<usize> = strong
            .iter()
            .map(|neighbors| neighbors.iter().filter(|&&j| !assigned[j]).count())
            .collect();
        let mut queue: BTreeSet<(Reverse<usize>, usize)> = (0..n)
            .filter(|&i| !assigned[i])
            .map(|i| (Reverse(free[i]), i))
            .collect();

        while let Some((Reverse(degree), seed)) = queue.first().copied() {
            if degree == 0 {
                break;
            }

            let members: Vec<usize> = std::iter::once(seed)
                .chain(strong[seed].iter().copied().filter(|&j| !assigned[j]))
                .collect();

            for &v in members.iter() {
                assigned[v] = true;
                id[v] = Some(count);
                queue.remove(&(Reverse(free[v]), v));
            }
            for &v in members.iter() {
                for &w in strong[v].iter().filter(|&&w| !assigned[w]) {
                    queue.remove(&(Reverse(free[w]), w));
                    free[w] -= 1;
                    queue.insert((Reverse(free[w]), w));
                }
            }
            count += 1;
        }

        let leftovers: Vec<usize> = (0..n).filter(|&i| !assigned[i]).collect();
        trace!(
            "greedy aggregation: {} aggregates, {} leftover rows",
            count,
            leftovers.len()
        );
        for i in leftovers {
            match strongest_aggregated_neighbor(mat, i, &strong[i], &id) {
                Some(j) => id[i] = id[j],
                None => {
                    id[i] = Some(count);
                    count += 1;
                }
            }
        }

        Self { id, count }
    }

    /// Number of fine unknowns.
    pub fn len(&self) -> usize {
        self.id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Flat encoding of the assignment with `-1` for unaggregated rows.
    pub fn signed_ids(&self) -> Vec<isize> {
        self.id
            .iter()
            .map(|id| id.map_or(-1, |agg| agg as isize))
            .collect()
    }

    /// Members of each aggregate in ascending order.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.count];
        for (i, agg) in self.id.iter().enumerate() {
            if let Some(agg) = agg {
                members[*agg].push(i);
            }
        }
        members
    }
}

/// Symmetrised graph of strong connections, neighbours sorted ascending.
pub fn strong_connections(mat: &CsrMatrix, eps_strong: f64) -> Vec<Vec<usize>> {
    let n = mat.rows();
    let diag: Vec<f64> = diagonal_abs(mat);
    let mut strong: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, row) in mat.outer_iterator().enumerate() {
        for (j, &val) in row.iter().filter(|(j, _)| *j != i) {
            if val == 0.0 || j >= n {
                continue;
            }
            if val.abs() >= eps_strong * (diag[i] * diag[j]).sqrt() {
                strong[i].push(j);
                strong[j].push(i);
            }
        }
    }

    for neighbors in strong.iter_mut() {
        neighbors.sort_unstable();
        neighbors.dedup();
    }
    strong
}

fn diagonal_abs(mat: &CsrMatrix) -> Vec<f64> {
    mat.outer_iterator()
        .enumerate()
        .map(|(i, row)| row.get(i).map_or(0.0, |val| val.abs()))
        .collect()
}

fn strongest_aggregated_neighbor(
    mat: &CsrMatrix,
    row: usize,
    neighbors: &[usize],
    id: &[Option<usize>],
) -> Option<usize> {
    let weight = |j: usize| -> f64 {
        let forward = mat.get(row, j).map_or(0.0, |v| v.abs());
        let backward = mat.get(j, row).map_or(0.0, |v| v.abs());
        forward.max(backward)
    };

    let mut best: Option<(usize, f64)> = None;
    for &j in neighbors.iter().filter(|&&j| id[j].is_some()) {
        let w = weight(j);
        match best {
            Some((_, best_w)) if w <= best_w => {}
            _ => best = Some((j, w)),
        }
    }
    best.map(|(j, _)| j)
}
