//! Device-side kernels: the data-parallel inner loops of one rank.
//!
//! Three kernels mirror the phases of an iteration: block-sum accumulation
//! over the local row slab, the block-mean finalization, and the row/column
//! reassignment sweeps. Cluster sums and candidate distances accumulate in
//! f64; only the final block means are narrowed to f32. Partial sums are
//! produced per fixed-size chunk and merged in slab order, so a kernel's
//! result does not depend on thread scheduling.

use std::ops::Range;

use rayon::prelude::*;

use crate::labels::Label;
use crate::matrix::Matrix;

/// Rows (or columns) per parallel work item in the accumulation kernel.
const REDUCE_CHUNK: usize = 128;

/// Flat block index of the (row-label, column-label) pair.
#[inline]
pub fn cluster_id(row_label: Label, col_label: Label, num_col_labels: usize) -> usize {
    row_label * num_col_labels + col_label
}

/// Result of one reassignment sweep over a slab.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReassignOutcome {
    /// Number of slab entries whose label changed.
    pub updated: u64,
    /// Sum of best-candidate squared distances over the slab.
    pub error: f64,
}

/// Accumulate per-block sums and counts over the local row slab.
///
/// Both label vectors must be globally consistent when this runs. Returns
/// the local contribution; the caller all-reduces across ranks before
/// forming means.
pub fn accumulate_block_partials(
    matrix: &Matrix,
    row_labels: &[Label],
    col_labels: &[Label],
    num_row_labels: usize,
    num_col_labels: usize,
    slab: Range<usize>,
) -> (Vec<f64>, Vec<u64>) {
    let num_blocks = num_row_labels * num_col_labels;
    let rows: Vec<usize> = slab.collect();
    let partials: Vec<(Vec<f64>, Vec<u64>)> = rows
        .par_chunks(REDUCE_CHUNK)
        .map(|chunk| {
            let mut sums = vec![0.0f64; num_blocks];
            let mut counts = vec![0u64; num_blocks];
            for &i in chunk {
                let block_row = row_labels[i] * num_col_labels;
                for (j, &value) in matrix.data.row(i).iter().enumerate() {
                    let id = block_row + col_labels[j];
                    sums[id] += value as f64;
                    counts[id] += 1;
                }
            }
            (sums, counts)
        })
        .collect();

    let mut sums = vec![0.0f64; num_blocks];
    let mut counts = vec![0u64; num_blocks];
    for (partial_sums, partial_counts) in partials {
        for (acc, value) in sums.iter_mut().zip(&partial_sums) {
            *acc += value;
        }
        for (acc, value) in counts.iter_mut().zip(&partial_counts) {
            *acc += value;
        }
    }
    (sums, counts)
}

/// Finalize block means from globally reduced sums and counts.
///
/// An empty block reports 0.0. Its candidate distance degenerates to the
/// plain sum of squares, so it cannot outscore a non-empty block covering
/// the same entries except in pathological inputs.
pub fn block_means(sums: &[f64], counts: &[u64]) -> Vec<f32> {
    sums.iter()
        .zip(counts)
        .map(|(&sum, &count)| {
            if count > 0 {
                (sum / count as f64) as f32
            } else {
                0.0
            }
        })
        .collect()
}

/// Pick the winning candidate from a distance table.
///
/// The current label wins any tie it is part of; otherwise the smallest
/// tying index wins (the ascending scan keeps the first strict minimum).
fn choose_label(distances: &[f64], current: Label) -> (Label, f64) {
    let mut best = 0;
    let mut best_distance = distances[0];
    for (candidate, &distance) in distances.iter().enumerate().skip(1) {
        if distance < best_distance {
            best = candidate;
            best_distance = distance;
        }
    }
    if distances[current] == best_distance {
        (current, best_distance)
    } else {
        (best, best_distance)
    }
}

/// Reassign every row in the slab to its best row label.
///
/// `slab_labels` holds the scattered local labels and is updated in place;
/// `slab_start` is the global index of its first row. Column labels are the
/// globally consistent vector from the current iteration's mean matrix.
pub fn reassign_rows(
    matrix: &Matrix,
    means: &[f32],
    col_labels: &[Label],
    slab_labels: &mut [Label],
    slab_start: usize,
    num_row_labels: usize,
    num_col_labels: usize,
) -> ReassignOutcome {
    let per_row: Vec<(bool, f64)> = slab_labels
        .par_iter_mut()
        .enumerate()
        .map(|(local_index, label)| {
            let row = matrix.data.row(slab_start + local_index);
            let mut distances = vec![0.0f64; num_row_labels];
            for (candidate, distance) in distances.iter_mut().enumerate() {
                let block_row = candidate * num_col_labels;
                let mut acc = 0.0f64;
                for (j, &value) in row.iter().enumerate() {
                    let diff = (means[block_row + col_labels[j]] - value) as f64;
                    acc += diff * diff;
                }
                *distance = acc;
            }
            let (best, best_distance) = choose_label(&distances, *label);
            let changed = best != *label;
            *label = best;
            (changed, best_distance)
        })
        .collect();

    let mut outcome = ReassignOutcome::default();
    for (changed, distance) in per_row {
        outcome.updated += u64::from(changed);
        outcome.error += distance;
    }
    outcome
}

/// Reassign every column in the slab to its best column label.
///
/// Runs after the row phase has published its labels, so `row_labels` is the
/// refreshed global vector.
pub fn reassign_cols(
    matrix: &Matrix,
    means: &[f32],
    row_labels: &[Label],
    slab_labels: &mut [Label],
    slab_start: usize,
    num_col_labels: usize,
) -> ReassignOutcome {
    let per_col: Vec<(bool, f64)> = slab_labels
        .par_iter_mut()
        .enumerate()
        .map(|(local_index, label)| {
            let column = matrix.data.column(slab_start + local_index);
            let mut distances = vec![0.0f64; num_col_labels];
            for (candidate, distance) in distances.iter_mut().enumerate() {
                let mut acc = 0.0f64;
                for (i, &value) in column.iter().enumerate() {
                    let diff =
                        (means[row_labels[i] * num_col_labels + candidate] - value) as f64;
                    acc += diff * diff;
                }
                *distance = acc;
            }
            let (best, best_distance) = choose_label(&distances, *label);
            let changed = best != *label;
            *label = best;
            (changed, best_distance)
        })
        .collect();

    let mut outcome = ReassignOutcome::default();
    for (changed, distance) in per_col {
        outcome.updated += u64::from(changed);
        outcome.error += distance;
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn block_diagonal() -> Matrix {
        Matrix::new(array![
            [1.0, 1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 1.0],
            [0.0, 0.0, 1.0, 1.0],
        ])
    }

    #[test]
    fn test_cluster_id_layout() {
        assert_eq!(cluster_id(0, 0, 3), 0);
        assert_eq!(cluster_id(0, 2, 3), 2);
        assert_eq!(cluster_id(1, 0, 3), 3);
        assert_eq!(cluster_id(2, 1, 3), 7);
    }

    #[test]
    fn test_block_partials_full_slab() {
        let matrix = block_diagonal();
        let rl = vec![0, 0, 1, 1];
        let cl = vec![0, 0, 1, 1];
        let (sums, counts) = accumulate_block_partials(&matrix, &rl, &cl, 2, 2, 0..4);
        assert_eq!(sums, vec![4.0, 0.0, 0.0, 4.0]);
        assert_eq!(counts, vec![4, 4, 4, 4]);
    }

    #[test]
    fn test_block_partials_are_local_to_the_slab() {
        let matrix = block_diagonal();
        let rl = vec![0, 0, 1, 1];
        let cl = vec![0, 0, 1, 1];
        let (top_sums, top_counts) = accumulate_block_partials(&matrix, &rl, &cl, 2, 2, 0..2);
        let (bottom_sums, bottom_counts) =
            accumulate_block_partials(&matrix, &rl, &cl, 2, 2, 2..4);
        assert_eq!(top_sums, vec![4.0, 0.0, 0.0, 0.0]);
        assert_eq!(top_counts, vec![4, 4, 0, 0]);
        let combined: Vec<f64> = top_sums
            .iter()
            .zip(&bottom_sums)
            .map(|(a, b)| a + b)
            .collect();
        assert_eq!(combined, vec![4.0, 0.0, 0.0, 4.0]);
        assert_eq!(bottom_counts, vec![0, 0, 4, 4]);
    }

    #[test]
    fn test_block_partials_empty_slab() {
        let matrix = block_diagonal();
        let rl = vec![0, 0, 1, 1];
        let cl = vec![0, 0, 1, 1];
        let (sums, counts) = accumulate_block_partials(&matrix, &rl, &cl, 2, 2, 2..2);
        assert_eq!(sums, vec![0.0; 4]);
        assert_eq!(counts, vec![0; 4]);
    }

    #[test]
    fn test_block_means_empty_block_is_zero() {
        let means = block_means(&[6.0, 0.0], &[3, 0]);
        assert_eq!(means, vec![2.0, 0.0]);
    }

    #[test]
    fn test_choose_label_prefers_current_on_tie() {
        assert_eq!(choose_label(&[1.0, 1.0, 1.0], 2), (2, 1.0));
        assert_eq!(choose_label(&[1.0, 0.5, 0.5], 0), (1, 0.5));
        assert_eq!(choose_label(&[0.5, 1.0, 0.5], 2), (2, 0.5));
    }

    #[test]
    fn test_reassign_rows_keeps_consistent_labeling() {
        let matrix = block_diagonal();
        let cl = vec![0, 0, 1, 1];
        let means = vec![1.0, 0.0, 0.0, 1.0];
        let mut slab = vec![0, 0, 1, 1];
        let outcome = reassign_rows(&matrix, &means, &cl, &mut slab, 0, 2, 2);
        assert_eq!(slab, vec![0, 0, 1, 1]);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.error, 0.0);
    }

    #[test]
    fn test_reassign_rows_moves_misplaced_row() {
        let matrix = block_diagonal();
        let cl = vec![0, 0, 1, 1];
        let means = vec![1.0, 0.0, 0.0, 1.0];
        // Row 1 belongs with the top block but starts mislabeled.
        let mut slab = vec![0, 1, 1, 1];
        let outcome = reassign_rows(&matrix, &means, &cl, &mut slab, 0, 2, 2);
        assert_eq!(slab, vec![0, 0, 1, 1]);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.error, 0.0);
    }

    #[test]
    fn test_reassign_rows_slab_offset() {
        let matrix = block_diagonal();
        let cl = vec![0, 0, 1, 1];
        let means = vec![1.0, 0.0, 0.0, 1.0];
        let mut slab = vec![0, 1];
        let outcome = reassign_rows(&matrix, &means, &cl, &mut slab, 2, 2, 2);
        assert_eq!(slab, vec![1, 1]);
        assert_eq!(outcome.updated, 1);
    }

    #[test]
    fn test_reassign_cols_symmetric() {
        let matrix = block_diagonal();
        let rl = vec![0, 0, 1, 1];
        let means = vec![1.0, 0.0, 0.0, 1.0];
        let mut slab = vec![1, 0, 1, 1];
        let outcome = reassign_cols(&matrix, &means, &rl, &mut slab, 0, 2);
        assert_eq!(slab, vec![0, 0, 1, 1]);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.error, 0.0);
    }

    #[test]
    fn test_reassign_error_accumulates_best_distance() {
        // Uniform matrix, means pulled toward 0.5 in one block: distances are
        // exact in f64.
        let matrix = Matrix::new(array![[1.0, 1.0], [1.0, 1.0]]);
        let cl = vec![0, 0];
        let means = vec![0.5, 0.0];
        let mut slab = vec![0, 0];
        let outcome = reassign_rows(&matrix, &means, &cl, &mut slab, 0, 2, 1);
        // Candidate 0 distance per row: 2 * 0.25 = 0.5; candidate 1: 2.0.
        assert_eq!(slab, vec![0, 0]);
        assert_eq!(outcome.error, 1.0);
    }
}
