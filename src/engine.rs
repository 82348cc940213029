//! Iteration controller and the `cluster` entry point.
//!
//! Each worker rank runs the same loop over the shared matrix: recompute the
//! block-average matrix, reassign its row slab, publish, reassign its column
//! slab, publish, then agree on the combined change count. Rows always move
//! before columns within an iteration; the loop ends on a zero change count
//! or at the iteration cap.

use std::fmt;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::collective::{Collective, ThreadWorld};
use crate::kernel;
use crate::labels::Label;
use crate::matrix::Matrix;
use crate::partition::PartitionPlan;

/// Clustering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of row groups R.
    pub num_row_labels: usize,
    /// Number of column groups C.
    pub num_col_labels: usize,
    /// Iteration cap.
    pub max_iterations: usize,
    /// World size: how many worker ranks share the label work.
    pub num_workers: usize,
}

impl ClusterConfig {
    /// Defaults for a given label-grid shape: 25 iterations on all cores.
    pub fn new(num_row_labels: usize, num_col_labels: usize) -> ClusterConfig {
        ClusterConfig {
            num_row_labels,
            num_col_labels,
            max_iterations: 25,
            num_workers: num_cpus::get(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> ClusterConfig {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_workers(mut self, num_workers: usize) -> ClusterConfig {
        self.num_workers = num_workers;
        self
    }
}

/// Per-iteration diagnostics, as reported by rank 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    /// 1-based iteration number.
    pub iteration: usize,
    /// Combined row and column label changes across all ranks.
    pub labels_updated: u64,
    /// Total reconstruction error divided by the cell count.
    pub mean_error: f64,
}

/// Outcome of a clustering run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Iterations executed.
    pub iterations: usize,
    /// True when the loop ended on a zero change count.
    pub converged: bool,
    /// Mean squared per-cell error of the last iteration (0.0 if none ran).
    pub mean_error: f64,
    /// One report per executed iteration.
    pub reports: Vec<IterationReport>,
}

/// Errors reported before any rank starts working.
#[derive(Debug)]
pub enum ClusterError {
    /// A label vector does not match the matrix shape.
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// An initial label lies outside its label range.
    LabelOutOfRange {
        what: &'static str,
        index: usize,
        label: Label,
        limit: usize,
    },
    /// Unusable parameters.
    InvalidConfig(String),
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClusterError::ShapeMismatch {
                what,
                expected,
                actual,
            } => write!(
                f,
                "{} has length {} but the matrix requires {}",
                what, actual, expected
            ),
            ClusterError::LabelOutOfRange {
                what,
                index,
                label,
                limit,
            } => write!(
                f,
                "{} {} is {} but labels must lie in [0, {})",
                what, index, label, limit
            ),
            ClusterError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ClusterError {}

/// Co-cluster `matrix` into `num_row_labels × num_col_labels` blocks.
///
/// `row_labels` and `col_labels` carry the initial assignment in and the
/// final assignment out. Every rank sees the whole matrix; only the label
/// work is partitioned, so worker counts beyond the row or column count are
/// legal (trailing ranks own empty slabs).
///
/// A run with a fixed worker count is bitwise reproducible; changing the
/// worker count regroups the floating-point sums and may perturb results in
/// the least significant bits.
pub fn cluster(
    matrix: &Matrix,
    row_labels: &mut [Label],
    col_labels: &mut [Label],
    config: &ClusterConfig,
) -> Result<ClusterSummary, ClusterError> {
    validate(matrix, row_labels, col_labels, config)?;

    let workers = config.num_workers;
    let row_plan = PartitionPlan::new(matrix.rows, workers);
    let col_plan = PartitionPlan::new(matrix.cols, workers);
    let world = ThreadWorld::new(workers);

    let (final_rows, final_cols, summary) = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|rank| {
                let comm = world.rank_comm(rank);
                let mut rank_rows = row_labels.to_vec();
                let mut rank_cols = col_labels.to_vec();
                let row_plan = &row_plan;
                let col_plan = &col_plan;
                scope.spawn(move || {
                    let summary = run_rank(
                        &comm,
                        matrix,
                        config,
                        row_plan,
                        col_plan,
                        &mut rank_rows,
                        &mut rank_cols,
                    );
                    (rank_rows, rank_cols, summary)
                })
            })
            .collect();

        // Rank 0 publishes the result; a panicked rank aborts the run, as any
        // fatal condition must (a survivor would deadlock at its next
        // collective otherwise).
        let mut result = None;
        for handle in handles {
            let rank_result = handle.join().expect("worker rank panicked");
            if result.is_none() {
                result = Some(rank_result);
            }
        }
        result.expect("world has at least one rank")
    });

    row_labels.copy_from_slice(&final_rows);
    col_labels.copy_from_slice(&final_cols);
    Ok(summary)
}

fn validate(
    matrix: &Matrix,
    row_labels: &[Label],
    col_labels: &[Label],
    config: &ClusterConfig,
) -> Result<(), ClusterError> {
    if matrix.rows == 0 || matrix.cols == 0 {
        return Err(ClusterError::InvalidConfig(
            "matrix must be non-empty".to_string(),
        ));
    }
    if config.num_row_labels == 0 || config.num_col_labels == 0 {
        return Err(ClusterError::InvalidConfig(
            "label counts must be positive".to_string(),
        ));
    }
    if config.num_workers == 0 {
        return Err(ClusterError::InvalidConfig(
            "worker count must be positive".to_string(),
        ));
    }
    if row_labels.len() != matrix.rows {
        return Err(ClusterError::ShapeMismatch {
            what: "row label vector",
            expected: matrix.rows,
            actual: row_labels.len(),
        });
    }
    if col_labels.len() != matrix.cols {
        return Err(ClusterError::ShapeMismatch {
            what: "column label vector",
            expected: matrix.cols,
            actual: col_labels.len(),
        });
    }
    for (index, &label) in row_labels.iter().enumerate() {
        if label >= config.num_row_labels {
            return Err(ClusterError::LabelOutOfRange {
                what: "row label",
                index,
                label,
                limit: config.num_row_labels,
            });
        }
    }
    for (index, &label) in col_labels.iter().enumerate() {
        if label >= config.num_col_labels {
            return Err(ClusterError::LabelOutOfRange {
                what: "column label",
                index,
                label,
                limit: config.num_col_labels,
            });
        }
    }
    Ok(())
}

/// The SPMD body executed by every rank.
fn run_rank<C: Collective>(
    comm: &C,
    matrix: &Matrix,
    config: &ClusterConfig,
    row_plan: &PartitionPlan,
    col_plan: &PartitionPlan,
    row_labels: &mut Vec<Label>,
    col_labels: &mut Vec<Label>,
) -> ClusterSummary {
    let rank = comm.rank();
    let num_blocks = config.num_row_labels * config.num_col_labels;
    let cells = (matrix.rows * matrix.cols) as f64;

    let mut reports = Vec::new();
    let mut converged = false;
    let mut iteration = 0;

    while iteration < config.max_iterations {
        // Block-average matrix: local accumulation over the row slab, then a
        // global reduction of sums and counts.
        let (local_sums, local_counts) = kernel::accumulate_block_partials(
            matrix,
            row_labels,
            col_labels,
            config.num_row_labels,
            config.num_col_labels,
            row_plan.slab(rank),
        );
        let mut sums = vec![0.0f64; num_blocks];
        let mut counts = vec![0u64; num_blocks];
        comm.all_reduce_sum_f64(&local_sums, &mut sums);
        comm.all_reduce_sum_u64(&local_counts, &mut counts);
        let means = kernel::block_means(&sums, &counts);

        // Row phase: scatter the local slab, reassign, publish.
        let row_slab = row_plan.slab(rank);
        let mut row_slab_labels = row_labels[row_slab.clone()].to_vec();
        let row_outcome = kernel::reassign_rows(
            matrix,
            &means,
            col_labels,
            &mut row_slab_labels,
            row_slab.start,
            config.num_row_labels,
            config.num_col_labels,
        );
        comm.all_gather_labels(&row_slab_labels, row_plan, row_labels);
        let mut rows_updated = [0u64];
        comm.all_reduce_sum_u64(&[row_outcome.updated], &mut rows_updated);
        comm.barrier();

        // Column phase: reads the row labels published above.
        let col_slab = col_plan.slab(rank);
        let mut col_slab_labels = col_labels[col_slab.clone()].to_vec();
        let col_outcome = kernel::reassign_cols(
            matrix,
            &means,
            row_labels,
            &mut col_slab_labels,
            col_slab.start,
            config.num_col_labels,
        );
        comm.all_gather_labels(&col_slab_labels, col_plan, col_labels);
        let mut cols_updated = [0u64];
        comm.all_reduce_sum_u64(&[col_outcome.updated], &mut cols_updated);
        let mut total_error = [0.0f64];
        comm.all_reduce_sum_f64(&[col_outcome.error], &mut total_error);

        iteration += 1;
        let labels_updated = rows_updated[0] + cols_updated[0];
        let mean_error = total_error[0] / cells;
        if rank == 0 {
            log::info!(
                "iteration {}: {} labels updated, mean squared error {:.6}",
                iteration,
                labels_updated,
                mean_error
            );
        }
        reports.push(IterationReport {
            iteration,
            labels_updated,
            mean_error,
        });

        if labels_updated == 0 {
            converged = true;
            break;
        }
    }

    let mean_error = reports.last().map_or(0.0, |report| report.mean_error);
    ClusterSummary {
        iterations: iteration,
        converged,
        mean_error,
        reports,
    }
}
