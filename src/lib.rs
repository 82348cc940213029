//! Distributed parallel co-clustering of dense matrices.
//!
//! The crate simultaneously partitions the rows and columns of an `f32`
//! matrix into R and C groups so that every (row-group, column-group) block
//! is well approximated by its mean. Refinement alternates three phases per
//! iteration: recompute the R×C block-average matrix, reassign each row to
//! the row label minimizing its squared reconstruction error, then reassign
//! each column symmetrically, until no label changes or an iteration cap is
//! reached.
//!
//! Work is split two ways: rows and columns are striped into contiguous
//! slabs across worker ranks (threads synchronizing through the
//! [`collective`] layer, each holding replicated label vectors), and each
//! rank fans its slab out over a rayon data-parallel kernel. Cluster sums
//! and candidate distances accumulate in f64 end to end.
//!
//! ```
//! use dist_cocluster::{cluster, ClusterConfig, Matrix};
//! use ndarray::array;
//!
//! let matrix = Matrix::new(array![
//!     [1.0, 1.0, 0.0, 0.0],
//!     [1.0, 1.0, 0.0, 0.0],
//!     [0.0, 0.0, 1.0, 1.0],
//!     [0.0, 0.0, 1.0, 1.0],
//! ]);
//! let mut row_labels = vec![0, 0, 0, 1];
//! let mut col_labels = vec![0, 0, 1, 1];
//! let config = ClusterConfig::new(2, 2).with_workers(2);
//!
//! let summary = cluster(&matrix, &mut row_labels, &mut col_labels, &config).unwrap();
//! assert!(summary.converged);
//! assert_eq!(row_labels, vec![0, 0, 1, 1]);
//! assert_eq!(summary.mean_error, 0.0);
//! ```

pub mod collective;
pub mod config;
pub mod engine;
pub mod kernel;
pub mod labels;
pub mod matrix;
pub mod partition;

pub use config::{Config, ConfigError};
pub use engine::{cluster, ClusterConfig, ClusterError, ClusterSummary, IterationReport};
pub use labels::{write_labels, Label, LabelSet};
pub use matrix::Matrix;
pub use partition::PartitionPlan;
