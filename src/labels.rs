//! Label vectors and the label file format.
//!
//! A label file is whitespace-separated: `num_rows num_cols`, then
//! `num_row_labels num_col_labels`, then `num_rows + num_cols` integers
//! giving the initial row labels followed by the initial column labels.
//! Output is one final label per line, rows first.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::config::ConfigError;
use crate::matrix::Matrix;

/// Cluster label. Row labels lie in `[0, num_row_labels)`, column labels in
/// `[0, num_col_labels)`.
pub type Label = usize;

/// Parsed label file: problem shape plus the two initial label vectors.
#[derive(Debug, Clone)]
pub struct LabelSet {
    pub num_rows: usize,
    pub num_cols: usize,
    pub num_row_labels: usize,
    pub num_col_labels: usize,
    pub row_labels: Vec<Label>,
    pub col_labels: Vec<Label>,
}

impl LabelSet {
    /// Parse a label file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<LabelSet, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Parse label file contents.
    pub fn parse(text: &str) -> Result<LabelSet, ConfigError> {
        let mut tokens = text.split_whitespace();
        let mut next_usize = |what: &str| -> Result<usize, ConfigError> {
            let token = tokens
                .next()
                .ok_or_else(|| ConfigError::LabelFile(format!("missing {}", what)))?;
            token.parse::<usize>().map_err(|_| {
                ConfigError::LabelFile(format!("bad {}: {:?}", what, token))
            })
        };

        let num_rows = next_usize("row count")?;
        let num_cols = next_usize("column count")?;
        let num_row_labels = next_usize("row label count")?;
        let num_col_labels = next_usize("column label count")?;
        if num_row_labels == 0 || num_col_labels == 0 {
            return Err(ConfigError::LabelFile(
                "label counts must be positive".to_string(),
            ));
        }

        let mut row_labels = Vec::with_capacity(num_rows);
        for i in 0..num_rows {
            let label = next_usize(&format!("row label {}", i))?;
            if label >= num_row_labels {
                return Err(ConfigError::LabelFile(format!(
                    "row label {} is {} but only {} row labels exist",
                    i, label, num_row_labels
                )));
            }
            row_labels.push(label);
        }
        let mut col_labels = Vec::with_capacity(num_cols);
        for j in 0..num_cols {
            let label = next_usize(&format!("column label {}", j))?;
            if label >= num_col_labels {
                return Err(ConfigError::LabelFile(format!(
                    "column label {} is {} but only {} column labels exist",
                    j, label, num_col_labels
                )));
            }
            col_labels.push(label);
        }
        if tokens.next().is_some() {
            return Err(ConfigError::LabelFile(
                "trailing tokens after the label vectors".to_string(),
            ));
        }

        Ok(LabelSet {
            num_rows,
            num_cols,
            num_row_labels,
            num_col_labels,
            row_labels,
            col_labels,
        })
    }

    /// Check that this label set describes `matrix`.
    pub fn validate_against(&self, matrix: &Matrix) -> Result<(), ConfigError> {
        if self.num_rows != matrix.rows || self.num_cols != matrix.cols {
            return Err(ConfigError::ShapeMismatch {
                matrix: (matrix.rows, matrix.cols),
                labels: (self.num_rows, self.num_cols),
            });
        }
        Ok(())
    }
}

/// Write final labels, one per line, row labels then column labels.
pub fn write_labels<P: AsRef<Path>>(
    path: P,
    row_labels: &[Label],
    col_labels: &[Label],
) -> Result<(), ConfigError> {
    let mut out = String::with_capacity((row_labels.len() + col_labels.len()) * 4);
    for &label in row_labels.iter().chain(col_labels) {
        out.push_str(&label.to_string());
        out.push('\n');
    }
    let mut file = fs::File::create(path.as_ref())?;
    file.write_all(out.as_bytes())?;
    Ok(())
}
