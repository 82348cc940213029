//! Run configuration: command-line surface and input loading.

use std::fmt;
use std::io;
use std::path::PathBuf;

use ndarray_npy::ReadNpyError;

use crate::labels::LabelSet;
use crate::matrix::Matrix;

/// Command-line usage, printed on argument errors.
pub const USAGE: &str = "usage: dist_cocluster <matrix.npy> <labels.txt> \
[--max-iterations N] [--output PATH] [--workers N]";

/// Parsed command line.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the 2-D `f32` `.npy` matrix.
    pub matrix_path: PathBuf,
    /// Path to the initial label file.
    pub labels_path: PathBuf,
    /// Where the final labels are written.
    pub output_path: PathBuf,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Worker rank count.
    pub num_workers: usize,
}

impl Config {
    /// Parse an argument iterator (the first item is the program name).
    pub fn new(mut args: impl Iterator<Item = String>) -> Result<Config, ConfigError> {
        args.next();

        let mut positional = Vec::new();
        let mut output_path = PathBuf::from("labels.out");
        let mut max_iterations = 25;
        let mut num_workers = num_cpus::get();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--max-iterations" => {
                    max_iterations = parse_flag_value(&arg, args.next())?;
                }
                "--workers" => {
                    num_workers = parse_flag_value(&arg, args.next())?;
                    if num_workers == 0 {
                        return Err(ConfigError::Usage(
                            "--workers must be positive".to_string(),
                        ));
                    }
                }
                "--output" => {
                    let value = args
                        .next()
                        .ok_or_else(|| ConfigError::Usage("--output needs a path".to_string()))?;
                    output_path = PathBuf::from(value);
                }
                other if other.starts_with("--") => {
                    return Err(ConfigError::Usage(format!("unknown flag {:?}", other)));
                }
                _ => positional.push(arg),
            }
        }

        if positional.len() != 2 {
            return Err(ConfigError::Usage(format!(
                "expected 2 positional arguments, got {}",
                positional.len()
            )));
        }
        let mut positional = positional.into_iter();

        Ok(Config {
            matrix_path: PathBuf::from(positional.next().unwrap()),
            labels_path: PathBuf::from(positional.next().unwrap()),
            output_path,
            max_iterations,
            num_workers,
        })
    }

    /// Load the matrix and label file and check they agree.
    pub fn load(&self) -> Result<(Matrix, LabelSet), ConfigError> {
        let matrix = Matrix::from_npy(&self.matrix_path)?;
        let labels = LabelSet::from_path(&self.labels_path)?;
        labels.validate_against(&matrix)?;
        Ok((matrix, labels))
    }
}

fn parse_flag_value(flag: &str, value: Option<String>) -> Result<usize, ConfigError> {
    let value =
        value.ok_or_else(|| ConfigError::Usage(format!("{} needs a value", flag)))?;
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Usage(format!("{} got a non-integer {:?}", flag, value)))
}

/// Everything that can go wrong before clustering starts.
#[derive(Debug)]
pub enum ConfigError {
    /// Bad command line.
    Usage(String),
    /// File could not be read or written.
    Io(io::Error),
    /// The matrix file is not a readable 2-D `f32` `.npy` array.
    Npy(ReadNpyError),
    /// The label file is malformed.
    LabelFile(String),
    /// Matrix and label file disagree on the problem shape.
    ShapeMismatch {
        matrix: (usize, usize),
        labels: (usize, usize),
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Usage(msg) => write!(f, "{}\n{}", msg, USAGE),
            ConfigError::Io(err) => write!(f, "I/O error: {}", err),
            ConfigError::Npy(err) => write!(f, "matrix file error: {}", err),
            ConfigError::LabelFile(msg) => write!(f, "label file error: {}", msg),
            ConfigError::ShapeMismatch { matrix, labels } => write!(
                f,
                "matrix is {}x{} but the label file declares {}x{}",
                matrix.0, matrix.1, labels.0, labels.1
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Npy(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> ConfigError {
        ConfigError::Io(err)
    }
}

impl From<ReadNpyError> for ConfigError {
    fn from(err: ReadNpyError) -> ConfigError {
        ConfigError::Npy(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        std::iter::once("dist_cocluster".to_string())
            .chain(list.iter().map(|s| s.to_string()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_positional_arguments_and_defaults() {
        let config = Config::new(args(&["matrix.npy", "labels.txt"])).unwrap();
        assert_eq!(config.matrix_path, PathBuf::from("matrix.npy"));
        assert_eq!(config.labels_path, PathBuf::from("labels.txt"));
        assert_eq!(config.output_path, PathBuf::from("labels.out"));
        assert_eq!(config.max_iterations, 25);
        assert!(config.num_workers >= 1);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::new(args(&[
            "m.npy",
            "--max-iterations",
            "7",
            "l.txt",
            "--output",
            "final.txt",
            "--workers",
            "3",
        ]))
        .unwrap();
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.output_path, PathBuf::from("final.txt"));
        assert_eq!(config.num_workers, 3);
    }

    #[test]
    fn test_missing_positional_is_usage_error() {
        let err = Config::new(args(&["matrix.npy"])).unwrap_err();
        assert!(matches!(err, ConfigError::Usage(_)));
    }

    #[test]
    fn test_unknown_flag_is_usage_error() {
        let err = Config::new(args(&["m.npy", "l.txt", "--fast"])).unwrap_err();
        assert!(matches!(err, ConfigError::Usage(_)));
    }

    #[test]
    fn test_non_integer_flag_value() {
        let err = Config::new(args(&["m.npy", "l.txt", "--max-iterations", "soon"])).unwrap_err();
        assert!(matches!(err, ConfigError::Usage(_)));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = Config::new(args(&["m.npy", "l.txt", "--workers", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::Usage(_)));
    }
}
