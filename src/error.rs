use std::fmt;
use std::path::PathBuf;

use crate::model::test_case::TestCaseId;

#[derive(Debug)]
pub enum OptimizerError {
    /// Reading or writing a file failed
    Io { path: PathBuf, source: std::io::Error },

    /// JSON parsing failed (test case, steps, recommendations, cache)
    JsonParse { context: String, source: serde_json::Error },

    /// JSON serialization failed (result files, optimized suite)
    JsonSerialize { context: String, source: serde_json::Error },

    /// YAML parsing failed
    YamlParse { context: String, source: serde_yaml::Error },

    /// A required field is absent from an input record
    MissingField { file: String, field: &'static str },

    /// An operation referenced an id that is not part of the suite
    UnknownTestCase { id: TestCaseId, context: String },

    /// Input that parses but cannot be used
    InvalidInput(String),

    /// Oracle configuration problem (unknown backend name etc.)
    Oracle(String),
}

pub type Result<T> = std::result::Result<T, OptimizerError>;

impl OptimizerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OptimizerError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn unknown(id: TestCaseId, context: impl Into<String>) -> Self {
        OptimizerError::UnknownTestCase {
            id,
            context: context.into(),
        }
    }
}

impl fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            OptimizerError::JsonParse { context, source } => {
                write!(f, "JSON parse error ({}): {}", context, source)
            }
            OptimizerError::JsonSerialize { context, source } => {
                write!(f, "JSON serialize error ({}): {}", context, source)
            }
            OptimizerError::YamlParse { context, source } => {
                write!(f, "YAML parse error ({}): {}", context, source)
            }
            OptimizerError::MissingField { file, field } => {
                write!(f, "Missing required field '{}' in {}", field, file)
            }
            OptimizerError::UnknownTestCase { id, context } => {
                write!(f, "Unknown test case {}: {}", id, context)
            }
            OptimizerError::InvalidInput(msg) => {
                write!(f, "Invalid input: {}", msg)
            }
            OptimizerError::Oracle(msg) => {
                write!(f, "Oracle error: {}", msg)
            }
        }
    }
}

impl std::error::Error for OptimizerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OptimizerError::Io { source, .. } => Some(source),
            OptimizerError::JsonParse { source, .. } => Some(source),
            OptimizerError::JsonSerialize { source, .. } => Some(source),
            OptimizerError::YamlParse { source, .. } => Some(source),
            _ => None,
        }
    }
}
