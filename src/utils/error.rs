// src/utils/error.rs
use crate::pipeline::asset::AssetKey;

/// Conditions raised by the asset graph and executor.
///
/// Everything else in the crate travels as `anyhow::Error`; these variants exist
/// so callers (and tests) can tell graph misuse apart from I/O failures with
/// `err.downcast_ref::<PipelineError>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// An op asked for an input that has no materialized value.
    NotMaterialized(AssetKey),
    /// An asset holds a value of a different kind than the op expected.
    UnexpectedValue {
        key: AssetKey,
        expected: &'static str,
    },
    /// Two ops declare the same output asset.
    DuplicateProducer(AssetKey),
    /// An op depends on an asset that no op produces.
    MissingProducer { op: &'static str, input: AssetKey },
    /// The op graph contains a cycle through the named op.
    Cycle(&'static str),
    /// An op returned an asset it did not declare, or skipped one it did.
    OutputMismatch { op: &'static str, key: AssetKey },
    /// Asset or op name that is not part of the graph.
    UnknownAsset(String),
    /// Cron expression that could not be parsed.
    InvalidCron(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::NotMaterialized(key) if key.is_fitted_state() => write!(
                f,
                "{} is not fitted: materialize it before using it downstream",
                key
            ),
            PipelineError::NotMaterialized(key) => {
                write!(f, "{} has not been materialized", key)
            }
            PipelineError::UnexpectedValue { key, expected } => {
                write!(f, "{} does not hold {}", key, expected)
            }
            PipelineError::DuplicateProducer(key) => {
                write!(f, "{} is produced by more than one op", key)
            }
            PipelineError::MissingProducer { op, input } => {
                write!(f, "op '{}' depends on {} but no op produces it", op, input)
            }
            PipelineError::Cycle(op) => write!(f, "op graph has a cycle through '{}'", op),
            PipelineError::OutputMismatch { op, key } => write!(
                f,
                "op '{}' returned outputs that do not match its declaration ({})",
                op, key
            ),
            PipelineError::UnknownAsset(name) => write!(f, "unknown asset '{}'", name),
            PipelineError::InvalidCron(reason) => write!(f, "invalid cron expression: {}", reason),
        }
    }
}

impl std::error::Error for PipelineError {}
