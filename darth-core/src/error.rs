//! Error types shared by the tensor backend and the module engine.

use thiserror::Error;

/// Failures reported by tensor operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("cannot {op} tensors of shapes {lhs:?} and {rhs:?}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    #[error("axis {axis} is out of range for a tensor of rank {rank}")]
    AxisOutOfRange { axis: usize, rank: usize },
}

/// Failures reported while building or running a module tree.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("backward called on `{module}` before a matching forward")]
    MissingForward { module: String },

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Coarse classification of a [`ModuleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    PreconditionViolation,
}

impl ModuleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModuleError::MissingForward { .. } => ErrorKind::PreconditionViolation,
            ModuleError::InvalidArgument(_)
            | ModuleError::Tensor(_)
            | ModuleError::Config(_) => ErrorKind::InvalidArgument,
        }
    }

    pub(crate) fn missing_forward(module: &str) -> Self {
        ModuleError::MissingForward {
            module: module.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModuleError>;
