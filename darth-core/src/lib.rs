pub mod backends;
pub mod config;
pub mod error;
pub mod module;
pub mod nn;

pub use error::{ErrorKind, ModuleError, Result, TensorError};
