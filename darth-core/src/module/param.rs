use crate::backends::{Element, Tensor};

use std::fmt;

/// Owned learnable or configuration state registered on a module.
#[derive(Debug, Clone)]
pub enum Param<T: Element, B: Tensor<T>> {
    Tensor(B),
    Scalar(T),
    Count(usize),
}

impl<T: Element, B: Tensor<T>> Param<T, B> {
    pub fn as_tensor(&self) -> Option<&B> {
        match self {
            Param::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn as_tensor_mut(&mut self) -> Option<&mut B> {
        match self {
            Param::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<T> {
        match self {
            Param::Scalar(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<usize> {
        match self {
            Param::Count(value) => Some(*value),
            _ => None,
        }
    }
}

impl<T: Element, B: Tensor<T>> fmt::Display for Param<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Tensor(tensor) => write!(f, "{}", tensor.get_data()),
            Param::Scalar(value) => write!(f, "{}", value),
            Param::Count(value) => write!(f, "{}", value),
        }
    }
}
