pub mod cpu;

use crate::error::TensorError;

use ndarray::{ArrayD, ScalarOperand};
use num_traits::{Float, FromPrimitive};
use std::fmt::{Debug, Display};
use std::iter::Sum;

/// Scalar types a tensor can hold.
pub trait Element:
    'static + Float + FromPrimitive + ScalarOperand + Debug + Display + Sum + Send + Sync
{
}

impl<T> Element for T where
    T: 'static + Float + FromPrimitive + ScalarOperand + Debug + Display + Sum + Send + Sync
{
}

/// N-dimensional array interface consumed by the module engine.
///
/// Binary elementwise operations broadcast numpy-style and report
/// incompatible shapes as [`TensorError::ShapeMismatch`].
pub trait Tensor<T: Element>: 'static + Clone + Debug + Send + Sync + Sized {
    fn new(data: ArrayD<T>) -> Self;

    fn get_data(&self) -> &ArrayD<T>;

    fn get_data_mut(&mut self) -> &mut ArrayD<T>;

    fn shape(&self) -> Vec<usize>;

    fn size(&self) -> usize;

    fn zeros(shape: &[usize]) -> Self;

    fn zeros_like(tensor: &Self) -> Self;

    /// Gaussian draw with mean zero and the given standard deviation.
    fn randn(shape: &[usize], std: T) -> Self;

    /// Reverses the axis order; for matrices this is the usual transpose.
    fn transpose(&self) -> Self;

    /// Matrix product of two rank-2 tensors.
    fn matmul(&self, other: &Self) -> Result<Self, TensorError>;

    fn add(&self, other: &Self) -> Result<Self, TensorError>;

    fn sub(&self, other: &Self) -> Result<Self, TensorError>;

    fn mul(&self, other: &Self) -> Result<Self, TensorError>;

    fn div(&self, other: &Self) -> Result<Self, TensorError>;

    fn mul_scalar(&self, scalar: T) -> Self;

    fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T;

    fn exp(&self) -> Self {
        self.map(|x| x.exp())
    }

    fn clip(&self, min: T, max: T) -> Self {
        self.map(|x| x.max(min).min(max))
    }

    /// Mask holding one where the element is greater than `scalar`, zero elsewhere.
    fn gt_scalar(&self, scalar: T) -> Self {
        self.map(|x| if x > scalar { T::one() } else { T::zero() })
    }

    fn max_axis(&self, axis: usize, keep_dims: bool) -> Result<Self, TensorError>;

    fn sum_axis(&self, axis: usize, keep_dims: bool) -> Result<Self, TensorError>;

    fn sum(&self) -> T;

    fn mean(&self) -> T;
}
