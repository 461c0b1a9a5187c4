use super::{Element, Tensor};
use crate::error::TensorError;

use ndarray::linalg::general_mat_mul;
use ndarray::{Array, ArrayD, Axis, Ix2, IxDyn, Zip};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuTensor<T> {
    pub data: ArrayD<T>,
}

/// Resulting shape when broadcasting `lhs` against `rhs`, aligned from the trailing axis.
fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Option<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    let dim = |shape: &[usize], i: usize| {
        let offset = rank - shape.len();
        if i >= offset { shape[i - offset] } else { 1 }
    };

    let mut shape = Vec::with_capacity(rank);
    for i in 0..rank {
        let (l, r) = (dim(lhs, i), dim(rhs, i));
        if l == r || r == 1 {
            shape.push(l);
        } else if l == 1 {
            shape.push(r);
        } else {
            return None;
        }
    }
    Some(shape)
}

impl<T: Element> CpuTensor<T> {
    fn zip_with<F>(&self, other: &Self, op: &'static str, f: F) -> Result<Self, TensorError>
    where
        F: Fn(T, T) -> T,
    {
        let mismatch = || TensorError::ShapeMismatch {
            op,
            lhs: self.shape(),
            rhs: other.shape(),
        };
        let shape = broadcast_shape(self.data.shape(), other.data.shape())
            .ok_or_else(mismatch)?;

        let lhs = self.data.broadcast(IxDyn(&shape)).ok_or_else(mismatch)?;
        let rhs = other.data.broadcast(IxDyn(&shape)).ok_or_else(mismatch)?;
        let data = Zip::from(&lhs).and(&rhs).map_collect(|&a, &b| f(a, b));
        Ok(Self { data })
    }

    fn check_axis(&self, axis: usize) -> Result<(), TensorError> {
        if axis >= self.data.ndim() {
            return Err(TensorError::AxisOutOfRange {
                axis,
                rank: self.data.ndim(),
            });
        }
        Ok(())
    }
}

impl<T: Element> Tensor<T> for CpuTensor<T> {
    fn new(data: ArrayD<T>) -> Self {
        Self { data }
    }

    fn get_data(&self) -> &ArrayD<T> {
        &self.data
    }

    fn get_data_mut(&mut self) -> &mut ArrayD<T> {
        &mut self.data
    }

    fn shape(&self) -> Vec<usize> {
        self.data.shape().to_vec()
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn zeros(shape: &[usize]) -> Self {
        Self {
            data: Array::zeros(IxDyn(shape)),
        }
    }

    fn zeros_like(tensor: &Self) -> Self {
        Self {
            data: Array::zeros(tensor.data.raw_dim()),
        }
    }

    fn randn(shape: &[usize], std: T) -> Self {
        let mut rng = rand::thread_rng();
        let data = Array::from_shape_fn(IxDyn(shape), |_| {
            let z: f64 = rng.sample(StandardNormal);
            T::from_f64(z).unwrap_or_else(T::zero) * std
        });
        Self { data }
    }

    fn transpose(&self) -> Self {
        Self {
            data: self.data.clone().reversed_axes(),
        }
    }

    fn matmul(&self, other: &Self) -> Result<Self, TensorError> {
        let mismatch = || TensorError::ShapeMismatch {
            op: "matmul",
            lhs: self.shape(),
            rhs: other.shape(),
        };

        let first = self
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| mismatch())?;
        let second = other
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| mismatch())?;
        if first.ncols() != second.nrows() {
            return Err(mismatch());
        }

        let mut result = Array::<T, Ix2>::zeros((first.nrows(), second.ncols()));
        general_mat_mul(T::one(), &first, &second, T::zero(), &mut result);
        Ok(Self {
            data: result.into_dyn(),
        })
    }

    fn add(&self, other: &Self) -> Result<Self, TensorError> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    fn sub(&self, other: &Self) -> Result<Self, TensorError> {
        self.zip_with(other, "subtract", |a, b| a - b)
    }

    fn mul(&self, other: &Self) -> Result<Self, TensorError> {
        self.zip_with(other, "multiply", |a, b| a * b)
    }

    fn div(&self, other: &Self) -> Result<Self, TensorError> {
        self.zip_with(other, "divide", |a, b| a / b)
    }

    fn mul_scalar(&self, scalar: T) -> Self {
        Self {
            data: self.data.mapv(|x| x * scalar),
        }
    }

    fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T,
    {
        Self {
            data: self.data.mapv(f),
        }
    }

    fn max_axis(&self, axis: usize, keep_dims: bool) -> Result<Self, TensorError> {
        self.check_axis(axis)?;
        let max = self
            .data
            .fold_axis(Axis(axis), T::neg_infinity(), |&acc, &x| acc.max(x));
        let data = if keep_dims {
            max.insert_axis(Axis(axis))
        } else {
            max
        };
        Ok(Self { data })
    }

    fn sum_axis(&self, axis: usize, keep_dims: bool) -> Result<Self, TensorError> {
        self.check_axis(axis)?;
        let sum = self.data.sum_axis(Axis(axis));
        let data = if keep_dims {
            sum.insert_axis(Axis(axis))
        } else {
            sum
        };
        Ok(Self { data })
    }

    fn sum(&self) -> T {
        self.data.sum()
    }

    fn mean(&self) -> T {
        if self.data.is_empty() {
            return T::zero();
        }
        self.data.sum() / T::from_usize(self.data.len()).unwrap_or_else(T::one)
    }
}
