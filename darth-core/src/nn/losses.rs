use crate::backends::{Element, Tensor};
use crate::error::{ModuleError, Result};

/// A scalar reduction of predictions against targets, with its gradient.
pub trait Loss<T: Element, B: Tensor<T>> {
    fn loss(&self, predicted: &B, actual: &B) -> Result<T>;

    /// Gradient with respect to `predicted`, shaped like `predicted`.
    fn grad(&self, predicted: &B, actual: &B) -> Result<B>;
}

/// Mean squared error: `mean((p - y)^2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mse;

fn check_shapes<T: Element, B: Tensor<T>>(predicted: &B, actual: &B) -> Result<()> {
    if predicted.shape() != actual.shape() {
        return Err(ModuleError::InvalidArgument(format!(
            "loss expects matching shapes, got {:?} and {:?}",
            predicted.shape(),
            actual.shape()
        )));
    }
    Ok(())
}

impl<T: Element, B: Tensor<T>> Loss<T, B> for Mse {
    fn loss(&self, predicted: &B, actual: &B) -> Result<T> {
        check_shapes::<T, B>(predicted, actual)?;
        let diff = predicted.sub(actual)?;
        Ok(diff.mul(&diff)?.mean())
    }

    fn grad(&self, predicted: &B, actual: &B) -> Result<B> {
        check_shapes::<T, B>(predicted, actual)?;
        let n = T::from_usize(predicted.size().max(1)).unwrap_or_else(T::one);
        let scale = T::from_f64(2.0).unwrap_or_else(T::one) / n;
        Ok(predicted.sub(actual)?.mul_scalar(scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::cpu::CpuTensor;
    use ndarray::array;

    #[test]
    fn test_mse_loss_and_grad() {
        let pred = CpuTensor::new(array![[1.0, 2.0], [3.0, 4.0]].into_dyn());
        let target = CpuTensor::new(array![[1.0, 0.0], [3.0, 6.0]].into_dyn());

        assert_eq!(Mse.loss(&pred, &target).unwrap(), 2.0);
        let grad = Mse.grad(&pred, &target).unwrap();
        assert_eq!(grad.data, array![[0.0, 1.0], [0.0, -1.0]].into_dyn());
    }

    #[test]
    fn test_mse_rejects_shape_mismatch() {
        let pred = CpuTensor::new(array![1.0, 2.0].into_dyn());
        let target = CpuTensor::new(array![[1.0, 2.0]].into_dyn());
        assert!(Mse.loss(&pred, &target).is_err());
    }
}
