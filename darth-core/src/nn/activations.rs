use crate::backends::{Element, Tensor};
use crate::error::{ModuleError, Result};
use crate::module::{Module, ModuleBase, ModuleFactory, Param};

use ndarray::{Array, Array2, IxDyn};

pub const DEFAULT_LEAKY_SLOPE: f64 = 0.01;

pub fn default_slope<T: Element>() -> T {
    T::from_f64(DEFAULT_LEAKY_SLOPE).unwrap_or_else(T::zero)
}

pub fn relu<T, B>(x: &B) -> B
where
    T: Element,
    B: Tensor<T>,
{
    x.map(|v| v.max(T::zero()))
}

pub fn relu_backward<T, B>(x: &B, grad_output: &B) -> Result<B>
where
    T: Element,
    B: Tensor<T>,
{
    Ok(grad_output.mul(&x.gt_scalar(T::zero()))?)
}

pub fn leaky_relu<T, B>(x: &B, slope: T) -> B
where
    T: Element,
    B: Tensor<T>,
{
    x.map(|v| if v > T::zero() { v } else { slope * v })
}

pub fn leaky_relu_backward<T, B>(x: &B, grad_output: &B, slope: T) -> Result<B>
where
    T: Element,
    B: Tensor<T>,
{
    let local = x.map(|v| if v > T::zero() { T::one() } else { slope });
    Ok(grad_output.mul(&local)?)
}

pub fn sigmoid<T, B>(x: &B) -> B
where
    T: Element,
    B: Tensor<T>,
{
    x.map(|v| T::one() / (T::one() + (-v).exp()))
}

/// Takes the sigmoid output `s`, not its input.
pub fn sigmoid_backward<T, B>(output: &B, grad_output: &B) -> Result<B>
where
    T: Element,
    B: Tensor<T>,
{
    let local = output.map(|s| s * (T::one() - s));
    Ok(grad_output.mul(&local)?)
}

/// Softmax over the last axis, stabilized by subtracting the row maximum.
pub fn softmax<T, B>(x: &B) -> Result<B>
where
    T: Element,
    B: Tensor<T>,
{
    let last_axis = x.shape().len().saturating_sub(1);

    // Rows that are entirely -inf would otherwise turn into NaN.
    let max = x
        .max_axis(last_axis, true)?
        .map(|v| if v.is_infinite() { T::zero() } else { v });
    let exps = x.sub(&max)?.exp();

    let sum = exps
        .sum_axis(last_axis, true)?
        .map(|v| if v == T::zero() { T::epsilon() } else { v });
    Ok(exps.div(&sum)?)
}

/// Applies the full softmax Jacobian `diag(o) - o·oᵗ` to each gradient row,
/// where `o` is the softmax output.
pub fn softmax_backward<T, B>(output: &B, grad_output: &B) -> Result<B>
where
    T: Element,
    B: Tensor<T>,
{
    let shape = output.shape();
    if grad_output.shape() != shape || shape.is_empty() {
        return Err(ModuleError::InvalidArgument(format!(
            "softmax backward expects a gradient shaped like the output {:?}, got {:?}",
            shape,
            grad_output.shape()
        )));
    }

    let cols = shape[shape.len() - 1];
    let rows = if cols == 0 { 0 } else { output.size() / cols };
    let to_rows = |tensor: &B| {
        let values = tensor.get_data().iter().copied().collect();
        Array2::from_shape_vec((rows, cols), values)
            .map_err(|e| ModuleError::InvalidArgument(e.to_string()))
    };
    let o = to_rows(output)?;
    let g = to_rows(grad_output)?;

    let mut result = Vec::with_capacity(rows * cols);
    for (o_row, g_row) in o.outer_iter().zip(g.outer_iter()) {
        let mut jacobian = Array2::<T>::zeros((cols, cols));
        for i in 0..cols {
            for j in 0..cols {
                let diag = if i == j { o_row[i] } else { T::zero() };
                jacobian[[i, j]] = diag - o_row[i] * o_row[j];
            }
        }
        result.extend(jacobian.dot(&g_row).iter().copied());
    }

    let data = Array::from_shape_vec(IxDyn(&shape), result)
        .map_err(|e| ModuleError::InvalidArgument(e.to_string()))?;
    Ok(B::new(data))
}

pub struct ReLU<T: Element, B: Tensor<T>> {
    base: ModuleBase<T, B>,
}

impl<T: Element, B: Tensor<T>> ReLU<T, B> {
    pub fn new() -> Self {
        Self::named("ReLU")
    }

    pub fn named(name: &str) -> Self {
        Self {
            base: ModuleBase::new(name),
        }
    }

    pub fn factory() -> ModuleFactory<T, B> {
        ModuleFactory::new("ReLU", |name| Box::new(Self::named(name)))
    }
}

impl<T: Element, B: Tensor<T>> Default for ReLU<T, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element, B: Tensor<T>> Module<T, B> for ReLU<T, B> {
    fn base(&self) -> &ModuleBase<T, B> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase<T, B> {
        &mut self.base
    }

    fn self_transform(&mut self, input: &B) -> Result<B> {
        Ok(relu(input))
    }

    fn self_gradient(&mut self, grad_output: &B) -> Result<B> {
        let input = self
            .base
            .last_input()
            .ok_or_else(|| ModuleError::missing_forward(self.base.name()))?;
        relu_backward(input, grad_output)
    }
}

pub struct LeakyReLU<T: Element, B: Tensor<T>> {
    base: ModuleBase<T, B>,
    slope: T,
}

impl<T: Element, B: Tensor<T>> LeakyReLU<T, B> {
    pub fn new(slope: T) -> Self {
        Self::named("LeakyReLU", slope)
    }

    pub fn named(name: &str, slope: T) -> Self {
        let mut base = ModuleBase::new(name);
        base.register_param("slope", Param::Scalar(slope));
        Self { base, slope }
    }

    pub fn factory() -> ModuleFactory<T, B> {
        ModuleFactory::new("LeakyReLU", |name| {
            Box::new(Self::named(name, default_slope()))
        })
    }

    pub fn slope(&self) -> T {
        self.slope
    }
}

impl<T: Element, B: Tensor<T>> Default for LeakyReLU<T, B> {
    fn default() -> Self {
        Self::new(default_slope())
    }
}

impl<T: Element, B: Tensor<T>> Module<T, B> for LeakyReLU<T, B> {
    fn base(&self) -> &ModuleBase<T, B> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase<T, B> {
        &mut self.base
    }

    fn self_transform(&mut self, input: &B) -> Result<B> {
        Ok(leaky_relu(input, self.slope))
    }

    fn self_gradient(&mut self, grad_output: &B) -> Result<B> {
        let input = self
            .base
            .last_input()
            .ok_or_else(|| ModuleError::missing_forward(self.base.name()))?;
        leaky_relu_backward(input, grad_output, self.slope)
    }
}

pub struct Sigmoid<T: Element, B: Tensor<T>> {
    base: ModuleBase<T, B>,
    output: Option<B>,
}

impl<T: Element, B: Tensor<T>> Sigmoid<T, B> {
    pub fn new() -> Self {
        Self::named("Sigmoid")
    }

    pub fn named(name: &str) -> Self {
        Self {
            base: ModuleBase::new(name),
            output: None,
        }
    }

    pub fn factory() -> ModuleFactory<T, B> {
        ModuleFactory::new("Sigmoid", |name| Box::new(Self::named(name)))
    }
}

impl<T: Element, B: Tensor<T>> Default for Sigmoid<T, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element, B: Tensor<T>> Module<T, B> for Sigmoid<T, B> {
    fn base(&self) -> &ModuleBase<T, B> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase<T, B> {
        &mut self.base
    }

    fn self_transform(&mut self, input: &B) -> Result<B> {
        let output = sigmoid(input);
        self.output = Some(output.clone());
        Ok(output)
    }

    fn self_gradient(&mut self, grad_output: &B) -> Result<B> {
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| ModuleError::missing_forward(self.base.name()))?;
        sigmoid_backward(output, grad_output)
    }
}

pub struct Softmax<T: Element, B: Tensor<T>> {
    base: ModuleBase<T, B>,
    output: Option<B>,
}

impl<T: Element, B: Tensor<T>> Softmax<T, B> {
    pub fn new() -> Self {
        Self::named("Softmax")
    }

    pub fn named(name: &str) -> Self {
        Self {
            base: ModuleBase::new(name),
            output: None,
        }
    }

    pub fn factory() -> ModuleFactory<T, B> {
        ModuleFactory::new("Softmax", |name| Box::new(Self::named(name)))
    }
}

impl<T: Element, B: Tensor<T>> Default for Softmax<T, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element, B: Tensor<T>> Module<T, B> for Softmax<T, B> {
    fn base(&self) -> &ModuleBase<T, B> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase<T, B> {
        &mut self.base
    }

    fn self_transform(&mut self, input: &B) -> Result<B> {
        let output = softmax(input)?;
        self.output = Some(output.clone());
        Ok(output)
    }

    fn self_gradient(&mut self, grad_output: &B) -> Result<B> {
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| ModuleError::missing_forward(self.base.name()))?;
        softmax_backward(output, grad_output)
    }
}
