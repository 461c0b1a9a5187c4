use super::{Module, ModuleFactory};
use crate::backends::{Element, Tensor};
use crate::error::{ModuleError, Result};
use crate::nn::activations::{
    default_slope, leaky_relu, leaky_relu_backward, relu, relu_backward, sigmoid,
    sigmoid_backward, softmax, softmax_backward,
};

/// Activation argument accepted by layer constructors, resolved once at
/// construction time.
pub enum Activation<T: Element, B: Tensor<T>> {
    None,
    /// Module type, instantiated under its default name.
    Factory(ModuleFactory<T, B>),
    /// Already constructed module.
    Module(Box<dyn Module<T, B>>),
    /// Raw function pair applied without child traversal.
    Function(ActivationFn<T, B>),
    /// Registered module type looked up by name, case-insensitively.
    Named(String),
}

impl<T: Element, B: Tensor<T>> Default for Activation<T, B> {
    fn default() -> Self {
        Activation::None
    }
}

pub type ForwardFn<B> = fn(&B) -> Result<B>;

/// Receives the cached input and the incoming gradient.
pub type BackwardFn<B> = fn(&B, &B) -> Result<B>;

/// A stateless activation function with its derivative, plus the input cache
/// its backward pass needs.
#[derive(Clone)]
pub struct ActivationFn<T: Element, B: Tensor<T>> {
    name: &'static str,
    forward: ForwardFn<B>,
    backward: BackwardFn<B>,
    input: Option<B>,
    dtype: std::marker::PhantomData<T>,
}

impl<T: Element, B: Tensor<T>> ActivationFn<T, B> {
    pub fn new(name: &'static str, forward: ForwardFn<B>, backward: BackwardFn<B>) -> Self {
        Self {
            name,
            forward,
            backward,
            input: None,
            dtype: std::marker::PhantomData,
        }
    }

    pub fn relu() -> Self {
        Self::new("relu", |x| Ok(relu::<T, B>(x)), relu_backward::<T, B>)
    }

    /// Leaky ReLU with the default slope.
    pub fn leaky_relu() -> Self {
        Self::new(
            "leaky_relu",
            |x| Ok(leaky_relu::<T, B>(x, default_slope::<T>())),
            |x, grad| leaky_relu_backward::<T, B>(x, grad, default_slope::<T>()),
        )
    }

    pub fn sigmoid() -> Self {
        Self::new(
            "sigmoid",
            |x| Ok(sigmoid::<T, B>(x)),
            |x, grad| sigmoid_backward::<T, B>(&sigmoid::<T, B>(x), grad),
        )
    }

    pub fn softmax() -> Self {
        Self::new("softmax", softmax::<T, B>, |x, grad| {
            softmax_backward::<T, B>(&softmax::<T, B>(x)?, grad)
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn forward(&mut self, x: &B) -> Result<B> {
        self.input = Some(x.clone());
        (self.forward)(x)
    }

    pub fn backward(&mut self, grad_output: &B) -> Result<B> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| ModuleError::missing_forward(self.name))?;
        (self.backward)(input, grad_output)
    }
}

impl<T: Element, B: Tensor<T>> std::fmt::Debug for ActivationFn<T, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationFn").field("name", &self.name).finish()
    }
}
