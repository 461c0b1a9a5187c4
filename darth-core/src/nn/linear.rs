use crate::backends::{Element, Tensor};
use crate::config::{LinearConfig, SequentialConfig};
use crate::error::{ModuleError, Result};
use crate::module::{
    Activation, Module, ModuleBase, ModuleFactory, Param, Registry, Submodule, ACTIVATION,
};

pub const DEFAULT_LEARNING_RATE: f64 = 0.01;

/// Dense affine layer `x·weight + bias` that updates its own parameters
/// with plain gradient descent on every backward call.
pub struct Linear<T: Element, B: Tensor<T>> {
    base: ModuleBase<T, B>,
    weight_grad: Option<B>,
    bias_grad: Option<B>,
}

impl<T: Element, B: Tensor<T>> Linear<T, B> {
    /// He-scaled Gaussian weights, zero bias, default learning rate.
    pub fn new(fan_in: usize, fan_out: usize, activation: Activation<T, B>) -> Result<Self> {
        let lr = T::from_f64(DEFAULT_LEARNING_RATE).unwrap_or_else(T::zero);
        Self::with_lr(fan_in, fan_out, lr, activation)
    }

    pub fn with_lr(
        fan_in: usize,
        fan_out: usize,
        lr: T,
        activation: Activation<T, B>,
    ) -> Result<Self> {
        if fan_in == 0 || fan_out == 0 {
            return Err(ModuleError::InvalidArgument(format!(
                "Linear needs non-zero dimensions, got {}x{}",
                fan_in, fan_out
            )));
        }
        let std = T::from_f64((2.0 / fan_in as f64).sqrt()).unwrap_or_else(T::one);
        let weight = B::randn(&[fan_in, fan_out], std);
        let bias = B::zeros(&[fan_out]);

        Self::build(weight, bias, lr, activation)
    }

    /// Builds a layer around existing parameters. `weight` must be
    /// `fan_in x fan_out` and `bias` a vector of length `fan_out`.
    pub fn from_weights(weight: B, bias: B, lr: T, activation: Activation<T, B>) -> Result<Self> {
        let weight_shape = weight.shape();
        let bias_shape = bias.shape();
        if weight_shape.len() != 2 || bias_shape != [weight_shape[1]] {
            return Err(ModuleError::InvalidArgument(format!(
                "Linear expects weight [fan_in, fan_out] and bias [fan_out], got {:?} and {:?}",
                weight_shape, bias_shape
            )));
        }
        Self::build(weight, bias, lr, activation)
    }

    pub fn from_config(config: &LinearConfig) -> Result<Self> {
        let lr = T::from_f64(config.lr).ok_or_else(|| {
            ModuleError::InvalidArgument(format!(
                "learning rate {} is not representable",
                config.lr
            ))
        })?;
        let activation = match &config.activation {
            Some(name) => Activation::Named(name.clone()),
            None => Activation::None,
        };
        let layer = Self::with_lr(config.fan_in, config.fan_out, lr, activation)?;
        Ok(match &config.name {
            Some(name) => layer.with_name(name),
            None => layer,
        })
    }

    fn build(weight: B, bias: B, lr: T, activation: Activation<T, B>) -> Result<Self> {
        let shape = weight.shape();
        let mut base = ModuleBase::new("Linear");
        base.register_param("fan_in", Param::Count(shape[0]));
        base.register_param("fan_out", Param::Count(shape[1]));
        base.register_param("weight", Param::Tensor(weight));
        base.register_param("bias", Param::Tensor(bias));
        base.register_param("lr", Param::Scalar(lr));

        let mut layer = Self {
            base,
            weight_grad: None,
            bias_grad: None,
        };
        layer.attach_activation(activation)?;
        Ok(layer)
    }

    fn attach_activation(&mut self, activation: Activation<T, B>) -> Result<()> {
        match activation {
            Activation::None => {}
            Activation::Factory(factory) => {
                self.base.add_submodule(ACTIVATION, Submodule::Instance(factory.instantiate(None)));
            }
            Activation::Module(module) => {
                self.base.add_submodule(ACTIVATION, Submodule::Instance(module));
            }
            Activation::Function(function) => self.base.set_activation_fn(function),
            Activation::Named(type_name) => {
                let module = Registry::with_builtins().instantiate(&type_name, None)?;
                self.base.add_submodule(ACTIVATION, Submodule::Instance(module));
            }
        }
        Ok(())
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.base.set_name(name);
        self
    }

    pub fn fan_in(&self) -> usize {
        self.base.param("fan_in").and_then(Param::as_count).unwrap_or(0)
    }

    pub fn fan_out(&self) -> usize {
        self.base.param("fan_out").and_then(Param::as_count).unwrap_or(0)
    }

    /// Current value of the `lr` param, which every backward call reads.
    pub fn lr(&self) -> T {
        self.base.scalar("lr").unwrap_or_else(T::zero)
    }

    pub fn weight(&self) -> Option<&B> {
        self.base.tensor("weight")
    }

    pub fn weight_mut(&mut self) -> Option<&mut B> {
        self.base.tensor_mut("weight")
    }

    pub fn bias(&self) -> Option<&B> {
        self.base.tensor("bias")
    }

    pub fn bias_mut(&mut self) -> Option<&mut B> {
        self.base.tensor_mut("bias")
    }

    /// Weight gradient computed by the last backward call.
    pub fn weight_grad(&self) -> Option<&B> {
        self.weight_grad.as_ref()
    }

    pub fn bias_grad(&self) -> Option<&B> {
        self.bias_grad.as_ref()
    }

    fn param_tensor(&self, name: &str) -> Result<B> {
        self.base.tensor(name).cloned().ok_or_else(|| {
            ModuleError::InvalidArgument(format!(
                "{} has no tensor param `{}`",
                self.base.name(),
                name
            ))
        })
    }

    fn param_scalar(&self, name: &str) -> Result<T> {
        self.base.scalar(name).ok_or_else(|| {
            ModuleError::InvalidArgument(format!(
                "{} has no scalar param `{}`",
                self.base.name(),
                name
            ))
        })
    }
}

impl<T: Element, B: Tensor<T>> Module<T, B> for Linear<T, B> {
    fn base(&self) -> &ModuleBase<T, B> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase<T, B> {
        &mut self.base
    }

    fn self_transform(&mut self, input: &B) -> Result<B> {
        let weight = self.param_tensor("weight")?;
        let bias = self.param_tensor("bias")?;
        Ok(input.matmul(&weight)?.add(&bias)?)
    }

    fn self_gradient(&mut self, grad_output: &B) -> Result<B> {
        let input = self
            .base
            .last_input()
            .cloned()
            .ok_or_else(|| ModuleError::missing_forward(self.base.name()))?;
        let weight = self.param_tensor("weight")?;
        let bias = self.param_tensor("bias")?;
        let lr = self.param_scalar("lr")?;

        let grad_input = grad_output.matmul(&weight.transpose())?;
        let weight_grad = input.transpose().matmul(grad_output)?;
        let bias_grad = grad_output.sum_axis(0, false)?;
        if weight_grad.shape() != weight.shape() || bias_grad.shape() != bias.shape() {
            return Err(ModuleError::InvalidArgument(format!(
                "{} expects gradients shaped {:?} and {:?}, got {:?} and {:?}",
                self.base.name(),
                weight.shape(),
                bias.shape(),
                weight_grad.shape(),
                bias_grad.shape()
            )));
        }

        let new_weight = weight.sub(&weight_grad.mul_scalar(lr))?;
        let new_bias = bias.sub(&bias_grad.mul_scalar(lr))?;
        log::trace!(
            "[{}] weight {:?} updated with lr {}",
            self.base.name(),
            new_weight.shape(),
            lr
        );

        self.base.register_param("weight", Param::Tensor(new_weight));
        self.base.register_param("bias", Param::Tensor(new_bias));
        self.weight_grad = Some(weight_grad);
        self.bias_grad = Some(bias_grad);

        Ok(grad_input)
    }
}

/// Applies its children in order on forward and in reverse on backward.
pub struct Sequential<T: Element, B: Tensor<T>> {
    base: ModuleBase<T, B>,
    len: usize,
}

impl<T: Element, B: Tensor<T>> Sequential<T, B> {
    pub fn new(layers: Vec<Box<dyn Module<T, B>>>) -> Self {
        let mut sequential = Self::named("Sequential");
        for layer in layers {
            sequential.push_boxed(layer);
        }
        sequential
    }

    pub fn named(name: &str) -> Self {
        Self {
            base: ModuleBase::new(name),
            len: 0,
        }
    }

    pub fn factory() -> ModuleFactory<T, B> {
        ModuleFactory::new("Sequential", |name| Box::new(Self::named(name)))
    }

    pub fn from_config(config: &SequentialConfig) -> Result<Self> {
        let mut sequential = Self::named(config.name.as_deref().unwrap_or("Sequential"));
        for layer in &config.layers {
            sequential.push(Linear::from_config(layer)?);
        }
        Ok(sequential)
    }

    /// Builder form of [`Sequential::push`].
    pub fn with<M: Module<T, B> + 'static>(mut self, layer: M) -> Self {
        self.push(layer);
        self
    }

    /// Appends `layer` as `layer_{n}`.
    pub fn push<M: Module<T, B> + 'static>(&mut self, layer: M) {
        self.push_boxed(Box::new(layer));
    }

    pub fn push_boxed(&mut self, layer: Box<dyn Module<T, B>>) {
        let name = format!("layer_{}", self.len);
        self.base.add_submodule(name, Submodule::Instance(layer));
        self.len += 1;
    }

    pub fn layer(&self, index: usize) -> Option<&dyn Module<T, B>> {
        self.base.submodule(&format!("layer_{}", index))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T: Element, B: Tensor<T>> Default for Sequential<T, B> {
    fn default() -> Self {
        Self::named("Sequential")
    }
}

impl<T: Element, B: Tensor<T>> Module<T, B> for Sequential<T, B> {
    fn base(&self) -> &ModuleBase<T, B> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase<T, B> {
        &mut self.base
    }
}
