//! Module tree engine.
//!
//! A module owns named parameters and an ordered list of named submodules.
//! Every concrete module embeds a [`ModuleBase`] and declares its owned state
//! explicitly in its constructor through [`ModuleBase::register_param`] and
//! [`ModuleBase::add_submodule`].
//!
//! `forward` computes `activation(children(self(x)))`: the module's own
//! transform, then each child in insertion order, then the activation.
//! `backward` walks the same composition in reverse: activation, children in
//! reverse insertion order, then the module's own gradient.
//!
//! The submodule named [`ACTIVATION`] never takes part in ordinary child
//! iteration. It is applied as the outermost wrapper, unless a raw
//! [`ActivationFn`] is attached, which takes precedence over it.

pub mod activation;
pub mod param;
pub mod registry;

pub use activation::{Activation, ActivationFn};
pub use param::Param;
pub use registry::{ModuleFactory, Registry};

use crate::backends::{Element, Tensor};
use crate::error::{ModuleError, Result};

use std::fmt::Write;

/// Reserved submodule name for an owned activation.
pub const ACTIVATION: &str = "activation";

/// A submodule handed to [`ModuleBase::add_submodule`]: either a built
/// instance or a factory instantiated under the submodule's name.
pub enum Submodule<T: Element, B: Tensor<T>> {
    Instance(Box<dyn Module<T, B>>),
    Factory(ModuleFactory<T, B>),
}

/// State shared by every module: identity, owned params and submodules,
/// the raw activation slot and the per-call cache used by `backward`.
pub struct ModuleBase<T: Element, B: Tensor<T>> {
    name: String,
    params: Vec<(String, Param<T, B>)>,
    submodules: Vec<(String, Box<dyn Module<T, B>>)>,
    activation: Option<ActivationFn<T, B>>,
    last_input: Option<B>,
    last_output: Option<B>,
}

impl<T: Element, B: Tensor<T>> ModuleBase<T, B> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            submodules: Vec::new(),
            activation: None,
            last_input: None,
            last_output: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Declares owned state. Re-registering a name replaces the value in place.
    pub fn register_param(&mut self, name: impl Into<String>, value: Param<T, B>) {
        let name = name.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.params.push((name, value)),
        }
    }

    /// Registers a child. A factory is instantiated with `name`; an existing
    /// entry under the same name is replaced and keeps its position.
    pub fn add_submodule(&mut self, name: impl Into<String>, module: Submodule<T, B>) {
        let name = name.into();
        let module = match module {
            Submodule::Instance(module) => module,
            Submodule::Factory(factory) => factory.instantiate(Some(&name)),
        };
        log::debug!(
            "[{}] adding submodule {} of type {}",
            self.name,
            name,
            module.name()
        );

        match self.submodules.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = module,
            None => self.submodules.push((name, module)),
        }
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &Param<T, B>)> {
        self.params.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn param(&self, name: &str) -> Option<&Param<T, B>> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut Param<T, B>> {
        self.params
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    pub fn tensor(&self, name: &str) -> Option<&B> {
        self.param(name).and_then(Param::as_tensor)
    }

    pub fn tensor_mut(&mut self, name: &str) -> Option<&mut B> {
        self.param_mut(name).and_then(Param::as_tensor_mut)
    }

    pub fn scalar(&self, name: &str) -> Option<T> {
        self.param(name).and_then(Param::as_scalar)
    }

    pub fn submodule_names(&self) -> impl Iterator<Item = &str> {
        self.submodules.iter().map(|(n, _)| n.as_str())
    }

    pub fn submodule(&self, name: &str) -> Option<&dyn Module<T, B>> {
        self.submodules
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m.as_ref())
    }

    pub fn submodule_mut(&mut self, name: &str) -> Option<&mut (dyn Module<T, B> + 'static)> {
        self.submodules
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m.as_mut())
    }

    /// Attaches a raw activation function. It takes precedence over an
    /// [`ACTIVATION`] submodule.
    pub fn set_activation_fn(&mut self, activation: ActivationFn<T, B>) {
        self.activation = Some(activation);
    }

    pub fn activation_fn(&self) -> Option<&ActivationFn<T, B>> {
        self.activation.as_ref()
    }

    pub fn last_input(&self) -> Option<&B> {
        self.last_input.as_ref()
    }

    pub fn last_output(&self) -> Option<&B> {
        self.last_output.as_ref()
    }

    fn children_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut Box<dyn Module<T, B>>> {
        self.submodules
            .iter_mut()
            .filter(|(n, _)| n != ACTIVATION)
            .map(|(_, m)| m)
    }

    fn activation_forward(&mut self, x: &B) -> Result<B> {
        if let Some(activation) = self.activation.as_mut() {
            return activation.forward(x);
        }
        match self.submodule_mut(ACTIVATION) {
            Some(activation) => activation.forward(x),
            None => Ok(x.clone()),
        }
    }

    fn activation_backward(&mut self, grad_output: &B) -> Result<B> {
        if let Some(activation) = self.activation.as_mut() {
            return activation.backward(grad_output);
        }
        match self.submodule_mut(ACTIVATION) {
            Some(activation) => activation.backward(grad_output),
            None => Ok(grad_output.clone()),
        }
    }

    /// Recursive structural dump used for debugging and golden tests.
    pub fn render(&self, depth: usize) -> String {
        let indent = "  ".repeat(depth + 1);
        let mut out = format!("{}(", self.name);
        let initial = out.len();

        for (name, value) in &self.params {
            let _ = write!(out, "\n{}{} = {},", indent, name, value);
        }
        if let Some(activation) = &self.activation {
            let _ = write!(out, "\n{}{} = {},", indent, ACTIVATION, activation.name());
        }
        for (name, module) in &self.submodules {
            let rendered = module.base().render(depth + 1);
            let _ = write!(out, "\n{}{} = {},", indent, name, rendered);
        }

        if out.len() == initial {
            out.push(')');
        } else {
            let _ = write!(out, "\n{})", "  ".repeat(depth));
        }
        out
    }
}

/// A composable unit of computation.
///
/// Implementors expose their [`ModuleBase`] and override `self_transform` /
/// `self_gradient`; the traversal in `forward` / `backward` is shared.
pub trait Module<T: Element, B: Tensor<T>>: Send {
    fn base(&self) -> &ModuleBase<T, B>;

    fn base_mut(&mut self) -> &mut ModuleBase<T, B>;

    /// The module's own transform. Identity unless overridden.
    fn self_transform(&mut self, input: &B) -> Result<B> {
        Ok(input.clone())
    }

    /// Gradient of the module's own transform with respect to its input.
    fn self_gradient(&mut self, grad_output: &B) -> Result<B> {
        Ok(grad_output.clone())
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    fn forward(&mut self, input: &B) -> Result<B> {
        log::debug!("[{}] forward", self.name());
        log::trace!("[{}] input shape {:?}", self.name(), input.shape());

        let base = self.base_mut();
        base.last_input = None;
        base.last_output = None;

        let output = traverse_forward(self, input)?;

        let base = self.base_mut();
        base.last_input = Some(input.clone());
        base.last_output = Some(output.clone());
        Ok(output)
    }

    /// Fails with [`ModuleError::MissingForward`] unless the most recent
    /// forward call succeeded.
    fn backward(&mut self, grad_output: &B) -> Result<B> {
        log::debug!("[{}] backward", self.name());
        if self.base().last_input.is_none() {
            return Err(ModuleError::missing_forward(self.name()));
        }

        let mut grad = self.base_mut().activation_backward(grad_output)?;
        for child in self.base_mut().children_mut().rev() {
            grad = child.backward(&grad)?;
        }
        self.self_gradient(&grad)
    }

    fn repr(&self) -> String {
        self.base().render(0)
    }
}

/// Own transform, then children in order, then the activation.
fn traverse_forward<T, B, M>(module: &mut M, input: &B) -> Result<B>
where
    T: Element,
    B: Tensor<T>,
    M: Module<T, B> + ?Sized,
{
    let mut x = module.self_transform(input)?;
    for child in module.base_mut().children_mut() {
        x = child.forward(&x)?;
    }
    module.base_mut().activation_forward(&x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::cpu::CpuTensor;
    use crate::nn::activations::{ReLU, Sigmoid};
    use crate::nn::linear::Linear;
    use ndarray::array;

    type Base = ModuleBase<f64, CpuTensor<f64>>;

    /// Doubles its input and owns whatever children a test attaches.
    struct Double {
        base: Base,
    }

    impl Double {
        fn new() -> Self {
            Self {
                base: ModuleBase::new("Double"),
            }
        }
    }

    impl Module<f64, CpuTensor<f64>> for Double {
        fn base(&self) -> &Base {
            &self.base
        }

        fn base_mut(&mut self) -> &mut Base {
            &mut self.base
        }

        fn self_transform(&mut self, input: &CpuTensor<f64>) -> Result<CpuTensor<f64>> {
            Ok(input.mul_scalar(2.0))
        }

        fn self_gradient(&mut self, grad_output: &CpuTensor<f64>) -> Result<CpuTensor<f64>> {
            Ok(grad_output.mul_scalar(2.0))
        }
    }

    fn tensor(data: ndarray::ArrayD<f64>) -> CpuTensor<f64> {
        CpuTensor::new(data)
    }

    fn instance<M>(module: M) -> Submodule<f64, CpuTensor<f64>>
    where
        M: Module<f64, CpuTensor<f64>> + 'static,
    {
        Submodule::Instance(Box::new(module))
    }

    #[test]
    fn test_submodule_registration() {
        let mut base = Base::new("Parent");
        base.add_submodule("child", instance(ReLU::new()));

        assert_eq!(base.submodule_names().collect::<Vec<_>>(), vec!["child"]);
        assert_eq!(base.submodule("child").unwrap().name(), "ReLU");
        assert!(base.param("child").is_none());
    }

    #[test]
    fn test_readding_submodule_replaces_in_place() {
        let mut base = Base::new("Parent");
        base.add_submodule("a", instance(ReLU::new()));
        base.add_submodule("b", instance(ReLU::new()));
        base.add_submodule("a", instance(Sigmoid::new()));

        assert_eq!(base.submodule_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(base.submodule("a").unwrap().name(), "Sigmoid");
    }

    #[test]
    fn test_factory_is_instantiated_with_the_submodule_name() {
        let mut base = Base::new("Parent");
        base.add_submodule("gate", Submodule::Factory(Sigmoid::factory()));
        assert_eq!(base.submodule("gate").unwrap().name(), "gate");
    }

    #[test]
    fn test_register_param_replaces_value() {
        let mut base = Base::new("Parent");
        base.register_param("lr", Param::Scalar(0.1));
        base.register_param("lr", Param::Scalar(0.2));
        assert_eq!(base.params().count(), 1);
        assert_eq!(base.scalar("lr"), Some(0.2));
    }

    #[test]
    fn test_forward_applies_self_then_children_then_activation() {
        let mut module = Double::new();
        module.base_mut().add_submodule(ACTIVATION, instance(ReLU::new()));
        module.base_mut().add_submodule("inner", instance(Double::new()));

        let x = tensor(array![[1.0, -3.0]].into_dyn());
        let out = module.forward(&x).unwrap();
        assert_eq!(out.data, array![[4.0, 0.0]].into_dyn());
        assert_eq!(module.base().last_output().unwrap().data, out.data);
    }

    #[test]
    fn test_backward_mirrors_forward() {
        let mut module = Double::new();
        module.base_mut().add_submodule(ACTIVATION, instance(ReLU::new()));
        module.base_mut().add_submodule("inner", instance(Double::new()));

        module.forward(&tensor(array![[1.0, -3.0]].into_dyn())).unwrap();
        let grad = module.backward(&tensor(array![[1.0, 1.0]].into_dyn())).unwrap();
        assert_eq!(grad.data, array![[4.0, 0.0]].into_dyn());
    }

    #[test]
    fn test_backward_runs_children_before_own_gradient() {
        // A 3 -> 2 layer owning a 2 -> 1 child: only child-first ordering
        // lines up the shapes.
        let mut outer = Linear::from_weights(
            tensor(array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]].into_dyn()),
            tensor(array![0.0, 0.0].into_dyn()),
            0.0,
            Activation::None,
        )
        .unwrap();
        let inner = Linear::from_weights(
            tensor(array![[1.0], [2.0]].into_dyn()),
            tensor(array![0.0].into_dyn()),
            0.0,
            Activation::None,
        )
        .unwrap();
        outer.base_mut().add_submodule("head", instance(inner));

        let out = outer.forward(&tensor(array![[1.0, 2.0, 3.0]].into_dyn())).unwrap();
        assert_eq!(out.data, array![[14.0]].into_dyn());

        let grad = outer.backward(&tensor(array![[1.0]].into_dyn())).unwrap();
        assert_eq!(grad.data, array![[1.0, 2.0, 3.0]].into_dyn());
    }

    #[test]
    fn test_backward_before_forward_fails_fast() {
        let mut module = Double::new();
        let err = module.backward(&tensor(array![[1.0]].into_dyn())).unwrap_err();
        assert!(
            matches!(err, ModuleError::MissingForward { ref module } if module == "Double")
        );
    }

    #[test]
    fn test_failed_forward_clears_cache() {
        let head = Linear::from_weights(
            tensor(array![[1.0], [1.0]].into_dyn()),
            tensor(array![0.0].into_dyn()),
            0.1,
            Activation::None,
        )
        .unwrap();
        let mut module = Double::new();
        module.base_mut().add_submodule("head", instance(head));

        module.forward(&tensor(array![[1.0, 2.0]].into_dyn())).unwrap();
        assert!(module.forward(&tensor(array![[1.0]].into_dyn())).is_err());
        assert!(module.base().last_input().is_none());
        assert!(module.base().last_output().is_none());

        let err = module.backward(&tensor(array![[1.0]].into_dyn())).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PreconditionViolation);
    }

    #[test]
    fn test_render_empty_and_nested() {
        let mut base = Base::new("Outer");
        assert_eq!(base.render(0), "Outer()");

        base.register_param("scale", Param::Scalar(0.5));
        base.add_submodule("inner", instance(ReLU::new()));
        assert_eq!(
            base.render(0),
            "Outer(\n  scale = 0.5,\n  inner = ReLU(),\n)"
        );
    }
}
