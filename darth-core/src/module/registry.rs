use super::Module;
use crate::backends::{Element, Tensor};
use crate::error::{ModuleError, Result};
use crate::nn::activations::{LeakyReLU, ReLU, Sigmoid, Softmax};
use crate::nn::linear::Sequential;

/// An uninstantiated module type: its default name and a constructor taking
/// the instance name.
pub struct ModuleFactory<T: Element, B: Tensor<T>> {
    type_name: &'static str,
    build: fn(&str) -> Box<dyn Module<T, B>>,
}

impl<T: Element, B: Tensor<T>> Clone for ModuleFactory<T, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Element, B: Tensor<T>> Copy for ModuleFactory<T, B> {}

impl<T: Element, B: Tensor<T>> ModuleFactory<T, B> {
    pub fn new(type_name: &'static str, build: fn(&str) -> Box<dyn Module<T, B>>) -> Self {
        Self { type_name, build }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Builds an instance, named `name` or else after the type.
    pub fn instantiate(&self, name: Option<&str>) -> Box<dyn Module<T, B>> {
        (self.build)(name.unwrap_or(self.type_name))
    }
}

/// Module types known by name, in registration order.
///
/// Populated explicitly, either entry by entry or through
/// [`Registry::with_builtins`].
pub struct Registry<T: Element, B: Tensor<T>> {
    entries: Vec<ModuleFactory<T, B>>,
}

impl<T: Element, B: Tensor<T>> Registry<T, B> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The parameter-free module types shipped with the crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ReLU::factory());
        registry.register(LeakyReLU::factory());
        registry.register(Sigmoid::factory());
        registry.register(Softmax::factory());
        registry.register(Sequential::factory());
        registry
    }

    /// Registers a type; an entry with the same type name is replaced.
    pub fn register(&mut self, factory: ModuleFactory<T, B>) {
        log::debug!("registering module type {}", factory.type_name());
        let existing = self
            .entries
            .iter_mut()
            .find(|f| f.type_name == factory.type_name);
        match existing {
            Some(slot) => *slot = factory,
            None => self.entries.push(factory),
        }
    }

    /// Case-insensitive lookup by type name.
    pub fn get(&self, type_name: &str) -> Option<ModuleFactory<T, B>> {
        self.entries
            .iter()
            .find(|f| f.type_name.eq_ignore_ascii_case(type_name))
            .copied()
    }

    pub fn instantiate(
        &self,
        type_name: &str,
        name: Option<&str>,
    ) -> Result<Box<dyn Module<T, B>>> {
        self.get(type_name)
            .map(|factory| factory.instantiate(name))
            .ok_or_else(|| {
                ModuleError::InvalidArgument(format!("unknown module type `{}`", type_name))
            })
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|f| f.type_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Element, B: Tensor<T>> Default for Registry<T, B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::cpu::CpuTensor;
    use crate::error::ErrorKind;

    type Cpu = CpuTensor<f32>;

    #[test]
    fn test_builtins_in_registration_order() {
        let registry = Registry::<f32, Cpu>::with_builtins();
        assert_eq!(
            registry.type_names().collect::<Vec<_>>(),
            vec!["ReLU", "LeakyReLU", "Sigmoid", "Softmax", "Sequential"]
        );
    }

    #[test]
    fn test_instantiate_by_name() {
        let registry = Registry::<f32, Cpu>::with_builtins();
        assert_eq!(registry.instantiate("relu", None).unwrap().name(), "ReLU");
        let gate = registry.instantiate("Sigmoid", Some("gate")).unwrap();
        assert_eq!(gate.name(), "gate");
    }

    #[test]
    fn test_unknown_type_is_invalid_argument() {
        let registry = Registry::<f32, Cpu>::with_builtins();
        let err = registry.instantiate("Tanh", None).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_register_replaces_same_type_name() {
        let mut registry = Registry::<f32, Cpu>::new();
        registry.register(ReLU::factory());
        registry.register(ModuleFactory::new(
            "ReLU",
            |name| -> Box<dyn Module<f32, Cpu>> { Box::new(Sigmoid::named(name)) },
        ));
        assert_eq!(registry.len(), 1);
        let replaced = registry.instantiate("ReLU", Some("x")).unwrap();
        assert_eq!(replaced.repr(), "x()");
    }
}
