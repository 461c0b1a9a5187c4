//! Declarative layer configuration, loadable from JSON.
//!
//! ```json
//! {
//!   "name": "classifier",
//!   "layers": [
//!     { "fan_in": 4, "fan_out": 8, "activation": "relu" },
//!     { "fan_in": 8, "fan_out": 3, "activation": "softmax", "lr": 0.05 }
//!   ]
//! }
//! ```

use crate::error::Result;
use crate::nn::linear::DEFAULT_LEARNING_RATE;

use serde::{Deserialize, Serialize};

fn default_lr() -> f64 {
    DEFAULT_LEARNING_RATE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub fan_in: usize,
    pub fan_out: usize,
    #[serde(default = "default_lr")]
    pub lr: f64,
    /// Registered activation type name, e.g. `"relu"`.
    #[serde(default)]
    pub activation: Option<String>,
}

impl LinearConfig {
    pub fn new(fan_in: usize, fan_out: usize) -> Self {
        Self {
            name: None,
            fan_in,
            fan_out,
            lr: DEFAULT_LEARNING_RATE,
            activation: None,
        }
    }

    pub fn activation(mut self, activation: &str) -> Self {
        self.activation = Some(activation.to_string());
        self
    }

    pub fn lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequentialConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub layers: Vec<LinearConfig>,
}

impl SequentialConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
