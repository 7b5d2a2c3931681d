//! Options handed to the value-network constructor.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ConfigError, Constraint, Result};
use crate::value::{ConfigMap, MAX_COUNT};

/// Hidden width used when `hidden_layers` is not given.
pub const DEFAULT_HIDDEN: usize = 64;

/// Non-linearity applied between hidden layers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Relu,
    LeakyRelu,
    Tanh,
    Sigmoid,
}

impl FromStr for Activation {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relu" => Ok(Self::Relu),
            "leaky_relu" | "leakyrelu" => Ok(Self::LeakyRelu),
            "tanh" => Ok(Self::Tanh),
            "sigmoid" => Ok(Self::Sigmoid),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Relu => "relu",
            Self::LeakyRelu => "leaky_relu",
            Self::Tanh => "tanh",
            Self::Sigmoid => "sigmoid",
        };
        f.write_str(name)
    }
}

/// Shape of the value network between the input and output layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkOptions {
    hidden_layers: Vec<usize>,
    activation: Activation,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            hidden_layers: vec![DEFAULT_HIDDEN],
            activation: Activation::default(),
        }
    }
}

impl NetworkOptions {
    /// Fails if `hidden_layers` is empty or holds a zero width.
    pub fn new(hidden_layers: Vec<usize>, activation: Activation) -> Result<Self> {
        if hidden_layers.is_empty() || hidden_layers.contains(&0) {
            return Err(ConfigError::new("hidden_layers", Constraint::NotPositive));
        }
        if hidden_layers.iter().any(|&width| width > MAX_COUNT) {
            return Err(ConfigError::new(
                "hidden_layers",
                Constraint::TooLarge { max: MAX_COUNT },
            ));
        }
        Ok(Self {
            hidden_layers,
            activation,
        })
    }

    /// Widths of the hidden layers, input side first.
    pub fn hidden_layers(&self) -> &[usize] {
        &self.hidden_layers
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Reads the sub-record; absent keys take their defaults. Field names in
    /// errors are relative to the sub-record.
    pub fn from_map(map: &ConfigMap) -> Result<Self> {
        let mut options = Self::default();

        for (key, value) in map {
            match key.as_str() {
                "hidden_layers" => {
                    let list = value
                        .as_list()
                        .ok_or_else(|| ConfigError::wrong_type(key.as_str(), "a list of widths"))?;
                    options.hidden_layers = list
                        .iter()
                        .map(|width| width.to_positive_usize("hidden_layers"))
                        .collect::<Result<_>>()?;
                }
                "activation" => {
                    options.activation = value
                        .as_str()
                        .and_then(|name| name.parse().ok())
                        .ok_or_else(|| {
                            ConfigError::wrong_type("activation", "relu, leaky_relu, tanh or sigmoid")
                        })?;
                }
                _ => return Err(ConfigError::new(key.as_str(), Constraint::UnknownField)),
            }
        }

        Self::new(options.hidden_layers, options.activation)
    }
}
