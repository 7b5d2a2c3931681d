//! This crate provides the validated hyperparameter record for a Deep Q-Network (DQN)
//! training run: compute device, network sizing, replay memory sizing, optimizer
//! and target-network rates, the ε-greedy schedule, and epoch/checkpoint cadence.
//! Values can come from files, the environment or the command line, and are
//! checked once when the record is built.

pub mod config;
pub mod device;
pub mod error;
pub mod exploration;
pub mod network;
pub mod store;
pub mod value;

pub use config::{TrainingConfig, TrainingConfigBuilder};
pub use device::{ComputeDevice, DeviceProbe, DeviceRequest, FixedProbe, TchProbe};
pub use error::{ConfigError, Constraint, LoadError};
pub use exploration::ExplorationSchedule;
pub use network::{Activation, NetworkOptions};
pub use store::ConfigStore;
pub use value::{ConfigMap, ConfigValue, MAX_COUNT};
