//! The validated training configuration.
//!
//! A [`TrainingConfig`] is built once at startup, either from a [`ConfigMap`]
//! of raw values or through [`TrainingConfigBuilder`], and is read-only from
//! then on. Every field is checked at construction; the first violation is
//! returned as a [`ConfigError`] naming the field and the broken constraint.
//!
//! Downstream components (network builder, replay memory, training loop,
//! checkpoint writer) take `&TrainingConfig` or an `Arc<TrainingConfig>`.

use serde::Serialize;

use crate::device::{ComputeDevice, DeviceProbe, DeviceRequest, TchProbe};
use crate::error::{ConfigError, Constraint, Result};
use crate::exploration::{self, ExplorationSchedule};
use crate::network::NetworkOptions;
use crate::value::{rename_keys, ConfigMap, ConfigValue, MAX_COUNT};

pub const COMPUTE_DEVICE: &str = "compute_device";
pub const INPUT_DIM: &str = "input_dim";
pub const OUTPUT_DIM: &str = "output_dim";
pub const NETWORK_OPTIONS: &str = "network_options";
pub const REPLAY_CAPACITY: &str = "replay_capacity";
pub const BATCH_SIZE: &str = "batch_size";
pub const LEARNING_RATE: &str = "learning_rate";
pub const DISCOUNT_FACTOR: &str = "discount_factor";
pub const TARGET_UPDATE_RATE: &str = "target_update_rate";
pub const EXPLORATION_OPTIONS: &str = "exploration_options";
pub const EPOCHS: &str = "epochs";
pub const CHECKPOINT_INTERVAL: &str = "checkpoint_interval";

/// Canonical field names and the short names they are also known by.
const FIELDS: &[(&str, &[&str])] = &[
    (COMPUTE_DEVICE, &["device"]),
    (INPUT_DIM, &["n_inputs"]),
    (OUTPUT_DIM, &["n_outputs"]),
    (NETWORK_OPTIONS, &["net_kwargs"]),
    (REPLAY_CAPACITY, &["rm_size"]),
    (BATCH_SIZE, &[]),
    (LEARNING_RATE, &["lr"]),
    (DISCOUNT_FACTOR, &["gamma"]),
    (TARGET_UPDATE_RATE, &["tau"]),
    (EXPLORATION_OPTIONS, &["epsilon_kwargs"]),
    (EPOCHS, &[]),
    (CHECKPOINT_INTERVAL, &["save_rate"]),
];

/// Maps a field name or one of its aliases to the canonical name.
pub fn canonical_key(key: &str) -> Option<&'static str> {
    FIELDS
        .iter()
        .find(|(name, aliases)| *name == key || aliases.contains(&key))
        .map(|(name, _)| *name)
}

/// Rewrites keys to their canonical names, including those inside
/// `exploration_options`.
///
/// Fails on top-level keys that are not fields, and when one field appears
/// under two names.
pub fn canonicalize(map: &ConfigMap) -> Result<ConfigMap> {
    let mut out = rename_keys(map, canonical_key, false)?;
    if let Some(ConfigValue::Map(inner)) = out.get_mut(EXPLORATION_OPTIONS) {
        *inner =
            exploration::canonicalize(inner).map_err(|e| e.nested_in(EXPLORATION_OPTIONS))?;
    }
    Ok(out)
}

/// Hyperparameters of a Deep Q-Network training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingConfig {
    compute_device: ComputeDevice,
    input_dim: usize,
    output_dim: usize,
    replay_capacity: usize,
    batch_size: usize,
    learning_rate: f64,
    discount_factor: f64,
    target_update_rate: f64,
    epochs: usize,
    checkpoint_interval: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    network_options: Option<NetworkOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exploration_options: Option<ExplorationSchedule>,
}

impl TrainingConfig {
    /// Starts a typed build with every field unset.
    pub fn builder() -> TrainingConfigBuilder {
        TrainingConfigBuilder::default()
    }

    /// Builds from raw values, checking device availability with libtorch.
    pub fn from_map(map: &ConfigMap) -> Result<Self> {
        Self::from_map_with(map, &TchProbe)
    }

    /// Builds from raw values with an explicit device probe.
    pub fn from_map_with(map: &ConfigMap, probe: &dyn DeviceProbe) -> Result<Self> {
        let map = canonicalize(map)?;
        let mut draft = TrainingConfigBuilder::default();

        if let Some(value) = map.get(COMPUTE_DEVICE) {
            let name = value
                .as_str()
                .ok_or_else(|| ConfigError::wrong_type(COMPUTE_DEVICE, "a device name"))?;
            let request = name.parse::<DeviceRequest>().map_err(|bad| {
                ConfigError::new(COMPUTE_DEVICE, Constraint::UnknownDevice(bad))
            })?;
            draft = draft.compute_device(request);
        }

        draft.input_dim = positive(&map, INPUT_DIM)?;
        draft.output_dim = positive(&map, OUTPUT_DIM)?;
        draft.replay_capacity = positive(&map, REPLAY_CAPACITY)?;
        draft.batch_size = positive(&map, BATCH_SIZE)?;
        draft.learning_rate = finite(&map, LEARNING_RATE)?;
        draft.discount_factor = finite(&map, DISCOUNT_FACTOR)?;
        draft.target_update_rate = finite(&map, TARGET_UPDATE_RATE)?;
        draft.epochs = positive(&map, EPOCHS)?;
        draft.checkpoint_interval = positive(&map, CHECKPOINT_INTERVAL)?;

        draft.network_options =
            sub_record(&map, NETWORK_OPTIONS, NetworkOptions::from_map)?;
        draft.exploration_options =
            sub_record(&map, EXPLORATION_OPTIONS, ExplorationSchedule::from_map)?;

        draft.build_with(probe)
    }

    /// Device the networks live on, already checked for availability.
    pub fn compute_device(&self) -> ComputeDevice {
        self.compute_device
    }

    /// The compute device as libtorch sees it.
    pub fn tch_device(&self) -> tch::Device {
        self.compute_device.into()
    }

    /// Number of observation features fed to the value network.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Number of discrete actions.
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Hidden layer shape, if one was configured.
    pub fn network_options(&self) -> Option<&NetworkOptions> {
        self.network_options.as_ref()
    }

    /// Maximum number of transitions kept in replay memory.
    pub fn replay_capacity(&self) -> usize {
        self.replay_capacity
    }

    /// Transitions sampled per optimisation step. Never exceeds [`replay_capacity`](Self::replay_capacity).
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Optimiser step size, strictly positive.
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Reward discount γ.
    pub fn discount_factor(&self) -> f64 {
        self.discount_factor
    }

    /// Soft-update blend factor τ; 1.0 copies the value network outright.
    pub fn target_update_rate(&self) -> f64 {
        self.target_update_rate
    }

    /// ε-greedy schedule, if one was configured.
    pub fn exploration_options(&self) -> Option<&ExplorationSchedule> {
        self.exploration_options.as_ref()
    }

    /// Number of training epochs.
    pub fn epochs(&self) -> usize {
        self.epochs
    }

    /// Epochs between persisted snapshots.
    pub fn checkpoint_interval(&self) -> usize {
        self.checkpoint_interval
    }

    /// Whether a snapshot is due after `epoch` (1-based) completes.
    pub fn is_checkpoint_epoch(&self, epoch: usize) -> bool {
        epoch > 0 && (epoch % self.checkpoint_interval == 0 || epoch == self.epochs)
    }

    /// The raw values this record was built from, under canonical names.
    /// Counts never exceed [`MAX_COUNT`], so they fit the raw integer type.
    /// Feeding the result back through [`TrainingConfig::from_map`] yields an equal record.
    pub fn to_map(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert(COMPUTE_DEVICE.into(), self.compute_device.to_string().into());
        map.insert(INPUT_DIM.into(), self.input_dim.into());
        map.insert(OUTPUT_DIM.into(), self.output_dim.into());
        map.insert(REPLAY_CAPACITY.into(), self.replay_capacity.into());
        map.insert(BATCH_SIZE.into(), self.batch_size.into());
        map.insert(LEARNING_RATE.into(), self.learning_rate.into());
        map.insert(DISCOUNT_FACTOR.into(), self.discount_factor.into());
        map.insert(TARGET_UPDATE_RATE.into(), self.target_update_rate.into());
        map.insert(EPOCHS.into(), self.epochs.into());
        map.insert(CHECKPOINT_INTERVAL.into(), self.checkpoint_interval.into());

        if let Some(network) = &self.network_options {
            let mut inner = ConfigMap::new();
            inner.insert("hidden_layers".into(), network.hidden_layers().to_vec().into());
            inner.insert("activation".into(), network.activation().to_string().into());
            map.insert(NETWORK_OPTIONS.into(), ConfigValue::Map(inner));
        }
        if let Some(schedule) = &self.exploration_options {
            let mut inner = ConfigMap::new();
            inner.insert("start".into(), schedule.start().into());
            inner.insert("end".into(), schedule.end().into());
            inner.insert("decay".into(), schedule.decay().into());
            map.insert(EXPLORATION_OPTIONS.into(), ConfigValue::Map(inner));
        }
        map
    }
}

fn positive(map: &ConfigMap, field: &'static str) -> Result<Option<usize>> {
    map.get(field)
        .map(|value| value.to_positive_usize(field))
        .transpose()
}

fn finite(map: &ConfigMap, field: &'static str) -> Result<Option<f64>> {
    map.get(field)
        .map(|value| value.to_finite_f64(field))
        .transpose()
}

fn sub_record<T>(
    map: &ConfigMap,
    field: &'static str,
    parse: fn(&ConfigMap) -> Result<T>,
) -> Result<Option<T>> {
    match map.get(field) {
        None => Ok(None),
        Some(ConfigValue::Map(inner)) => parse(inner).map(Some).map_err(|e| e.nested_in(field)),
        Some(_) => Err(ConfigError::wrong_type(field, "a table")),
    }
}

/// Typed construction path; every setter is optional until [`build`](Self::build).
#[derive(Debug, Default, Clone)]
pub struct TrainingConfigBuilder {
    compute_device: Option<DeviceRequest>,
    input_dim: Option<usize>,
    output_dim: Option<usize>,
    network_options: Option<NetworkOptions>,
    replay_capacity: Option<usize>,
    batch_size: Option<usize>,
    learning_rate: Option<f64>,
    discount_factor: Option<f64>,
    target_update_rate: Option<f64>,
    exploration_options: Option<ExplorationSchedule>,
    epochs: Option<usize>,
    checkpoint_interval: Option<usize>,
}

impl TrainingConfigBuilder {
    /// Defaults to [`DeviceRequest::Auto`] when never called.
    pub fn compute_device(mut self, device: impl Into<DeviceRequest>) -> Self {
        self.compute_device = Some(device.into());
        self
    }

    /// Observation features.
    pub fn input_dim(mut self, input_dim: usize) -> Self {
        self.input_dim = Some(input_dim);
        self
    }

    /// Discrete actions.
    pub fn output_dim(mut self, output_dim: usize) -> Self {
        self.output_dim = Some(output_dim);
        self
    }

    /// Optional; left out of the record when never called.
    pub fn network_options(mut self, options: NetworkOptions) -> Self {
        self.network_options = Some(options);
        self
    }

    /// Replay memory size in transitions.
    pub fn replay_capacity(mut self, replay_capacity: usize) -> Self {
        self.replay_capacity = Some(replay_capacity);
        self
    }

    /// Must not exceed the replay capacity.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Must be finite and greater than zero.
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = Some(learning_rate);
        self
    }

    /// γ, in [0, 1].
    pub fn discount_factor(mut self, discount_factor: f64) -> Self {
        self.discount_factor = Some(discount_factor);
        self
    }

    /// τ, in [0, 1].
    pub fn target_update_rate(mut self, target_update_rate: f64) -> Self {
        self.target_update_rate = Some(target_update_rate);
        self
    }

    /// Optional, like [`network_options`](Self::network_options).
    pub fn exploration_options(mut self, schedule: ExplorationSchedule) -> Self {
        self.exploration_options = Some(schedule);
        self
    }

    /// Number of training epochs.
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = Some(epochs);
        self
    }

    /// Epochs between snapshots. Larger than `epochs` only warns.
    pub fn checkpoint_interval(mut self, checkpoint_interval: usize) -> Self {
        self.checkpoint_interval = Some(checkpoint_interval);
        self
    }

    /// Validates every field and resolves the device against libtorch.
    pub fn build(self) -> Result<TrainingConfig> {
        self.build_with(&TchProbe)
    }

    /// Like [`build`](Self::build), with an explicit device probe.
    pub fn build_with(self, probe: &dyn DeviceProbe) -> Result<TrainingConfig> {
        let compute_device = self
            .compute_device
            .unwrap_or(DeviceRequest::Auto)
            .resolve(COMPUTE_DEVICE, probe)?;

        let input_dim = require_positive(INPUT_DIM, self.input_dim)?;
        let output_dim = require_positive(OUTPUT_DIM, self.output_dim)?;
        let replay_capacity = require_positive(REPLAY_CAPACITY, self.replay_capacity)?;
        let batch_size = require_positive(BATCH_SIZE, self.batch_size)?;
        if batch_size > replay_capacity {
            return Err(ConfigError::new(
                BATCH_SIZE,
                Constraint::ExceedsField { other: REPLAY_CAPACITY },
            ));
        }

        let learning_rate = require_finite(LEARNING_RATE, self.learning_rate)?;
        if learning_rate <= 0.0 {
            return Err(ConfigError::new(LEARNING_RATE, Constraint::NotPositive));
        }
        if learning_rate >= 1.0 {
            log::warn!("learning_rate {learning_rate} is unusually large");
        }

        let discount_factor = require_unit(DISCOUNT_FACTOR, self.discount_factor)?;
        let target_update_rate = require_unit(TARGET_UPDATE_RATE, self.target_update_rate)?;

        let epochs = require_positive(EPOCHS, self.epochs)?;
        let checkpoint_interval = require_positive(CHECKPOINT_INTERVAL, self.checkpoint_interval)?;
        if checkpoint_interval > epochs {
            log::warn!(
                "checkpoint_interval {checkpoint_interval} exceeds epochs {epochs}, \
                 only the final epoch will be saved"
            );
        }

        let config = TrainingConfig {
            compute_device,
            input_dim,
            output_dim,
            replay_capacity,
            batch_size,
            learning_rate,
            discount_factor,
            target_update_rate,
            epochs,
            checkpoint_interval,
            network_options: self.network_options,
            exploration_options: self.exploration_options,
        };

        log::info!(
            "training config ready: device={} dims={}->{} replay={} batch={} lr={} gamma={} tau={} epochs={} checkpoint every {}",
            config.compute_device,
            config.input_dim,
            config.output_dim,
            config.replay_capacity,
            config.batch_size,
            config.learning_rate,
            config.discount_factor,
            config.target_update_rate,
            config.epochs,
            config.checkpoint_interval,
        );

        Ok(config)
    }
}

fn require_positive(field: &'static str, value: Option<usize>) -> Result<usize> {
    match value {
        None => Err(ConfigError::missing(field)),
        Some(0) => Err(ConfigError::new(field, Constraint::NotPositive)),
        Some(v) if v > MAX_COUNT => {
            Err(ConfigError::new(field, Constraint::TooLarge { max: MAX_COUNT }))
        }
        Some(v) => Ok(v),
    }
}

fn require_finite(field: &'static str, value: Option<f64>) -> Result<f64> {
    let v = value.ok_or_else(|| ConfigError::missing(field))?;
    if !v.is_finite() {
        return Err(ConfigError::new(field, Constraint::NotFinite));
    }
    Ok(v)
}

fn require_unit(field: &'static str, value: Option<f64>) -> Result<f64> {
    let v = require_finite(field, value)?;
    if !(0.0..=1.0).contains(&v) {
        return Err(ConfigError::new(
            field,
            Constraint::OutOfRange { min: 0.0, max: 1.0 },
        ));
    }
    Ok(v)
}
