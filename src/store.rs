//! Layered collection of raw values, resolved into a [`TrainingConfig`].
//!
//! Layers are applied in the order they are added, later ones winning. The
//! usual stack is a file, then the environment, then command line overrides.

use std::ffi::OsString;
use std::path::Path;

use crate::config::{canonical_key, canonicalize, TrainingConfig};
use crate::device::{DeviceProbe, TchProbe};
use crate::error::{ConfigError, LoadError};
use crate::value::{insert_path, merge_into, ConfigMap, ConfigValue};

/// Prefix read by [`ConfigStore::with_env`] when none is given.
pub const DEFAULT_ENV_PREFIX: &str = "DEEPQ";

/// Raw values gathered from any number of sources. Keys are stored under
/// their canonical names so that `lr` in one layer and `learning_rate` in the
/// next address the same field.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    values: ConfigMap,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value under a possibly dotted key, e.g. `exploration_options.decay`.
    /// Aliases are accepted at both levels.
    pub fn set(&mut self, key: &str, value: impl Into<ConfigValue>) -> Result<(), ConfigError> {
        let mut layer = ConfigMap::new();
        insert_path(&mut layer, key, value.into());
        self.merge(&layer)
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        canonical_key(key).and_then(|name| self.values.get(name))
    }

    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        canonical_key(key).and_then(|name| self.values.remove(name))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Layers `map` on top of the current values.
    pub fn merge(&mut self, map: &ConfigMap) -> Result<(), ConfigError> {
        let layer = canonicalize(map)?;
        merge_into(&mut self.values, &layer);
        Ok(())
    }

    /// Layers the contents of a TOML or JSON file, chosen by extension.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let map: ConfigMap = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&text)?,
            Some("json") => match serde_json::from_str::<ConfigValue>(&text)? {
                ConfigValue::Map(map) => map,
                _ => return Err(LoadError::NotATable),
            },
            _ => return Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        };

        log::debug!("loaded {} keys from {}", map.len(), path.display());
        self.merge(&map)?;
        Ok(self)
    }

    /// Layers `PREFIX_FIELD` variables from the process environment.
    pub fn with_env(self, prefix: &str) -> Result<Self, LoadError> {
        self.with_vars_os(prefix, std::env::vars_os())
    }

    /// Like [`with_vars`](Self::with_vars) for raw OS strings. Variables
    /// outside the prefix are skipped whatever their encoding; a matching
    /// one that is not unicode fails with [`LoadError::NotUnicode`].
    pub fn with_vars_os<I>(self, prefix: &str, vars: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let wanted = format!("{}_", prefix.to_ascii_uppercase());
        let mut matching = Vec::new();
        for (key, value) in vars {
            if !key.to_string_lossy().starts_with(&wanted) {
                continue;
            }
            let not_unicode = || LoadError::NotUnicode(key.to_string_lossy().into_owned());
            let value = value.into_string().map_err(|_| not_unicode())?;
            let key = key.clone().into_string().map_err(|_| not_unicode())?;
            matching.push((key, value));
        }
        self.with_vars(prefix, matching)
    }

    /// Layers `PREFIX_FIELD` pairs from `vars`. `__` separates sub-record
    /// fields, so `DEEPQ_EXPLORATION_OPTIONS__DECAY` sets `exploration_options.decay`.
    pub fn with_vars<I, K, V>(mut self, prefix: &str, vars: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let prefix = format!("{}_", prefix.to_ascii_uppercase());
        let mut count = 0;
        for (key, value) in vars {
            let Some(field) = key.as_ref().strip_prefix(&prefix) else {
                continue;
            };
            let path = field.to_ascii_lowercase().replace("__", ".");
            self.set(&path, ConfigValue::parse_scalar(value.as_ref()))?;
            count += 1;
        }
        log::debug!("loaded {count} keys from {prefix}* environment variables");
        Ok(self)
    }

    /// Layers `key=value` overrides, as given on the command line.
    pub fn with_overrides<S: AsRef<str>>(mut self, overrides: &[S]) -> Result<Self, LoadError> {
        for raw in overrides {
            let raw = raw.as_ref();
            let (key, value) = raw
                .split_once('=')
                .filter(|(key, _)| !key.trim().is_empty())
                .ok_or_else(|| LoadError::MalformedOverride(raw.to_string()))?;
            self.set(key.trim(), ConfigValue::parse_scalar(value))?;
        }
        if !overrides.is_empty() {
            log::debug!("applied {} overrides", overrides.len());
        }
        Ok(self)
    }

    pub fn as_map(&self) -> &ConfigMap {
        &self.values
    }

    /// Validates the gathered values.
    pub fn build(&self) -> Result<TrainingConfig, ConfigError> {
        self.build_with(&TchProbe)
    }

    pub fn build_with(&self, probe: &dyn DeviceProbe) -> Result<TrainingConfig, ConfigError> {
        TrainingConfig::from_map_with(&self.values, probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FixedProbe;
    use crate::error::Constraint;

    #[test]
    fn test_set_get_remove() {
        let mut store = ConfigStore::new();
        store.set("lr", 0.01).unwrap();

        assert_eq!(store.get("learning_rate"), Some(&ConfigValue::Float(0.01)));
        assert_eq!(store.get("lr"), Some(&ConfigValue::Float(0.01)));
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["learning_rate"]);

        assert!(store.remove("learning_rate").is_some());
        assert!(store.get("lr").is_none());
    }

    #[test]
    fn test_set_unknown_key() {
        let mut store = ConfigStore::new();
        let err = store.set("momentum", 0.9).unwrap_err();
        assert_eq!(err.field(), "momentum");
        assert_eq!(err.constraint(), &Constraint::UnknownField);
    }

    #[test]
    fn test_set_dotted_key_under_alias() {
        let mut store = ConfigStore::new();
        store.set("epsilon_kwargs.decay", 0.9).unwrap();
        store.set("exploration_options.end", 0.2).unwrap();

        let inner = store.get("exploration_options").and_then(ConfigValue::as_map).unwrap();
        assert_eq!(inner["decay"], ConfigValue::Float(0.9));
        assert_eq!(inner["end"], ConfigValue::Float(0.2));
    }

    #[test]
    fn test_schedule_aliases_merge_across_layers() {
        let mut file = ConfigMap::new();
        insert_path(&mut file, "epsilon_kwargs.min", 0.05.into());
        insert_path(&mut file, "epsilon_kwargs.epsilon_decay", 0.99.into());

        let mut store = ConfigStore::new();
        store.merge(&file).unwrap();
        let store = store
            .with_overrides(&["exploration_options.end=0.2"])
            .unwrap();

        let inner = store.get("exploration_options").and_then(ConfigValue::as_map).unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner["end"], ConfigValue::Float(0.2));
        assert_eq!(inner["decay"], ConfigValue::Float(0.99));
    }

    #[test]
    fn test_schedule_alias_set_overrides_canonical() {
        let mut store = ConfigStore::new();
        store.set("exploration_options.start", 1.0).unwrap();
        store.set("epsilon_kwargs.epsilon_start", 0.5).unwrap();

        let inner = store.get("exploration_options").and_then(ConfigValue::as_map).unwrap();
        assert_eq!(inner.keys().collect::<Vec<_>>(), vec!["start"]);
        assert_eq!(inner["start"], ConfigValue::Float(0.5));
    }

    #[test]
    fn test_two_schedule_spellings_in_one_layer() {
        let mut layer = ConfigMap::new();
        insert_path(&mut layer, "exploration_options.start", 1.0.into());
        insert_path(&mut layer, "exploration_options.epsilon_start", 0.9.into());

        let err = ConfigStore::new().merge(&layer).unwrap_err();
        assert_eq!(err.field(), "exploration_options.start");
        assert_eq!(
            err.constraint(),
            &Constraint::Duplicate { alias: "epsilon_start".into() }
        );
    }

    #[test]
    fn test_later_layers_win_across_aliases() {
        let mut base = ConfigMap::new();
        base.insert("gamma".into(), 0.9.into());

        let mut store = ConfigStore::new();
        store.merge(&base).unwrap();
        store.set("discount_factor", 0.95).unwrap();

        assert_eq!(store.get("gamma"), Some(&ConfigValue::Float(0.95)));
    }

    #[test]
    fn test_env_vars() {
        let vars = [
            ("DEEPQ_BATCH_SIZE", "32"),
            ("DEEPQ_DEVICE", "cpu"),
            ("DEEPQ_EXPLORATION_OPTIONS__DECAY", "0.99"),
            ("HOME", "/root"),
        ];
        let store = ConfigStore::new().with_vars("deepq", vars).unwrap();

        assert_eq!(store.get("batch_size"), Some(&ConfigValue::Integer(32)));
        assert_eq!(store.get("compute_device").and_then(ConfigValue::as_str), Some("cpu"));
        let inner = store.get("exploration_options").and_then(ConfigValue::as_map).unwrap();
        assert_eq!(inner["decay"], ConfigValue::Float(0.99));
    }

    #[test]
    fn test_vars_outside_prefix_ignored() {
        let vars = [("PATH", "/usr/bin"), ("DEEPQUEUE_SIZE", "3"), ("deepq_epochs", "7")];
        let store = ConfigStore::new().with_vars("DEEPQ", vars).unwrap();
        assert_eq!(store.keys().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_env_vars() {
        use std::os::unix::ffi::OsStringExt;

        let garbage = || OsString::from_vec(vec![0x66, 0xff, 0xfe]);
        let vars = vec![
            (garbage(), garbage()),
            (OsString::from("OTHER"), garbage()),
            (OsString::from("DEEPQ_EPOCHS"), OsString::from("12")),
        ];
        let store = ConfigStore::new().with_vars_os("DEEPQ", vars).unwrap();
        assert_eq!(store.get("epochs"), Some(&ConfigValue::Integer(12)));

        let vars = vec![(OsString::from("DEEPQ_DEVICE"), garbage())];
        let err = ConfigStore::new().with_vars_os("DEEPQ", vars).unwrap_err();
        assert!(matches!(err, LoadError::NotUnicode(ref key) if key == "DEEPQ_DEVICE"));
    }

    #[test]
    fn test_unknown_env_var_fails() {
        let err = ConfigStore::new()
            .with_vars("DEEPQ", [("DEEPQ_MOMENTUM", "0.9")])
            .unwrap_err();
        assert!(matches!(err, LoadError::Config(ref e) if e.field() == "momentum"));
    }

    #[test]
    fn test_overrides() {
        let store = ConfigStore::new()
            .with_overrides(&["epochs=10", " tau = 0.5", "net_kwargs.hidden_layers=[32,16]"])
            .unwrap();

        assert_eq!(store.get("epochs"), Some(&ConfigValue::Integer(10)));
        assert_eq!(store.get("target_update_rate"), Some(&ConfigValue::Float(0.5)));
        let inner = store.get("network_options").and_then(ConfigValue::as_map).unwrap();
        assert_eq!(
            inner["hidden_layers"],
            ConfigValue::List(vec![ConfigValue::Integer(32), ConfigValue::Integer(16)])
        );
    }

    #[test]
    fn test_malformed_override() {
        let err = ConfigStore::new().with_overrides(&["epochs"]).unwrap_err();
        assert!(matches!(err, LoadError::MalformedOverride(_)));

        let err = ConfigStore::new().with_overrides(&["=3"]).unwrap_err();
        assert!(matches!(err, LoadError::MalformedOverride(_)));
    }

    #[test]
    fn test_build_from_overrides() {
        let config = ConfigStore::new()
            .with_overrides(&[
                "device=cpu",
                "n_inputs=4",
                "n_outputs=2",
                "rm_size=10000",
                "batch_size=64",
                "lr=0.001",
                "gamma=0.99",
                "tau=0.005",
                "epochs=500",
                "save_rate=50",
            ])
            .unwrap()
            .build_with(&FixedProbe(0))
            .unwrap();

        assert_eq!(config.batch_size(), 64);
        assert_eq!(config.checkpoint_interval(), 50);
    }
}
