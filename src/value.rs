//! Raw, not yet validated configuration values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Constraint, Result};

/// Field name to raw value.
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// Largest count a record accepts; counts are carried as `i64` in raw values.
pub const MAX_COUNT: usize = i64::MAX as usize;

/// A configuration value as read from a file, the environment or the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(ConfigMap),
}

impl ConfigValue {
    /// Parses a scalar given as text (environment variable or `--set`).
    /// Tries bool, integer, then float; anything else stays a string.
    pub fn parse_scalar(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(v) = trimmed.parse::<bool>() {
            return Self::Bool(v);
        }
        if let Ok(v) = trimmed.parse::<i64>() {
            return Self::Integer(v);
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            return Self::Float(v);
        }
        if let Some(list) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return Self::List(
                list.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(Self::parse_scalar)
                    .collect(),
            );
        }
        Self::String(trimmed.to_string())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers widen to floats, so `gamma = 1` is accepted.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            Self::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Reads a strictly positive count.
    pub(crate) fn to_positive_usize(&self, field: &str) -> Result<usize> {
        let v = self
            .as_integer()
            .ok_or_else(|| ConfigError::wrong_type(field, "a positive integer"))?;
        if v <= 0 {
            return Err(ConfigError::new(field, Constraint::NotPositive));
        }
        usize::try_from(v).map_err(|_| ConfigError::wrong_type(field, "a positive integer"))
    }

    /// Reads a finite float.
    pub(crate) fn to_finite_f64(&self, field: &str) -> Result<f64> {
        let v = self
            .as_float()
            .ok_or_else(|| ConfigError::wrong_type(field, "a number"))?;
        if !v.is_finite() {
            return Err(ConfigError::new(field, Constraint::NotFinite));
        }
        Ok(v)
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<usize> for ConfigValue {
    fn from(v: usize) -> Self {
        Self::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f32> for ConfigValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<ConfigMap> for ConfigValue {
    fn from(v: ConfigMap) -> Self {
        Self::Map(v)
    }
}

/// Inserts `value` at a dotted `path`, creating intermediate maps.
/// A scalar sitting where a map is needed is replaced.
pub fn insert_path(map: &mut ConfigMap, path: &str, value: ConfigValue) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = map
                .entry(head.to_string())
                .or_insert_with(|| ConfigValue::Map(ConfigMap::new()));
            if !matches!(slot, ConfigValue::Map(_)) {
                *slot = ConfigValue::Map(ConfigMap::new());
            }
            if let ConfigValue::Map(inner) = slot {
                insert_path(inner, rest, value);
            }
        }
    }
}

/// Rewrites keys to the names `lookup` returns for them.
///
/// Keys `lookup` does not know are kept as they are when `keep_unknown` is
/// set and rejected otherwise. Two spellings of the same key fail with
/// [`Constraint::Duplicate`].
pub(crate) fn rename_keys(
    map: &ConfigMap,
    lookup: impl Fn(&str) -> Option<&'static str>,
    keep_unknown: bool,
) -> Result<ConfigMap> {
    let mut out = ConfigMap::new();
    let mut spelled: BTreeMap<String, &str> = BTreeMap::new();
    for (key, value) in map {
        let name = match lookup(key.as_str()) {
            Some(name) => name.to_string(),
            None if keep_unknown => key.clone(),
            None => return Err(ConfigError::new(key.as_str(), Constraint::UnknownField)),
        };
        if let Some(first) = spelled.insert(name.clone(), key.as_str()) {
            let alias = if first == name { key.clone() } else { first.to_string() };
            return Err(ConfigError::new(name, Constraint::Duplicate { alias }));
        }
        out.insert(name, value.clone());
    }
    Ok(out)
}

/// Deep merge: maps merge key by key, everything else in `overlay` wins.
pub fn merge_into(base: &mut ConfigMap, overlay: &ConfigMap) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(ConfigValue::Map(existing)), ConfigValue::Map(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
