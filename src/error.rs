//! Error types raised while building a [`TrainingConfig`](crate::config::TrainingConfig).

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for construction.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// The constraint a field failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Required field was not provided.
    Missing,
    /// Value has the wrong shape, e.g. a string where an integer was expected.
    WrongType { expected: &'static str },
    /// Value must be strictly greater than zero.
    NotPositive,
    /// Value is NaN or infinite.
    NotFinite,
    /// Count is larger than `max`.
    TooLarge { max: usize },
    /// Value lies outside `[min, max]`.
    OutOfRange { min: f64, max: f64 },
    /// Value is larger than the field it is bounded by.
    ExceedsField { other: &'static str },
    /// Value must not be greater than another field of the same record.
    Ordering { other: &'static str },
    /// Device name could not be parsed.
    UnknownDevice(String),
    /// Device parsed but is not present on this host.
    DeviceUnavailable(String),
    /// Key is not part of the record.
    UnknownField,
    /// Field given twice under different names, e.g. `lr` and `learning_rate`.
    Duplicate { alias: String },
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "required field is missing"),
            Self::WrongType { expected } => write!(f, "expected {expected}"),
            Self::NotPositive => write!(f, "must be greater than zero"),
            Self::NotFinite => write!(f, "must be a finite number"),
            Self::TooLarge { max } => write!(f, "must not exceed {max}"),
            Self::OutOfRange { min, max } => write!(f, "must be within [{min}, {max}]"),
            Self::ExceedsField { other } => write!(f, "must not exceed `{other}`"),
            Self::Ordering { other } => write!(f, "must not be greater than `{other}`"),
            Self::UnknownDevice(name) => write!(f, "unknown device `{name}`"),
            Self::DeviceUnavailable(name) => write!(f, "device `{name}` is not available"),
            Self::UnknownField => write!(f, "unknown field"),
            Self::Duplicate { alias } => write!(f, "also given as `{alias}`"),
        }
    }
}

/// Construction failure: which field, and which constraint it broke.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid `{field}`: {constraint}")]
pub struct ConfigError {
    field: String,
    constraint: Constraint,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            field: field.into(),
            constraint,
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, Constraint::Missing)
    }

    pub fn wrong_type(field: impl Into<String>, expected: &'static str) -> Self {
        Self::new(field, Constraint::WrongType { expected })
    }

    /// Name of the offending field. Sub-record fields are dotted,
    /// e.g. `exploration_options.decay`.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// Prefixes the field with the name of the enclosing record.
    pub(crate) fn nested_in(mut self, parent: &str) -> Self {
        self.field = format!("{parent}.{}", self.field);
        self
    }
}

/// Failure while reading raw values from a file or the environment.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config file extension: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("expected `key=value`, got `{0}`")]
    MalformedOverride(String),

    #[error("environment variable `{0}` is not valid unicode")]
    NotUnicode(String),

    #[error("top level of a config file must be a table")]
    NotATable,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
