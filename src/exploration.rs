//! ε-greedy exploration schedule.

use rand::Rng;
use serde::Serialize;

use crate::error::{ConfigError, Constraint, Result};
use crate::value::{rename_keys, ConfigMap};

pub const DEFAULT_EPSILON_START: f64 = 1.0;
pub const DEFAULT_EPSILON_END: f64 = 0.01;
pub const DEFAULT_EPSILON_DECAY: f64 = 0.999;

/// Exponentially decaying ε, floored at `end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExplorationSchedule {
    start: f64,
    end: f64,
    decay: f64,
}

impl Default for ExplorationSchedule {
    fn default() -> Self {
        Self {
            start: DEFAULT_EPSILON_START,
            end: DEFAULT_EPSILON_END,
            decay: DEFAULT_EPSILON_DECAY,
        }
    }
}

impl ExplorationSchedule {
    /// `start` and `end` must lie in [0, 1] with `end <= start`; `decay` in (0, 1].
    pub fn new(start: f64, end: f64, decay: f64) -> Result<Self> {
        unit_interval("start", start)?;
        unit_interval("end", end)?;
        if end > start {
            return Err(ConfigError::new("end", Constraint::Ordering { other: "start" }));
        }
        if !decay.is_finite() {
            return Err(ConfigError::new("decay", Constraint::NotFinite));
        }
        if decay <= 0.0 {
            return Err(ConfigError::new("decay", Constraint::NotPositive));
        }
        if decay > 1.0 {
            return Err(ConfigError::new(
                "decay",
                Constraint::OutOfRange { min: 0.0, max: 1.0 },
            ));
        }
        Ok(Self { start, end, decay })
    }

    /// ε at step zero.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Floor ε never drops below.
    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    /// ε after `step` decay steps.
    pub fn epsilon(&self, step: u64) -> f64 {
        let exponent = i32::try_from(step).unwrap_or(i32::MAX);
        f64::max(self.end, self.start * self.decay.powi(exponent))
    }

    /// Whether the agent should take a random action at `step`.
    pub fn explore<R: Rng + ?Sized>(&self, step: u64, rng: &mut R) -> bool {
        rng.random_range(0.0..1.0) < self.epsilon(step)
    }

    /// Reads the sub-record; absent keys take their defaults. Also accepts
    /// `epsilon_start`, `epsilon_end`/`min` and `epsilon_decay`.
    pub fn from_map(map: &ConfigMap) -> Result<Self> {
        let map = canonicalize(map)?;
        let mut start = DEFAULT_EPSILON_START;
        let mut end = DEFAULT_EPSILON_END;
        let mut decay = DEFAULT_EPSILON_DECAY;

        for (key, value) in &map {
            match key.as_str() {
                "start" => start = value.to_finite_f64("start")?,
                "end" => end = value.to_finite_f64("end")?,
                "decay" => decay = value.to_finite_f64("decay")?,
                _ => return Err(ConfigError::new(key.as_str(), Constraint::UnknownField)),
            }
        }

        Self::new(start, end, decay)
    }
}

/// Schedule keys and the names they are also known by.
const KEYS: &[(&str, &[&str])] = &[
    ("start", &["epsilon_start"]),
    ("end", &["epsilon_end", "min", "epsilon_min"]),
    ("decay", &["epsilon_decay"]),
];

fn canonical_key(key: &str) -> Option<&'static str> {
    KEYS.iter()
        .find(|(name, aliases)| *name == key || aliases.contains(&key))
        .map(|(name, _)| *name)
}

/// Rewrites schedule keys to `start`, `end` and `decay`. Unknown keys are
/// left for [`ExplorationSchedule::from_map`] to reject.
pub(crate) fn canonicalize(map: &ConfigMap) -> Result<ConfigMap> {
    rename_keys(map, canonical_key, true)
}

fn unit_interval(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(ConfigError::new(field, Constraint::NotFinite));
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::new(
            field,
            Constraint::OutOfRange { min: 0.0, max: 1.0 },
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_epsilon_decays_to_floor() {
        let schedule = ExplorationSchedule::new(1.0, 0.1, 0.5).unwrap();
        assert_eq!(schedule.epsilon(0), 1.0);
        assert_eq!(schedule.epsilon(1), 0.5);
        assert_eq!(schedule.epsilon(2), 0.25);
        assert_eq!(schedule.epsilon(10), 0.1);
        assert_eq!(schedule.epsilon(u64::MAX), 0.1);
    }

    #[test]
    fn test_greedy_schedule_never_explores() {
        let schedule = ExplorationSchedule::new(0.0, 0.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..1000).all(|step| !schedule.explore(step, &mut rng)));
    }

    #[test]
    fn test_full_exploration_always_explores() {
        let schedule = ExplorationSchedule::new(1.0, 1.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..1000).all(|step| schedule.explore(step, &mut rng)));
    }

    #[test]
    fn test_end_above_start_rejected() {
        let err = ExplorationSchedule::new(0.1, 0.5, 0.99).unwrap_err();
        assert_eq!(err.field(), "end");
        assert_eq!(err.constraint(), &Constraint::Ordering { other: "start" });
    }

    #[test]
    fn test_decay_bounds() {
        let err = ExplorationSchedule::new(1.0, 0.1, 0.0).unwrap_err();
        assert_eq!(err.constraint(), &Constraint::NotPositive);

        let err = ExplorationSchedule::new(1.0, 0.1, 1.5).unwrap_err();
        assert_eq!(err.field(), "decay");
        assert!(matches!(err.constraint(), Constraint::OutOfRange { .. }));
    }

    #[test]
    fn test_from_map_accepts_aliases() {
        let mut map = ConfigMap::new();
        map.insert("epsilon_start".into(), 0.9.into());
        map.insert("min".into(), 0.05.into());
        map.insert("decay".into(), 0.995.into());

        let schedule = ExplorationSchedule::from_map(&map).unwrap();
        assert_eq!(schedule.start(), 0.9);
        assert_eq!(schedule.end(), 0.05);
        assert_eq!(schedule.decay(), 0.995);
    }

    #[test]
    fn test_from_map_rejects_two_spellings() {
        let mut map = ConfigMap::new();
        map.insert("end".into(), 0.2.into());
        map.insert("min".into(), 0.05.into());

        let err = ExplorationSchedule::from_map(&map).unwrap_err();
        assert_eq!(err.field(), "end");
        assert_eq!(err.constraint(), &Constraint::Duplicate { alias: "min".into() });
    }

    #[test]
    fn test_from_map_rejects_unknown_key() {
        let mut map = ConfigMap::new();
        map.insert("warmup".into(), 100.into());

        let err = ExplorationSchedule::from_map(&map).unwrap_err();
        assert_eq!(err.field(), "warmup");
        assert_eq!(err.constraint(), &Constraint::UnknownField);
    }
}
