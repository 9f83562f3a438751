//! Parameter schemas and resolved parameter snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{DetectionError, Result};

pub const LOWCUT: &str = "lowcut";
pub const HIGHCUT: &str = "highcut";
pub const MIN_DURATION: &str = "min_duration";
pub const MAX_DURATION: &str = "max_duration";
pub const MIN_INTERVAL: &str = "min_interval";

/// Flat name → value override map supplied by the caller
pub type Overrides = BTreeMap<String, f64>;

/// Pairs that must stay ordered after overrides: (lower, upper, strict)
const ORDERED_PAIRS: &[(&str, &str, bool)] = &[
    (LOWCUT, HIGHCUT, true),
    (MIN_DURATION, MAX_DURATION, false),
    ("min_trough_duration", "max_trough_duration", false),
    ("broad_lowcut", "broad_highcut", true),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Float,
    /// Hz; must stay below the Nyquist frequency of every subsegment
    Frequency,
    /// Seconds
    Duration,
    Int,
    Bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// `None` means unset, which duration limits read as unbounded
    pub default: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub tunable: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn new(
        name: &'static str,
        kind: ParamKind,
        default: Option<f64>,
        description: &'static str,
    ) -> Self {
        let min = match kind {
            ParamKind::Frequency | ParamKind::Duration => Some(0.0),
            ParamKind::Int => Some(1.0),
            ParamKind::Bool => Some(0.0),
            ParamKind::Float => None,
        };
        let max = match kind {
            ParamKind::Bool => Some(1.0),
            _ => None,
        };
        Self {
            name,
            kind,
            default,
            min,
            max,
            tunable: true,
            description,
        }
    }

    pub const fn bounded(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub const fn unbounded_below(mut self) -> Self {
        self.min = None;
        self
    }

    pub const fn fixed(mut self) -> Self {
        self.tunable = false;
        self
    }

    fn check(&self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(DetectionError::Configuration(format!(
                "{} must be a finite number, got {}",
                self.name, value
            )));
        }
        if let Some(min) = self.min {
            if value < min {
                return Err(DetectionError::Configuration(format!(
                    "{} = {} is below the minimum {}",
                    self.name, value, min
                )));
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Err(DetectionError::Configuration(format!(
                    "{} = {} is above the maximum {}",
                    self.name, value, max
                )));
            }
        }
        match self.kind {
            ParamKind::Int if value.fract() != 0.0 => Err(DetectionError::Configuration(
                format!("{} must be an integer, got {}", self.name, value),
            )),
            ParamKind::Bool if value != 0.0 && value != 1.0 => {
                Err(DetectionError::Configuration(format!(
                    "{} must be 0 or 1, got {}",
                    self.name, value
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Immutable parameter values captured for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    values: BTreeMap<String, f64>,
}

impl ParamSet {
    pub fn defaults(specs: &[ParamSpec]) -> Self {
        let values = specs
            .iter()
            .filter_map(|s| s.default.map(|v| (s.name.to_string(), v)))
            .collect();
        Self { values }
    }

    /// Apply `overrides` on top of the defaults, validating each against its schema.
    pub fn resolve(specs: &[ParamSpec], overrides: &Overrides) -> Result<Self> {
        let mut set = Self::defaults(specs);
        for (name, &value) in overrides {
            let spec = specs.iter().find(|s| s.name == name).ok_or_else(|| {
                DetectionError::Configuration(format!("unknown parameter '{}'", name))
            })?;
            if !spec.tunable {
                return Err(DetectionError::Configuration(format!(
                    "parameter '{}' is fixed for this method",
                    name
                )));
            }
            spec.check(value)?;
            set.values.insert(name.clone(), value);
        }
        set.check_ordering()?;
        Ok(set)
    }

    fn check_ordering(&self) -> Result<()> {
        for &(lower, upper, strict) in ORDERED_PAIRS {
            if let (Some(lo), Some(hi)) = (self.get(lower), self.get(upper)) {
                let violated = if strict { lo >= hi } else { lo > hi };
                if violated {
                    return Err(DetectionError::Configuration(format!(
                        "{} ({}) must be {} {} ({})",
                        lower,
                        lo,
                        if strict { "less than" } else { "at most" },
                        upper,
                        hi
                    )));
                }
            }
        }
        if let Some(v) = self.get(MIN_INTERVAL) {
            if v < 0.0 {
                return Err(DetectionError::Configuration(format!(
                    "{} must not be negative, got {}",
                    MIN_INTERVAL, v
                )));
            }
        }
        Ok(())
    }

    /// Every frequency parameter must lie below the Nyquist frequency.
    pub fn check_sample_rate(&self, specs: &[ParamSpec], sample_rate: f64) -> Result<()> {
        let nyquist = sample_rate / 2.0;
        for spec in specs.iter().filter(|s| s.kind == ParamKind::Frequency) {
            if let Some(v) = self.get(spec.name) {
                if v >= nyquist {
                    return Err(DetectionError::Configuration(format!(
                        "{} ({} Hz) must be less than Nyquist ({} Hz) at sample rate {} Hz",
                        spec.name, v, nyquist, sample_rate
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<f64> {
        self.get(name).ok_or_else(|| {
            DetectionError::Configuration(format!("parameter '{}' has no value", name))
        })
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| v != 0.0)
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Duration bounds; an unset maximum is unbounded.
    pub fn duration_bounds(&self) -> (f64, f64) {
        (
            self.get(MIN_DURATION).unwrap_or(0.0),
            self.get(MAX_DURATION).unwrap_or(f64::INFINITY),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[ParamSpec] = &[
        ParamSpec::new(LOWCUT, ParamKind::Frequency, Some(11.0), "low"),
        ParamSpec::new(HIGHCUT, ParamKind::Frequency, Some(15.0), "high"),
        ParamSpec::new(MIN_DURATION, ParamKind::Duration, Some(0.3), "min"),
        ParamSpec::new(MAX_DURATION, ParamKind::Duration, None, "max"),
        ParamSpec::new("order", ParamKind::Int, Some(4.0), "order").bounded(1.0, 12.0),
        ParamSpec::new("invert", ParamKind::Bool, Some(0.0), "invert"),
        ParamSpec::new("ratio", ParamKind::Float, Some(0.5), "ratio").fixed(),
    ];

    fn overrides(pairs: &[(&str, f64)]) -> Overrides {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_defaults_skip_unset() {
        let set = ParamSet::defaults(SPECS);
        assert_eq!(set.get(LOWCUT), Some(11.0));
        assert_eq!(set.get(MAX_DURATION), None);
        assert_eq!(set.duration_bounds(), (0.3, f64::INFINITY));
        assert!(!set.flag("invert"));
    }

    #[test]
    fn test_resolve_applies_overrides() {
        let set = ParamSet::resolve(SPECS, &overrides(&[("lowcut", 9.0), ("highcut", 11.0)])).unwrap();
        assert_eq!(set.get(LOWCUT), Some(9.0));
        assert_eq!(set.get(HIGHCUT), Some(11.0));
    }

    #[test]
    fn test_resolve_rejects_bad_overrides() {
        let cases = [
            overrides(&[("bogus", 1.0)]),
            overrides(&[("ratio", 0.7)]),
            overrides(&[("order", 2.5)]),
            overrides(&[("order", 20.0)]),
            overrides(&[("invert", 0.5)]),
            overrides(&[("lowcut", -1.0)]),
            overrides(&[("lowcut", 16.0)]),
            overrides(&[("min_duration", 2.0), ("max_duration", 1.0)]),
            overrides(&[("lowcut", f64::NAN)]),
        ];
        for case in cases {
            let err = ParamSet::resolve(SPECS, &case).unwrap_err();
            assert!(
                matches!(err, DetectionError::Configuration(_)),
                "expected configuration error for {:?}",
                case
            );
        }
    }

    #[test]
    fn test_nyquist_check() {
        let set = ParamSet::resolve(SPECS, &overrides(&[("highcut", 30.0)])).unwrap();
        assert!(set.check_sample_rate(SPECS, 256.0).is_ok());
        let err = set.check_sample_rate(SPECS, 50.0).unwrap_err();
        assert!(err.to_string().contains("highcut"));
    }
}
