//! Agent configuration.
//!
//! Read once at construction.  Every field has a default, so a partial YAML
//! or JSON document only needs the keys it overrides:
//!
//! ```yaml
//! high_variance_threshold: 0.05
//! increasing_variance_threshold: 0.01
//! variance_window_size: 16
//! belief_learn_rate: 0.1
//! belief_decay: 0.05
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::monitor::MIN_WINDOW;

/// Lower bound of the integration parameter.
pub const INTEGRATION_MIN: f32 = 0.05;
/// Upper bound of the integration parameter.
pub const INTEGRATION_MAX: f32 = 0.95;

/// Construction-time parameters for an agent and its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Variance level above which the monitor reports `high_variance`.
    pub high_variance_threshold: f32,
    /// Newer-half minus older-half variance above which the monitor reports `increasing`.
    pub increasing_variance_threshold: f32,
    /// Ring-buffer capacity of the variance monitor.
    pub variance_window_size: usize,
    /// Blend weight pulling belief toward the emotion/observation target (0.0–1.0).
    pub belief_learn_rate: f32,
    /// Fraction of trust-weighted belief forgotten per step (0.0–1.0).
    pub belief_decay: f32,
    /// Change in emotion norm between steps that counts as a large deviation.
    pub trust_deviation_threshold: f32,
    /// Multiplicative trust loss on a large deviation or invalid step (0.0–1.0].
    pub trust_decay: f32,
    /// Trust regained after a stable streak (0.0–1.0).
    pub trust_recovery: f32,
    /// Consecutive stable steps needed before trust recovers.
    pub trust_recovery_streak: u32,
    /// Trust never decays below this value.
    pub trust_floor: f32,
    /// Starting integration parameter (clamped into `[0.05, 0.95]`).
    pub initial_integration: f32,
    /// Number of step records a session keeps.
    pub trajectory_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            high_variance_threshold: 0.05,
            increasing_variance_threshold: 0.01,
            variance_window_size: 16,
            belief_learn_rate: 0.1,
            belief_decay: 0.05,
            trust_deviation_threshold: 0.5,
            trust_decay: 0.2,
            trust_recovery: 0.02,
            trust_recovery_streak: 3,
            trust_floor: 0.0,
            initial_integration: 0.5,
            trajectory_capacity: 256,
        }
    }
}

impl AgentConfig {
    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from disk.  `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("high_variance_threshold", self.high_variance_threshold),
            ("increasing_variance_threshold", self.increasing_variance_threshold),
            ("belief_learn_rate", self.belief_learn_rate),
            ("belief_decay", self.belief_decay),
            ("trust_deviation_threshold", self.trust_deviation_threshold),
            ("trust_decay", self.trust_decay),
            ("trust_recovery", self.trust_recovery),
            ("trust_floor", self.trust_floor),
            ("initial_integration", self.initial_integration),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(invalid(format!("{name} must be finite, got {value}")));
            }
        }

        if self.variance_window_size < MIN_WINDOW {
            return Err(invalid(format!(
                "variance_window_size must be at least {MIN_WINDOW}, got {}",
                self.variance_window_size
            )));
        }
        for (name, value) in [
            ("belief_learn_rate", self.belief_learn_rate),
            ("belief_decay", self.belief_decay),
            ("trust_recovery", self.trust_recovery),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if !(self.trust_decay > 0.0 && self.trust_decay <= 1.0) {
            return Err(invalid(format!(
                "trust_decay must be within (0, 1], got {}",
                self.trust_decay
            )));
        }
        if !(0.0..1.0).contains(&self.trust_floor) {
            return Err(invalid(format!(
                "trust_floor must be within [0, 1), got {}",
                self.trust_floor
            )));
        }
        if self.trust_deviation_threshold <= 0.0 {
            return Err(invalid(format!(
                "trust_deviation_threshold must be positive, got {}",
                self.trust_deviation_threshold
            )));
        }
        if self.trust_recovery_streak == 0 {
            return Err(invalid("trust_recovery_streak must be at least 1".to_string()));
        }
        if self.trajectory_capacity == 0 {
            return Err(invalid("trajectory_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Starting integration value, clamped into bounds.
    pub fn clamped_initial_integration(&self) -> f32 {
        self.initial_integration.clamp(INTEGRATION_MIN, INTEGRATION_MAX)
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid(message)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
high_variance_threshold: 0.2
variance_window_size: 8
"#;
        let config = AgentConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.high_variance_threshold, 0.2);
        assert_eq!(config.variance_window_size, 8);
        assert_eq!(config.belief_learn_rate, AgentConfig::default().belief_learn_rate);
    }

    #[test]
    fn test_json_parsing() {
        let config =
            AgentConfig::from_json(r#"{"belief_learn_rate": 0.3, "belief_decay": 0.0}"#).unwrap();
        assert_eq!(config.belief_learn_rate, 0.3);
        assert_eq!(config.belief_decay, 0.0);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let err = AgentConfig::from_yaml("belief_decay: 1.5").unwrap_err();
        assert!(err.to_string().contains("belief_decay"));

        let err = AgentConfig::from_yaml("variance_window_size: 1").unwrap_err();
        assert!(err.to_string().contains("variance_window_size"));

        // Too small for the newer/older half comparison.
        let err = AgentConfig::from_yaml("variance_window_size: 3").unwrap_err();
        assert!(err.to_string().contains("variance_window_size"));
        assert!(AgentConfig::from_yaml("variance_window_size: 4").is_ok());

        let err = AgentConfig::from_yaml("trust_decay: 0.0").unwrap_err();
        assert!(err.to_string().contains("trust_decay"));

        let err = AgentConfig::from_yaml("trust_recovery_streak: 0").unwrap_err();
        assert!(err.to_string().contains("trust_recovery_streak"));
    }

    #[test]
    fn test_rejects_non_finite() {
        let config = AgentConfig {
            belief_learn_rate: f32::NAN,
            ..AgentConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            AgentConfig::from_yaml("belief_decay: [not, a, number]"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_initial_integration_is_clamped() {
        let config = AgentConfig {
            initial_integration: 2.0,
            ..AgentConfig::default()
        };
        assert_eq!(config.clamped_initial_integration(), INTEGRATION_MAX);
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("agent.yaml");
        std::fs::write(&yaml_path, "trust_recovery: 0.1\n").unwrap();
        assert_eq!(AgentConfig::from_file(&yaml_path).unwrap().trust_recovery, 0.1);

        let json_path = dir.path().join("agent.json");
        std::fs::write(&json_path, r#"{"trajectory_capacity": 4}"#).unwrap();
        assert_eq!(AgentConfig::from_file(&json_path).unwrap().trajectory_capacity, 4);

        assert!(matches!(
            AgentConfig::from_file(dir.path().join("missing.yaml")),
            Err(ConfigError::Io(_))
        ));
    }
}
