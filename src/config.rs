use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::frame::FAST_MULTIPLIER;
use crate::simulation::types::DEFAULT_PARTICLE_COUNT;

/// Which compute backend drives the kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum BackendKind {
    Gpu,
    Software,
}

/// Startup configuration, read from an optional JSON file.
///
/// Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    pub particle_count: u32,
    pub simulation_depth: u32,
    pub window_width: u32,
    pub window_height: u32,
    /// Kernel source candidates, tried in order.
    pub kernel_paths: Vec<PathBuf>,
    /// Extra directories searched by `#include`, after the kernel's own directory.
    pub include_dirs: Vec<PathBuf>,
    pub seed: Option<u64>,
    pub backend: BackendKind,
    /// Blend weight of the newest frame over the accumulated image.
    pub trail_alpha: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            particle_count: DEFAULT_PARTICLE_COUNT,
            simulation_depth: 1,
            window_width: 800,
            window_height: 600,
            kernel_paths: vec![
                // Development path first, then the path next to the working directory
                Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders/kernel.wgsl"),
                PathBuf::from("shaders/kernel.wgsl"),
            ],
            include_dirs: Vec::new(),
            seed: None,
            backend: BackendKind::Gpu,
            trail_alpha: 0.5,
        }
    }
}

impl Config {
    /// Loads the config from `path`, or the defaults when no path is given.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                log::info!("Loaded config from {}", path.display());
                Self::from_json(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.particle_count == 0 {
            return Err(ConfigError::Invalid("particle_count must be positive".into()));
        }
        if self.simulation_depth == 0 {
            return Err(ConfigError::Invalid("simulation_depth must be positive".into()));
        }
        // Fast frames run depth * FAST_MULTIPLIER sub-steps
        if self.simulation_depth > u32::MAX / FAST_MULTIPLIER {
            return Err(ConfigError::Invalid(format!(
                "simulation_depth {} must be at most {}",
                self.simulation_depth,
                u32::MAX / FAST_MULTIPLIER
            )));
        }
        if self.window_width == 0 || self.window_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} must be positive",
                self.window_width, self.window_height
            )));
        }
        if self.kernel_paths.is_empty() {
            return Err(ConfigError::Invalid("kernel_paths must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.trail_alpha) {
            return Err(ConfigError::Invalid(format!(
                "trail_alpha {} must be within [0, 1]",
                self.trail_alpha
            )));
        }
        Ok(())
    }

    /// Integration step per sub-step; constant for the process lifetime.
    pub(crate) fn step_width(&self) -> f32 {
        1.0 / self.simulation_depth as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.particle_count, 500);
        assert_eq!(config.simulation_depth, 1);
        assert_eq!((config.window_width, config.window_height), (800, 600));
        assert_eq!(config.backend, BackendKind::Gpu);
        assert_eq!(config.step_width(), 1.0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{ "simulation_depth": 4, "seed": 12, "backend": "software" }"#)
            .unwrap();
        config.validate().unwrap();
        assert_eq!(config.simulation_depth, 4);
        assert_eq!(config.step_width(), 0.25);
        assert_eq!(config.seed, Some(12));
        assert_eq!(config.backend, BackendKind::Software);
        assert_eq!(config.particle_count, 500);
        assert_eq!(config.kernel_paths.len(), 2);
    }

    #[test]
    fn rejects_invalid_values() {
        for json in [
            r#"{ "particle_count": 0 }"#,
            r#"{ "simulation_depth": 0 }"#,
            r#"{ "simulation_depth": 2000000000 }"#,
            r#"{ "window_width": 0 }"#,
            r#"{ "kernel_paths": [] }"#,
            r#"{ "trail_alpha": 1.5 }"#,
        ] {
            let config = Config::from_json(json).unwrap();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{json} should be rejected"
            );
        }
    }

    #[test]
    fn deepest_accepted_depth_fits_fast_frames() {
        let mut config = Config {
            simulation_depth: u32::MAX / FAST_MULTIPLIER,
            ..Config::default()
        };
        config.validate().unwrap();
        assert!(config.simulation_depth.checked_mul(FAST_MULTIPLIER).is_some());

        config.simulation_depth += 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(matches!(
            Config::from_json(r#"{ "particles": 10 }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Config::load(Some(Path::new("does/not/exist.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
