//! Coupler configuration.
//!
//! All tolerances and bounds used by point location live in one
//! serde-serializable struct so drivers can load them alongside the rest of
//! their run configuration.

use crate::mesh_error::CouplerError;
use serde::{Deserialize, Serialize};

/// Tuning knobs for point location and interpolation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplerConfig {
    /// Physical-space residual tolerance of the inverse map.
    pub newton_tolerance: f64,
    /// Upper bound on Newton iterations per inverse evaluation.
    pub max_newton_iterations: usize,
    /// Parametric-space tolerance of the inside test.
    pub inside_tolerance: f64,
    /// Initial leaf cap of the local KD-tree.
    pub max_per_leaf: usize,
    /// Number of index build attempts; the leaf cap doubles after each failure.
    pub max_build_attempts: usize,
    /// Maximum split depth of the local KD-tree.
    pub max_tree_depth: usize,
    /// Base message tag; collectives use fixed offsets from it.
    pub comm_tag: u16,
    /// Order (nodes per direction) of spectral elements, if any.
    ///
    /// Elements carrying [`SPECTRAL_COORD_TAGS`] are mapped as spectral
    /// elements of this order.
    pub spectral_order: Option<usize>,
}

/// Per-element tags holding Gauss–Lobatto node coordinates of spectral elements.
pub const SPECTRAL_COORD_TAGS: [&str; 3] = ["SEM_X", "SEM_Y", "SEM_Z"];

impl Default for CouplerConfig {
    fn default() -> Self {
        Self {
            newton_tolerance: 1e-10,
            max_newton_iterations: 10,
            inside_tolerance: 1e-6,
            max_per_leaf: 8,
            max_build_attempts: 5,
            max_tree_depth: 30,
            comm_tag: 0x4300,
            spectral_order: None,
        }
    }
}

impl CouplerConfig {
    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), CouplerError> {
        if !(self.newton_tolerance > 0.0) {
            return Err(CouplerError::InvalidConfig(format!(
                "newton_tolerance must be positive, got {}",
                self.newton_tolerance
            )));
        }
        if !(self.inside_tolerance >= 0.0) {
            return Err(CouplerError::InvalidConfig(format!(
                "inside_tolerance must be non-negative, got {}",
                self.inside_tolerance
            )));
        }
        if self.max_newton_iterations == 0 {
            return Err(CouplerError::InvalidConfig(
                "max_newton_iterations must be at least 1".into(),
            ));
        }
        if self.max_per_leaf == 0 || self.max_build_attempts == 0 {
            return Err(CouplerError::InvalidConfig(
                "max_per_leaf and max_build_attempts must be at least 1".into(),
            ));
        }
        if let Some(order) = self.spectral_order {
            if order < 2 {
                return Err(CouplerError::InvalidConfig(format!(
                    "spectral_order must be at least 2, got {order}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        CouplerConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_values() {
        let cfg = CouplerConfig {
            newton_tolerance: 0.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = CouplerConfig {
            spectral_order: Some(1),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: CouplerConfig = serde_json::from_str(r#"{"max_per_leaf": 16}"#).unwrap();
        assert_eq!(cfg.max_per_leaf, 16);
        assert_eq!(cfg.max_newton_iterations, 10);
    }
}
