use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use permit_store_core::{LatLng, SortSpec, MEAN_EARTH_RADIUS_METERS};
use serde::{Deserialize, Serialize};

/// Browser settings, usually read from a YAML file:
///
/// ```yaml
/// permits_path: permits.json
/// earth_radius_meters: 6371000
/// default_sort:
///   field: submitted
///   descending: true
/// reference:
///   lat: 42.3736
///   lng: -71.1097
///   radius_meters: 800
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserConfig {
    pub permits_path: Option<PathBuf>,
    pub earth_radius_meters: f64,
    pub default_sort: Option<SortSpec>,
    pub reference: Option<ReferenceConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReferenceConfig {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub radius_meters: Option<f64>,
}

impl ReferenceConfig {
    #[must_use]
    pub fn point(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            permits_path: None,
            earth_radius_meters: MEAN_EARTH_RADIUS_METERS,
            default_sort: None,
            reference: None,
        }
    }
}

impl BrowserConfig {
    /// Read and validate a YAML config file. A relative `permits_path` is resolved
    /// against the config file's directory.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed, or holds invalid values.
    pub fn load(path: &Path) -> Result<Self> {
        let body = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: Self = serde_yaml::from_str(&body)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        if let (Some(permits_path), Some(parent)) = (config.permits_path.as_mut(), path.parent()) {
            if permits_path.is_relative() {
                *permits_path = parent.join(&*permits_path);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error when the earth radius is not positive or the reference point
    /// lies outside valid coordinates.
    pub fn validate(&self) -> Result<()> {
        if !(self.earth_radius_meters.is_finite() && self.earth_radius_meters > 0.0) {
            return Err(anyhow!("earth_radius_meters MUST be a positive number"));
        }

        if let Some(reference) = &self.reference {
            if !reference.point().is_valid() {
                return Err(anyhow!(
                    "reference point MUST be within lat [-90, 90] and lng [-180, 180]"
                ));
            }
        }

        Ok(())
    }
}
