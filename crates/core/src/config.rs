//! Run configuration
//!
//! A TOML file with `[main]`, `[region]`, `[methods]`, `[invariants]`,
//! `[engine]` and `[inputs]` sections. Method names stay strings here;
//! the processing crate resolves them through its factories.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::invariant::InvariantPolicy;
use crate::region::{preset_name, Extent, Region};

/// Default target resolution, 30 arc-seconds
pub const DEFAULT_RESOLUTION: f64 = 1.0 / 120.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub main: MainConfig,
    pub region: RegionConfig,
    #[serde(default)]
    pub methods: MethodsConfig,
    #[serde(default)]
    pub invariants: InvariantPolicy,
    #[serde(default)]
    pub engine: EngineConfig,
    pub inputs: InputsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MainConfig {
    pub output_directory: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    /// Preset extent (`globe`, `uk`) or a label for an explicit extent
    pub name: String,
    pub west: Option<f64>,
    pub south: Option<f64>,
    pub east: Option<f64>,
    pub north: Option<f64>,
    #[serde(default = "default_resolution")]
    pub resolution: f64,
}

fn default_resolution() -> f64 {
    DEFAULT_RESOLUTION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MethodsConfig {
    pub land_fraction: String,
    pub frac: Vec<String>,
    pub npft: Vec<u32>,
    pub soil_props: Vec<String>,
    pub fraction_policy: String,
    pub years: Vec<i32>,
}

impl Default for MethodsConfig {
    fn default() -> Self {
        Self {
            land_fraction: "ESA".into(),
            frac: vec!["Poulter".into()],
            npft: vec![5, 9],
            soil_props: vec!["Cosby".into()],
            fraction_policy: "strict".into(),
            years: vec![2015],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub max_attempts: u32,
    pub deadline_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            deadline_secs: 600,
        }
    }
}

impl EngineConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Paths into the working store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputsConfig {
    /// Land-cover class rasters keyed by year
    #[serde(default)]
    pub landcover: BTreeMap<String, PathBuf>,
    pub waterbodies: Option<PathBuf>,
    pub elevation: Option<PathBuf>,
    pub c4_natural: Option<PathBuf>,
    pub c4_crop: Option<PathBuf>,
    pub ecoregions: Option<PathBuf>,
    /// horizon -> variable -> path
    #[serde(default)]
    pub soil: BTreeMap<String, BTreeMap<String, PathBuf>>,
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(text).map_err(|e| {
            Error::config("config", e.message().to_string(), "cannot parse configuration")
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Make relative input and output paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.main.output_directory);
        self.inputs.landcover.values_mut().for_each(fix);
        for p in [
            &mut self.inputs.waterbodies,
            &mut self.inputs.elevation,
            &mut self.inputs.c4_natural,
            &mut self.inputs.c4_crop,
            &mut self.inputs.ecoregions,
        ]
        .into_iter()
        .flatten()
        {
            fix(p);
        }
        for vars in self.inputs.soil.values_mut() {
            vars.values_mut().for_each(fix);
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.region.resolution > 0.0) {
            return Err(Error::config(
                "region.resolution",
                self.region.resolution.to_string(),
                "must be positive",
            ));
        }
        if self.engine.max_attempts == 0 {
            return Err(Error::config("engine.max_attempts", "0", "at least one attempt is required"));
        }
        if !(self.invariants.tolerance >= 0.0) {
            return Err(Error::config(
                "invariants.tolerance",
                self.invariants.tolerance.to_string(),
                "must be non-negative",
            ));
        }
        for year in &self.methods.years {
            if !self.inputs.landcover.contains_key(&year.to_string()) {
                return Err(Error::config(
                    "inputs.landcover",
                    year.to_string(),
                    "no land-cover raster configured for this year",
                ));
            }
        }
        self.target_region().map(|_| ())
    }

    /// The preset or label part of the region name, e.g. `uk`
    fn extent_label(&self) -> &str {
        self.region.name.split('_').next().unwrap_or(&self.region.name)
    }

    pub fn extent(&self) -> Result<Extent> {
        let r = &self.region;
        match (r.west, r.south, r.east, r.north) {
            (Some(w), Some(s), Some(e), Some(n)) => Extent::new(w, s, e, n),
            (None, None, None, None) => Extent::named(self.extent_label()).ok_or_else(|| {
                Error::config("region.name", &r.name, "unknown preset extent and no explicit bounds")
            }),
            _ => Err(Error::config(
                "region",
                &r.name,
                "west, south, east and north must be given together",
            )),
        }
    }

    pub fn target_region(&self) -> Result<Region> {
        Region::with_resolution(self.extent()?, self.region.resolution)
    }

    /// Name used in output file names, e.g. `uk_0.008333Deg`
    pub fn region_name(&self) -> String {
        preset_name(self.extent_label(), self.region.resolution)
    }

    pub fn landcover_path(&self, year: i32) -> Result<&Path> {
        self.inputs
            .landcover
            .get(&year.to_string())
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::config("inputs.landcover", year.to_string(), "no raster for year"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[main]
output_directory = "out"

[region]
name = "uk"

[inputs]
waterbodies = "wb.tif"

[inputs.landcover]
2015 = "lc_2015.tif"
"#;

    #[test]
    fn test_defaults() {
        let config = RunConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.methods.land_fraction, "ESA");
        assert_eq!(config.methods.npft, vec![5, 9]);
        assert_eq!(config.engine.max_attempts, 3);
        assert!(config.invariants.hard_fail);
        assert!(!config.main.overwrite);
        assert_eq!(config.region_name(), "uk_0.008333Deg");
        assert_eq!(config.target_region().unwrap().shape(), (1200, 1200));
    }

    #[test]
    fn test_explicit_extent() {
        let text = MINIMAL.replace(
            "name = \"uk\"",
            "name = \"test\"\nwest = 0.0\nsouth = 0.0\neast = 1.0\nnorth = 1.0\nresolution = 0.25",
        );
        let config = RunConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.target_region().unwrap().shape(), (4, 4));
        assert_eq!(config.region_name(), "test_0.250000Deg");
    }

    #[test]
    fn test_unknown_region_names_key() {
        let text = MINIMAL.replace("\"uk\"", "\"atlantis\"");
        let err = RunConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, Error::Configuration { ref key, .. } if key == "region.name"));
    }

    #[test]
    fn test_missing_year_is_config_error() {
        let text = format!("{}\n[methods]\nyears = [2015, 2020]\n", MINIMAL);
        let err = RunConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, Error::Configuration { ref key, .. } if key == "inputs.landcover"));
    }

    #[test]
    fn test_paths_resolved_against_config_dir() {
        let mut config = RunConfig::from_toml_str(MINIMAL).unwrap();
        config.resolve_paths(Path::new("/data/run"));
        assert_eq!(config.main.output_directory, PathBuf::from("/data/run/out"));
        assert_eq!(config.landcover_path(2015).unwrap(), Path::new("/data/run/lc_2015.tif"));
    }
}
