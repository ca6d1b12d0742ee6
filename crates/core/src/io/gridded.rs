//! Self-describing gridded output
//!
//! Final fraction and soil-parameter grids are written as JSON documents
//! carrying explicit lat/lon axes, per-cell bounds, a grid-mapping
//! descriptor and a fill value for masked cells. One document per
//! (variable group, region).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::Raster;
use crate::region::Region;

/// Fill value for masked cells
pub const FILL_VALUE: f64 = 9.969209968386869e36;

/// Earth radius of the spherical lat/lon grid mapping, metres
pub const EARTH_RADIUS: f64 = 6_371_229.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub units: String,
    pub standard_name: String,
    pub values: Vec<f64>,
    pub bounds: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMapping {
    pub grid_mapping_name: String,
    pub longitude_of_prime_meridian: f64,
    pub earth_radius: f64,
}

impl Default for GridMapping {
    fn default() -> Self {
        Self {
            grid_mapping_name: "latitude_longitude".into(),
            longitude_of_prime_meridian: 0.0,
            earth_radius: EARTH_RADIUS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub units: String,
    pub long_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_name: Option<String>,
    pub fill_value: f64,
    /// `[index, y, x]`
    pub dimensions: [String; 3],
    /// Layers along the index dimension, rows north to south
    pub data: Vec<Vec<Vec<f64>>>,
}

impl Variable {
    /// Cell value with the fill value mapped back to NaN
    pub fn value(&self, layer: usize, row: usize, col: usize) -> Option<f64> {
        let v = *self.data.get(layer)?.get(row)?.get(col)?;
        Some(if v == self.fill_value { f64::NAN } else { v })
    }
}

/// A gridded dataset under construction or read back from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GriddedDataset {
    pub title: String,
    pub index_dimension: String,
    pub index_labels: Vec<String>,
    pub x: Axis,
    pub y: Axis,
    pub grid_mapping: GridMapping,
    pub variables: BTreeMap<String, Variable>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(skip)]
    region: Option<Region>,
}

/// What happened on [`GriddedDataset::write`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(PathBuf),
    /// File existed and overwrite was off
    Skipped(PathBuf),
}

impl GriddedDataset {
    /// Empty dataset over `region`. `index_dimension` is `type` for
    /// land-cover fractions and `soil` for soil horizons.
    pub fn new(
        title: impl Into<String>,
        region: &Region,
        index_dimension: impl Into<String>,
        index_labels: Vec<String>,
    ) -> Self {
        Self {
            title: title.into(),
            index_dimension: index_dimension.into(),
            index_labels,
            x: Axis {
                units: "degrees_east".into(),
                standard_name: "longitude".into(),
                values: region.x_centers(),
                bounds: region.x_bounds(),
            },
            y: Axis {
                units: "degrees_north".into(),
                standard_name: "latitude".into(),
                values: region.y_centers(),
                bounds: region.y_bounds(),
            },
            grid_mapping: GridMapping::default(),
            variables: BTreeMap::new(),
            attributes: BTreeMap::new(),
            region: Some(*region),
        }
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a variable with one layer per index label. Layers must lie on
    /// the dataset's region; NaN cells become the fill value.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        units: impl Into<String>,
        long_name: impl Into<String>,
        standard_name: Option<&str>,
        layers: &[&Raster<f64>],
    ) -> Result<()> {
        let name = name.into();
        if layers.len() != self.index_labels.len() {
            return Err(Error::InvalidParameter {
                name: "layers",
                value: layers.len().to_string(),
                reason: format!(
                    "variable `{}` needs one layer per {} ({})",
                    name,
                    self.index_dimension,
                    self.index_labels.len()
                ),
            });
        }
        let region = self
            .region
            .ok_or_else(|| Error::Other("dataset was read from disk and is immutable".into()))?;

        let mut data = Vec::with_capacity(layers.len());
        for layer in layers {
            if !layer.region().same_grid(&region) {
                return Err(Error::RegionMismatch {
                    expected: region.describe(),
                    actual: layer.region().describe(),
                });
            }
            let rows = layer
                .data()
                .rows()
                .into_iter()
                .map(|row| {
                    row.iter()
                        .map(|&v| if v.is_finite() { v } else { FILL_VALUE })
                        .collect()
                })
                .collect();
            data.push(rows);
        }

        self.variables.insert(
            name,
            Variable {
                units: units.into(),
                long_name: long_name.into(),
                standard_name: standard_name.map(str::to_string),
                fill_value: FILL_VALUE,
                dimensions: [self.index_dimension.clone(), "y".into(), "x".into()],
                data,
            },
        );
        Ok(())
    }

    /// Write `<group>_<region_name>.json` into `dir`.
    pub fn write(&self, dir: &Path, group: &str, region_name: &str, overwrite: bool) -> Result<WriteOutcome> {
        let path = dataset_path(dir, group, region_name);
        if path.exists() && !overwrite {
            return Ok(WriteOutcome::Skipped(path));
        }
        fs::create_dir_all(dir)?;
        let text = serde_json::to_string(self).map_err(|e| Error::Other(e.to_string()))?;
        fs::write(&path, text)?;
        Ok(WriteOutcome::Written(path))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| Error::Other(format!("{}: {}", path.display(), e)))
    }
}

pub fn dataset_path(dir: &Path, group: &str, region_name: &str) -> PathBuf {
    dir.join(format!("{}_{}.json", group, region_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Extent;

    fn region() -> Region {
        Region::with_resolution(Extent::new(0.0, 0.0, 2.0, 1.0).unwrap(), 1.0).unwrap()
    }

    #[test]
    fn test_masked_cells_use_fill_value() {
        let a = Raster::from_vec(region(), vec![0.25, f64::NAN]).unwrap();
        let b = Raster::from_vec(region(), vec![0.75, f64::NAN]).unwrap();
        let mut ds = GriddedDataset::new("frac", &region(), "type", vec!["x".into(), "y".into()]);
        ds.add_variable("frac", "1", "fractional cover", None, &[&a, &b]).unwrap();
        let var = &ds.variables["frac"];
        assert_eq!(var.data[0][0][1], FILL_VALUE);
        assert!(var.value(1, 0, 1).unwrap().is_nan());
        assert_eq!(var.value(1, 0, 0), Some(0.75));
    }

    #[test]
    fn test_layer_count_and_region_checked() {
        let a = Raster::from_vec(region(), vec![1.0, 1.0]).unwrap();
        let mut ds = GriddedDataset::new("frac", &region(), "type", vec!["x".into(), "y".into()]);
        assert!(ds.add_variable("frac", "1", "", None, &[&a]).is_err());

        let other = Region::with_resolution(Extent::new(0.0, 0.0, 2.0, 1.0).unwrap(), 0.5).unwrap();
        let b = Raster::new(other);
        assert!(matches!(
            ds.add_variable("frac", "1", "", None, &[&a, &b]),
            Err(Error::RegionMismatch { .. })
        ));
    }

    #[test]
    fn test_write_respects_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let a = Raster::from_vec(region(), vec![1.0, 0.0]).unwrap();
        let mut ds = GriddedDataset::new("land fraction", &region(), "type", vec!["land".into()]);
        ds.add_variable("land_frac", "1", "land fraction", None, &[&a]).unwrap();

        let first = ds.write(dir.path(), "land_frac", "uk_0.500000Deg", false).unwrap();
        assert!(matches!(first, WriteOutcome::Written(_)));
        let second = ds.write(dir.path(), "land_frac", "uk_0.500000Deg", false).unwrap();
        assert!(matches!(second, WriteOutcome::Skipped(_)));

        let back = GriddedDataset::read(&dataset_path(dir.path(), "land_frac", "uk_0.500000Deg")).unwrap();
        assert_eq!(back.grid_mapping.earth_radius, EARTH_RADIUS);
        assert_eq!(back.x.bounds[1], [1.0, 2.0]);
        assert_eq!(back.variables["land_frac"].value(0, 0, 0), Some(1.0));
    }
}
