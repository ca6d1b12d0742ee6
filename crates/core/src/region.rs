//! Explicit spatial regions
//!
//! A [`Region`] is an extent plus a cell resolution. Every raster carries
//! its own region, and every engine operation receives the region it
//! should compute on as an argument.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Relative tolerance used when comparing grid coordinates.
const GRID_EPS: f64 = 1e-9;

/// Preset extents, `[west, south, east, north]`
pub const EXTENTS: [(&str, [f64; 4]); 2] = [
    ("globe", [-180.0, -90.0, 180.0, 90.0]),
    ("uk", [-8.0, 49.0, 2.0, 59.0]),
];

/// Preset resolutions in decimal degrees
pub const RESOLUTIONS: [f64; 15] = [
    0.5,
    0.25,
    0.1,
    0.125,
    1.0 / 12.0,
    0.0625,
    0.05,
    1.0 / 24.0,
    1.0 / 60.0,
    0.01,
    1.0 / 120.0,
    1.0 / 240.0,
    1.0 / 480.0,
    1.0 / 360.0,
    1.0 / 1200.0,
];

/// Geographic bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Extent {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        if !(west < east && south < north) {
            return Err(Error::InvalidParameter {
                name: "extent",
                value: format!("[{}, {}, {}, {}]", west, south, east, north),
                reason: "west must be < east and south < north".into(),
            });
        }
        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Look up a preset extent by name
    pub fn named(name: &str) -> Option<Self> {
        EXTENTS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, e)| Self {
                west: e[0],
                south: e[1],
                east: e[2],
                north: e[3],
            })
    }
}

/// A regular north-up grid: extent plus cell size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    extent: Extent,
    res_x: f64,
    res_y: f64,
    rows: usize,
    cols: usize,
}

impl Region {
    /// Create a region covering `extent` with approximately the given
    /// resolution. The extent is kept and the resolution adjusted so a
    /// whole number of cells fits.
    pub fn new(extent: Extent, res_x: f64, res_y: f64) -> Result<Self> {
        if !(res_x > 0.0 && res_y > 0.0) {
            return Err(Error::InvalidParameter {
                name: "resolution",
                value: format!("{} x {}", res_x, res_y),
                reason: "resolution must be positive".into(),
            });
        }
        let cols = (extent.width() / res_x).round() as usize;
        let rows = (extent.height() / res_y).round() as usize;
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        Ok(Self {
            extent,
            res_x: extent.width() / cols as f64,
            res_y: extent.height() / rows as f64,
            rows,
            cols,
        })
    }

    /// Square-cell shorthand for [`Region::new`]
    pub fn with_resolution(extent: Extent, res: f64) -> Result<Self> {
        Self::new(extent, res, res)
    }

    /// Region from a top-left origin, cell size and shape
    pub fn from_origin(west: f64, north: f64, res_x: f64, res_y: f64, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let extent = Extent::new(
            west,
            north - rows as f64 * res_y,
            west + cols as f64 * res_x,
            north,
        )?;
        Ok(Self {
            extent,
            res_x,
            res_y,
            rows,
            cols,
        })
    }

    /// Resolve a preset region name such as `uk_0.008333Deg`.
    pub fn named(name: &str) -> Result<Self> {
        for (extent_name, _) in EXTENTS.iter() {
            for res in RESOLUTIONS {
                if preset_name(extent_name, res) == name {
                    let extent = Extent::named(extent_name)
                        .ok_or_else(|| Error::config("region.name", name, "unknown extent"))?;
                    return Self::with_resolution(extent, res);
                }
            }
        }
        Err(Error::config(
            "region.name",
            name,
            "not a known `<extent>_<resolution>Deg` region",
        ))
    }

    /// Snap `extent` outward onto the grid of `reference`, keeping the
    /// reference cell size.
    pub fn aligned_to(reference: &Region, extent: &Extent) -> Result<Self> {
        let rx = reference.res_x;
        let ry = reference.res_y;
        let ref_w = reference.extent.west;
        let ref_n = reference.extent.north;

        let snap_down = |v: f64| (v + GRID_EPS).floor();
        let snap_up = |v: f64| (v - GRID_EPS).ceil();

        let west = ref_w + snap_down((extent.west - ref_w) / rx) * rx;
        let east = ref_w + snap_up((extent.east - ref_w) / rx) * rx;
        let north = ref_n - snap_down((ref_n - extent.north) / ry) * ry;
        let south = ref_n - snap_up((ref_n - extent.south) / ry) * ry;

        let cols = ((east - west) / rx).round() as usize;
        let rows = ((north - south) / ry).round() as usize;
        Self::from_origin(west, north, rx, ry, rows, cols)
    }

    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn res_x(&self) -> f64 {
        self.res_x
    }

    pub fn res_y(&self) -> f64 {
        self.res_y
    }

    pub fn west(&self) -> f64 {
        self.extent.west
    }

    pub fn north(&self) -> f64 {
        self.extent.north
    }

    /// Bounds of one cell as (west, south, east, north)
    pub fn cell_bounds(&self, row: usize, col: usize) -> (f64, f64, f64, f64) {
        let w = self.extent.west + col as f64 * self.res_x;
        let n = self.extent.north - row as f64 * self.res_y;
        (w, n - self.res_y, w + self.res_x, n)
    }

    pub fn x_center(&self, col: usize) -> f64 {
        self.extent.west + (col as f64 + 0.5) * self.res_x
    }

    pub fn y_center(&self, row: usize) -> f64 {
        self.extent.north - (row as f64 + 0.5) * self.res_y
    }

    /// Cell-centre longitudes, west to east
    pub fn x_centers(&self) -> Vec<f64> {
        (0..self.cols).map(|c| self.x_center(c)).collect()
    }

    /// Cell-centre latitudes, north to south
    pub fn y_centers(&self) -> Vec<f64> {
        (0..self.rows).map(|r| self.y_center(r)).collect()
    }

    /// Per-column `[west, east]` bounds
    pub fn x_bounds(&self) -> Vec<[f64; 2]> {
        (0..self.cols)
            .map(|c| {
                let w = self.extent.west + c as f64 * self.res_x;
                [w, w + self.res_x]
            })
            .collect()
    }

    /// Per-row `[north, south]` bounds
    pub fn y_bounds(&self) -> Vec<[f64; 2]> {
        (0..self.rows)
            .map(|r| {
                let n = self.extent.north - r as f64 * self.res_y;
                [n, n - self.res_y]
            })
            .collect()
    }

    /// Column index containing longitude `x`
    pub fn col_of(&self, x: f64) -> Option<usize> {
        let c = ((x - self.extent.west) / self.res_x).floor();
        if c < 0.0 || c >= self.cols as f64 || c.is_nan() {
            None
        } else {
            Some(c as usize)
        }
    }

    /// Row index containing latitude `y`
    pub fn row_of(&self, y: f64) -> Option<usize> {
        let r = ((self.extent.north - y) / self.res_y).floor();
        if r < 0.0 || r >= self.rows as f64 || r.is_nan() {
            None
        } else {
            Some(r as usize)
        }
    }

    /// Whether two regions describe the same cells
    pub fn same_grid(&self, other: &Region) -> bool {
        let close = |a: f64, b: f64, scale: f64| (a - b).abs() <= GRID_EPS * scale.max(1.0);
        self.rows == other.rows
            && self.cols == other.cols
            && close(self.res_x, other.res_x, self.res_x)
            && close(self.res_y, other.res_y, self.res_y)
            && close(self.extent.west, other.extent.west, self.res_x)
            && close(self.extent.north, other.extent.north, self.res_y)
    }

    /// Short human-readable description, used in error messages
    pub fn describe(&self) -> String {
        format!(
            "{}x{} cells of {:.6}x{:.6} at ({:.4}, {:.4})",
            self.cols, self.rows, self.res_x, self.res_y, self.extent.west, self.extent.north
        )
    }
}

impl Default for Region {
    fn default() -> Self {
        Self {
            extent: Extent {
                west: 0.0,
                south: -1.0,
                east: 1.0,
                north: 0.0,
            },
            res_x: 1.0,
            res_y: 1.0,
            rows: 1,
            cols: 1,
        }
    }
}

/// Format a preset region name: `<extent>_<res:.6>Deg`
pub fn preset_name(extent_name: &str, res: f64) -> String {
    format!("{}_{:.6}Deg", extent_name, res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_named_region() {
        let region = Region::named("uk_0.008333Deg").unwrap();
        assert_eq!(region.cols(), 1200);
        assert_eq!(region.rows(), 1200);
        assert_relative_eq!(region.res_x(), 1.0 / 120.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_region_is_config_error() {
        let err = Region::named("mars_0.5Deg").unwrap_err();
        assert!(matches!(err, Error::Configuration { ref key, .. } if key == "region.name"));
    }

    #[test]
    fn test_cell_centres_and_bounds() {
        let region = Region::with_resolution(Extent::new(0.0, 0.0, 4.0, 2.0).unwrap(), 1.0).unwrap();
        assert_eq!(region.shape(), (2, 4));
        assert_relative_eq!(region.x_center(0), 0.5);
        assert_relative_eq!(region.y_center(0), 1.5);
        assert_eq!(region.y_bounds()[1], [1.0, 0.0]);
        assert_eq!(region.cell_bounds(1, 3), (3.0, 0.0, 4.0, 1.0));
        assert_eq!(region.row_of(1.5), Some(0));
        assert_eq!(region.col_of(4.5), None);
    }

    #[test]
    fn test_aligned_to_snaps_outward() {
        let reference = Region::with_resolution(Extent::new(-10.0, -10.0, 10.0, 10.0).unwrap(), 0.25).unwrap();
        let extent = Extent::new(0.1, 0.1, 0.9, 0.9).unwrap();
        let aligned = Region::aligned_to(&reference, &extent).unwrap();
        assert_relative_eq!(aligned.west(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(aligned.north(), 1.0, epsilon = 1e-9);
        assert_eq!(aligned.shape(), (4, 4));
        assert_relative_eq!(aligned.res_x(), 0.25);
    }

    #[test]
    fn test_same_grid() {
        let a = Region::with_resolution(Extent::new(0.0, 0.0, 1.0, 1.0).unwrap(), 0.1).unwrap();
        let b = Region::from_origin(0.0, 1.0, 0.1, 0.1, 10, 10).unwrap();
        let c = Region::with_resolution(Extent::new(0.0, 0.0, 1.0, 1.0).unwrap(), 0.5).unwrap();
        assert!(a.same_grid(&b));
        assert!(!a.same_grid(&c));
    }
}
