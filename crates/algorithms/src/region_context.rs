//! Native and target grids of a run
//!
//! A run works on two grids: the native grid of whichever source raster
//! an operation starts from (clipped to the configured extent) and the
//! fixed target grid of the outputs. Both are plain [`Region`] values
//! handed to each engine call.

use ancil_core::{Error, Extent, Region, Result, RunConfig};

use crate::engine::{Engine, ResampleMethod};

#[derive(Debug, Clone)]
pub struct RegionContext {
    extent: Extent,
    target: Region,
    name: String,
}

impl RegionContext {
    pub fn new(extent: Extent, resolution: f64, name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            extent,
            target: Region::with_resolution(extent, resolution)?,
            name: name.into(),
        })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Self::new(config.extent()?, config.region.resolution, config.region_name())
    }

    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    /// Region name used in output file names
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The output grid
    pub fn target(&self) -> Region {
        self.target
    }

    /// The grid of `reference`, restricted to the configured extent.
    pub fn native(&self, engine: &mut Engine, reference: &str) -> Result<Region> {
        let grid = engine.region_of(reference)?;
        let r = grid.extent();
        let clipped = Extent {
            west: r.west.max(self.extent.west),
            south: r.south.max(self.extent.south),
            east: r.east.min(self.extent.east),
            north: r.north.min(self.extent.north),
        };
        if clipped.west >= clipped.east || clipped.south >= clipped.north {
            return Err(Error::RegionMismatch {
                expected: format!(
                    "overlap with [{}, {}, {}, {}]",
                    self.extent.west, self.extent.south, self.extent.east, self.extent.north
                ),
                actual: format!("`{}` covering {}", reference, grid.describe()),
            });
        }
        Region::aligned_to(&grid, &clipped)
    }

    /// Aggregate a native raster onto the target grid.
    pub fn resample_to_target(
        &self,
        engine: &mut Engine,
        input: &str,
        output: &str,
        method: ResampleMethod,
    ) -> Result<()> {
        engine.resample(input, output, &self.target, method)
    }
}
