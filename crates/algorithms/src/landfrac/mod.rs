//! Land fraction from two disagreeing land/ocean sources
//!
//! A cell is ocean only when both the water-body product and the
//! land-cover product say so. The water-body product is first brought to
//! the land-cover grid with the `minimum` resampler, so a single fine
//! ocean pixel marks its coarse parent as ocean. The binary land mask on
//! the native grid is kept (soil properties are masked with it) and its
//! average on the target grid is the land fraction.

use ancil_core::io::GriddedDataset;
use ancil_core::{Error, Raster, Result};
use tracing::{debug, info};

use crate::engine::{Engine, ResampleMethod};
use crate::region_context::RegionContext;

/// Water-body value meaning ocean
pub const OCEAN_CODE: i64 = 0;
/// Land-cover class meaning water
pub const WATER_CLASS: i64 = 210;

#[derive(Debug, Clone)]
pub struct LandFractionReconciler {
    ocean_code: i64,
    water_class: i64,
    prefix: String,
    overwrite: bool,
}

/// Outputs of [`LandFractionReconciler::compute`].
#[derive(Debug, Clone)]
pub struct LandFraction {
    /// Catalog name of the 0/1 land mask on the land-cover grid
    pub native: String,
    /// Catalog name of the target-grid fraction
    pub target: String,
    pub fraction: Raster<f64>,
}

impl LandFraction {
    pub fn to_dataset(&self, region_name: &str) -> Result<GriddedDataset> {
        let mut ds = GriddedDataset::new(
            format!("land_frac_{}", region_name),
            self.fraction.region(),
            "type",
            vec!["land".to_string()],
        );
        ds.add_variable("land_frac", "1", "Land fraction", Some("land_area_fraction"), &[&self.fraction])?;
        Ok(ds)
    }
}

impl Default for LandFractionReconciler {
    fn default() -> Self {
        Self {
            ocean_code: OCEAN_CODE,
            water_class: WATER_CLASS,
            prefix: "landfrac_esa".to_string(),
            overwrite: true,
        }
    }
}

impl LandFractionReconciler {
    /// Resolve a land fraction method by name.
    pub fn by_name(method: &str) -> Result<Self> {
        match method.to_ascii_uppercase().as_str() {
            "ESA" => Ok(Self::default()),
            _ => Err(Error::config("methods.land_fraction", method, "unknown land fraction method")),
        }
    }

    pub fn with_codes(mut self, ocean_code: i64, water_class: i64) -> Self {
        self.ocean_code = ocean_code;
        self.water_class = water_class;
        self
    }

    /// Reuse an existing native land mask unless set
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn native_name(&self) -> String {
        format!("{}_native", self.prefix)
    }

    pub fn compute(
        &self,
        engine: &mut Engine,
        ctx: &RegionContext,
        landcover: &str,
        waterbodies: &str,
    ) -> Result<LandFraction> {
        info!("Computing land fraction");
        let native_name = self.native_name();
        let target_name = self.prefix.clone();

        if engine.contains(&native_name) && !self.overwrite {
            debug!("{} exists, reusing it", native_name);
        } else {
            let native = ctx.native(engine, landcover)?;
            let p = &self.prefix;
            let wb_min = format!("{}_wb_min_tmp", p);
            let ocean_wb = format!("{}_ocean_wb_tmp", p);
            let ocean_lc = format!("{}_ocean_lc_tmp", p);
            let ocean = format!("{}_ocean_tmp", p);

            engine.resample(waterbodies, &wb_min, &native, ResampleMethod::Minimum)?;
            engine.map_algebra(&native, &ocean_wb, &format!("if({} == {}, 1, 0)", wb_min, self.ocean_code), None)?;
            engine.map_algebra(
                &native,
                &ocean_lc,
                &format!("if({} == {}, 1, 0)", landcover, self.water_class),
                None,
            )?;
            engine.map_algebra(
                &native,
                &ocean,
                &format!("if({} == 1 && {} == 1, 1, 0)", ocean_wb, ocean_lc),
                None,
            )?;
            engine.map_algebra(&native, &native_name, &format!("1 - {}", ocean), None)?;
            engine.remove_matching("_tmp");
        }

        ctx.resample_to_target(engine, &native_name, &target_name, ResampleMethod::Average)?;
        let fraction = engine.get(&target_name)?.as_ref().clone();
        Ok(LandFraction {
            native: native_name,
            target: target_name,
            fraction,
        })
    }
}
