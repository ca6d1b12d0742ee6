//! # ancil algorithms
//!
//! Processing for land-surface model ancillaries on top of a small raster
//! algebra engine.
//!
//! - **engine**: named raster catalog, map algebra, weighted reclassify,
//!   area-weighted resampling, grow, retried calls
//! - **landcover**: crosswalk tables, category schemes, fractions and
//!   surface heights
//! - **landfrac**: land fraction from water bodies and land cover
//! - **soil**: texture classes and pedotransfer families
//! - **process**: a whole configured run

pub mod engine;
pub mod landcover;
pub mod landfrac;
pub(crate) mod maybe_rayon;
pub mod process;
pub mod region_context;
pub mod soil;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::{Bindings, CallPolicy, Engine, Mask, Pipeline, ResampleMethod};
    pub use crate::landcover::{
        CategoryScheme, CrosswalkTable, FractionInputs, FractionPolicy, FractionSet, LandCoverFractionEngine,
    };
    pub use crate::landfrac::{LandFraction, LandFractionReconciler};
    pub use crate::process::{Run, RunSummary};
    pub use crate::region_context::RegionContext;
    pub use crate::soil::{Horizon, HydraulicParameter, SoilFamily, SoilInputs, SoilProperties, SoilPropertyEngine};
    pub use ancil_core::prelude::*;
}
