//! Land-cover fractions from discrete class rasters
//!
//! - [`CrosswalkTable`]: class code → per-category weights
//! - [`CategoryScheme`]: how crosswalk categories become output categories
//! - [`LandCoverFractionEngine`]: the full chain for one year
//! - [`FractionPolicy`]: what happens after the sum-to-one check

mod crosswalk;
mod fraction;
mod policy;
mod scheme;
mod surface;

pub use crosswalk::CrosswalkTable;
pub use fraction::{FractionInputs, FractionSet, LandCoverFractionEngine};
pub use policy::{check_sum_to_one, ice_renormalize, renormalize, FractionPolicy};
pub use scheme::{CategoryScheme, FIVE_PFT_NAMES, NINE_PFT_NAMES};
pub use surface::{surface_heights, SurfaceOutcome};
