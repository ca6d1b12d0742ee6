//! # ancil core
//!
//! Grid types, configuration and I/O shared by the ancillary-data
//! processing crates.
//!
//! This crate provides:
//! - `Region`: an explicit extent plus resolution, carried by every raster
//! - `Raster<T>`: generic raster grid type
//! - The error taxonomy and invariant reports
//! - TOML run configuration
//! - GeoTIFF store I/O and the gridded JSON output writer

pub mod config;
pub mod error;
pub mod invariant;
pub mod io;
pub mod raster;
pub mod region;

pub use config::RunConfig;
pub use error::{EngineError, EngineErrorKind, Error, Result};
pub use invariant::{InvariantPolicy, InvariantReport};
pub use raster::{Raster, RasterElement, RasterStatistics};
pub use region::{Extent, Region};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{EngineError, EngineErrorKind, Error, Result};
    pub use crate::invariant::{InvariantPolicy, InvariantReport};
    pub use crate::raster::{Raster, RasterElement};
    pub use crate::region::{Extent, Region};
}
