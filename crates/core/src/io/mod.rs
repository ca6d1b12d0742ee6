//! Raster store I/O and gridded output

mod gridded;
mod native;

pub use gridded::{dataset_path, Axis, GridMapping, GriddedDataset, Variable, WriteOutcome, EARTH_RADIUS, FILL_VALUE};
pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer, GeoTiffOptions, SampleFormat,
};
