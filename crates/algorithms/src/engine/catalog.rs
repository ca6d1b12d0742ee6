//! Named raster catalog
//!
//! Every raster the engine touches is addressed by a stable string name.
//! Entries are either held in memory or registered against a GeoTIFF in
//! the working store and loaded on first use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ancil_core::error::{EngineError, EngineErrorKind};
use ancil_core::io::read_geotiff;
use ancil_core::{Error, Raster, Region, Result};
use tracing::debug;

#[derive(Debug, Clone)]
enum Entry {
    Loaded(Arc<Raster<f64>>),
    Stored(PathBuf),
}

#[derive(Debug, Default)]
pub struct Catalog {
    entries: BTreeMap<String, Entry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store-backed raster. Nothing is read until it is used.
    pub fn register_file(&mut self, name: impl Into<String>, path: impl AsRef<Path>) {
        self.entries
            .insert(name.into(), Entry::Stored(path.as_ref().to_path_buf()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch a raster, loading it from the store if needed.
    ///
    /// Store read failures are reported as `Transient` so the call policy
    /// can retry them.
    pub fn get(&mut self, name: &str) -> Result<Arc<Raster<f64>>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| EngineError::missing(name))?;
        let path = match entry {
            Entry::Loaded(raster) => return Ok(Arc::clone(raster)),
            Entry::Stored(path) => path.clone(),
        };

        debug!("loading `{}` from {}", name, path.display());
        let raster: Raster<f64> = read_geotiff(&path).map_err(|e| {
            let mut err = EngineError::new(
                EngineErrorKind::Transient,
                format!("cannot read {}: {}", path.display(), e),
            );
            err.inputs = vec![name.to_string()];
            Error::Engine(err)
        })?;
        let raster = Arc::new(raster.to_f64_nan());
        self.entries
            .insert(name.to_string(), Entry::Loaded(Arc::clone(&raster)));
        Ok(raster)
    }

    pub fn region_of(&mut self, name: &str) -> Result<Region> {
        Ok(*self.get(name)?.region())
    }

    /// Store a raster under `name`. An existing entry is only replaced
    /// when `overwrite` is set.
    pub fn insert(&mut self, name: &str, raster: Raster<f64>, overwrite: bool) -> Result<()> {
        if !overwrite && self.contains(name) {
            return Err(Error::InvalidParameter {
                name: "output",
                value: name.to_string(),
                reason: "raster exists and overwrite is off".into(),
            });
        }
        self.entries
            .insert(name.to_string(), Entry::Loaded(Arc::new(raster)));
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Drop every entry whose name ends with `suffix`; returns how many.
    pub fn remove_matching(&mut self, suffix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|name, _| !name.ends_with(suffix));
        before - self.entries.len()
    }
}
