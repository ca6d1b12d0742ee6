//! Soil hydraulic parameters per (family, horizon) unit

use std::collections::BTreeMap;

use ancil_core::io::GriddedDataset;
use ancil_core::{Error, Raster, Result};
use tracing::{debug, info, warn};

use super::ptf::{family, PedotransferFunction};
use super::{HydraulicParameter, Horizon, SoilFamily, SoilVariable};
use crate::engine::{Bindings, Engine, Mask, ResampleMethod};
use crate::region_context::RegionContext;

/// Catalog names of the soil variables, per horizon.
#[derive(Debug, Clone, Default)]
pub struct SoilInputs {
    horizons: BTreeMap<Horizon, BTreeMap<SoilVariable, String>>,
}

impl SoilInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, horizon: Horizon, variable: SoilVariable, name: impl Into<String>) -> &mut Self {
        self.horizons.entry(horizon).or_default().insert(variable, name.into());
        self
    }

    pub fn get(&self, horizon: Horizon, variable: SoilVariable) -> Option<&str> {
        self.horizons.get(&horizon)?.get(&variable).map(String::as_str)
    }

    /// Horizons with at least one variable, top down
    pub fn horizons(&self) -> Vec<Horizon> {
        self.horizons.keys().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Uninitialized,
    Computed,
}

#[derive(Debug)]
struct Unit {
    horizon: Horizon,
    state: UnitState,
    texture_gaps: usize,
}

/// Hydraulic parameters of one family over all of its horizons.
#[derive(Debug)]
pub struct SoilPropertyEngine {
    ptf: Box<dyn PedotransferFunction>,
    units: Vec<Unit>,
    overwrite: bool,
}

fn group_name(family: SoilFamily) -> String {
    format!("soil_props_{}", family)
}

/// Target-grid parameters of one family, one layer per horizon.
#[derive(Debug, Clone)]
pub struct SoilProperties {
    pub family: SoilFamily,
    pub horizons: Vec<Horizon>,
    pub parameters: Vec<(HydraulicParameter, Vec<Raster<f64>>)>,
}

impl SoilProperties {
    /// Group name, `soil_props_<family>`
    pub fn group(&self) -> String {
        group_name(self.family)
    }

    pub fn parameter(&self, parameter: HydraulicParameter) -> Option<&[Raster<f64>]> {
        self.parameters
            .iter()
            .find(|(p, _)| *p == parameter)
            .map(|(_, layers)| layers.as_slice())
    }

    pub fn to_dataset(&self, region_name: &str) -> Result<GriddedDataset> {
        let region = self
            .parameters
            .first()
            .and_then(|(_, layers)| layers.first())
            .map(|r| *r.region())
            .ok_or_else(|| Error::Algorithm(format!("{} has no horizons", self.group())))?;
        let labels = self.horizons.iter().map(|h| h.label().to_string()).collect();
        let mut ds = GriddedDataset::new(format!("{}_{}", self.group(), region_name), &region, "soil", labels)
            .attribute("pedotransfer_function", self.family.name());
        for (parameter, layers) in &self.parameters {
            let layers: Vec<&Raster<f64>> = layers.iter().collect();
            ds.add_variable(parameter.name(), parameter.units(), parameter.long_name(), None, &layers)?;
        }
        Ok(ds)
    }
}

impl SoilPropertyEngine {
    pub fn new(soil_family: SoilFamily, horizons: &[Horizon], overwrite: bool) -> Self {
        Self {
            ptf: family(soil_family),
            units: horizons
                .iter()
                .map(|&horizon| Unit {
                    horizon,
                    state: UnitState::Uninitialized,
                    texture_gaps: 0,
                })
                .collect(),
            overwrite,
        }
    }

    pub fn from_name(name: &str, horizons: &[Horizon], overwrite: bool) -> Result<Self> {
        Ok(Self::new(name.parse()?, horizons, overwrite))
    }

    pub fn family(&self) -> SoilFamily {
        self.ptf.family()
    }

    /// Name of the dataset this family is written to
    pub fn group(&self) -> String {
        group_name(self.family())
    }

    pub fn state(&self, horizon: Horizon) -> Option<UnitState> {
        self.units.iter().find(|u| u.horizon == horizon).map(|u| u.state)
    }

    /// Land cells of a horizon whose texture fell in no class, for the
    /// texture-lookup family. Their `psi_m` is null and `b` is -1.
    pub fn texture_gaps(&self, horizon: Horizon) -> Option<usize> {
        self.units.iter().find(|u| u.horizon == horizon).map(|u| u.texture_gaps)
    }

    /// Catalog name of a target-grid parameter
    pub fn output_name(&self, parameter: HydraulicParameter, horizon: Horizon) -> String {
        format!("{}_{}_{}", parameter.name(), self.family(), horizon.key())
    }

    /// Compute every horizon, masked to `land`, and collect the results.
    pub fn compute(
        &mut self,
        engine: &mut Engine,
        ctx: &RegionContext,
        inputs: &SoilInputs,
        land: &Mask,
    ) -> Result<SoilProperties> {
        let horizons: Vec<Horizon> = self.units.iter().map(|u| u.horizon).collect();
        for &horizon in &horizons {
            self.compute_horizon(engine, ctx, inputs, horizon, land)?;
        }

        let mut parameters = Vec::with_capacity(HydraulicParameter::ALL.len());
        for parameter in HydraulicParameter::ALL {
            let mut layers = Vec::with_capacity(horizons.len());
            for &horizon in &horizons {
                layers.push(engine.get(&self.output_name(parameter, horizon))?.as_ref().clone());
            }
            parameters.push((parameter, layers));
        }
        Ok(SoilProperties {
            family: self.family(),
            horizons,
            parameters,
        })
    }

    /// Compute one unit. A unit already computed is left alone, and so is
    /// one whose outputs all exist when overwrite is off.
    pub fn compute_horizon(
        &mut self,
        engine: &mut Engine,
        ctx: &RegionContext,
        inputs: &SoilInputs,
        horizon: Horizon,
        land: &Mask,
    ) -> Result<()> {
        let index = self
            .units
            .iter()
            .position(|u| u.horizon == horizon)
            .ok_or_else(|| Error::config("inputs.soil", horizon.label(), format!("not configured for {}", self.family())))?;
        if self.units[index].state == UnitState::Computed {
            return Ok(());
        }

        let outputs: Vec<String> = HydraulicParameter::ALL
            .iter()
            .map(|&p| self.output_name(p, horizon))
            .collect();
        if !self.overwrite && outputs.iter().all(|o| engine.contains(o)) {
            info!("{} {} exists, skipping", self.family(), horizon);
            self.units[index].state = UnitState::Computed;
            return Ok(());
        }

        info!("Computing {} soil properties for {}", self.family(), horizon);
        let ns = format!("{}_{}_native_", self.family(), horizon.key());
        let mut bindings = Bindings::new(ns);
        for &variable in self.ptf.required() {
            let name = inputs.get(horizon, variable).ok_or_else(|| {
                Error::config(
                    format!("inputs.soil.{}.{}", horizon.key(), variable.name()),
                    "",
                    format!("required by {}", self.family()),
                )
            })?;
            bindings.bind(variable.name(), name);
        }
        let reference = bindings
            .resolve(SoilVariable::Clay.name())
            .map(str::to_string)
            .ok_or_else(|| Error::config("inputs.soil", horizon.label(), "clay is required"))?;

        let native = ctx.native(engine, &reference)?;
        self.ptf.pipeline().run(engine, &native, &mut bindings, Some(land))?;
        if self.family() == SoilFamily::ZhangSchaap {
            let alpha = engine.get(&bindings.output_name("alpha"))?;
            let gaps = alpha.data().iter().filter(|&&v| v == 0.0).count();
            if gaps > 0 {
                warn!(
                    "{} {}: {} cells fall in no texture class, psi_m is null there",
                    self.family(),
                    horizon,
                    gaps
                );
            }
            self.units[index].texture_gaps = gaps;
        }

        for (parameter, output) in HydraulicParameter::ALL.iter().zip(&outputs) {
            let source = bindings.output_name(parameter.name());
            debug!("{} -> {}", source, output);
            ctx.resample_to_target(engine, &source, output, ResampleMethod::Average)?;
        }
        engine.remove_matching("_tmp");
        self.units[index].state = UnitState::Computed;
        Ok(())
    }
}
