//! Run orchestration
//!
//! Builds every processing engine from a [`RunConfig`] up front, so an
//! unknown method, horizon or variable name fails before any raster is
//! touched, then runs the stages in a fixed order: land fraction,
//! land-cover fractions (each method, variant and year), soil properties
//! (each family), and finally writes the gridded outputs.

use std::path::PathBuf;

use ancil_core::io::{dataset_path, GriddedDataset, WriteOutcome};
use ancil_core::{Error, InvariantReport, Result, RunConfig};
use tracing::{info, warn};

use crate::engine::{CallPolicy, Engine, Mask};
use crate::landcover::{FractionInputs, FractionPolicy, FractionSet, LandCoverFractionEngine};
use crate::landfrac::{LandFraction, LandFractionReconciler};
use crate::region_context::RegionContext;
use crate::soil::{Horizon, SoilInputs, SoilProperties, SoilPropertyEngine, SoilVariable};

const WATERBODIES: &str = "waterbodies";
const ELEVATION: &str = "elevation";
const C4_NATURAL: &str = "c4_natural";
const C4_CROP: &str = "c4_crop";
const ECOREGIONS: &str = "ecoregions";
const LAND_FRAC: &str = "land_frac";

fn landcover_name(year: i32) -> String {
    format!("landcover_{}", year)
}

/// What a run produced.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub written: Vec<PathBuf>,
    /// Outputs left in place because they existed and overwrite was off
    pub skipped: Vec<PathBuf>,
    /// Sum-to-one report of every fraction set computed
    pub reports: Vec<InvariantReport>,
    pub engine_calls: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written(p) => {
                info!("Wrote {}", p.display());
                self.written.push(p);
            }
            WriteOutcome::Skipped(p) => {
                info!("{} exists, skipping", p.display());
                self.skipped.push(p);
            }
        }
    }
}

/// One configured run.
#[derive(Debug)]
pub struct Run {
    config: RunConfig,
    ctx: RegionContext,
    engine: Engine,
    land_fraction: LandFractionReconciler,
    fractions: Vec<LandCoverFractionEngine>,
    soil: Vec<SoilPropertyEngine>,
    fraction_inputs: FractionInputs,
    soil_inputs: SoilInputs,
    reference_year: i32,
    /// Outputs not recomputed because they were on disk
    skipped: Vec<PathBuf>,
}

impl Run {
    pub fn new(config: RunConfig) -> Result<Self> {
        let ctx = RegionContext::from_config(&config)?;
        let overwrite = config.main.overwrite;
        let methods = &config.methods;

        let land_fraction = LandFractionReconciler::by_name(&methods.land_fraction)?.with_overwrite(overwrite);
        let policy: FractionPolicy = methods.fraction_policy.parse()?;
        let mut fractions = Vec::new();
        for method in &methods.frac {
            for &npft in &methods.npft {
                fractions.push(LandCoverFractionEngine::from_names(
                    method,
                    npft as usize,
                    policy,
                    config.invariants,
                )?);
            }
        }

        let mut engine = Engine::new(CallPolicy::from(&config.engine));
        let reference_year = *methods
            .years
            .first()
            .ok_or_else(|| Error::config("methods.years", "[]", "at least one year is required"))?;
        for &year in &methods.years {
            engine.register_file(&landcover_name(year), config.landcover_path(year)?);
        }

        let inputs = &config.inputs;
        let waterbodies = inputs
            .waterbodies
            .as_ref()
            .ok_or_else(|| Error::config("inputs.waterbodies", "", "required by the land fraction"))?;
        engine.register_file(WATERBODIES, waterbodies);

        let mut fraction_inputs = FractionInputs::new(landcover_name(reference_year));
        for (name, path, slot) in [
            (ELEVATION, &inputs.elevation, &mut fraction_inputs.elevation),
            (C4_NATURAL, &inputs.c4_natural, &mut fraction_inputs.c4_natural),
            (C4_CROP, &inputs.c4_crop, &mut fraction_inputs.c4_crop),
            (ECOREGIONS, &inputs.ecoregions, &mut fraction_inputs.ecoregions),
        ] {
            if let Some(path) = path {
                engine.register_file(name, path);
                *slot = Some(name.to_string());
            }
        }

        let mut soil_inputs = SoilInputs::new();
        for (horizon_key, variables) in &inputs.soil {
            let horizon: Horizon = horizon_key.parse()?;
            for (variable_key, path) in variables {
                let variable: SoilVariable = variable_key.parse()?;
                let name = format!("soil_{}_{}", variable.name(), horizon.key());
                engine.register_file(&name, path);
                soil_inputs.set(horizon, variable, name);
            }
        }
        let horizons = soil_inputs.horizons();
        if !methods.soil_props.is_empty() && horizons.is_empty() {
            return Err(Error::config("inputs.soil", "", "required by methods.soil_props"));
        }
        let soil = methods
            .soil_props
            .iter()
            .map(|name| SoilPropertyEngine::from_name(name, &horizons, overwrite))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Run over {} ({}): {} fraction variants, {} soil families",
            ctx.name(),
            ctx.target().describe(),
            fractions.len(),
            soil.len()
        );
        Ok(Self {
            config,
            ctx,
            engine,
            land_fraction,
            fractions,
            soil,
            fraction_inputs,
            soil_inputs,
            reference_year,
            skipped: Vec::new(),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn context(&self) -> &RegionContext {
        &self.ctx
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn output_path(&self, group: &str) -> PathBuf {
        dataset_path(&self.config.main.output_directory, group, self.ctx.name())
    }

    /// True when `path` is on disk and must be left alone.
    fn keep_existing(&mut self, path: PathBuf) -> bool {
        if self.config.main.overwrite || !path.exists() {
            return false;
        }
        info!("{} exists, skipping", path.display());
        self.skipped.push(path);
        true
    }

    /// `None` when the land fraction dataset is already on disk.
    pub fn land_fraction(&mut self) -> Result<Option<LandFraction>> {
        if self.keep_existing(self.output_path(LAND_FRAC)) {
            return Ok(None);
        }
        self.compute_land_fraction().map(Some)
    }

    fn compute_land_fraction(&mut self) -> Result<LandFraction> {
        self.land_fraction.compute(
            &mut self.engine,
            &self.ctx,
            &landcover_name(self.reference_year),
            WATERBODIES,
        )
    }

    /// Every (method, variant, year) whose output is not already on disk.
    pub fn land_cover_fractions(&mut self) -> Result<Vec<FractionSet>> {
        let mut sets = Vec::new();
        for index in 0..self.fractions.len() {
            for year in self.config.methods.years.clone() {
                let name = self.fractions[index].name(year);
                if self.keep_existing(self.output_path(&name)) {
                    let surface = self.output_path(&name.replacen("frac", "surf_hgt", 1));
                    if surface.exists() {
                        self.skipped.push(surface);
                    }
                    continue;
                }
                let mut inputs = self.fraction_inputs.clone();
                inputs.landcover = landcover_name(year);
                sets.push(self.fractions[index].compute(&mut self.engine, &self.ctx, &inputs, year)?);
            }
        }
        Ok(sets)
    }

    /// Every soil family whose dataset is not already on disk. The land
    /// mask is rebuilt when `land` was skipped and a family still needs it.
    pub fn soil_properties(&mut self, land: Option<&LandFraction>) -> Result<Vec<SoilProperties>> {
        let mut pending = Vec::with_capacity(self.soil.len());
        for index in 0..self.soil.len() {
            let path = self.output_path(&self.soil[index].group());
            if !self.keep_existing(path) {
                pending.push(index);
            }
        }
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let native = match land {
            Some(land) => land.native.clone(),
            None => self.compute_land_fraction()?.native,
        };
        let mask = Mask::new(native, 1.0);
        let mut out = Vec::with_capacity(pending.len());
        for index in pending {
            out.push(self.soil[index].compute(&mut self.engine, &self.ctx, &self.soil_inputs, &mask)?);
        }
        Ok(out)
    }

    fn write(&self, summary: &mut RunSummary, ds: &GriddedDataset, group: &str) -> Result<()> {
        let outcome = ds.write(
            &self.config.main.output_directory,
            group,
            self.ctx.name(),
            self.config.main.overwrite,
        )?;
        summary.record(outcome);
        Ok(())
    }

    pub fn write_outputs(
        &self,
        land: Option<&LandFraction>,
        sets: &[FractionSet],
        soil: &[SoilProperties],
    ) -> Result<RunSummary> {
        let mut summary = RunSummary {
            skipped: self.skipped.clone(),
            ..Default::default()
        };
        if let Some(land) = land {
            self.write(&mut summary, &land.to_dataset(self.ctx.name())?, LAND_FRAC)?;
        }
        for set in sets {
            if !set.report.is_clean() {
                warn!("{}", set.report);
            }
            self.write(&mut summary, &set.to_dataset()?, &set.name)?;
            if let Some(ds) = set.surface_dataset()? {
                self.write(&mut summary, &ds, &set.surface_name())?;
            }
            summary.reports.push(set.report.clone());
        }
        for props in soil {
            self.write(&mut summary, &props.to_dataset(self.ctx.name())?, &props.group())?;
        }
        summary.engine_calls = self.engine.calls();
        Ok(summary)
    }

    /// All stages in order.
    pub fn execute(&mut self) -> Result<RunSummary> {
        let land = self.land_fraction()?;
        let sets = self.land_cover_fractions()?;
        let soil = self.soil_properties(land.as_ref())?;
        self.write_outputs(land.as_ref(), &sets, &soil)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> RunConfig {
        let text = format!(
            r#"
[main]
output_directory = "/tmp/ancil-out"

[region]
name = "uk"
resolution = 0.5

[methods]
{}

[inputs]
landcover = {{ "2015" = "lc_2015.tif" }}
waterbodies = "wb.tif"

[inputs.soil.0-5cm]
clay = "clay.tif"
sand = "sand.tif"
"#,
            extra
        );
        RunConfig::from_toml_str(&text).unwrap()
    }

    #[test]
    fn test_factories_resolved_eagerly() {
        let run = Run::new(config("npft = [5, 9, 14]")).unwrap();
        assert_eq!(run.fractions.len(), 3);
        assert_eq!(run.soil.len(), 1);
        assert!(run.engine().contains("landcover_2015"));
        assert!(run.engine().contains("soil_clay_0_5cm"));
    }

    #[test]
    fn test_unknown_names_fail_before_compute() {
        let cases = [
            ("frac = [\"Hansen\"]", "methods.frac"),
            ("npft = [7]", "methods.npft"),
            ("soil_props = [\"Saxton\"]", "methods.soil_props"),
            ("land_fraction = \"MODIS\"", "methods.land_fraction"),
            ("fraction_policy = \"loose\"", "methods.fraction_policy"),
        ];
        for (line, expected) in cases {
            match Run::new(config(line)) {
                Err(Error::Configuration { key, .. }) => assert_eq!(key, expected),
                other => panic!("{}: unexpected {:?}", line, other.map(|_| ())),
            }
        }
    }
}
