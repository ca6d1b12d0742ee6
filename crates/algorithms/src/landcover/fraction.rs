//! Land-cover fraction computation
//!
//! For one year: reclassify the class raster into one weight raster per
//! crosswalk category on its native grid, build the output categories
//! with the scheme's pipeline, aggregate them to the target grid, check
//! that they sum to one and apply the fraction policy.

use ancil_core::io::GriddedDataset;
use ancil_core::{Error, InvariantPolicy, InvariantReport, Raster, Region, Result};
use tracing::{info, warn};

use super::crosswalk::CrosswalkTable;
use super::policy::{check_sum_to_one, ice_renormalize, renormalize, FractionPolicy};
use super::scheme::CategoryScheme;
use super::surface::surface_heights;
use crate::engine::{Bindings, Engine, ResampleMethod};
use crate::region_context::RegionContext;

/// Catalog names of the rasters a fraction run reads.
#[derive(Debug, Clone, Default)]
pub struct FractionInputs {
    pub landcover: String,
    pub c4_natural: Option<String>,
    pub c4_crop: Option<String>,
    /// Ecoregion biome codes; 0 is treated as no data
    pub ecoregions: Option<String>,
    pub elevation: Option<String>,
}

impl FractionInputs {
    pub fn new(landcover: impl Into<String>) -> Self {
        Self {
            landcover: landcover.into(),
            ..Default::default()
        }
    }
}

/// Fractions of one (method, scheme, year) on the target grid.
#[derive(Debug, Clone)]
pub struct FractionSet {
    pub name: String,
    pub year: i32,
    pub categories: Vec<String>,
    pub fractions: Vec<Raster<f64>>,
    /// Mean surface height per category, when an elevation was given
    pub surface: Option<Vec<Raster<f64>>>,
    /// Sum-to-one check taken before the fraction policy was applied
    pub report: InvariantReport,
}

impl FractionSet {
    pub fn region(&self) -> Option<&Region> {
        self.fractions.first().map(|r| r.region())
    }

    pub fn fraction(&self, category: &str) -> Option<&Raster<f64>> {
        self.categories
            .iter()
            .position(|c| c == category)
            .map(|i| &self.fractions[i])
    }

    /// Group name of the surface height dataset
    pub fn surface_name(&self) -> String {
        self.name.replacen("frac", "surf_hgt", 1)
    }

    pub fn to_dataset(&self) -> Result<GriddedDataset> {
        let region = self
            .region()
            .ok_or_else(|| Error::Algorithm(format!("{} has no categories", self.name)))?;
        let mut ds = GriddedDataset::new(&self.name, region, "type", self.categories.clone())
            .attribute("year", self.year.to_string());
        let layers: Vec<&Raster<f64>> = self.fractions.iter().collect();
        ds.add_variable("frac", "1", "Land-cover type fraction", None, &layers)?;
        Ok(ds)
    }

    pub fn surface_dataset(&self) -> Result<Option<GriddedDataset>> {
        let (Some(surface), Some(region)) = (&self.surface, self.region()) else {
            return Ok(None);
        };
        let mut ds = GriddedDataset::new(self.surface_name(), region, "type", self.categories.clone())
            .attribute("year", self.year.to_string());
        let layers: Vec<&Raster<f64>> = surface.iter().collect();
        ds.add_variable("surf_hgt", "m", "Mean surface height per land-cover type", Some("height"), &layers)?;
        Ok(Some(ds))
    }
}

#[derive(Debug, Clone)]
pub struct LandCoverFractionEngine {
    crosswalk: CrosswalkTable,
    scheme: CategoryScheme,
    policy: FractionPolicy,
    invariants: InvariantPolicy,
}

impl LandCoverFractionEngine {
    pub fn new(
        crosswalk: CrosswalkTable,
        scheme: CategoryScheme,
        policy: FractionPolicy,
        invariants: InvariantPolicy,
    ) -> Self {
        Self {
            crosswalk,
            scheme,
            policy,
            invariants,
        }
    }

    /// Resolve a method name and `npft` variant.
    pub fn from_names(method: &str, npft: usize, policy: FractionPolicy, invariants: InvariantPolicy) -> Result<Self> {
        let crosswalk = CrosswalkTable::by_name(method)?;
        let scheme = CategoryScheme::from_npft(npft, &crosswalk)?;
        Ok(Self::new(crosswalk, scheme, policy, invariants))
    }

    pub fn crosswalk(&self) -> &CrosswalkTable {
        &self.crosswalk
    }

    pub fn scheme(&self) -> CategoryScheme {
        self.scheme
    }

    /// `frac_<method>_<n>pft_<year>`
    pub fn name(&self, year: i32) -> String {
        format!(
            "frac_{}_{}pft_{}",
            self.crosswalk.name().to_ascii_lowercase(),
            self.scheme.npft(&self.crosswalk),
            year
        )
    }

    pub fn compute(
        &self,
        engine: &mut Engine,
        ctx: &RegionContext,
        inputs: &FractionInputs,
        year: i32,
    ) -> Result<FractionSet> {
        let name = self.name(year);
        let ns = format!("{}_", name);
        info!("Computing {}", name);

        let native = ctx.native(engine, &inputs.landcover)?;
        let target = ctx.target();

        let completeness = self.check_completeness(engine, &native, &inputs.landcover, &ns, &name)?;

        let mut bindings = Bindings::new(format!("{}native_", ns));
        for category in self.crosswalk.categories() {
            let weights = self
                .crosswalk
                .weights(category)
                .ok_or_else(|| Error::Algorithm(format!("crosswalk lost category {}", category)))?;
            let output = format!("{}w_{}_tmp", ns, category);
            engine.reclassify_weights(&native, &inputs.landcover, &output, weights)?;
            bindings.bind(category, output);
        }

        if self.scheme.needs_c4() {
            bindings
                .bind("c4_natural", required(&inputs.c4_natural, "inputs.c4_natural", &name)?)
                .bind("c4_crop", required(&inputs.c4_crop, "inputs.c4_crop", &name)?);
        }
        if self.scheme.needs_biome() {
            let ecoregions = required(&inputs.ecoregions, "inputs.ecoregions", &name)?;
            let tropical = prepare_tropical(engine, &native, ecoregions, &ns)?;
            bindings.bind("tropical", tropical);
        }

        let native_outputs = self.scheme.pipeline(&self.crosswalk).run(engine, &native, &mut bindings, None)?;
        let categories = self.scheme.categories(&self.crosswalk);

        let mut fractions = Vec::with_capacity(categories.len());
        for (category, native_name) in categories.iter().zip(&native_outputs) {
            info!("Resampling {} to target grid", category);
            let output = format!("{}{}", ns, category);
            ctx.resample_to_target(engine, native_name, &output, ResampleMethod::Average)?;
            fractions.push(engine.get(&output)?.as_ref().clone());
        }

        let mut zero_weight_cells = 0;
        let mut surface = match &inputs.elevation {
            Some(elevation) => {
                let outcome = surface_heights(engine, &native, &target, elevation, &categories, &native_outputs, &ns)?;
                zero_weight_cells = outcome.zero_weight_cells;
                let mut heights = Vec::with_capacity(outcome.outputs.len());
                for output in &outcome.outputs {
                    heights.push(engine.get(output)?.as_ref().clone());
                }
                Some(heights)
            }
            None => None,
        };

        let mut report = check_sum_to_one(&fractions, &self.invariants, &name)?;
        report.zero_weight_cells = zero_weight_cells;
        report.notes.extend(completeness.notes);
        if report.zero_weight_cells > 0 {
            warn!(
                "{}: {} cells had no weight for a category; used the cell mean elevation",
                name, report.zero_weight_cells
            );
        }

        let after = match self.policy {
            FractionPolicy::Strict => report.clone(),
            FractionPolicy::Renormalize => {
                renormalize(&mut fractions)?;
                check_sum_to_one(&fractions, &self.invariants, &name)?
            }
            FractionPolicy::IceRenormalize => {
                ice_renormalize(&categories, &mut fractions, surface.as_deref_mut())?;
                check_sum_to_one(&fractions, &self.invariants, &name)?
            }
        };
        if after.violating_cells > 0 {
            if self.invariants.hard_fail {
                engine.remove_matching("_tmp");
                return Err(Error::InvariantViolation(after));
            }
            warn!("{} (policy {})", after, self.policy);
        }

        engine.remove_matching("_tmp");
        Ok(FractionSet {
            name,
            year,
            categories,
            fractions,
            surface,
            report,
        })
    }

    /// Every class code on the native grid must be claimed by some
    /// category; unclaimed codes would silently count as zero.
    fn check_completeness(
        &self,
        engine: &mut Engine,
        native: &Region,
        landcover: &str,
        ns: &str,
        subject: &str,
    ) -> Result<InvariantReport> {
        let clipped = format!("{}classes_tmp", ns);
        engine.map_algebra(native, &clipped, landcover, None)?;
        let codes = self.crosswalk.unmapped_codes(&*engine.get(&clipped)?);

        let mut report = self.invariants.report(subject);
        if !codes.is_empty() {
            let list: Vec<String> = codes.iter().map(i64::to_string).collect();
            report.note(format!(
                "class codes {} are not in the {} crosswalk",
                list.join(", "),
                self.crosswalk.name()
            ));
            if self.invariants.hard_fail {
                engine.remove_matching("_tmp");
                return Err(Error::InvariantViolation(report));
            }
            warn!("{}", report);
        }
        Ok(report)
    }
}

fn required<'a>(input: &'a Option<String>, key: &str, subject: &str) -> Result<&'a str> {
    input
        .as_deref()
        .ok_or_else(|| Error::config(key, "", format!("required by {}", subject)))
}

/// Tropical membership from ecoregion biomes: biome 0 is no data and
/// is filled from the nearest biome before testing for biomes 1 and 2.
fn prepare_tropical(engine: &mut Engine, native: &Region, ecoregions: &str, ns: &str) -> Result<String> {
    let biome = format!("{}biome_tmp", ns);
    let filled = format!("{}biome_filled_tmp", ns);
    let tropical = format!("{}tropical_tmp", ns);
    engine.map_algebra(native, &biome, &format!("if({e} == 0, null(), {e})", e = ecoregions), None)?;
    engine.grow_distance(&biome, &filled)?;
    engine.map_algebra(native, &tropical, &format!("if({b} == 1 || {b} == 2, 1, 0)", b = filled), None)?;
    Ok(tropical)
}
