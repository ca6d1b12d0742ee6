//! Per-category mean surface height
//!
//! The height of a category inside a target cell is the fraction-weighted
//! mean of the fine elevation: `Σ(frac·elev) / Σ(frac)`, both sums taken
//! with the area-weighted `sum` resampler. Where a category is absent the
//! denominator is 0; those cells are counted and fall back to the plain
//! mean elevation of the target cell.

use ancil_core::{Region, Result};
use tracing::debug;

use crate::engine::{Engine, ResampleMethod};

/// Catalog names of the surface heights and how many cells had no weight.
#[derive(Debug, Clone, Default)]
pub struct SurfaceOutcome {
    pub outputs: Vec<String>,
    pub zero_weight_cells: usize,
}

/// Compute one height raster per entry of `fractions` (native-grid
/// catalog names, paired with `categories`). Every name written starts
/// with `ns`.
pub fn surface_heights(
    engine: &mut Engine,
    native: &Region,
    target: &Region,
    elevation: &str,
    categories: &[String],
    fractions: &[String],
    ns: &str,
) -> Result<SurfaceOutcome> {
    let mean_elev = format!("{}elev_mean_tmp", ns);
    let native_elev = format!("{}elev_native_tmp", ns);
    engine.map_algebra(native, &native_elev, elevation, None)?;
    engine.resample(&native_elev, &mean_elev, target, ResampleMethod::Average)?;

    let mut outcome = SurfaceOutcome::default();
    for (category, frac) in categories.iter().zip(fractions) {
        debug!("surface height for {}", category);
        let weighted = format!("{}fe_{}_tmp", ns, category);
        let weighted_sum = format!("{}fe_sum_{}_tmp", ns, category);
        let weight_sum = format!("{}f_sum_{}_tmp", ns, category);
        let output = format!("{}surf_hgt_{}", ns, category);

        engine.map_algebra(native, &weighted, &format!("{} * {}", frac, native_elev), None)?;
        engine.resample(&weighted, &weighted_sum, target, ResampleMethod::Sum)?;
        engine.resample(frac, &weight_sum, target, ResampleMethod::Sum)?;
        engine.map_algebra(
            target,
            &output,
            &format!(
                "if({w} > 0, {fe} / {w}, {mean})",
                w = weight_sum,
                fe = weighted_sum,
                mean = mean_elev
            ),
            None,
        )?;

        let weights = engine.get(&weight_sum)?;
        let means = engine.get(&mean_elev)?;
        outcome.zero_weight_cells += weights
            .data()
            .iter()
            .zip(means.data().iter())
            .filter(|(w, m)| !m.is_nan() && (w.is_nan() || **w <= 0.0))
            .count();
        outcome.outputs.push(output);
    }
    Ok(outcome)
}
