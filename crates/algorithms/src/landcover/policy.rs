//! Sum-to-one checking and the fraction policies applied afterwards

use std::fmt;
use std::str::FromStr;

use ancil_core::{Error, InvariantPolicy, InvariantReport, Raster, Result};

/// What to do with category fractions once their sum has been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FractionPolicy {
    /// Report deviations, leave the fractions alone
    #[default]
    Strict,
    /// Divide every category by the per-cell sum
    Renormalize,
    /// Renormalize, then make cells that are mostly ice pure ice and fold
    /// the ice fraction of all other cells into bare soil
    IceRenormalize,
}

impl FromStr for FractionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" => Ok(Self::Strict),
            "renormalize" => Ok(Self::Renormalize),
            "ice_renormalize" => Ok(Self::IceRenormalize),
            _ => Err(Error::config(
                "methods.fraction_policy",
                s,
                "expected strict, renormalize or ice_renormalize",
            )),
        }
    }
}

impl fmt::Display for FractionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Strict => "strict",
            Self::Renormalize => "renormalize",
            Self::IceRenormalize => "ice_renormalize",
        };
        f.write_str(s)
    }
}

fn check_shapes(fractions: &[Raster<f64>]) -> Result<(usize, usize)> {
    let first = fractions
        .first()
        .ok_or_else(|| Error::Algorithm("no category fractions".into()))?;
    let shape = first.shape();
    for f in &fractions[1..] {
        if f.shape() != shape {
            return Err(Error::SizeMismatch {
                er: shape.0,
                ec: shape.1,
                ar: f.rows(),
                ac: f.cols(),
            });
        }
    }
    Ok(shape)
}

/// Sum over categories at one cell, nulls counted as 0; `None` when
/// every category is null there.
#[inline]
fn cell_sum(fractions: &[Raster<f64>], row: usize, col: usize) -> Option<f64> {
    let mut any = false;
    let mut sum = 0.0;
    for f in fractions {
        let v = unsafe { f.get_unchecked(row, col) };
        if !v.is_nan() {
            any = true;
            sum += v;
        }
    }
    any.then_some(sum)
}

/// Measure how far each cell's category sum is from 1.
pub fn check_sum_to_one(
    fractions: &[Raster<f64>],
    policy: &InvariantPolicy,
    subject: &str,
) -> Result<InvariantReport> {
    let (rows, cols) = check_shapes(fractions)?;
    let mut report = policy.report(subject);
    for row in 0..rows {
        for col in 0..cols {
            if let Some(sum) = cell_sum(fractions, row, col) {
                report.observe(sum - 1.0);
            }
        }
    }
    Ok(report)
}

/// Divide each cell by its category sum. Cells summing to 0 are left as they are.
pub fn renormalize(fractions: &mut [Raster<f64>]) -> Result<()> {
    let (rows, cols) = check_shapes(fractions)?;
    for row in 0..rows {
        for col in 0..cols {
            let Some(sum) = cell_sum(fractions, row, col) else {
                continue;
            };
            if sum <= 0.0 {
                continue;
            }
            for f in fractions.iter_mut() {
                let v = f.get(row, col)?;
                if !v.is_nan() {
                    f.set(row, col, v / sum)?;
                }
            }
        }
    }
    Ok(())
}

fn index_of(categories: &[String], name: &str) -> Result<usize> {
    categories.iter().position(|c| c == name).ok_or_else(|| {
        Error::config(
            "methods.fraction_policy",
            "ice_renormalize",
            format!("category set has no `{}`", name),
        )
    })
}

fn or_zero(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v
    }
}

/// Threshold above which a cell becomes pure ice
const ICE_THRESHOLD: f64 = 0.5;

/// Ice/soil reassignment. `heights`, when present, are the per-category
/// surface heights paired with `fractions` and are recomputed alongside.
pub fn ice_renormalize(
    categories: &[String],
    fractions: &mut [Raster<f64>],
    mut heights: Option<&mut [Raster<f64>]>,
) -> Result<()> {
    let soil = index_of(categories, "bare_soil")?;
    let ice = index_of(categories, "snow_ice")?;
    renormalize(fractions)?;
    let (rows, cols) = check_shapes(fractions)?;

    for row in 0..rows {
        for col in 0..cols {
            if cell_sum(fractions, row, col).is_none() {
                continue;
            }
            let ice_frac = or_zero(fractions[ice].get(row, col)?);
            let soil_frac = or_zero(fractions[soil].get(row, col)?);

            if let Some(h) = heights.as_deref_mut() {
                let (mut hf, mut f) = (0.0, 0.0);
                for (frac, hgt) in fractions.iter().zip(h.iter()) {
                    let (fv, hv) = (or_zero(frac.get(row, col)?), hgt.get(row, col)?);
                    if !hv.is_nan() {
                        hf += fv * hv;
                        f += fv;
                    }
                }
                let mean = if f > 0.0 { hf / f } else { f64::NAN };
                let soil_ice = soil_frac + ice_frac;
                let soil_ice_h = if soil_ice > 0.0 {
                    (soil_frac * or_zero(h[soil].get(row, col)?) + ice_frac * or_zero(h[ice].get(row, col)?))
                        / soil_ice
                } else {
                    0.0
                };
                if ice_frac > ICE_THRESHOLD {
                    for hgt in h.iter_mut() {
                        hgt.set(row, col, 0.0)?;
                    }
                    h[ice].set(row, col, mean)?;
                } else {
                    h[soil].set(row, col, soil_ice_h)?;
                }
            }

            if ice_frac > ICE_THRESHOLD {
                for f in fractions.iter_mut() {
                    f.set(row, col, 0.0)?;
                }
                fractions[ice].set(row, col, 1.0)?;
            } else {
                fractions[soil].set(row, col, soil_frac + ice_frac)?;
                fractions[ice].set(row, col, 0.0)?;
            }
        }
    }

    renormalize(fractions)
}
