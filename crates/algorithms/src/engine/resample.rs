//! Area-weighted resampling between grids
//!
//! Each target cell collects every source cell it overlaps, weighted by
//! the fraction of the source cell's area that falls inside it. Null
//! source cells are ignored; a target cell with no valid contributor is
//! null.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;

use ancil_core::{Error, Raster, Region, Result};

use crate::maybe_rayon::fill_rows;

/// Overlaps smaller than this fraction of a source cell are dropped.
const MIN_OVERLAP: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleMethod {
    /// Σ w·v / Σ w
    Average,
    /// Σ w·v
    Sum,
    /// Smallest overlapping value
    Minimum,
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResampleMethod::Average => "average",
            ResampleMethod::Sum => "sum",
            ResampleMethod::Minimum => "minimum",
        })
    }
}

impl FromStr for ResampleMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "average" => Ok(ResampleMethod::Average),
            "sum" => Ok(ResampleMethod::Sum),
            "minimum" | "min" => Ok(ResampleMethod::Minimum),
            _ => Err(Error::config("method", s, "expected average, sum or minimum")),
        }
    }
}

/// Source cells overlapping each target cell along one axis, as
/// (source index, fraction of the source cell covered).
///
/// Coordinates increase with the index on both grids; the y axis is
/// passed negated so rows run north to south.
fn axis_overlaps(
    src_start: f64,
    src_res: f64,
    src_n: usize,
    tgt_start: f64,
    tgt_res: f64,
    tgt_n: usize,
) -> Vec<Vec<(usize, f64)>> {
    (0..tgt_n)
        .map(|t| {
            let lo = tgt_start + t as f64 * tgt_res;
            let hi = lo + tgt_res;
            let first = ((lo - src_start) / src_res).floor().max(0.0) as usize;
            let last = (((hi - src_start) / src_res).ceil().max(0.0) as usize).min(src_n);
            (first..last)
                .filter_map(|s| {
                    let s_lo = src_start + s as f64 * src_res;
                    let overlap = hi.min(s_lo + src_res) - lo.max(s_lo);
                    let w = overlap / src_res;
                    (w > MIN_OVERLAP).then_some((s, w.min(1.0)))
                })
                .collect()
        })
        .collect()
}

/// Resample `src` onto `target`.
pub fn resample(src: &Raster<f64>, target: &Region, method: ResampleMethod) -> Result<Raster<f64>> {
    let sr = src.region();
    let (rows, cols) = target.shape();

    let x_overlaps = axis_overlaps(sr.west(), sr.res_x(), sr.cols(), target.west(), target.res_x(), cols);
    let y_overlaps = axis_overlaps(-sr.north(), sr.res_y(), sr.rows(), -target.north(), target.res_y(), rows);

    let output_data = fill_rows(rows, cols, |row, row_data| {
        let ys = &y_overlaps[row];
        for (col, out) in row_data.iter_mut().enumerate() {
            let mut weighted = 0.0;
            let mut total_w = 0.0;
            let mut minimum = f64::INFINITY;
            let mut any = false;

            for &(sy, wy) in ys {
                for &(sx, wx) in &x_overlaps[col] {
                    // SAFETY: overlap indices are clamped to the source shape
                    let v = unsafe { src.get_unchecked(sy, sx) };
                    if v.is_nan() {
                        continue;
                    }
                    let w = wy * wx;
                    any = true;
                    weighted += w * v;
                    total_w += w;
                    if v < minimum {
                        minimum = v;
                    }
                }
            }

            if !any {
                continue;
            }
            *out = match method {
                ResampleMethod::Average => weighted / total_w,
                ResampleMethod::Sum => weighted,
                ResampleMethod::Minimum => minimum,
            };
        }
    });

    let data = Array2::from_shape_vec((rows, cols), output_data).map_err(|e| Error::Other(e.to_string()))?;
    Raster::from_array(*target, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ancil_core::Extent;
    use approx::assert_relative_eq;

    fn grid(res: f64) -> Region {
        Region::with_resolution(Extent::new(0.0, 0.0, 1.0, 1.0).unwrap(), res).unwrap()
    }

    #[test]
    fn test_constant_average_is_idempotent() {
        let src = Raster::filled(grid(0.1), 0.37);
        for res in [0.5, 0.25, 1.0 / 3.0, 1.0] {
            let out = resample(&src, &grid(res), ResampleMethod::Average).unwrap();
            for &v in out.data().iter() {
                assert_relative_eq!(v, 0.37, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_sum_and_minimum() {
        let src = Raster::from_vec(grid(0.5), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let sum = resample(&src, &grid(1.0), ResampleMethod::Sum).unwrap();
        assert_relative_eq!(sum.get(0, 0).unwrap(), 10.0);
        let min = resample(&src, &grid(1.0), ResampleMethod::Minimum).unwrap();
        assert_eq!(min.get(0, 0).unwrap(), 1.0);
        let avg = resample(&src, &grid(1.0), ResampleMethod::Average).unwrap();
        assert_relative_eq!(avg.get(0, 0).unwrap(), 2.5);
    }

    #[test]
    fn test_partial_overlap_weights() {
        // 3 source columns of width 1/3 into 2 target columns of width 1/2:
        // target 0 gets all of s0 and half of s1
        let region = Region::from_origin(0.0, 1.0, 1.0 / 3.0, 1.0, 1, 3).unwrap();
        let src = Raster::from_vec(region, vec![0.0, 1.0, 1.0]).unwrap();
        let target = Region::from_origin(0.0, 1.0, 0.5, 1.0, 1, 2).unwrap();
        let out = resample(&src, &target, ResampleMethod::Average).unwrap();
        assert_relative_eq!(out.get(0, 0).unwrap(), 0.5 / 1.5, epsilon = 1e-12);
        assert_relative_eq!(out.get(0, 1).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_nulls_ignored_and_empty_cells_null() {
        let src = Raster::from_vec(grid(0.5), vec![f64::NAN, 2.0, f64::NAN, f64::NAN]).unwrap();
        let out = resample(&src, &grid(1.0), ResampleMethod::Average).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 2.0);

        let all_null = Raster::filled(grid(0.5), f64::NAN);
        let out = resample(&all_null, &grid(1.0), ResampleMethod::Sum).unwrap();
        assert!(out.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn test_target_outside_source_is_null() {
        let src = Raster::filled(grid(0.5), 1.0);
        let target = Region::with_resolution(Extent::new(2.0, 0.0, 3.0, 1.0).unwrap(), 0.5).unwrap();
        let out = resample(&src, &target, ResampleMethod::Average).unwrap();
        assert!(out.data().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("Average".parse::<ResampleMethod>().unwrap(), ResampleMethod::Average);
        assert!("median".parse::<ResampleMethod>().is_err());
    }
}
