//! Weighted reclassification of class rasters
//!
//! Maps each integer class code to a floating-point weight through a
//! dense lookup array indexed by code. Unmapped codes get weight 0,
//! null stays null.

use std::collections::BTreeMap;

use ndarray::Array2;

use ancil_core::{Error, Raster, Result};

use crate::maybe_rayon::fill_rows;

/// Largest code span served by the dense array; wider tables use the map.
const MAX_DENSE_SPAN: i64 = 1 << 20;

enum Lookup<'a> {
    Dense { offset: i64, weights: Vec<f64> },
    Sparse(&'a BTreeMap<i64, f64>),
}

impl<'a> Lookup<'a> {
    fn build(table: &'a BTreeMap<i64, f64>) -> Self {
        let (Some((&lo, _)), Some((&hi, _))) = (table.first_key_value(), table.last_key_value()) else {
            return Lookup::Dense {
                offset: 0,
                weights: Vec::new(),
            };
        };
        let span = match hi.checked_sub(lo) {
            Some(span) if span < MAX_DENSE_SPAN => span,
            _ => return Lookup::Sparse(table),
        };
        let mut weights = vec![0.0; span as usize + 1];
        for (&code, &w) in table {
            weights[(code - lo) as usize] = w;
        }
        Lookup::Dense { offset: lo, weights }
    }

    #[inline]
    fn weight(&self, code: i64) -> f64 {
        match self {
            Lookup::Dense { offset, weights } => match code.checked_sub(*offset) {
                Some(i) if i >= 0 => weights.get(i as usize).copied().unwrap_or(0.0),
                _ => 0.0,
            },
            Lookup::Sparse(map) => map.get(&code).copied().unwrap_or(0.0),
        }
    }
}

/// Reclassify class codes (rounded to the nearest integer) into weights.
pub fn reclassify_weights(raster: &Raster<f64>, table: &BTreeMap<i64, f64>) -> Result<Raster<f64>> {
    let (rows, cols) = raster.shape();
    let lookup = Lookup::build(table);

    let data = fill_rows(rows, cols, |row, row_data| {
        for (col, out) in row_data.iter_mut().enumerate() {
            let val = unsafe { raster.get_unchecked(row, col) };
            if !val.is_nan() {
                *out = lookup.weight(val.round() as i64);
            }
        }
    });

    let data = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Raster::from_array(*raster.region(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ancil_core::Region;

    fn classes(values: Vec<f64>) -> Raster<f64> {
        let n = values.len();
        let region = Region::from_origin(0.0, 1.0, 1.0, 1.0, 1, n).unwrap();
        Raster::from_vec(region, values).unwrap()
    }

    #[test]
    fn test_weights_and_defaults() {
        let table = BTreeMap::from([(10, 1.0), (170, 0.6), (210, 0.25)]);
        let r = classes(vec![10.0, 170.0, 210.0, 50.0, f64::NAN, 300.0]);
        let out = reclassify_weights(&r, &table).unwrap();
        let v: Vec<f64> = out.data().iter().copied().collect();
        assert_eq!(&v[..4], &[1.0, 0.6, 0.25, 0.0]);
        assert!(v[4].is_nan());
        assert_eq!(v[5], 0.0);
    }

    #[test]
    fn test_no_integer_scaling_loss() {
        let table = BTreeMap::from([(1, 1.0 / 3.0)]);
        let out = reclassify_weights(&classes(vec![1.0]), &table).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 1.0 / 3.0);
    }

    #[test]
    fn test_sparse_table() {
        let table = BTreeMap::from([(0, 0.5), (5_000_000, 0.7)]);
        let out = reclassify_weights(&classes(vec![5_000_000.0, 0.0, 3.0]), &table).unwrap();
        let v: Vec<f64> = out.data().iter().copied().collect();
        assert_eq!(v, vec![0.7, 0.5, 0.0]);
    }

    #[test]
    fn test_extreme_codes() {
        let table = BTreeMap::from([(i64::MIN, 0.1), (i64::MAX, 0.9)]);
        let out = reclassify_weights(&classes(vec![1e300, -1e300, 0.0]), &table).unwrap();
        let v: Vec<f64> = out.data().iter().copied().collect();
        assert_eq!(v, vec![0.9, 0.1, 0.0]);

        // dense table, codes far below its offset
        let table = BTreeMap::from([(i64::MAX - 1, 0.4), (i64::MAX, 0.6)]);
        let out = reclassify_weights(&classes(vec![-1e300, 0.0]), &table).unwrap();
        assert!(out.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_empty_table_is_all_zero() {
        let out = reclassify_weights(&classes(vec![1.0, 2.0]), &BTreeMap::new()).unwrap();
        assert!(out.data().iter().all(|&v| v == 0.0));
    }
}
