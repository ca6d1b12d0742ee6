//! Row-wise fill of raster buffers.
//!
//! With the `parallel` feature rows are filled on the rayon pool,
//! otherwise one after another. Callers see the same function either way.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Build a row-major `rows x cols` buffer. Every cell starts as NaN and
/// `fill(row, out)` writes the cells of one row.
pub(crate) fn fill_rows<F>(rows: usize, cols: usize, fill: F) -> Vec<f64>
where
    F: Fn(usize, &mut [f64]) + Send + Sync,
{
    let mut data = vec![f64::NAN; rows * cols];
    if cols == 0 {
        return data;
    }

    #[cfg(feature = "parallel")]
    data.par_chunks_mut(cols)
        .enumerate()
        .for_each(|(row, out)| fill(row, out));

    #[cfg(not(feature = "parallel"))]
    data.chunks_mut(cols)
        .enumerate()
        .for_each(|(row, out)| fill(row, out));

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_in_order() {
        let data = fill_rows(3, 2, |row, out| {
            out[0] = row as f64;
        });
        assert_eq!(data.len(), 6);
        assert_eq!(data[0], 0.0);
        assert_eq!(data[4], 2.0);
        assert!(data[5].is_nan());
    }

    #[test]
    fn test_zero_columns() {
        assert!(fill_rows(4, 0, |_, _| {}).is_empty());
    }
}
