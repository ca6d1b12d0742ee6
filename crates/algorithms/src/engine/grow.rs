//! Nearest-feature growth
//!
//! Fills every null cell with the value of its nearest non-null cell.
//! Distances are accumulated over 8-connected steps (1 for cardinal,
//! √2 for diagonal moves) with a multi-source Dijkstra search.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::Array2;

use ancil_core::{Error, Raster, Result};

#[derive(Debug, Clone, PartialEq)]
struct State {
    dist: f64,
    row: usize,
    col: usize,
}

impl Eq for State {}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap
        other.dist.partial_cmp(&self.dist).unwrap_or(Ordering::Equal)
    }
}

const NEIGHBORS: [(isize, isize, f64); 8] = [
    (-1, -1, std::f64::consts::SQRT_2),
    (-1, 0, 1.0),
    (-1, 1, std::f64::consts::SQRT_2),
    (0, -1, 1.0),
    (0, 1, 1.0),
    (1, -1, std::f64::consts::SQRT_2),
    (1, 0, 1.0),
    (1, 1, std::f64::consts::SQRT_2),
];

/// Grow non-null values into null cells. A raster with no non-null cell
/// is returned unchanged.
pub fn grow_distance(input: &Raster<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = input.shape();
    let mut dist = vec![f64::INFINITY; rows * cols];
    let mut value = vec![f64::NAN; rows * cols];
    let mut heap = BinaryHeap::new();

    for r in 0..rows {
        for c in 0..cols {
            let v = unsafe { input.get_unchecked(r, c) };
            if !v.is_nan() {
                let i = r * cols + c;
                dist[i] = 0.0;
                value[i] = v;
                heap.push(State { dist: 0.0, row: r, col: c });
            }
        }
    }

    while let Some(State { dist: d, row, col }) = heap.pop() {
        let here = row * cols + col;
        if d > dist[here] {
            continue;
        }
        let carried = value[here];

        for &(dr, dc, step) in &NEIGHBORS {
            let nr = row as isize + dr;
            let nc = col as isize + dc;
            if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
                continue;
            }
            let n = nr as usize * cols + nc as usize;
            let nd = d + step;
            if nd < dist[n] {
                dist[n] = nd;
                value[n] = carried;
                heap.push(State {
                    dist: nd,
                    row: nr as usize,
                    col: nc as usize,
                });
            }
        }
    }

    let data = Array2::from_shape_vec((rows, cols), value).map_err(|e| Error::Other(e.to_string()))?;
    Raster::from_array(*input.region(), data)
}
