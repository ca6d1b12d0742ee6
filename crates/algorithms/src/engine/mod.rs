//! Raster algebra engine
//!
//! An in-process engine over a catalog of named rasters. Every
//! operation takes the region it computes on as an explicit argument;
//! there is no ambient region to forget to switch.
//!
//! All calls run through [`Engine::invoke`], which applies one retry and
//! deadline policy: transient store failures are retried up to
//! `max_attempts`, syntax and reference failures abort at once, and a
//! call that outlives its deadline becomes [`Error::Timeout`] with its
//! output discarded.

mod catalog;
mod expression;
mod grow;
mod pipeline;
mod reclassify;
mod resample;

pub use catalog::Catalog;
pub use expression::Expression;
pub use grow::grow_distance;
pub use pipeline::{Bindings, Pipeline, Step};
pub use reclassify::reclassify_weights;
pub use resample::{resample, ResampleMethod};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::Array2;
use tracing::{debug, warn};

use ancil_core::config::EngineConfig;
use ancil_core::error::{EngineError, EngineErrorKind};
use ancil_core::{Error, Raster, Region, Result};

use crate::maybe_rayon::fill_rows;

/// Retry and deadline policy applied to every engine call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallPolicy {
    pub max_attempts: u32,
    /// Wall-clock limit per call, including retries
    pub deadline: Option<Duration>,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            deadline: Some(Duration::from_secs(600)),
        }
    }
}

impl From<&EngineConfig> for CallPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            deadline: Some(config.deadline()),
        }
    }
}

/// Identity of one engine call, attached to any error it raises.
#[derive(Debug, Clone, Default)]
pub struct CallSite {
    pub operation: &'static str,
    pub expression: String,
    pub inputs: Vec<String>,
    pub output: String,
}

impl CallSite {
    pub fn new(operation: &'static str, output: &str) -> Self {
        Self {
            operation,
            output: output.to_string(),
            ..Default::default()
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Name the call in an engine error. Raw I/O errors are transient.
    pub fn attach(&self, err: Error) -> Error {
        let err = match err {
            Error::Io(e) => Error::Engine(EngineError::new(EngineErrorKind::Transient, e.to_string())),
            other => other,
        };
        match err {
            Error::Engine(e) => Error::Engine(e.in_call(self.operation, &self.expression, &self.inputs, &self.output)),
            other => other,
        }
    }
}

/// Restricts a `map_algebra` call to cells where `raster == category`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub raster: String,
    pub category: f64,
}

impl Mask {
    pub fn new(raster: impl Into<String>, category: f64) -> Self {
        Self {
            raster: raster.into(),
            category,
        }
    }
}

/// Nearest-cell view of a raster from another grid.
struct Sampler {
    raster: Arc<Raster<f64>>,
    rows: Vec<Option<usize>>,
    cols: Vec<Option<usize>>,
}

impl Sampler {
    fn new(raster: Arc<Raster<f64>>, region: &Region) -> Self {
        let (rows, cols) = if raster.region().same_grid(region) {
            (
                (0..region.rows()).map(Some).collect(),
                (0..region.cols()).map(Some).collect(),
            )
        } else {
            let src = *raster.region();
            (
                (0..region.rows()).map(|r| src.row_of(region.y_center(r))).collect(),
                (0..region.cols()).map(|c| src.col_of(region.x_center(c))).collect(),
            )
        };
        Self { raster, rows, cols }
    }

    #[inline]
    fn value(&self, row: usize, col: usize) -> f64 {
        match (self.rows[row], self.cols[col]) {
            // SAFETY: indices come from the source region's own row_of/col_of
            (Some(r), Some(c)) => unsafe { self.raster.get_unchecked(r, c) },
            _ => f64::NAN,
        }
    }
}

/// The raster algebra engine.
#[derive(Debug)]
pub struct Engine {
    catalog: Catalog,
    policy: CallPolicy,
    overwrite: bool,
    calls: usize,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(CallPolicy::default())
    }
}

impl Engine {
    pub fn new(policy: CallPolicy) -> Self {
        Self {
            catalog: Catalog::new(),
            policy,
            overwrite: true,
            calls: 0,
        }
    }

    /// Whether outputs may replace existing catalog entries (default true)
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Number of successful engine calls so far
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn contains(&self, name: &str) -> bool {
        self.catalog.contains(name)
    }

    pub fn get(&mut self, name: &str) -> Result<Arc<Raster<f64>>> {
        self.catalog.get(name)
    }

    pub fn region_of(&mut self, name: &str) -> Result<Region> {
        self.catalog.region_of(name)
    }

    pub fn insert(&mut self, name: &str, raster: Raster<f64>) -> Result<()> {
        self.catalog.insert(name, raster, self.overwrite)
    }

    pub fn register_file(&mut self, name: &str, path: impl AsRef<std::path::Path>) {
        self.catalog.register_file(name, path);
    }

    /// Run one engine operation under the call policy and store its output.
    pub fn invoke<F>(&mut self, call: &CallSite, mut op: F) -> Result<()>
    where
        F: FnMut(&mut Catalog) -> Result<Raster<f64>>,
    {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let timeout = || Error::Timeout {
            operation: call.operation.to_string(),
            output: call.output.clone(),
            limit: self.policy.deadline.unwrap_or_default(),
        };
        let overdue = |started: Instant| {
            self.policy
                .deadline
                .is_some_and(|limit| started.elapsed() > limit)
        };

        let mut attempt = 1;
        loop {
            debug!(
                "{} -> {} (attempt {}/{})",
                call.operation, call.output, attempt, max_attempts
            );
            match op(&mut self.catalog) {
                Ok(raster) => {
                    if overdue(started) {
                        return Err(timeout());
                    }
                    self.catalog.insert(&call.output, raster, self.overwrite)?;
                    self.calls += 1;
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    if overdue(started) {
                        return Err(timeout());
                    }
                    warn!(
                        "{} -> {} failed on attempt {}, retrying: {}",
                        call.operation, call.output, attempt, e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(call.attach(e)),
            }
        }
    }

    /// Evaluate `expression` at every cell of `region` and store it as
    /// `output`. Inputs on other grids are sampled at the cell centre.
    pub fn map_algebra(&mut self, region: &Region, output: &str, expression: &str, mask: Option<&Mask>) -> Result<()> {
        let call = CallSite::new("map_algebra", output).with_expression(expression);
        let expr = Expression::parse(expression).map_err(|e| call.attach(e.into()))?;
        let mut inputs: Vec<String> = expr.names().to_vec();
        if let Some(m) = mask {
            inputs.push(m.raster.clone());
        }
        let call = call.with_inputs(inputs);

        self.invoke(&call, |catalog| {
            let samplers = expr
                .names()
                .iter()
                .map(|name| catalog.get(name).map(|r| Sampler::new(r, region)))
                .collect::<Result<Vec<_>>>()?;
            let mask = match mask {
                Some(m) => Some((Sampler::new(catalog.get(&m.raster)?, region), m.category)),
                None => None,
            };
            evaluate(&expr, &samplers, mask.as_ref(), region)
        })
    }

    /// Map class codes of `input` to weights, on `region`.
    pub fn reclassify_weights(
        &mut self,
        region: &Region,
        input: &str,
        output: &str,
        table: &BTreeMap<i64, f64>,
    ) -> Result<()> {
        let rule = table
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        let call = CallSite::new("reclassify", output)
            .with_expression(rule)
            .with_inputs([input]);
        self.invoke(&call, |catalog| {
            let src = sample_to(catalog.get(input)?, region)?;
            reclassify_weights(&src, table)
        })
    }

    /// Aggregate `input` onto `target` with area weighting.
    pub fn resample(&mut self, input: &str, output: &str, target: &Region, method: ResampleMethod) -> Result<()> {
        let call = CallSite::new("resample", output)
            .with_expression(format!("method={}", method))
            .with_inputs([input]);
        self.invoke(&call, |catalog| resample(&*catalog.get(input)?, target, method))
    }

    /// Fill null cells of `input` with the nearest non-null value.
    pub fn grow_distance(&mut self, input: &str, output: &str) -> Result<()> {
        let call = CallSite::new("grow_distance", output).with_inputs([input]);
        self.invoke(&call, |catalog| grow_distance(&*catalog.get(input)?))
    }

    /// Drop temporaries whose name ends with `suffix`.
    pub fn remove_matching(&mut self, suffix: &str) -> usize {
        let n = self.catalog.remove_matching(suffix);
        if n > 0 {
            debug!("removed {} temporaries matching *{}", n, suffix);
        }
        n
    }
}

/// Nearest-cell resample of a raster onto `region`; no copy when the grids match.
fn sample_to(raster: Arc<Raster<f64>>, region: &Region) -> Result<Arc<Raster<f64>>> {
    if raster.region().same_grid(region) {
        return Ok(raster);
    }
    let sampler = Sampler::new(raster, region);
    let (rows, cols) = region.shape();
    let data = Array2::from_shape_fn((rows, cols), |(r, c)| sampler.value(r, c));
    Ok(Arc::new(Raster::from_array(*region, data)?))
}

fn evaluate(
    expr: &Expression,
    samplers: &[Sampler],
    mask: Option<&(Sampler, f64)>,
    region: &Region,
) -> Result<Raster<f64>> {
    let (rows, cols) = region.shape();

    let output_data = fill_rows(rows, cols, |row, row_data| {
        let mut values = vec![f64::NAN; samplers.len()];
        for (col, out) in row_data.iter_mut().enumerate() {
            if let Some((m, category)) = mask {
                if m.value(row, col) != *category {
                    continue;
                }
            }
            for (slot, s) in values.iter_mut().zip(samplers) {
                *slot = s.value(row, col);
            }
            *out = expr.eval(&values);
        }
    });

    let data = Array2::from_shape_vec((rows, cols), output_data).map_err(|e| Error::Other(e.to_string()))?;
    Raster::from_array(*region, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ancil_core::Extent;
    use approx::assert_relative_eq;

    fn region(res: f64) -> Region {
        Region::with_resolution(Extent::new(0.0, 0.0, 1.0, 1.0).unwrap(), res).unwrap()
    }

    fn engine_with(name: &str, raster: Raster<f64>) -> Engine {
        let mut engine = Engine::default();
        engine.insert(name, raster).unwrap();
        engine
    }

    #[test]
    fn test_map_algebra_on_explicit_region() {
        let mut engine = engine_with("a", Raster::from_vec(region(0.5), vec![1.0, 2.0, 3.0, 4.0]).unwrap());
        engine.map_algebra(&region(0.5), "b", "a * 2 + 1", None).unwrap();
        let b = engine.get("b").unwrap();
        assert_eq!(b.get(1, 1).unwrap(), 9.0);

        // finer region samples the nearest source cell
        engine.map_algebra(&region(0.25), "c", "a", None).unwrap();
        let c = engine.get("c").unwrap();
        assert_eq!(c.shape(), (4, 4));
        assert_eq!(c.get(3, 3).unwrap(), 4.0);
        assert_eq!(c.get(0, 1).unwrap(), 1.0);
    }

    #[test]
    fn test_mask_restricts_cells() {
        let mut engine = engine_with("a", Raster::filled(region(0.5), 5.0));
        engine
            .insert("land", Raster::from_vec(region(0.5), vec![1.0, 0.0, f64::NAN, 1.0]).unwrap())
            .unwrap();
        engine
            .map_algebra(&region(0.5), "b", "a", Some(&Mask::new("land", 1.0)))
            .unwrap();
        let b = engine.get("b").unwrap();
        assert_eq!(b.get(0, 0).unwrap(), 5.0);
        assert!(b.get(0, 1).unwrap().is_nan());
        assert!(b.get(1, 0).unwrap().is_nan());
    }

    #[test]
    fn test_errors_name_the_call() {
        let mut engine = engine_with("a", Raster::filled(region(0.5), 1.0));
        let err = engine.map_algebra(&region(0.5), "out", "a + missing", None).unwrap_err();
        match err {
            Error::Engine(e) => {
                assert_eq!(e.kind, EngineErrorKind::MissingReference);
                assert_eq!(e.operation, "map_algebra");
                assert_eq!(e.output, "out");
                assert_eq!(e.expression, "a + missing");
                assert!(e.inputs.contains(&"missing".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
        let err = engine.map_algebra(&region(0.5), "out", "a +", None).unwrap_err();
        assert!(matches!(err, Error::Engine(ref e) if e.kind == EngineErrorKind::Syntax));
        assert!(!engine.contains("out"));
    }

    #[test]
    fn test_transient_failures_retried() {
        let mut engine = Engine::new(CallPolicy {
            max_attempts: 3,
            deadline: None,
        });
        let mut failures = 2;
        let call = CallSite::new("test", "out");
        engine
            .invoke(&call, |_| {
                if failures > 0 {
                    failures -= 1;
                    return Err(EngineError::new(EngineErrorKind::Transient, "flaky").into());
                }
                Ok(Raster::filled(region(1.0), 1.0))
            })
            .unwrap();
        assert!(engine.contains("out"));

        let mut attempts = 0;
        let err = engine
            .invoke(&CallSite::new("test", "never"), |_| {
                attempts += 1;
                Err(EngineError::new(EngineErrorKind::Transient, "down").into())
            })
            .unwrap_err();
        assert_eq!(attempts, 3);
        assert!(err.is_retryable());
        assert!(!engine.contains("never"));
    }

    #[test]
    fn test_non_retryable_aborts_immediately() {
        let mut engine = Engine::default();
        let mut attempts = 0;
        let _ = engine.invoke(&CallSite::new("test", "out"), |_| {
            attempts += 1;
            Err(EngineError::new(EngineErrorKind::Syntax, "bad").into())
        });
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_deadline_discards_output() {
        let mut engine = Engine::new(CallPolicy {
            max_attempts: 1,
            deadline: Some(Duration::from_millis(1)),
        });
        let err = engine
            .invoke(&CallSite::new("slow", "late"), |_| {
                std::thread::sleep(Duration::from_millis(20));
                Ok(Raster::filled(region(1.0), 1.0))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { ref output, .. } if output == "late"));
        assert!(!engine.contains("late"));
    }

    #[test]
    fn test_resample_and_grow_through_engine() {
        let n = f64::NAN;
        let mut engine = engine_with("a", Raster::from_vec(region(0.5), vec![1.0, n, n, 3.0]).unwrap());
        engine.grow_distance("a", "a_filled").unwrap();
        assert!(engine.get("a_filled").unwrap().data().iter().all(|v| !v.is_nan()));

        engine.resample("a", "a_avg", &region(1.0), ResampleMethod::Average).unwrap();
        assert_relative_eq!(engine.get("a_avg").unwrap().get(0, 0).unwrap(), 2.0);
    }

    #[test]
    fn test_reclassify_on_region() {
        let mut engine = engine_with("lc", Raster::from_vec(region(0.5), vec![10.0, 170.0, 210.0, 10.0]).unwrap());
        let table = BTreeMap::from([(170, 0.6)]);
        engine.reclassify_weights(&region(0.5), "lc", "w", &table).unwrap();
        let w = engine.get("w").unwrap();
        assert_eq!(w.get(0, 1).unwrap(), 0.6);
        assert_eq!(w.get(0, 0).unwrap(), 0.0);
    }
}
