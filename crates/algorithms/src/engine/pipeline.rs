//! Table-driven map-algebra pipelines
//!
//! A pipeline is an ordered list of steps, each an output name and an
//! expression template. Templates refer to logical names in braces:
//!
//! ```text
//! c4_grass = {natural_grass} * {c4_nat} + {managed_grass} * {c4_crop}
//! ```
//!
//! Logical names are bound to catalog names before a run; each step's
//! output is written under the run's namespace and bound for the steps
//! that follow.

use std::collections::BTreeMap;

use ancil_core::error::{EngineError, EngineErrorKind};
use ancil_core::{Region, Result};

use super::{Engine, Mask};

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub output: String,
    pub template: String,
}

impl Step {
    pub fn new(output: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            template: template.into(),
        }
    }
}

/// Logical name -> catalog name, plus the namespace outputs are written to.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    namespace: String,
    names: BTreeMap<String, String>,
}

impl Bindings {
    /// `namespace` prefixes every output name so concurrent units of work
    /// never share catalog entries.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            names: BTreeMap::new(),
        }
    }

    pub fn bind(&mut self, logical: impl Into<String>, catalog_name: impl Into<String>) -> &mut Self {
        self.names.insert(logical.into(), catalog_name.into());
        self
    }

    pub fn resolve(&self, logical: &str) -> Option<&str> {
        self.names.get(logical).map(String::as_str)
    }

    /// Catalog name a step output is written to
    pub fn output_name(&self, logical: &str) -> String {
        format!("{}{}", self.namespace, logical)
    }

    /// Replace every `{name}` with its bound catalog name.
    pub fn render(&self, template: &str) -> std::result::Result<String, EngineError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                let mut e = EngineError::new(EngineErrorKind::Syntax, "unterminated `{` in template");
                e.expression = template.to_string();
                e
            })?;
            let logical = after[..close].trim();
            let bound = self.resolve(logical).ok_or_else(|| {
                let mut e = EngineError::new(
                    EngineErrorKind::MissingReference,
                    format!("placeholder `{{{}}}` is not bound", logical),
                );
                e.expression = template.to_string();
                e
            })?;
            out.push_str(bound);
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, output: impl Into<String>, template: impl Into<String>) -> Self {
        self.steps.push(Step::new(output, template));
        self
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.output.as_str())
    }

    pub fn extend(&mut self, other: Pipeline) {
        self.steps.extend(other.steps);
    }

    /// Execute every step on `region`; returns the catalog names written,
    /// in step order.
    pub fn run(&self, engine: &mut Engine, region: &Region, bindings: &mut Bindings, mask: Option<&Mask>) -> Result<Vec<String>> {
        let mut written = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let expression = bindings.render(&step.template).map_err(|mut e| {
                e.output = bindings.output_name(&step.output);
                e.operation = "pipeline".into();
                e
            })?;
            let output = bindings.output_name(&step.output);
            engine.map_algebra(region, &output, &expression, mask)?;
            bindings.bind(step.output.clone(), output.clone());
            written.push(output);
        }
        Ok(written)
    }
}
