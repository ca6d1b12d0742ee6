//! Weighted crosswalk from land-cover class codes to categories
//!
//! Each category holds a table of class code → fractional weight. The
//! weights of one class across all categories should add up to 1, but
//! nothing enforces it: [`CrosswalkTable::class_totals`] and
//! [`CrosswalkTable::coverage_gaps`] make any residual visible, and
//! [`CrosswalkTable::unmapped_codes`] finds codes in a raster that no
//! category claims.

use std::collections::{BTreeMap, BTreeSet};

use ancil_core::{Error, Raster, Result};

/// Category name → (class code → weight), in output order.
#[derive(Debug, Clone, PartialEq)]
pub struct CrosswalkTable {
    name: String,
    categories: Vec<(String, BTreeMap<i64, f64>)>,
}

impl CrosswalkTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            categories: Vec::new(),
        }
    }

    /// Append a category. Weights must lie in `[0, 1]`.
    pub fn category(mut self, name: &str, weights: &[(i64, f64)]) -> Result<Self> {
        if self.categories.iter().any(|(n, _)| n == name) {
            return Err(Error::config("crosswalk.category", name, "duplicate category"));
        }
        for &(code, w) in weights {
            if !(0.0..=1.0).contains(&w) {
                return Err(Error::config(
                    format!("crosswalk.{}.{}", name, code),
                    w.to_string(),
                    "weight must be in [0, 1]",
                ));
            }
        }
        self.categories
            .push((name.to_string(), weights.iter().copied().collect()));
        Ok(self)
    }

    /// Look up a table by method name.
    pub fn by_name(method: &str) -> Result<Self> {
        match method.to_ascii_lowercase().as_str() {
            "poulter" => Ok(Self::poulter()),
            _ => Err(Error::config("methods.frac", method, "unknown land-cover fraction method")),
        }
    }

    /// ESA CCI classes to 14 categories after Poulter et al. (2015), with
    /// urban (190) given a category of its own.
    pub fn poulter() -> Self {
        let table: [(&str, &[(i64, f64)]); 14] = [
            (
                "trees_broadleaf_evergreen",
                &[(30, 0.05), (40, 0.05), (50, 0.90), (100, 0.1), (110, 0.05), (150, 0.01), (160, 0.3), (170, 0.6)],
            ),
            (
                "trees_broadleaf_deciduous",
                &[
                    (30, 0.05), (40, 0.05), (60, 0.70), (61, 0.70), (62, 0.30), (90, 0.30), (100, 0.20),
                    (110, 0.10), (150, 0.03), (151, 0.02), (160, 0.30), (180, 0.05),
                ],
            ),
            (
                "trees_needleleaf_evergreen",
                &[
                    (70, 0.70), (71, 0.70), (72, 0.30), (90, 0.20), (100, 0.05), (110, 0.05), (150, 0.01),
                    (151, 0.06), (180, 0.10),
                ],
            ),
            (
                "trees_needleleaf_deciduous",
                &[(80, 0.70), (81, 0.70), (82, 0.30), (90, 0.10), (100, 0.05), (151, 0.02)],
            ),
            (
                "shrubs_broadleaf_evergreen",
                &[
                    (30, 0.05), (40, 0.075), (50, 0.05), (70, 0.05), (71, 0.05), (80, 0.05), (81, 0.05),
                    (90, 0.05), (100, 0.05), (110, 0.05), (120, 0.20), (121, 0.30), (150, 0.01), (152, 0.02),
                    (170, 0.20),
                ],
            ),
            (
                "shrubs_broadleaf_deciduous",
                &[
                    (12, 0.50), (30, 0.05), (40, 0.10), (50, 0.05), (60, 0.15), (61, 0.15), (62, 0.25),
                    (70, 0.05), (71, 0.05), (72, 0.05), (80, 0.05), (81, 0.05), (82, 0.05), (90, 0.05),
                    (100, 0.10), (110, 0.10), (120, 0.20), (122, 0.60), (150, 0.03), (152, 0.06), (180, 0.10),
                ],
            ),
            (
                "shrubs_needleleaf_evergreen",
                &[
                    (30, 0.05), (40, 0.075), (70, 0.05), (71, 0.05), (72, 0.05), (80, 0.05), (81, 0.05),
                    (82, 0.05), (90, 0.05), (100, 0.05), (110, 0.05), (120, 0.20), (121, 0.30), (150, 0.01),
                    (152, 0.02), (180, 0.05),
                ],
            ),
            ("shrubs_needleleaf_deciduous", &[]),
            (
                "natural_grass",
                &[
                    (30, 0.15), (40, 0.25), (60, 0.15), (61, 0.15), (62, 0.35), (70, 0.15), (71, 0.15),
                    (72, 0.30), (80, 0.15), (81, 0.15), (82, 0.30), (90, 0.15), (100, 0.40), (110, 0.60),
                    (120, 0.20), (121, 0.20), (122, 0.20), (130, 0.60), (140, 0.60), (150, 0.05),
                    (151, 0.05), (152, 0.05), (153, 0.15), (160, 0.20), (180, 0.40),
                ],
            ),
            ("crops", &[(10, 1.0), (11, 1.0), (12, 0.50), (20, 1.0), (30, 0.6), (40, 0.4)]),
            (
                "bare_soil",
                &[
                    (62, 0.10), (72, 0.30), (82, 0.30), (90, 0.10), (120, 0.20), (121, 0.20), (122, 0.20),
                    (130, 0.40), (140, 0.40), (150, 0.85), (151, 0.85), (152, 0.85), (153, 0.85),
                    (200, 1.0), (201, 1.0), (202, 1.0),
                ],
            ),
            ("water", &[(160, 0.20), (170, 0.20), (180, 0.30), (210, 1.0)]),
            ("urban", &[(190, 1.0)]),
            ("snow_ice", &[(220, 1.0)]),
        ];

        Self {
            name: "Poulter".to_string(),
            categories: table
                .iter()
                .map(|(name, weights)| (name.to_string(), weights.iter().copied().collect()))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(n, _)| n.as_str())
    }

    pub fn weights(&self, category: &str) -> Option<&BTreeMap<i64, f64>> {
        self.categories
            .iter()
            .find(|(n, _)| n == category)
            .map(|(_, w)| w)
    }

    /// Sum of weights per class code over all categories.
    pub fn class_totals(&self) -> BTreeMap<i64, f64> {
        let mut totals = BTreeMap::new();
        for (_, weights) in &self.categories {
            for (&code, &w) in weights {
                *totals.entry(code).or_insert(0.0) += w;
            }
        }
        totals
    }

    /// Classes whose total weight differs from 1 by more than `tolerance`.
    pub fn coverage_gaps(&self, tolerance: f64) -> Vec<(i64, f64)> {
        self.class_totals()
            .into_iter()
            .filter(|(_, total)| (total - 1.0).abs() > tolerance)
            .collect()
    }

    /// Whether any category has a weight entry for `code`.
    pub fn is_mapped(&self, code: i64) -> bool {
        self.categories.iter().any(|(_, w)| w.contains_key(&code))
    }

    /// Codes present in `raster` that no category maps, in ascending order.
    pub fn unmapped_codes(&self, raster: &Raster<f64>) -> BTreeSet<i64> {
        let mut seen = BTreeSet::new();
        for &v in raster.data().iter() {
            if !v.is_nan() {
                seen.insert(v.round() as i64);
            }
        }
        seen.into_iter().filter(|&c| !self.is_mapped(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ancil_core::Region;

    #[test]
    fn test_poulter_layout() {
        let table = CrosswalkTable::poulter();
        assert_eq!(table.len(), 14);
        assert_eq!(table.categories().next(), Some("trees_broadleaf_evergreen"));
        assert_eq!(table.weights("water").unwrap()[&210], 1.0);
        assert!(table.weights("shrubs_needleleaf_deciduous").unwrap().is_empty());
        assert!(!table.is_mapped(0));
        assert!(table.is_mapped(190));
    }

    #[test]
    fn test_poulter_classes_fully_allocated() {
        let table = CrosswalkTable::poulter();
        assert!(table.coverage_gaps(1e-9).is_empty(), "{:?}", table.coverage_gaps(1e-9));
        assert_eq!(table.class_totals().len(), 37);
    }

    #[test]
    fn test_gaps_reported() {
        let table = CrosswalkTable::new("partial")
            .category("x", &[(10, 1.0), (170, 0.0)])
            .unwrap()
            .category("y", &[(170, 0.6)])
            .unwrap();
        assert_eq!(table.coverage_gaps(1e-6), vec![(170, 0.6)]);
    }

    #[test]
    fn test_invalid_tables_rejected() {
        assert!(CrosswalkTable::new("t").category("a", &[(1, 1.5)]).is_err());
        let dup = CrosswalkTable::new("t").category("a", &[]).unwrap().category("a", &[]);
        assert!(matches!(dup, Err(Error::Configuration { .. })));
        assert!(CrosswalkTable::by_name("Unknown").is_err());
        assert_eq!(CrosswalkTable::by_name("poulter").unwrap().name(), "Poulter");
    }

    #[test]
    fn test_unmapped_codes() {
        let region = Region::from_origin(0.0, 1.0, 0.25, 0.25, 1, 4).unwrap();
        let raster = Raster::from_vec(region, vec![10.0, 999.0, f64::NAN, 0.0]).unwrap();
        let codes = CrosswalkTable::poulter().unmapped_codes(&raster);
        assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec![0, 999]);
    }
}
