//! Output category schemes
//!
//! A scheme turns the crosswalk weight rasters into the categories a
//! land-surface model consumes. Each scheme is just a [`Pipeline`]: one
//! step per output category, with templates over the crosswalk category
//! names plus the auxiliary rasters `{c4_natural}`, `{c4_crop}` and
//! `{tropical}`.

use ancil_core::{Error, Result};

use super::crosswalk::CrosswalkTable;
use crate::engine::Pipeline;

pub const FIVE_PFT_NAMES: [&str; 9] = [
    "tree_broadleaf",
    "tree_needleleaf",
    "shrub",
    "c3_grass",
    "c4_grass",
    "urban",
    "water",
    "bare_soil",
    "snow_ice",
];

pub const NINE_PFT_NAMES: [&str; 13] = [
    "tree_broadleaf_evergreen_tropical",
    "tree_broadleaf_evergreen_temperate",
    "tree_broadleaf_deciduous",
    "tree_needleleaf_evergreen",
    "tree_needleleaf_deciduous",
    "shrub_evergreen",
    "shrub_deciduous",
    "c3_grass",
    "c4_grass",
    "urban",
    "water",
    "bare_soil",
    "snow_ice",
];

const C3_GRASS: &str = "({natural_grass} * (1 - {c4_natural})) + ({crops} * (1 - {c4_crop}))";
const C4_GRASS: &str = "({natural_grass} * {c4_natural}) + ({crops} * {c4_crop})";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryScheme {
    /// The crosswalk categories unchanged
    Raw,
    FivePft,
    NinePft,
}

impl CategoryScheme {
    /// Resolve the `npft` variant; the raw scheme is selected by the
    /// crosswalk's own category count.
    pub fn from_npft(npft: usize, crosswalk: &CrosswalkTable) -> Result<Self> {
        match npft {
            5 => Ok(Self::FivePft),
            9 => Ok(Self::NinePft),
            n if n == crosswalk.len() => Ok(Self::Raw),
            n => Err(Error::config(
                "methods.npft",
                n.to_string(),
                format!("expected 5, 9 or {}", crosswalk.len()),
            )),
        }
    }

    pub fn npft(&self, crosswalk: &CrosswalkTable) -> usize {
        match self {
            Self::Raw => crosswalk.len(),
            Self::FivePft => 5,
            Self::NinePft => 9,
        }
    }

    pub fn needs_c4(&self) -> bool {
        !matches!(self, Self::Raw)
    }

    pub fn needs_biome(&self) -> bool {
        matches!(self, Self::NinePft)
    }

    /// Output categories in order.
    pub fn categories(&self, crosswalk: &CrosswalkTable) -> Vec<String> {
        match self {
            Self::Raw => crosswalk.categories().map(str::to_string).collect(),
            Self::FivePft => FIVE_PFT_NAMES.iter().map(|s| s.to_string()).collect(),
            Self::NinePft => NINE_PFT_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn pipeline(&self, crosswalk: &CrosswalkTable) -> Pipeline {
        match self {
            Self::Raw => crosswalk
                .categories()
                .fold(Pipeline::new(), |p, c| p.step(c, format!("{{{}}}", c))),
            Self::FivePft => Pipeline::new()
                .step(
                    "tree_broadleaf",
                    "{trees_broadleaf_deciduous} + {trees_broadleaf_evergreen}",
                )
                .step(
                    "tree_needleleaf",
                    "{trees_needleleaf_deciduous} + {trees_needleleaf_evergreen}",
                )
                .step(
                    "shrub",
                    "{shrubs_broadleaf_deciduous} + {shrubs_broadleaf_evergreen} \
                     + {shrubs_needleleaf_deciduous} + {shrubs_needleleaf_evergreen}",
                )
                .step("c3_grass", C3_GRASS)
                .step("c4_grass", C4_GRASS)
                .step("urban", "{urban}")
                .step("water", "{water}")
                .step("bare_soil", "{bare_soil}")
                .step("snow_ice", "{snow_ice}"),
            Self::NinePft => Pipeline::new()
                .step(
                    "tree_broadleaf_evergreen_tropical",
                    "{trees_broadleaf_evergreen} * {tropical}",
                )
                .step(
                    "tree_broadleaf_evergreen_temperate",
                    "{trees_broadleaf_evergreen} * (1 - {tropical})",
                )
                .step("tree_broadleaf_deciduous", "{trees_broadleaf_deciduous}")
                .step("tree_needleleaf_evergreen", "{trees_needleleaf_evergreen}")
                .step("tree_needleleaf_deciduous", "{trees_needleleaf_deciduous}")
                .step(
                    "shrub_evergreen",
                    "{shrubs_broadleaf_evergreen} + {shrubs_needleleaf_evergreen}",
                )
                .step(
                    "shrub_deciduous",
                    "{shrubs_broadleaf_deciduous} + {shrubs_needleleaf_deciduous}",
                )
                .step("c3_grass", C3_GRASS)
                .step("c4_grass", C4_GRASS)
                .step("urban", "{urban}")
                .step("water", "{water}")
                .step("bare_soil", "{bare_soil}")
                .step("snow_ice", "{snow_ice}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_npft() {
        let cw = CrosswalkTable::poulter();
        assert_eq!(CategoryScheme::from_npft(5, &cw).unwrap(), CategoryScheme::FivePft);
        assert_eq!(CategoryScheme::from_npft(9, &cw).unwrap(), CategoryScheme::NinePft);
        assert_eq!(CategoryScheme::from_npft(14, &cw).unwrap(), CategoryScheme::Raw);
        let err = CategoryScheme::from_npft(7, &cw).unwrap_err();
        assert!(matches!(err, Error::Configuration { ref key, .. } if key == "methods.npft"));
    }

    #[test]
    fn test_pipeline_outputs_match_categories() {
        let cw = CrosswalkTable::poulter();
        for scheme in [CategoryScheme::Raw, CategoryScheme::FivePft, CategoryScheme::NinePft] {
            let outputs: Vec<String> = scheme.pipeline(&cw).outputs().map(str::to_string).collect();
            assert_eq!(outputs, scheme.categories(&cw));
        }
    }

    #[test]
    fn test_auxiliary_needs() {
        assert!(!CategoryScheme::Raw.needs_c4());
        assert!(CategoryScheme::FivePft.needs_c4());
        assert!(!CategoryScheme::FivePft.needs_biome());
        assert!(CategoryScheme::NinePft.needs_biome());
    }
}
