//! Soil hydraulic parameters from texture and chemistry
//!
//! Each pedotransfer family turns the seven soil variables of a horizon
//! into the hydraulic parameter set of the land-surface model. Families
//! are table-driven pipelines, see [`PedotransferFunction`].

mod engine;
mod ptf;
mod texture;

pub use engine::{SoilInputs, SoilProperties, SoilPropertyEngine, UnitState};
pub use ptf::{
    family, Cosby, PedotransferFunction, RetentionShape, TomasellaHodnett, VanGenuchten, ZhangSchaap,
    CRITICAL_POINT_SUCTION, WILTING_POINT_SUCTION,
};
pub use texture::{classify, texture_indicator_pipeline, TextureBox, TextureClass, TEXTURE_BOXES};

use std::fmt;
use std::str::FromStr;

use ancil_core::{Error, Result};

/// Depth intervals of the soil survey, top down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Horizon {
    D0To5,
    D5To15,
    D15To30,
    D30To60,
    D60To100,
    D100To200,
}

impl Horizon {
    pub const ALL: [Horizon; 6] = [
        Horizon::D0To5,
        Horizon::D5To15,
        Horizon::D15To30,
        Horizon::D30To60,
        Horizon::D60To100,
        Horizon::D100To200,
    ];

    /// Label as written in the survey, e.g. `0-5cm`
    pub fn label(&self) -> &'static str {
        match self {
            Horizon::D0To5 => "0-5cm",
            Horizon::D5To15 => "5-15cm",
            Horizon::D15To30 => "15-30cm",
            Horizon::D30To60 => "30-60cm",
            Horizon::D60To100 => "60-100cm",
            Horizon::D100To200 => "100-200cm",
        }
    }

    /// Label usable inside raster names, e.g. `0_5cm`
    pub fn key(&self) -> String {
        self.label().replace('-', "_")
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Horizon {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.replace('_', "-");
        Horizon::ALL
            .into_iter()
            .find(|h| h.label() == normalized)
            .ok_or_else(|| Error::config("inputs.soil", s, "unknown soil horizon"))
    }
}

/// Source variables of a horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SoilVariable {
    Clay,
    Sand,
    Silt,
    BulkDensity,
    CationExchangeCapacity,
    Ph,
    OrganicCarbon,
}

impl SoilVariable {
    pub const ALL: [SoilVariable; 7] = [
        SoilVariable::Clay,
        SoilVariable::Sand,
        SoilVariable::Silt,
        SoilVariable::BulkDensity,
        SoilVariable::CationExchangeCapacity,
        SoilVariable::Ph,
        SoilVariable::OrganicCarbon,
    ];

    /// Name used in configuration and pipeline templates
    pub fn name(&self) -> &'static str {
        match self {
            SoilVariable::Clay => "clay",
            SoilVariable::Sand => "sand",
            SoilVariable::Silt => "silt",
            SoilVariable::BulkDensity => "bdod",
            SoilVariable::CationExchangeCapacity => "cec",
            SoilVariable::Ph => "phh2o",
            SoilVariable::OrganicCarbon => "soc",
        }
    }
}

impl FromStr for SoilVariable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SoilVariable::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| Error::config("inputs.soil", s, "unknown soil variable"))
    }
}

/// Parameters written for every family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydraulicParameter {
    B,
    PsiM,
    Ksat,
    ThetaSat,
    ThetaCrit,
    ThetaWilt,
    ThetaRes,
}

impl HydraulicParameter {
    pub const ALL: [HydraulicParameter; 7] = [
        HydraulicParameter::B,
        HydraulicParameter::PsiM,
        HydraulicParameter::Ksat,
        HydraulicParameter::ThetaSat,
        HydraulicParameter::ThetaCrit,
        HydraulicParameter::ThetaWilt,
        HydraulicParameter::ThetaRes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HydraulicParameter::B => "b",
            HydraulicParameter::PsiM => "psi_m",
            HydraulicParameter::Ksat => "ksat",
            HydraulicParameter::ThetaSat => "theta_sat",
            HydraulicParameter::ThetaCrit => "theta_crit",
            HydraulicParameter::ThetaWilt => "theta_wilt",
            HydraulicParameter::ThetaRes => "theta_res",
        }
    }

    pub fn units(&self) -> &'static str {
        match self {
            HydraulicParameter::B => "1",
            HydraulicParameter::PsiM => "m",
            HydraulicParameter::Ksat => "kg m-2 s-1",
            _ => "m3 m-3",
        }
    }

    pub fn long_name(&self) -> &'static str {
        match self {
            HydraulicParameter::B => "Exponent in soil hydraulic characteristics",
            HydraulicParameter::PsiM => "Absolute value of the soil matric suction at saturation",
            HydraulicParameter::Ksat => "Hydraulic conductivity at saturation",
            HydraulicParameter::ThetaSat => "Volumetric soil moisture content at saturation",
            HydraulicParameter::ThetaCrit => "Volumetric soil moisture content at the critical point",
            HydraulicParameter::ThetaWilt => "Volumetric soil moisture content at the wilting point",
            HydraulicParameter::ThetaRes => "Residual volumetric soil moisture content",
        }
    }
}

/// Pedotransfer families selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoilFamily {
    Cosby,
    TomasellaHodnett,
    ZhangSchaap,
}

impl SoilFamily {
    pub fn name(&self) -> &'static str {
        match self {
            SoilFamily::Cosby => "cosby",
            SoilFamily::TomasellaHodnett => "tomasellahodnett",
            SoilFamily::ZhangSchaap => "zhangschaap",
        }
    }
}

impl fmt::Display for SoilFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SoilFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "cosby" => Ok(SoilFamily::Cosby),
            "tomasellahodnett" => Ok(SoilFamily::TomasellaHodnett),
            "zhangschaap" => Ok(SoilFamily::ZhangSchaap),
            _ => Err(Error::config("methods.soil_props", s, "unknown pedotransfer family")),
        }
    }
}
