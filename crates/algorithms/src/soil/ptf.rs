//! Pedotransfer function families
//!
//! A family is a pipeline of expression templates over the soil
//! variables (`{clay}`, `{sand}`, `{silt}`, `{bdod}`, `{cec}`, `{phh2o}`,
//! `{soc}`). Its steps must produce every [`HydraulicParameter`]; steps
//! ending in `_tmp` are intermediates dropped after the run.

use std::fmt;

use super::texture::{texture_indicator_pipeline, TEXTURE_BOXES};
use super::{SoilFamily, SoilVariable};
use crate::engine::Pipeline;

/// Suction at the critical point (m)
pub const CRITICAL_POINT_SUCTION: f64 = 3.364;
/// Suction at the wilting point (m)
pub const WILTING_POINT_SUCTION: f64 = 152.9;

const KSAT_COSBY: &str = "(25.4 / (60 * 60)) * (10 ^ (-0.60 - (0.0064 * {clay}) + (0.0126 * {sand})))";

pub trait PedotransferFunction: fmt::Debug + Send + Sync {
    fn family(&self) -> SoilFamily;

    /// Soil variables the templates read
    fn required(&self) -> &'static [SoilVariable];

    fn pipeline(&self) -> Pipeline;
}

/// Resolve a family to its implementation.
pub fn family(family: SoilFamily) -> Box<dyn PedotransferFunction> {
    match family {
        SoilFamily::Cosby => Box::new(Cosby),
        SoilFamily::TomasellaHodnett => Box::new(VanGenuchten(TomasellaHodnett)),
        SoilFamily::ZhangSchaap => Box::new(VanGenuchten(ZhangSchaap)),
    }
}

/// Brooks and Corey parameters regressed on clay and sand, after
/// Cosby et al. (1984).
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosby;

impl Cosby {
    fn retention(suction: f64) -> String {
        format!("{{theta_sat}} * ({{psi_m}} / {}) ^ (1 / {{b}})", suction)
    }
}

impl PedotransferFunction for Cosby {
    fn family(&self) -> SoilFamily {
        SoilFamily::Cosby
    }

    fn required(&self) -> &'static [SoilVariable] {
        &[SoilVariable::Clay, SoilVariable::Sand]
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new()
            .step("b", "3.10 + (0.157 * {clay}) - (0.003 * {sand})")
            .step("psi_m", "0.01 * (10 ^ (2.17 - (0.0063 * {clay}) - (0.0158 * {sand})))")
            .step("ksat", KSAT_COSBY)
            .step("theta_sat", "0.01 * (50.5 - (0.037 * {clay}) - (0.142 * {sand}))")
            .step("theta_res", "0")
            .step("theta_crit", Cosby::retention(CRITICAL_POINT_SUCTION))
            .step("theta_wilt", Cosby::retention(WILTING_POINT_SUCTION))
    }
}

/// Source of the van Genuchten shape parameters. The pipeline must
/// produce `alpha` (m⁻¹), `n`, `theta_res`, `theta_sat` and `ksat`.
pub trait RetentionShape: fmt::Debug + Send + Sync {
    fn family(&self) -> SoilFamily;
    fn required(&self) -> &'static [SoilVariable];
    fn shape(&self) -> Pipeline;
}

/// Parameters derived from a van Genuchten retention curve.
#[derive(Debug, Clone, Copy, Default)]
pub struct VanGenuchten<S>(pub S);

impl<S: RetentionShape> VanGenuchten<S> {
    fn retention(pipeline: Pipeline, label: &str, suction: f64) -> Pipeline {
        let a = format!("a_{}_tmp", label);
        let se = format!("se_{}_tmp", label);
        pipeline
            .step(a.clone(), format!("({{alpha}} * {}) ^ {{n}}", suction))
            .step(se.clone(), format!("(1 + {{{}}}) ^ ((1 / {{n}}) - 1)", a))
            .step(
                format!("theta_{}", label),
                format!("({{{}}} * ({{theta_sat}} - {{theta_res}})) + {{theta_res}}", se),
            )
    }
}

impl<S: RetentionShape> PedotransferFunction for VanGenuchten<S> {
    fn family(&self) -> SoilFamily {
        self.0.family()
    }

    fn required(&self) -> &'static [SoilVariable] {
        self.0.required()
    }

    fn pipeline(&self) -> Pipeline {
        let pipeline = self
            .0
            .shape()
            .step("psi_m", "1 / {alpha}")
            .step("b", "1 / ({n} - 1)");
        let pipeline = Self::retention(pipeline, "crit", CRITICAL_POINT_SUCTION);
        Self::retention(pipeline, "wilt", WILTING_POINT_SUCTION)
    }
}

/// Multi-variable regressions of Tomasella and Hodnett (1998). They give
/// no conductivity, so `ksat` uses the Cosby regression.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomasellaHodnett;

impl RetentionShape for TomasellaHodnett {
    fn family(&self) -> SoilFamily {
        SoilFamily::TomasellaHodnett
    }

    fn required(&self) -> &'static [SoilVariable] {
        &SoilVariable::ALL
    }

    fn shape(&self) -> Pipeline {
        Pipeline::new()
            .step(
                "alpha",
                "9.80665 * exp((-2.294 - (3.526 * {silt}) + (2.440 * ({soc} / 10)) - (0.076 * {cec}) \
                 - (11.331 * {phh2o} / 10) + (0.019 * {silt} * {silt})) / 100)",
            )
            .step(
                "n",
                "exp((62.986 - (0.833 * {clay}) - (0.529 * ({soc} / 10)) + (0.593 * {phh2o} / 10) \
                 + (0.007 * {clay} * {clay}) - (0.014 * {sand} * {silt})) / 100)",
            )
            .step(
                "theta_res",
                "0.01 * (22.733 - (0.164 * {sand}) + (0.235 * {cec}) - (0.831 * {phh2o} / 10) \
                 + (0.0018 * {clay} * {clay}) + (0.0026 * {sand} * {clay}))",
            )
            .step(
                "theta_sat",
                "0.01 * (81.799 + (0.099 * {clay}) - (31.42 * {bdod} * 0.001) + (0.018 * {cec}) \
                 + (0.451 * {phh2o} / 10) - (0.0005 * {sand} * {clay}))",
            )
            .step("ksat", KSAT_COSBY)
    }
}

/// Per texture-class coefficients of Zhang and Schaap (2017), in
/// [`TEXTURE_BOXES`] order.
pub(crate) mod zhang_schaap {
    pub const ALPHA: [f64; 12] = [
        0.0085736519, 0.0101142735, 0.0250359697, 0.0099478343, 0.0055563345, 0.0124256821, 0.0063582607,
        0.0034302367, 0.0164037225, 0.0060396053, 0.024619742, 0.0328446188,
    ];
    pub const N: [f64; 12] = [
        1.2547490134, 1.273204146, 1.2366347276, 1.3908612189, 1.4341667317, 1.3051970186, 1.4214753311,
        1.5517801798, 1.4569557234, 1.5771727061, 1.6968969844, 2.8953059015,
    ];
    pub const THETA_RES: [f64; 12] = [
        0.1309948472, 0.1236437112, 0.147392179, 0.1072850999, 0.1196643822, 0.0933631331, 0.0902482845,
        0.083186447, 0.0606397155, 0.0650483449, 0.0581702395, 0.0545506462,
    ];
    pub const THETA_SAT: [f64; 12] = [
        0.4574695264, 0.4729208221, 0.3818242427, 0.4287550719, 0.4702973434, 0.3800973379, 0.4017669217,
        0.4269400175, 0.3808945256, 0.4724838864, 0.3830712622, 0.3633494968,
    ];
    pub const KSAT: [f64; 12] = [
        14.7500629329, 9.6136374341, 11.3533844849, 7.0635116122, 11.108435216, 13.2312093416,
        13.3386286706, 18.4713576853, 37.4503675019, 43.7471157565, 108.1993376227, 642.9544642258,
    ];
}

/// Texture-class lookup of the van Genuchten parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZhangSchaap;

impl ZhangSchaap {
    /// `Σ indicator_k · factor_k`; with exclusive indicators this picks
    /// the cell's class coefficient.
    fn blend(factors: &[f64; 12]) -> String {
        TEXTURE_BOXES
            .iter()
            .zip(factors)
            .map(|(b, f)| format!("({{{}}} * {})", b.class.indicator(), f))
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

impl RetentionShape for ZhangSchaap {
    fn family(&self) -> SoilFamily {
        SoilFamily::ZhangSchaap
    }

    fn required(&self) -> &'static [SoilVariable] {
        &[SoilVariable::Clay, SoilVariable::Sand, SoilVariable::Silt]
    }

    fn shape(&self) -> Pipeline {
        let mut pipeline = texture_indicator_pipeline();
        pipeline.extend(
            Pipeline::new()
                .step("alpha", Self::blend(&zhang_schaap::ALPHA))
                .step("n", Self::blend(&zhang_schaap::N))
                .step("theta_res", Self::blend(&zhang_schaap::THETA_RES))
                .step("theta_sat", Self::blend(&zhang_schaap::THETA_SAT))
                .step("ksat", Self::blend(&zhang_schaap::KSAT)),
        );
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Bindings, Engine};
    use crate::soil::HydraulicParameter;
    use ancil_core::{Extent, Raster, Region};
    use approx::assert_relative_eq;

    fn region() -> Region {
        Region::with_resolution(Extent::new(0.0, 0.0, 1.0, 1.0).unwrap(), 1.0).unwrap()
    }

    /// Run a family on one cell and read back a parameter.
    fn run(ptf: &dyn PedotransferFunction, values: &[(SoilVariable, f64)]) -> (Engine, Bindings) {
        let mut engine = Engine::default();
        let mut bindings = Bindings::new("t_");
        for &(var, v) in values {
            engine.insert(var.name(), Raster::filled(region(), v)).unwrap();
            bindings.bind(var.name(), var.name());
        }
        ptf.pipeline().run(&mut engine, &region(), &mut bindings, None).unwrap();
        (engine, bindings)
    }

    fn value(engine: &mut Engine, name: &str) -> f64 {
        engine.get(&format!("t_{}", name)).unwrap().get(0, 0).unwrap()
    }

    fn loam() -> Vec<(SoilVariable, f64)> {
        vec![
            (SoilVariable::Clay, 20.0),
            (SoilVariable::Sand, 40.0),
            (SoilVariable::Silt, 40.0),
            (SoilVariable::BulkDensity, 1300.0),
            (SoilVariable::CationExchangeCapacity, 15.0),
            (SoilVariable::Ph, 65.0),
            (SoilVariable::OrganicCarbon, 20.0),
        ]
    }

    #[test]
    fn test_every_family_produces_every_parameter() {
        for f in [SoilFamily::Cosby, SoilFamily::TomasellaHodnett, SoilFamily::ZhangSchaap] {
            let ptf = family(f);
            assert_eq!(ptf.family(), f);
            let outputs: Vec<String> = ptf.pipeline().outputs().map(str::to_string).collect();
            for p in HydraulicParameter::ALL {
                assert!(outputs.iter().any(|o| o == p.name()), "{} lacks {}", f, p.name());
            }
        }
    }

    #[test]
    fn test_cosby_values() {
        let (mut engine, _) = run(&Cosby, &loam());
        assert_relative_eq!(value(&mut engine, "b"), 3.10 + 0.157 * 20.0 - 0.003 * 40.0, epsilon = 1e-12);
        let psi = 0.01 * 10f64.powf(2.17 - 0.0063 * 20.0 - 0.0158 * 40.0);
        assert_relative_eq!(value(&mut engine, "psi_m"), psi, epsilon = 1e-12);
        assert_relative_eq!(value(&mut engine, "theta_sat"), 0.01 * (50.5 - 0.74 - 5.68), epsilon = 1e-12);
        assert_eq!(value(&mut engine, "theta_res"), 0.0);
    }

    #[test]
    fn test_retention_ordering() {
        for f in [SoilFamily::Cosby, SoilFamily::TomasellaHodnett, SoilFamily::ZhangSchaap] {
            let (mut engine, _) = run(family(f).as_ref(), &loam());
            let sat = value(&mut engine, "theta_sat");
            let crit = value(&mut engine, "theta_crit");
            let wilt = value(&mut engine, "theta_wilt");
            assert!(wilt <= crit && crit <= sat, "{}: {} {} {}", f, wilt, crit, sat);
        }
    }

    #[test]
    fn test_zhang_schaap_picks_class_coefficients() {
        let (mut engine, _) = run(&VanGenuchten(ZhangSchaap), &loam());
        // loam is the seventh class
        assert_relative_eq!(value(&mut engine, "alpha"), zhang_schaap::ALPHA[6], epsilon = 1e-15);
        assert_relative_eq!(value(&mut engine, "n"), zhang_schaap::N[6], epsilon = 1e-15);
        assert_relative_eq!(value(&mut engine, "psi_m"), 1.0 / zhang_schaap::ALPHA[6], epsilon = 1e-9);
        assert_relative_eq!(value(&mut engine, "b"), 1.0 / (zhang_schaap::N[6] - 1.0), epsilon = 1e-12);
    }
}
