//! End-to-end chains over the in-memory engine: land-cover fractions,
//! land fraction and texture indicators.

use ancil_algorithms::engine::{resample, Bindings, Engine, ResampleMethod};
use ancil_algorithms::landcover::{CategoryScheme, CrosswalkTable, FractionInputs, FractionPolicy, LandCoverFractionEngine};
use ancil_algorithms::landfrac::LandFractionReconciler;
use ancil_algorithms::region_context::RegionContext;
use ancil_algorithms::soil::{classify, texture_indicator_pipeline, TEXTURE_BOXES};
use ancil_core::{Error, Extent, InvariantPolicy, Raster, Region};
use approx::assert_relative_eq;

fn unit_extent() -> Extent {
    Extent::new(0.0, 0.0, 1.0, 1.0).unwrap()
}

fn grid(res: f64) -> Region {
    Region::with_resolution(unit_extent(), res).unwrap()
}

fn ctx(res: f64) -> RegionContext {
    RegionContext::new(unit_extent(), res, "unit").unwrap()
}

fn lenient() -> InvariantPolicy {
    InvariantPolicy {
        tolerance: 1e-9,
        hard_fail: false,
    }
}

fn raw(crosswalk: CrosswalkTable, invariants: InvariantPolicy) -> LandCoverFractionEngine {
    let scheme = CategoryScheme::from_npft(crosswalk.len(), &crosswalk).unwrap();
    LandCoverFractionEngine::new(crosswalk, scheme, FractionPolicy::Strict, invariants)
}

// ---------------------------------------------------------------------------
// Land-cover fractions
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_pure_water() {
    let crosswalk = CrosswalkTable::new("water_only")
        .category("water", &[(210, 1.0)])
        .unwrap()
        .category("trees", &[])
        .unwrap()
        .category("grass", &[])
        .unwrap();
    let mut engine = Engine::default();
    engine.insert("lc", Raster::filled(grid(0.125), 210.0)).unwrap();

    let set = raw(crosswalk, InvariantPolicy::default())
        .compute(&mut engine, &ctx(0.5), &FractionInputs::new("lc"), 2015)
        .unwrap();

    assert_eq!(set.categories, vec!["water", "trees", "grass"]);
    for &v in set.fraction("water").unwrap().data().iter() {
        assert_relative_eq!(v, 1.0, epsilon = 1e-12);
    }
    for name in ["trees", "grass"] {
        assert!(set.fraction(name).unwrap().data().iter().all(|&v| v == 0.0));
    }
    assert!(set.report.is_clean());
}

#[test]
fn scenario_b_half_and_half() {
    let crosswalk = CrosswalkTable::new("xy")
        .category("x", &[(10, 1.0), (170, 0.0)])
        .unwrap()
        .category("y", &[(170, 0.6)])
        .unwrap();
    let mut engine = Engine::default();
    // left column class 10, right column class 170, one target cell
    engine
        .insert("lc", Raster::from_vec(grid(0.5), vec![10.0, 170.0, 10.0, 170.0]).unwrap())
        .unwrap();

    let set = raw(crosswalk, lenient())
        .compute(&mut engine, &ctx(1.0), &FractionInputs::new("lc"), 2015)
        .unwrap();

    assert_relative_eq!(set.fraction("x").unwrap().get(0, 0).unwrap(), 0.5, epsilon = 1e-12);
    assert_relative_eq!(set.fraction("y").unwrap().get(0, 0).unwrap(), 0.3, epsilon = 1e-12);
    // class 170 is only 60% allocated
    assert_eq!(set.report.violating_cells, 1);
    assert_relative_eq!(set.report.worst_deviation, 0.2, epsilon = 1e-12);
}

#[test]
fn scenario_b_fails_under_hard_policy() {
    let crosswalk = CrosswalkTable::new("xy")
        .category("x", &[(10, 1.0)])
        .unwrap()
        .category("y", &[(170, 0.6)])
        .unwrap();
    let mut engine = Engine::default();
    engine
        .insert("lc", Raster::from_vec(grid(0.5), vec![10.0, 170.0, 10.0, 170.0]).unwrap())
        .unwrap();

    let err = raw(crosswalk, InvariantPolicy::default())
        .compute(&mut engine, &ctx(1.0), &FractionInputs::new("lc"), 2015)
        .unwrap_err();
    match err {
        Error::InvariantViolation(report) => {
            assert_eq!(report.violating_cells, 1);
            assert!(report.worst_deviation > 0.19);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!engine.catalog().names().any(|n| n.ends_with("_tmp")));
}

#[test]
fn unmapped_class_is_reported() {
    let crosswalk = CrosswalkTable::new("xy").category("x", &[(10, 1.0)]).unwrap();
    let mut engine = Engine::default();
    engine
        .insert("lc", Raster::from_vec(grid(0.5), vec![10.0, 10.0, 10.0, 99.0]).unwrap())
        .unwrap();

    let err = raw(crosswalk.clone(), InvariantPolicy::default())
        .compute(&mut engine, &ctx(1.0), &FractionInputs::new("lc"), 2015)
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(ref r) if r.notes.iter().any(|n| n.contains("99"))));

    let set = raw(crosswalk, lenient())
        .compute(&mut engine, &ctx(1.0), &FractionInputs::new("lc"), 2015)
        .unwrap();
    assert!(set.report.notes.iter().any(|n| n.contains("99")));
    assert_eq!(set.report.violating_cells, 1);
}

#[test]
fn poulter_five_pft_sums_to_one() {
    let mut engine = Engine::default();
    let codes = [10.0, 30.0, 50.0, 70.0, 100.0, 130.0, 150.0, 190.0, 200.0, 210.0, 220.0, 120.0, 60.0, 90.0, 180.0, 40.0];
    engine.insert("lc", Raster::from_vec(grid(0.25), codes.to_vec()).unwrap()).unwrap();
    engine.insert("c4n", Raster::filled(grid(0.25), 0.3)).unwrap();
    engine.insert("c4c", Raster::filled(grid(0.1), 0.1)).unwrap();

    let lcf = LandCoverFractionEngine::from_names("Poulter", 5, FractionPolicy::Strict, InvariantPolicy::default())
        .unwrap();
    let mut inputs = FractionInputs::new("lc");
    inputs.c4_natural = Some("c4n".into());
    inputs.c4_crop = Some("c4c".into());
    let set = lcf.compute(&mut engine, &ctx(0.5), &inputs, 2015).unwrap();

    assert_eq!(set.categories.len(), 9);
    let (rows, cols) = set.region().unwrap().shape();
    for r in 0..rows {
        for c in 0..cols {
            let total: f64 = set.fractions.iter().map(|f| f.get(r, c).unwrap()).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        }
    }
    assert!(set.report.is_clean());
}

#[test]
fn resampling_constant_is_idempotent() {
    let src = Raster::filled(grid(0.05), 0.42);
    for res in [0.1, 0.2, 0.25, 1.0 / 3.0, 0.5] {
        for method in [ResampleMethod::Average, ResampleMethod::Minimum] {
            let out = resample(&src, &grid(res), method).unwrap();
            for &v in out.data().iter() {
                assert_relative_eq!(v, 0.42, epsilon = 1e-12);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Land fraction
// ---------------------------------------------------------------------------

#[test]
fn land_fraction_is_conservative() {
    let mut engine = Engine::default();
    // land cover at 0.5: water everywhere but the top-left cell
    engine
        .insert("lc", Raster::from_vec(grid(0.5), vec![10.0, 210.0, 210.0, 210.0]).unwrap())
        .unwrap();
    // water bodies at 0.25: top-right quadrant land, one ocean pixel in
    // the bottom-left quadrant, bottom-right all ocean
    #[rustfmt::skip]
    let wb = vec![
        1.0, 1.0, 1.0, 1.0,
        1.0, 1.0, 1.0, 1.0,
        1.0, 1.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
    ];
    engine.insert("wb", Raster::from_vec(grid(0.25), wb).unwrap()).unwrap();

    let land = LandFractionReconciler::default()
        .compute(&mut engine, &ctx(0.5), "lc", "wb")
        .unwrap();

    let f = &land.fraction;
    // land cover says land
    assert_eq!(f.get(0, 0).unwrap(), 1.0);
    // sources disagree: water in land cover, land in water bodies
    assert!(f.get(0, 1).unwrap() > 0.0);
    // one fine ocean pixel makes the coarse cell ocean in both sources
    assert_eq!(f.get(1, 0).unwrap(), 0.0);
    // both agree on ocean
    assert_eq!(f.get(1, 1).unwrap(), 0.0);
    assert!(engine.contains(&land.native));
}

// ---------------------------------------------------------------------------
// Texture indicators
// ---------------------------------------------------------------------------

#[test]
fn texture_indicators_are_exclusive() {
    let mut sand = Vec::new();
    let mut silt = Vec::new();
    let mut clay = Vec::new();
    for s in (0..=100).step_by(5) {
        for c in (0..=100 - s).step_by(5) {
            sand.push(s as f64);
            clay.push(c as f64);
            silt.push((100 - s - c) as f64);
        }
    }
    let n = sand.len();
    let region = Region::from_origin(0.0, 1.0, 1.0 / n as f64, 1.0, 1, n).unwrap();

    let mut engine = Engine::default();
    engine.insert("sand", Raster::from_vec(region, sand.clone()).unwrap()).unwrap();
    engine.insert("silt", Raster::from_vec(region, silt.clone()).unwrap()).unwrap();
    engine.insert("clay", Raster::from_vec(region, clay.clone()).unwrap()).unwrap();
    let mut bindings = Bindings::new("tx_");
    bindings.bind("sand", "sand").bind("silt", "silt").bind("clay", "clay");
    texture_indicator_pipeline()
        .run(&mut engine, &region, &mut bindings, None)
        .unwrap();

    let indicators: Vec<_> = TEXTURE_BOXES
        .iter()
        .map(|b| engine.get(&bindings.output_name(&b.class.indicator())).unwrap())
        .collect();
    for col in 0..n {
        let on: Vec<usize> = (0..12)
            .filter(|&k| indicators[k].get(0, col).unwrap() == 1.0)
            .collect();
        assert!(on.len() <= 1, "texture {} {} {} in {:?}", sand[col], silt[col], clay[col], on);
        let expected = classify(sand[col], silt[col], clay[col]);
        assert_eq!(on.first().map(|&k| TEXTURE_BOXES[k].class), expected);
    }
}
