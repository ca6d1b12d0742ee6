//! USDA soil texture classes
//!
//! Each class is a box of inclusive sand/silt/clay percentage ranges.
//! The boxes share their edges, so a texture on a boundary falls in more
//! than one; the first box in [`TEXTURE_BOXES`] order wins, which keeps
//! the 12 indicator rasters mutually exclusive.

use std::fmt;

use crate::engine::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureClass {
    Clay,
    SiltyClay,
    SandyClay,
    ClayLoam,
    SiltyClayLoam,
    SandyClayLoam,
    Loam,
    SiltLoam,
    SandyLoam,
    Silt,
    LoamySand,
    Sand,
}

impl TextureClass {
    pub fn key(&self) -> &'static str {
        match self {
            TextureClass::Clay => "clay",
            TextureClass::SiltyClay => "silty_clay",
            TextureClass::SandyClay => "sandy_clay",
            TextureClass::ClayLoam => "clay_loam",
            TextureClass::SiltyClayLoam => "silty_clay_loam",
            TextureClass::SandyClayLoam => "sandy_clay_loam",
            TextureClass::Loam => "loam",
            TextureClass::SiltLoam => "silt_loam",
            TextureClass::SandyLoam => "sandy_loam",
            TextureClass::Silt => "silt",
            TextureClass::LoamySand => "loamy_sand",
            TextureClass::Sand => "sand",
        }
    }

    /// Name of the class's indicator step
    pub fn indicator(&self) -> String {
        format!("usda_{}", self.key())
    }
}

impl fmt::Display for TextureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key().replace('_', " "))
    }
}

/// Inclusive percentage ranges of one class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureBox {
    pub class: TextureClass,
    pub sand: (f64, f64),
    pub silt: (f64, f64),
    pub clay: (f64, f64),
}

impl TextureBox {
    const fn new(class: TextureClass, sand: (f64, f64), silt: (f64, f64), clay: (f64, f64)) -> Self {
        Self { class, sand, silt, clay }
    }

    pub fn contains(&self, sand: f64, silt: f64, clay: f64) -> bool {
        let within = |v: f64, (lo, hi): (f64, f64)| v >= lo && v <= hi;
        within(sand, self.sand) && within(silt, self.silt) && within(clay, self.clay)
    }

    fn condition(&self) -> String {
        format!(
            "{{sand}} >= {} && {{sand}} <= {} && {{silt}} >= {} && {{silt}} <= {} && {{clay}} >= {} && {{clay}} <= {}",
            self.sand.0, self.sand.1, self.silt.0, self.silt.1, self.clay.0, self.clay.1
        )
    }
}

/// The 12 classes, in the order used for tie-breaking and for the
/// per-class coefficient tables.
pub const TEXTURE_BOXES: [TextureBox; 12] = [
    TextureBox::new(TextureClass::Clay, (0.0, 45.0), (0.0, 40.0), (40.0, 100.0)),
    TextureBox::new(TextureClass::SiltyClay, (0.0, 20.0), (40.0, 60.0), (40.0, 60.0)),
    TextureBox::new(TextureClass::SandyClay, (45.0, 65.0), (0.0, 20.0), (35.0, 55.0)),
    TextureBox::new(TextureClass::ClayLoam, (20.0, 45.0), (15.0, 53.0), (27.0, 40.0)),
    TextureBox::new(TextureClass::SiltyClayLoam, (0.0, 20.0), (40.0, 73.0), (27.0, 40.0)),
    TextureBox::new(TextureClass::SandyClayLoam, (45.0, 80.0), (0.0, 28.0), (20.0, 35.0)),
    TextureBox::new(TextureClass::Loam, (23.0, 52.0), (28.0, 50.0), (7.0, 27.0)),
    TextureBox::new(TextureClass::SiltLoam, (0.0, 50.0), (50.0, 88.0), (0.0, 27.0)),
    TextureBox::new(TextureClass::SandyLoam, (43.0, 85.0), (0.0, 50.0), (0.0, 20.0)),
    TextureBox::new(TextureClass::Silt, (0.0, 20.0), (80.0, 100.0), (0.0, 12.0)),
    TextureBox::new(TextureClass::LoamySand, (70.0, 90.0), (0.0, 30.0), (0.0, 15.0)),
    TextureBox::new(TextureClass::Sand, (85.0, 100.0), (0.0, 15.0), (0.0, 10.0)),
];

/// First class whose box holds the texture.
pub fn classify(sand: f64, silt: f64, clay: f64) -> Option<TextureClass> {
    TEXTURE_BOXES
        .iter()
        .find(|b| b.contains(sand, silt, clay))
        .map(|b| b.class)
}

/// Steps producing one 0/1 indicator per class over `{sand}`, `{silt}`
/// and `{clay}`. A running `usda_claimed_<k>` step records whether an
/// earlier class already took the cell.
pub fn texture_indicator_pipeline() -> Pipeline {
    let mut pipeline = Pipeline::new();
    let mut claimed: Option<String> = None;
    for (k, b) in TEXTURE_BOXES.iter().enumerate() {
        let indicator = b.class.indicator();
        let template = match &claimed {
            None => format!("if({}, 1, 0)", b.condition()),
            Some(c) => format!("if(({}) && !{{{}}}, 1, 0)", b.condition(), c),
        };
        pipeline = pipeline.step(indicator.clone(), template);

        let next = format!("usda_claimed_{}", k);
        let template = match &claimed {
            None => format!("{{{}}}", indicator),
            Some(c) => format!("{{{}}} || {{{}}}", c, indicator),
        };
        pipeline = pipeline.step(next.clone(), template);
        claimed = Some(next);
    }
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_typical_textures() {
        assert_eq!(classify(20.0, 20.0, 60.0), Some(TextureClass::Clay));
        assert_eq!(classify(40.0, 40.0, 20.0), Some(TextureClass::Loam));
        assert_eq!(classify(5.0, 92.0, 3.0), Some(TextureClass::Silt));
        assert_eq!(classify(10.0, 85.0, 5.0), Some(TextureClass::SiltLoam));
        assert_eq!(classify(92.0, 5.0, 3.0), Some(TextureClass::Sand));
        assert_eq!(classify(88.0, 8.0, 4.0), Some(TextureClass::LoamySand));
        assert_eq!(classify(f64::NAN, 10.0, 10.0), None);
    }

    #[test]
    fn test_boundary_goes_to_first_class() {
        // sand 20, silt 40, clay 40 lies on four boxes
        assert!(TEXTURE_BOXES[0].contains(20.0, 40.0, 40.0));
        assert!(TEXTURE_BOXES[1].contains(20.0, 40.0, 40.0));
        assert_eq!(classify(20.0, 40.0, 40.0), Some(TextureClass::Clay));
    }

    #[test]
    fn test_pipeline_shape() {
        let p = texture_indicator_pipeline();
        assert_eq!(p.steps().len(), 24);
        assert_eq!(p.steps()[0].output, "usda_clay");
        assert!(p.steps()[2].template.contains("!{usda_claimed_0}"));
        assert_eq!(p.steps()[23].output, "usda_claimed_11");
    }

    #[test]
    fn test_display() {
        assert_eq!(TextureClass::SiltyClayLoam.to_string(), "silty clay loam");
    }
}
