//! Cell value types

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Types that can be stored in a raster cell.
///
/// Class rasters arrive as small integers, everything the engine derives
/// is `f64` with NaN as null.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Null marker used when a file carries no explicit one
    fn default_nodata() -> Self;

    /// Whether this value is null, given the raster's declared nodata
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_int_element {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MAX
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata == Some(*self)
            }
        }
    )*};
}

macro_rules! impl_float_element {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) if nd.is_nan() => false,
                    Some(nd) => (self - nd).abs() <= nd.abs().max(1.0) * <$t>::EPSILON * 4.0,
                    None => false,
                }
            }
        }
    )*};
}

impl_int_element!(u8, u16, i16, i32, u32);
impl_float_element!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_nodata() {
        assert!(f64::NAN.is_nodata(None));
        assert!((-9999.0_f64).is_nodata(Some(-9999.0)));
        assert!(!(1.0_f64).is_nodata(Some(-9999.0)));
        assert!(9.969209968386869e36_f32.is_nodata(Some(9.969209968386869e36)));
    }

    #[test]
    fn test_int_nodata() {
        assert!(255_u8.is_nodata(Some(255)));
        assert!(!210_u8.is_nodata(Some(255)));
        assert!(!0_i16.is_nodata(None));
        assert_eq!(210_u8.to_f64(), Some(210.0));
    }
}
