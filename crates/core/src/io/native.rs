//! GeoTIFF working store
//!
//! Geographic (lat/lon) rasters only. The grid is carried by the
//! ModelPixelScale and ModelTiepoint tags, null by the GDAL_NODATA tag.

use crate::error::{Error, Result};
use crate::raster::{Raster, RasterElement};
use crate::region::Region;
use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{Gray32Float, Gray64Float};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

/// Sample type written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    Float32,
    #[default]
    Float64,
}

#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    pub sample_format: SampleFormat,
}

/// Read the first band of a GeoTIFF file.
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

fn tiff_err(what: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{}: {}", what, e))
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader)
        .map_err(tiff_err("TIFF decode error"))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder
        .dimensions()
        .map_err(tiff_err("Cannot read dimensions"))?;
    let rows = height as usize;
    let cols = width as usize;

    let region = read_region(&mut decoder, rows, cols)?;
    let nodata = read_nodata::<T, R>(&mut decoder);

    let result = decoder
        .read_image()
        .map_err(tiff_err("Cannot read image data"))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    let mut raster = Raster::from_vec(region, data)?;
    raster.set_nodata(nodata);
    Ok(raster)
}

/// Grid from the pixel-scale and tie-point tags. Rasters without them
/// cannot be placed on a region and are rejected.
fn read_region<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    rows: usize,
    cols: usize,
) -> Result<Region> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| Error::UnsupportedDataType("missing ModelPixelScale tag".into()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| Error::UnsupportedDataType("missing ModelTiepoint tag".into()))?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(Error::UnsupportedDataType(
            "malformed georeferencing tags".into(),
        ));
    }
    // tiepoint: [I, J, K, X, Y, Z]
    let west = tiepoint[3] - tiepoint[0] * scale[0];
    let north = tiepoint[4] + tiepoint[1] * scale[1];
    Region::from_origin(west, north, scale[0], scale[1], rows, cols)
}

fn read_nodata<T, R>(decoder: &mut Decoder<R>) -> Option<T>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let text = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    num_traits::cast(value)
}

pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_geotiff(raster, file, options.unwrap_or_default())
}

pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), options.unwrap_or_default())?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;
    let (rows, cols) = raster.shape();
    let region = raster.region();

    let scale = [region.res_x(), region.res_y(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, region.west(), region.north(), 0.0];
    // GeoKeyDirectory: geographic model, pixel-is-area, WGS84
    let geokeys: [u16; 16] = [
        1, 1, 0, 3, //
        1024, 0, 1, 2, //
        1025, 0, 1, 1, //
        2048, 0, 1, 4326,
    ];
    let nodata = raster
        .nodata()
        .and_then(|v| v.to_f64())
        .map(|v| v.to_string());

    macro_rules! write_image {
        ($colortype:ty, $cast:ty) => {{
            let data: Vec<$cast> = raster
                .data()
                .iter()
                .map(|&v| num_traits::cast(v).unwrap_or(<$cast>::NAN))
                .collect();
            let mut image = encoder
                .new_image::<$colortype>(cols as u32, rows as u32)
                .map_err(tiff_err("Cannot create TIFF image"))?;
            image
                .encoder()
                .write_tag(Tag::ModelPixelScaleTag, &scale[..])
                .map_err(tiff_err("Cannot write scale tag"))?;
            image
                .encoder()
                .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
                .map_err(tiff_err("Cannot write tiepoint tag"))?;
            image
                .encoder()
                .write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])
                .map_err(tiff_err("Cannot write geokey tag"))?;
            if let Some(text) = &nodata {
                image
                    .encoder()
                    .write_tag(Tag::GdalNodata, text.as_str())
                    .map_err(tiff_err("Cannot write nodata tag"))?;
            }
            image
                .write_data(&data)
                .map_err(tiff_err("Cannot write image data"))?;
        }};
    }

    match options.sample_format {
        SampleFormat::Float32 => write_image!(Gray32Float, f32),
        SampleFormat::Float64 => write_image!(Gray64Float, f64),
    }
    Ok(())
}
