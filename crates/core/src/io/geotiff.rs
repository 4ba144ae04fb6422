//! Single-band GeoTIFF reading/writing on top of the `tiff` crate
//!
//! Georeferencing is carried in the ModelTiepoint/ModelPixelScale tags, or
//! the ModelTransformation matrix when the grid is rotated or not north-up.
//! The CRS lives in the GeoKey directory and its double/ASCII parameter
//! tags; keys read from a file are written back unchanged. The no-data value
//! goes in the GDAL_NODATA ASCII tag, which is what GDAL-based tools read back.

use crate::crs::{GeoKeys, CRS};
use crate::error::{Error, Result};
use crate::raster::{DataType, GeoTransform, Raster, RasterElement, RasterProfile};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{
    ColorType, Gray16, Gray32Float, Gray64Float, Gray8, GrayI16, GrayI32,
};
use tiff::encoder::compression::{
    Compression as TiffCompression, Deflate, Lzw, Uncompressed,
};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;

// GeoKey identifiers (GeoTIFF 1.0, section 6.2)
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GT_CITATION: u16 = 1026;
const GEOGRAPHIC_TYPE: u16 = 2048;
const GEOG_CITATION: u16 = 2049;
const PROJECTED_CS_TYPE: u16 = 3072;
const PCS_CITATION: u16 = 3073;
const ASCII_PARAMS_LOCATION: u16 = 34737;
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

/// Compression applied to written image strips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Lzw,
    Deflate,
}

impl Compression {
    /// Map a TIFF `Compression` tag value
    pub fn from_tag(code: u32) -> Option<Self> {
        match code {
            1 => Some(Compression::None),
            5 => Some(Compression::Lzw),
            8 | 32946 => Some(Compression::Deflate),
            _ => None,
        }
    }
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    pub compression: Compression,
    /// Sample type on disk; defaults to the raster's own element type
    pub data_type: Option<DataType>,
}

/// Header-level description of a GeoTIFF
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiffInfo {
    pub profile: RasterProfile,
    pub data_type: DataType,
    pub compression: Option<Compression>,
    pub samples_per_pixel: u16,
}

/// Read a single-band GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file))
}

/// Read a single-band GeoTIFF from an in-memory buffer
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

/// Read the header of a GeoTIFF: georeferencing, sample type and compression
pub fn read_info<P: AsRef<Path>>(path: P) -> Result<GeoTiffInfo> {
    let file = File::open(path.as_ref())?;
    let mut decoder = Decoder::new(BufReader::new(file))?;
    let (rows, cols) = dimensions(&mut decoder)?;

    let samples_per_pixel = match decoder.colortype()? {
        tiff::ColorType::Gray(_) => 1,
        other => {
            return Err(Error::UnsupportedDataType(format!(
                "expected a single-band raster, found {:?}",
                other
            )))
        }
    };

    let data_type = sample_data_type(&mut decoder)?;
    let compression = decoder
        .get_tag_u32(Tag::Compression)
        .ok()
        .and_then(Compression::from_tag);

    Ok(GeoTiffInfo {
        profile: read_metadata(&mut decoder, rows, cols),
        data_type,
        compression,
        samples_per_pixel,
    })
}

fn dimensions<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<(usize, usize)> {
    let (width, height) = decoder.dimensions()?;
    Ok((height as usize, width as usize))
}

fn sample_data_type<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<DataType> {
    let bits = match decoder.colortype()? {
        tiff::ColorType::Gray(bits) => bits,
        other => return Err(Error::UnsupportedDataType(format!("{:?}", other))),
    };
    // SampleFormat: 1 = unsigned, 2 = signed, 3 = IEEE float
    let format = decoder.get_tag_u32(Tag::SampleFormat).unwrap_or(1);

    match (format, bits) {
        (1, 8) => Ok(DataType::UInt8),
        (1, 16) => Ok(DataType::UInt16),
        (2, 16) => Ok(DataType::Int16),
        (2, 32) => Ok(DataType::Int32),
        (3, 32) => Ok(DataType::Float32),
        (3, 64) => Ok(DataType::Float64),
        _ => Err(Error::UnsupportedDataType(format!(
            "sample format {} with {} bits",
            format, bits
        ))),
    }
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader)?;
    let (rows, cols) = dimensions(&mut decoder)?;

    let data: Vec<T> = match decoder.read_image()? {
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    if data.len() != rows * cols {
        return Err(Error::UnsupportedDataType(format!(
            "expected {} samples for a {}x{} single-band raster, found {}",
            rows * cols,
            cols,
            rows,
            data.len()
        )));
    }

    let profile = read_metadata(&mut decoder, rows, cols);
    let mut raster = Raster::from_vec(data, rows, cols)?;
    raster.set_transform(profile.transform);
    raster.set_crs(profile.crs);
    raster.set_nodata(profile.nodata.and_then(num_traits::cast));

    Ok(raster)
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

/// Georeferencing tags; missing tags fall back to an identity grid
fn read_metadata<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    rows: usize,
    cols: usize,
) -> RasterProfile {
    let transform = match (
        decoder.get_tag_f64_vec(Tag::ModelTiepointTag),
        decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag),
    ) {
        (Ok(tiepoint), Ok(scale)) => GeoTransform::from_tiepoint_scale(&tiepoint, &scale),
        _ => decoder
            .get_tag_f64_vec(Tag::ModelTransformationTag)
            .ok()
            .and_then(|m| GeoTransform::from_model_transformation(&m)),
    }
    .unwrap_or_default();

    let crs = decoder
        .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
        .ok()
        .and_then(|directory| {
            let geokeys = GeoKeys {
                directory,
                doubles: decoder.get_tag_f64_vec(Tag::GeoDoubleParamsTag).unwrap_or_default(),
                ascii: decoder
                    .get_tag_ascii_string(Tag::GeoAsciiParamsTag)
                    .map(|s| s.trim_end_matches(char::from(0)).to_string())
                    .unwrap_or_default(),
            };
            crs_from_geokeys(geokeys)
        });

    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());

    RasterProfile {
        rows,
        cols,
        transform,
        crs,
        nodata,
    }
}

/// Directory entries as `[key, location, count, value_or_offset]`
fn geokey_entries(directory: &[u16]) -> impl Iterator<Item = &[u16]> {
    // Header: KeyDirectoryVersion, KeyRevision, MinorRevision, NumberOfKeys
    let count = directory.get(3).copied().unwrap_or(0) as usize;
    directory
        .get(4..4 + 4 * count)
        .unwrap_or_default()
        .chunks_exact(4)
}

/// Value of a short key stored in the directory itself, unless user-defined
fn short_key(geokeys: &GeoKeys, key: u16) -> Option<u32> {
    geokey_entries(&geokeys.directory)
        .find(|e| e[0] == key && e[1] == 0 && e[3] != USER_DEFINED)
        .map(|e| u32::from(e[3]))
}

/// Citation text a key points at in the ASCII params, without its `|`
fn citation_key(geokeys: &GeoKeys, key: u16) -> Option<String> {
    let entry = geokey_entries(&geokeys.directory)
        .find(|e| e[0] == key && e[1] == ASCII_PARAMS_LOCATION)?;
    let start = entry[3] as usize;
    let text = geokeys.ascii.get(start..start + entry[2] as usize)?;
    Some(text.trim_end_matches('|').to_string())
}

/// Decode the CRS a GeoKey directory describes, keeping the raw keys.
///
/// EPSG codes come from the projected or geographic type keys; user-defined
/// systems are recognised by a WKT citation. Returns `None` when the keys
/// carry nothing beyond the model and raster type.
fn crs_from_geokeys(geokeys: GeoKeys) -> Option<CRS> {
    let epsg = short_key(&geokeys, PROJECTED_CS_TYPE)
        .or_else(|| short_key(&geokeys, GEOGRAPHIC_TYPE));
    let wkt = [PCS_CITATION, GEOG_CITATION, GT_CITATION]
        .into_iter()
        .filter_map(|key| citation_key(&geokeys, key))
        .find(|c| c.contains('['));

    let crs = match (epsg, wkt) {
        (Some(code), _) => CRS::from_epsg(code),
        (None, Some(wkt)) => CRS::from_wkt(wkt),
        (None, None) => {
            let only_model_keys = geokey_entries(&geokeys.directory)
                .all(|e| e[0] == GT_MODEL_TYPE || e[0] == GT_RASTER_TYPE);
            return (!only_model_keys).then(|| CRS::from_geokeys(geokeys));
        }
    };
    Some(crs.with_geokeys(geokeys))
}

fn unrepresentable(crs: &CRS, reason: &str) -> Error {
    Error::InvalidParameter {
        name: "crs",
        value: crs.identifier(),
        reason: reason.to_string(),
    }
}

/// GeoKeys to write for `crs`.
///
/// Keys decoded from a file are reused as they are. Otherwise an EPSG code
/// becomes a projected or geographic type key, and a WKT-only CRS becomes a
/// user-defined system with the WKT as its citation.
fn geokeys_for(crs: Option<&CRS>) -> Result<GeoKeys> {
    let mut directory = Vec::with_capacity(20);
    let mut ascii = String::new();

    let Some(crs) = crs else {
        directory.extend_from_slice(&[1, 1, 0, 2]);
        directory.extend_from_slice(&[GT_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED]);
        directory.extend_from_slice(&[GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA]);
        return Ok(GeoKeys {
            directory,
            doubles: Vec::new(),
            ascii,
        });
    };
    if let Some(keys) = crs.geokeys() {
        return Ok(keys.clone());
    }

    let code = crs.epsg().and_then(|c| u16::try_from(c).ok());
    let (model, type_key, value) = match (code, crs.wkt()) {
        (Some(code), _) if crs.is_geographic() => (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE, code),
        (Some(code), _) => (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE, code),
        (None, Some(wkt)) => {
            if wkt.contains('|') {
                return Err(unrepresentable(crs, "WKT contains the GeoTIFF citation separator '|'"));
            }
            ascii = format!("{}|", wkt);
            let upper = wkt.trim_start().to_ascii_uppercase();
            let geographic = ["GEOGCS", "GEOGCRS", "GEODCRS"]
                .iter()
                .any(|tag| upper.starts_with(tag));
            if geographic {
                (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE, USER_DEFINED)
            } else {
                (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE, USER_DEFINED)
            }
        }
        (None, None) => {
            return Err(unrepresentable(
                crs,
                "no GeoKey, EPSG code below 65536 or WKT to encode",
            ))
        }
    };

    let count = u16::try_from(ascii.len())
        .map_err(|_| unrepresentable(crs, "WKT longer than a GeoKey citation can hold"))?;
    let citation = (!ascii.is_empty()).then_some([GT_CITATION, ASCII_PARAMS_LOCATION, count, 0]);

    directory.extend_from_slice(&[1, 1, 0, 3 + u16::from(citation.is_some())]);
    directory.extend_from_slice(&[GT_MODEL_TYPE, 0, 1, model]);
    directory.extend_from_slice(&[GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA]);
    if let Some(entry) = citation {
        directory.extend_from_slice(&entry);
    }
    directory.extend_from_slice(&[type_key, 0, 1, value]);

    Ok(GeoKeys {
        directory,
        doubles: Vec::new(),
        ascii,
    })
}

/// Write a Raster to a single-band GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    encode_geotiff(raster, &mut writer, &options.unwrap_or_default())?;
    writer.flush()?;
    Ok(())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), &options.unwrap_or_default())?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer)?;
    match options.compression {
        Compression::None => encode_samples(&mut encoder, raster, options, Uncompressed),
        Compression::Lzw => encode_samples(&mut encoder, raster, options, Lzw),
        Compression::Deflate => encode_samples(&mut encoder, raster, options, Deflate::default()),
    }
}

fn encode_samples<T, W, D>(
    encoder: &mut TiffEncoder<W>,
    raster: &Raster<T>,
    options: &GeoTiffOptions,
    compression: D,
) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
    D: TiffCompression,
{
    match options.data_type.unwrap_or(T::DATA_TYPE) {
        DataType::UInt8 => write_image::<T, W, Gray8, D>(encoder, raster, compression),
        DataType::UInt16 => write_image::<T, W, Gray16, D>(encoder, raster, compression),
        DataType::Int16 => write_image::<T, W, GrayI16, D>(encoder, raster, compression),
        DataType::Int32 => write_image::<T, W, GrayI32, D>(encoder, raster, compression),
        DataType::Float32 => write_image::<T, W, Gray32Float, D>(encoder, raster, compression),
        DataType::Float64 => write_image::<T, W, Gray64Float, D>(encoder, raster, compression),
    }
}

fn write_image<T, W, C, D>(encoder: &mut TiffEncoder<W>, raster: &Raster<T>, compression: D) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
    C: ColorType,
    C::Inner: RasterElement,
    [C::Inner]: TiffValue,
    D: TiffCompression,
{
    let (rows, cols) = raster.shape();
    let nodata: Option<C::Inner> = raster.nodata().and_then(num_traits::cast);
    let fallback = nodata.unwrap_or_else(C::Inner::default_nodata);

    let data: Vec<C::Inner> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(fallback))
        .collect();

    let geokeys = geokeys_for(raster.crs())?;
    let transform = raster.transform();

    let mut image = encoder.new_image_with_compression::<C, D>(cols as u32, rows as u32, compression)?;

    if transform.is_north_up() {
        let (tiepoint, scale) = transform.to_tiepoint_scale();
        image.encoder().write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
        image.encoder().write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
    } else {
        let matrix = transform.to_model_transformation();
        image.encoder().write_tag(Tag::ModelTransformationTag, &matrix[..])?;
    }

    image.encoder().write_tag(Tag::GeoKeyDirectoryTag, geokeys.directory.as_slice())?;
    if !geokeys.doubles.is_empty() {
        image.encoder().write_tag(Tag::GeoDoubleParamsTag, geokeys.doubles.as_slice())?;
    }
    if !geokeys.ascii.is_empty() {
        image.encoder().write_tag(Tag::GeoAsciiParamsTag, geokeys.ascii.as_str())?;
    }

    if let Some(nd) = nodata.and_then(RasterElement::to_f64) {
        let text = format!("{}", nd);
        image.encoder().write_tag(Tag::GdalNodata, text.as_str())?;
    }

    image.write_data(&data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_band() -> Raster<u16> {
        let mut raster: Raster<u16> = Raster::new(20, 30);
        raster.set_transform(GeoTransform::new(399_960.0, 5_800_020.0, 10.0, -10.0));
        raster.set_crs(Some(CRS::from_epsg(32633)));
        for row in 0..20 {
            for col in 0..30 {
                raster.set(row, col, (row * 100 + col) as u16).unwrap();
            }
        }
        raster
    }

    #[test]
    fn test_write_read_roundtrip_keeps_georeferencing() {
        let band = sample_band();
        let tmp = NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff(&band, tmp.path(), None).unwrap();

        let loaded: Raster<f64> = read_geotiff(tmp.path()).unwrap();
        assert_eq!(loaded.shape(), (20, 30));
        assert_eq!(loaded.get(7, 11).unwrap(), 711.0);
        assert_eq!(loaded.transform(), band.transform());
        assert_eq!(loaded.crs(), Some(&CRS::from_epsg(32633)));
    }

    #[test]
    fn test_info_reports_type_and_compression() {
        let band = sample_band();
        let tmp = NamedTempFile::with_suffix(".tif").unwrap();
        let options = GeoTiffOptions {
            compression: Compression::Deflate,
            data_type: Some(DataType::Float32),
        };
        write_geotiff(&band, tmp.path(), Some(options)).unwrap();

        let info = read_info(tmp.path()).unwrap();
        assert_eq!(info.data_type, DataType::Float32);
        assert_eq!(info.compression, Some(Compression::Deflate));
        assert_eq!(info.samples_per_pixel, 1);
        assert_eq!(info.profile.shape(), (20, 30));
    }

    #[test]
    fn test_u8_lzw_with_nodata() {
        let mut classes: Raster<u8> = Raster::filled(8, 8, 2);
        classes.set_crs(Some(CRS::wgs84()));
        classes.set_nodata(Some(0));
        classes.set(0, 0, 0).unwrap();

        let buf = write_geotiff_to_buffer(&classes, None).unwrap();
        let loaded: Raster<u8> = read_geotiff_from_buffer(&buf).unwrap();

        assert_eq!(loaded.nodata(), Some(0));
        assert_eq!(loaded.crs(), Some(&CRS::wgs84()));
        assert_eq!(loaded.get(0, 0).unwrap(), 0);
        assert_eq!(loaded.get(7, 7).unwrap(), 2);
    }

    const LOCAL_WKT: &str = r#"PROJCS["Local grid",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["Central_Meridian",15.5],UNIT["Meter",1.0]]"#;

    /// User-defined projection with a linear unit size in the double params
    #[rustfmt::skip]
    fn custom_keys() -> GeoKeys {
        GeoKeys {
            directory: vec![
                1, 1, 0, 5,
                GT_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED,
                GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
                GT_CITATION, ASCII_PARAMS_LOCATION, 12, 0,
                PROJECTED_CS_TYPE, 0, 1, USER_DEFINED,
                3076, 34736, 1, 0,
            ],
            doubles: vec![0.3048],
            ascii: "Survey grid|".to_string(),
        }
    }

    fn roundtrip(raster: &Raster<u16>) -> Raster<u16> {
        let buf = write_geotiff_to_buffer(raster, None).unwrap();
        read_geotiff_from_buffer(&buf).unwrap()
    }

    #[test]
    fn test_geokeys_roundtrip() {
        let decode = |crs: Option<&CRS>| crs_from_geokeys(geokeys_for(crs).unwrap());
        let projected = CRS::from_epsg(32633);
        assert_eq!(decode(Some(&projected)), Some(projected));
        assert_eq!(decode(Some(&CRS::wgs84())), Some(CRS::wgs84()));
        assert_eq!(decode(None), None);
    }

    #[test]
    fn test_wkt_crs_roundtrip() {
        let mut band = sample_band();
        band.set_crs(Some(CRS::from_wkt(LOCAL_WKT)));
        let loaded = roundtrip(&band);

        let crs = loaded.crs().unwrap();
        assert_eq!(crs.wkt(), Some(LOCAL_WKT));
        assert_eq!(crs.epsg(), None);
        assert_eq!(crs, band.crs().unwrap());
    }

    #[test]
    fn test_rotated_transform_roundtrip() {
        let mut band = sample_band();
        let rotated = GeoTransform {
            row_rotation: 2.0,
            col_rotation: -1.5,
            ..*band.transform()
        };
        band.set_transform(rotated);
        assert_eq!(roundtrip(&band).transform(), &rotated);

        let south_up = GeoTransform::new(0.0, 0.0, 10.0, 10.0);
        band.set_transform(south_up);
        assert_eq!(roundtrip(&band).transform(), &south_up);
    }

    #[test]
    fn test_raw_geokeys_written_back_unchanged() {
        let mut band = sample_band();
        band.set_crs(Some(CRS::from_geokeys(custom_keys())));

        let once = roundtrip(&band);
        let crs = once.crs().unwrap();
        assert_eq!(crs.geokeys(), Some(&custom_keys()));
        // The citation is plain text, not WKT
        assert_eq!(crs.wkt(), None);

        let twice = roundtrip(&once);
        assert_eq!(twice.crs().unwrap().geokeys(), Some(&custom_keys()));
    }

    #[test]
    fn test_epsg_keys_are_kept_verbatim() {
        let mut band = sample_band();
        band.set_crs(Some(CRS::from_epsg(32633)));
        let once = roundtrip(&band);
        let keys = once.crs().unwrap().geokeys().cloned().unwrap();
        assert_eq!(keys, geokeys_for(Some(&CRS::from_epsg(32633))).unwrap());
        assert_eq!(roundtrip(&once).crs().unwrap().geokeys(), Some(&keys));
    }

    #[test]
    fn test_unrepresentable_crs_is_an_error() {
        let mut band = sample_band();
        band.set_crs(Some(CRS::from_epsg(100_000)));
        assert!(matches!(
            write_geotiff_to_buffer(&band, None),
            Err(Error::InvalidParameter { name: "crs", .. })
        ));

        band.set_crs(Some(CRS::from_wkt("LOCAL_CS[\"a|b\"]")));
        assert!(matches!(
            write_geotiff_to_buffer(&band, None),
            Err(Error::InvalidParameter { name: "crs", .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result: Result<Raster<f64>> = read_geotiff("/nonexistent/band.tif");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
