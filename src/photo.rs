//! GPS positions from JPEG EXIF metadata.

use anyhow::{anyhow, Context, Result};
use exif::{Exif, In, Tag, Value};
use geo::Point;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::warn;

/// JPEG files directly inside `dir`, sorted by file name.
pub fn list_photos(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut photos = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read photo directory {:?}", dir))? {
        let path = entry?.path();
        let is_jpeg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
        if is_jpeg && path.is_file() {
            photos.push(path);
        }
    }
    photos.sort();
    Ok(photos)
}

/// The photo's location, or `None` when it carries no usable GPS tags.
/// Unreadable files count as untagged; the reason is logged.
pub fn read_photo_gps(path: &Path) -> Option<Point<f64>> {
    match try_read_gps(path) {
        Ok(Some(point)) => Some(point),
        Ok(None) => {
            warn!("No GPS coordinates in {:?}; the photo may not be geotagged", path);
            None
        }
        Err(e) => {
            warn!("Error reading GPS data from {:?}: {:#}", path, e);
            None
        }
    }
}

fn try_read_gps(path: &Path) -> Result<Option<Point<f64>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| anyhow!("No EXIF data: {}", e))?;

    let lat = coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S');
    let lon = coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W');
    Ok(match (lat, lon) {
        (Some(lat), Some(lon)) => Some(Point::new(lon, lat)),
        _ => None,
    })
}

fn coordinate(exif: &Exif, value_tag: Tag, ref_tag: Tag, negative_ref: u8) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let degrees = match &field.value {
        Value::Rational(parts) if !parts.is_empty() => {
            let dms: Vec<f64> = parts.iter().map(|r| r.to_f64()).collect();
            dms_to_degrees(&dms)
        }
        _ => return None,
    };
    let negative = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|f| match &f.value {
            Value::Ascii(strings) => strings.first().and_then(|s| s.first()).copied(),
            _ => None,
        })
        .is_some_and(|c| c.eq_ignore_ascii_case(&negative_ref));
    Some(if negative { -degrees } else { degrees })
}

/// Degrees, minutes, seconds (any prefix of them) to decimal degrees.
pub fn dms_to_degrees(dms: &[f64]) -> f64 {
    dms.iter()
        .zip([1.0, 60.0, 3600.0])
        .map(|(v, div)| v / div)
        .sum()
}

/// A minimal JPEG whose only content is an EXIF block with GPS tags.
#[cfg(test)]
pub(crate) fn geotagged_jpeg(lat: f64, lon: f64) -> Vec<u8> {
    use exif::experimental::Writer;
    use exif::{Field, Rational};

    fn dms(v: f64) -> Value {
        let v = v.abs();
        let deg = v.trunc();
        let min = ((v - deg) * 60.0).trunc();
        let sec = ((v - deg) * 60.0 - min) * 60.0;
        Value::Rational(vec![
            Rational { num: deg as u32, denom: 1 },
            Rational { num: min as u32, denom: 1 },
            Rational { num: (sec * 10_000.0).round() as u32, denom: 10_000 },
        ])
    }
    let ascii = |s: &str| Value::Ascii(vec![s.as_bytes().to_vec()]);
    let fields = [
        Field { tag: Tag::GPSLatitudeRef, ifd_num: In::PRIMARY, value: ascii(if lat < 0.0 { "S" } else { "N" }) },
        Field { tag: Tag::GPSLatitude, ifd_num: In::PRIMARY, value: dms(lat) },
        Field { tag: Tag::GPSLongitudeRef, ifd_num: In::PRIMARY, value: ascii(if lon < 0.0 { "W" } else { "E" }) },
        Field { tag: Tag::GPSLongitude, ifd_num: In::PRIMARY, value: dms(lon) },
    ];
    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut tiff = std::io::Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
    let len = (2 + 6 + tiff.len()) as u16;
    jpeg.extend_from_slice(&len.to_be_bytes());
    jpeg.extend_from_slice(b"Exif\0\0");
    jpeg.extend_from_slice(&tiff);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}
