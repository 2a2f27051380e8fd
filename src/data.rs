use crate::crs::Crs;
use crate::types::{Listing, PointOfInterest, RawPoint, Tract};
use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use geo::{Area, MultiPolygon};
use serde::Serialize;
use shapefile::Reader;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

/// Opens a text file, transparently decompressing `.gz`.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Output text file. Gzip output must be closed with [`TextWriter::finish`]
/// so that a failure while writing the trailer is reported.
pub enum TextWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl TextWriter {
    /// Flushes everything, completing the gzip stream first.
    pub fn finish(self) -> io::Result<()> {
        match self {
            TextWriter::Plain(mut w) => w.flush(),
            TextWriter::Gzip(gz) => gz.finish()?.flush(),
        }
    }
}

impl Write for TextWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TextWriter::Plain(w) => w.write(buf),
            TextWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TextWriter::Plain(w) => w.flush(),
            TextWriter::Gzip(w) => w.flush(),
        }
    }
}

/// Creates a text file, gzip-compressing when the name ends in `.gz`.
pub fn create_text(path: &Path) -> Result<TextWriter> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    if is_gzip(path) {
        Ok(TextWriter::Gzip(GzEncoder::new(BufWriter::new(file), Compression::default())))
    } else {
        Ok(TextWriter::Plain(BufWriter::new(file)))
    }
}

/// Reads a JSON-lines file, one `T` per non-blank line.
pub fn read_json_lines<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let reader = open_text(path)?;
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {:?}", path))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("Malformed JSON on line {} of {:?}", line_no + 1, path))?;
        records.push(record);
    }
    Ok(records)
}

pub fn write_json_lines<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut writer = create_text(path)?;
    for record in records {
        serde_json::to_writer(&mut writer, record)
            .with_context(|| format!("Failed to serialize record for {:?}", path))?;
        writer.write_all(b"\n")?;
    }
    writer.finish().with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

pub fn load_points(path: &Path) -> Result<Vec<PointOfInterest>> {
    let raw: Vec<RawPoint> = read_json_lines(path)?;
    let points: Vec<PointOfInterest> = raw.into_iter().map(PointOfInterest::from).collect();
    info!("Loaded {} points from {:?}", points.len(), path);
    Ok(points)
}

pub fn load_listings(path: &Path) -> Result<Vec<Listing>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut listings = Vec::new();
    for (row, result) in rdr.deserialize().enumerate() {
        let listing: Listing =
            result.with_context(|| format!("Malformed listing on row {} of {:?}", row + 1, path))?;
        listings.push(listing);
    }
    info!("Loaded {} listings from {:?}", listings.len(), path);
    Ok(listings)
}

/// Loads tract polygons (Shapefile or GeoJSON) that are stored in `crs`.
///
/// Areas are computed in that CRS, so it has to be a projected one.
pub fn load_tracts(path: &Path, id_column: &str, crs: &Crs) -> Result<Vec<Tract>> {
    if crs.is_geographic() {
        return Err(anyhow!(
            "Tract CRS {} is geographic; areas need a projected CRS",
            crs
        ));
    }

    let extension = path.extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input geometry file has no extension"))?;

    let shapes = match extension.as_str() {
        "shp" => read_shapefile_polygons(path, id_column)?,
        "json" | "geojson" => read_geojson_polygons(path, id_column)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    let tracts: Vec<Tract> = shapes
        .into_iter()
        .map(|(id, geometry)| {
            let area_km2 = geometry.unsigned_area() * 1e-6;
            Tract { id, geometry, area_km2 }
        })
        .collect();

    info!("Loaded {} tracts from {:?}", tracts.len(), path);
    Ok(tracts)
}

pub(crate) fn dbase_text(value: &shapefile::dbase::FieldValue) -> Option<String> {
    use shapefile::dbase::FieldValue;
    match value {
        FieldValue::Character(Some(s)) => Some(s.trim().to_string()),
        FieldValue::Numeric(Some(n)) => Some(n.to_string()),
        FieldValue::Float(Some(n)) => Some(n.to_string()),
        FieldValue::Integer(n) => Some(n.to_string()),
        _ => None,
    }
}

fn shape_to_multipolygon(shape: shapefile::Shape) -> Result<Option<MultiPolygon<f64>>> {
    let geometry: MultiPolygon<f64> = match shape {
        shapefile::Shape::Polygon(polygon) => polygon.try_into()
            .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
        shapefile::Shape::PolygonM(polygon) => polygon.try_into()
            .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
        shapefile::Shape::PolygonZ(polygon) => polygon.try_into()
            .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
        _ => return Ok(None), // Skip non-polygon shapes
    };
    Ok(Some(geometry))
}

/// Every polygon record of a shapefile as (id, geometry, record).
pub fn read_shapefile_records(
    path: &Path,
    id_column: &str,
) -> Result<Vec<(String, MultiPolygon<f64>, shapefile::dbase::Record)>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut out = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let id_value = record.get(id_column)
            .ok_or_else(|| anyhow!("Id column '{}' not found in Shapefile", id_column))?;
        let Some(id) = dbase_text(id_value) else {
            debug!("Skipping shapefile record with empty id");
            continue;
        };

        if let Some(geometry) = shape_to_multipolygon(shape)? {
            out.push((id, geometry, record));
        }
    }
    Ok(out)
}

fn read_shapefile_polygons(path: &Path, id_column: &str) -> Result<Vec<(String, MultiPolygon<f64>)>> {
    Ok(read_shapefile_records(path, id_column)?
        .into_iter()
        .map(|(id, geometry, _)| (id, geometry))
        .collect())
}

fn read_geojson_polygons(path: &Path, id_column: &str) -> Result<Vec<(String, MultiPolygon<f64>)>> {
    use geojson::GeoJson;

    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let reader = BufReader::new(file);

    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut out = Vec::new();
    for feature in collection.features {
        let id_val = feature.properties.as_ref()
            .and_then(|props| props.get(id_column));

        let id = match id_val {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => continue, // Skip if no ID or not string/number
        };

        let geometry = match feature.geometry {
            Some(geo) => {
                let valid_geo: geo::Geometry<f64> = geo.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            }
            None => continue,
        };

        out.push((id, geometry));
    }
    Ok(out)
}

/// Writes tracts as a GeoJSON FeatureCollection with a single id property.
pub fn write_tracts_geojson(path: &Path, id_column: &str, tracts: &[(String, MultiPolygon<f64>)]) -> Result<()> {
    use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};

    let features = tracts
        .iter()
        .map(|(id, geometry)| {
            let mut properties = JsonObject::new();
            properties.insert(id_column.to_string(), serde_json::Value::String(id.clone()));
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::from(geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let collection = GeoJson::from(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    });

    let mut writer = create_text(path)?;
    writer.write_all(collection.to_string().as_bytes())?;
    writer.finish().with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use std::io::Read;

    const SQUARE_TRACTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"CTUID": "9330001.01"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1000,0],[1000,1000],[0,1000],[0,0]]]}},
            {"type": "Feature", "properties": {"CTUID": 9330002},
             "geometry": {"type": "MultiPolygon", "coordinates": [[[[1000,0],[3000,0],[3000,1000],[1000,1000],[1000,0]]]]}},
            {"type": "Feature", "properties": {"OTHER": "x"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}},
            {"type": "Feature", "properties": {"CTUID": "line"},
             "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]}}
        ]
    }"#;

    #[test]
    fn geojson_tracts_get_ids_and_areas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracts.geojson");
        std::fs::write(&path, SQUARE_TRACTS).unwrap();

        let tracts = load_tracts(&path, "CTUID", &Crs::from_epsg(3347).unwrap()).unwrap();
        assert_eq!(tracts.len(), 2);
        assert_eq!(tracts[0].id, "9330001.01");
        assert_eq!(tracts[1].id, "9330002");
        assert!((tracts[0].area_km2 - 1.0).abs() < 1e-9);
        assert!((tracts[1].area_km2 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn geographic_tract_crs_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracts.geojson");
        std::fs::write(&path, SQUARE_TRACTS).unwrap();
        assert!(load_tracts(&path, "CTUID", &Crs::Wgs84).is_err());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_tracts(Path::new("tracts.kml"), "CTUID", &Crs::WebMercator).unwrap_err();
        assert!(err.to_string().contains("Unsupported geometry format"));
    }

    #[test]
    fn finished_gzip_stream_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json.gz");
        let mut writer = create_text(&path).unwrap();
        writer.write_all(b"{\"lat\":1,\"lon\":2}\n").unwrap();
        writer.finish().unwrap();

        // the decoder fails on a truncated stream without a trailer
        let mut text = String::new();
        GzDecoder::new(File::open(&path).unwrap()).read_to_string(&mut text).unwrap();
        assert_eq!(text, "{\"lat\":1,\"lon\":2}\n");
    }

    #[test]
    fn gzipped_json_lines_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.json.gz");
        let rows = vec![
            serde_json::json!({"lat": 49.28, "lon": -123.12, "name": "A", "brand": "X"}),
            serde_json::json!({"lat": 49.29, "lon": -123.11, "name": "", "amenity": "cafe"}),
        ];
        write_json_lines(&path, &rows).unwrap();

        // really compressed
        let mut magic = [0u8; 2];
        File::open(&path).unwrap().read_exact(&mut magic).unwrap();
        assert_eq!(magic, [0x1f, 0x8b]);

        let points = load_points(&path).unwrap();
        assert_eq!(points.len(), 2);
        assert!(points[0].is_chain());
        assert_eq!(points[1].name, None);
        assert_eq!(points[1].amenity.as_deref(), Some("cafe"));
    }

    #[test]
    fn malformed_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.json");
        std::fs::write(&path, "{\"lat\":1,\"lon\":2}\n\nnot json\n").unwrap();
        let err = load_points(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("line 3"));
    }

    #[test]
    fn listings_ignore_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.csv");
        std::fs::write(
            &path,
            "id,name,host_id,latitude,longitude,price\n1,Cozy loft,7,49.28,-123.12,120\n2,Suite,8,49.26,-123.10,90\n",
        )
        .unwrap();
        let listings = load_listings(&path).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].name, "Cozy loft");
        assert_eq!(listings[1].id.as_deref(), Some("2"));
        assert_eq!(listings[1].location().y(), 49.26);
    }

    #[test]
    fn geojson_writer_output_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        let square = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 2000.0, y: 0.0), (x: 2000.0, y: 500.0), (x: 0.0, y: 500.0), (x: 0.0, y: 0.0),
        ]]);
        write_tracts_geojson(&path, "CTUID", &[("42".to_string(), square)]).unwrap();

        let tracts = load_tracts(&path, "CTUID", &Crs::WebMercator).unwrap();
        assert_eq!(tracts.len(), 1);
        assert_eq!(tracts[0].id, "42");
        assert!((tracts[0].area_km2 - 1.0).abs() < 1e-9);
    }
}
