//! Input preparation: OSM extract conversion, metro tract extraction,
//! amenity categorization and listing cleanup.

use crate::config::{CategoryConfig, ListingFilterConfig};
use crate::data::{self, create_text, open_text};
use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type JsonObject = Map<String, Value>;

fn attribute(element: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn node_object(element: &BytesStart) -> Result<JsonObject> {
    let coordinate = |name: &str| -> Result<f64> {
        let raw = attribute(element, name.as_bytes())?
            .ok_or_else(|| anyhow!("<node> without a {} attribute", name))?;
        raw.parse::<f64>()
            .with_context(|| format!("Bad {} value '{}'", name, raw))
    };

    let mut node = JsonObject::new();
    node.insert("lat".into(), Value::from(coordinate("lat")?));
    node.insert("lon".into(), Value::from(coordinate("lon")?));
    for key in ["timestamp", "amenity", "name"] {
        node.insert(key.into(), Value::String(String::new()));
    }
    Ok(node)
}

fn write_node(writer: &mut impl Write, node: &JsonObject) -> Result<()> {
    serde_json::to_writer(&mut *writer, node)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Converts every `<node>` of an OSM XML file to one JSON object per line:
/// `lat`, `lon`, empty `timestamp`/`amenity`/`name` defaults, then each
/// `<tag k v>` as a string field. Returns the number of nodes written.
pub fn osm_to_json(input: &Path, output: &Path) -> Result<usize> {
    let mut reader = Reader::from_reader(open_text(input)?);
    reader.trim_text(true);
    let mut writer = create_text(output)?;

    let mut buf = Vec::new();
    let mut current: Option<JsonObject> = None;
    let mut written = 0;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .with_context(|| format!("Malformed XML at byte {} of {:?}", reader.buffer_position(), input))?;
        match event {
            Event::Start(e) if e.name().as_ref() == b"node" => current = Some(node_object(&e)?),
            Event::Empty(e) if e.name().as_ref() == b"node" => {
                write_node(&mut writer, &node_object(&e)?)?;
                written += 1;
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"tag" => {
                if let Some(node) = current.as_mut() {
                    let key = attribute(&e, b"k")?;
                    let value = attribute(&e, b"v")?;
                    match (key, value) {
                        (Some(k), Some(v)) => {
                            node.insert(k, Value::String(v));
                        }
                        _ => debug!("Skipping <tag> without k or v"),
                    }
                }
            }
            Event::End(e) if e.name().as_ref() == b"node" => {
                if let Some(node) = current.take() {
                    write_node(&mut writer, &node)?;
                    written += 1;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    writer.finish().with_context(|| format!("Failed to write {:?}", output))?;
    info!("Converted {} OSM nodes from {:?}", written, input);
    Ok(written)
}

/// Tracts of one census metropolitan area (`CMANAME`), as (id, geometry).
pub fn select_metro(
    records: Vec<(String, MultiPolygon<f64>, shapefile::dbase::Record)>,
    metro: &str,
) -> Vec<(String, MultiPolygon<f64>)> {
    records
        .into_iter()
        .filter(|(_, _, record)| {
            record
                .get("CMANAME")
                .and_then(data::dbase_text)
                .is_some_and(|name| name == metro)
        })
        .map(|(id, geometry, _)| (id, geometry))
        .collect()
}

/// Extracts one metropolitan area's tracts from a national shapefile into
/// a GeoJSON file keeping only the id column. Returns the tract count.
pub fn extract_tracts(shapefile: &Path, output: &Path, metro: &str, id_column: &str) -> Result<usize> {
    let records = data::read_shapefile_records(shapefile, id_column)?;
    let total = records.len();
    let selected = select_metro(records, metro);
    if selected.is_empty() {
        return Err(anyhow!("No tracts with CMANAME '{}' in {:?}", metro, shapefile));
    }
    data::write_tracts_geojson(output, id_column, &selected)?;
    info!("Kept {} of {} tracts for {}", selected.len(), total, metro);
    Ok(selected.len())
}

/// Splits an amenity dump into one file per category, adding a `category`
/// field. Amenities outside every category are dropped; empty categories
/// produce no file.
pub fn categorize(
    input: &Path,
    categories: &CategoryConfig,
    file_for: impl Fn(&str) -> PathBuf,
) -> Result<Vec<PathBuf>> {
    let rows: Vec<JsonObject> = data::read_json_lines(input)?;
    let total = rows.len();

    let mut groups: BTreeMap<&str, Vec<JsonObject>> = BTreeMap::new();
    for mut row in rows {
        let Some(category) = row.get("amenity").and_then(Value::as_str).and_then(|a| categories.category_of(a)) else {
            continue;
        };
        row.insert("category".into(), Value::String(category.to_string()));
        groups.entry(category).or_default().push(row);
    }

    let mut written = Vec::new();
    for (category, rows) in &groups {
        let path = file_for(category);
        data::write_json_lines(&path, rows)?;
        info!("{}: {} amenities -> {:?}", category, rows.len(), path);
        written.push(path);
    }
    let kept: usize = groups.values().map(Vec::len).sum();
    debug!("{} of {} amenities fall outside every category", total - kept, total);
    Ok(written)
}

const REQUIRED: [&str; 4] = ["name", "price", "number_of_reviews", "reviews_per_month"];

/// Cleans the raw listings CSV: drops duplicate ids (first kept), rows
/// missing a required value and rows failing the review, stay-length and
/// availability thresholds; removes the `host_name` column.
/// Returns (kept, read).
pub fn clean_listings(input: &Path, output: &Path, filter: &ListingFilterConfig) -> Result<(usize, usize)> {
    let mut rdr = csv::Reader::from_path(input)
        .with_context(|| format!("Failed to open CSV file: {:?}", input))?;
    let headers = rdr.headers()?.clone();
    let column = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("Column '{}' not found in {:?}", name, input))
    };
    let id = column("id")?;
    let required: Vec<usize> = REQUIRED.iter().map(|&c| column(c)).collect::<Result<_>>()?;
    let reviews = column("number_of_reviews")?;
    let per_month = column("reviews_per_month")?;
    let min_nights = column("minimum_nights")?;
    let availability = column("availability_365")?;
    let host_name = headers.iter().position(|h| h == "host_name");

    let keep_columns: Vec<usize> = (0..headers.len()).filter(|&i| Some(i) != host_name).collect();
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create CSV file: {:?}", output))?;
    writer.write_record(keep_columns.iter().map(|&i| &headers[i]))?;

    let number = |record: &csv::StringRecord, i: usize| record.get(i).and_then(|v| v.trim().parse::<f64>().ok());

    let mut seen: HashSet<String> = HashSet::new();
    let (mut read, mut kept) = (0, 0);
    for (row, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Malformed CSV on row {} of {:?}", row + 1, input))?;
        read += 1;

        if !seen.insert(record.get(id).unwrap_or_default().to_string()) {
            continue;
        }
        if required.iter().any(|&i| record.get(i).map_or(true, |v| v.trim().is_empty())) {
            continue;
        }
        let passes = number(&record, reviews).is_some_and(|v| v >= filter.min_reviews)
            && number(&record, per_month).is_some_and(|v| v >= filter.min_reviews_per_month)
            && number(&record, min_nights).is_some_and(|v| v <= filter.max_minimum_nights)
            && number(&record, availability).is_some_and(|v| v >= filter.min_availability);
        if !passes {
            continue;
        }

        writer.write_record(keep_columns.iter().map(|&i| record.get(i).unwrap_or_default()))?;
        kept += 1;
    }
    writer.flush()?;

    if kept == 0 {
        warn!("No listing in {:?} passed the filters", input);
    }
    info!("Kept {} of {} listings", kept, read);
    Ok((kept, read))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use shapefile::dbase::{FieldValue, Record};
    use std::fs;

    #[test]
    fn osm_nodes_become_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("restaurants.osm");
        let output = dir.path().join("restaurants.json.gz");
        fs::write(
            &input,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6">
  <node id="1" lat="49.2827" lon="-123.1207">
    <tag k="amenity" v="restaurant"/>
    <tag k="name" v="Tom &amp; Jerry's"/>
    <tag k="brand" v="T&amp;J"/>
  </node>
  <node id="2" lat="49.25" lon="-123.10"/>
  <way id="3"><nd ref="1"/><tag k="name" v="ignored"/></way>
</osm>"#,
        )
        .unwrap();

        assert_eq!(osm_to_json(&input, &output).unwrap(), 2);
        let rows: Vec<JsonObject> = data::read_json_lines(&output).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["lat"], 49.2827);
        assert_eq!(rows[0]["name"], "Tom & Jerry's");
        assert_eq!(rows[0]["brand"], "T&J");
        assert_eq!(rows[0]["timestamp"], "");
        assert_eq!(rows[1]["amenity"], "");
        assert_eq!(rows[1]["name"], "");

        // the converted file loads as points
        let points = data::load_points(&output).unwrap();
        assert!(points[0].is_chain());
        assert_eq!(points[1].name, None);
    }

    #[test]
    fn node_without_coordinates_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.osm");
        fs::write(&input, r#"<osm><node id="1" lat="49.0"/></osm>"#).unwrap();
        assert!(osm_to_json(&input, &dir.path().join("out.json")).is_err());
    }

    fn record(metro: &str) -> Record {
        let mut record = Record::default();
        record.insert("CMANAME".to_string(), FieldValue::Character(Some(metro.to_string())));
        record
    }

    #[test]
    fn metro_selection_matches_exact_name() {
        let shape = MultiPolygon::new(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)]]);
        let records = vec![
            ("9330001.00".to_string(), shape.clone(), record("Vancouver")),
            ("5350001.00".to_string(), shape.clone(), record("Toronto")),
            ("9330002.00".to_string(), shape.clone(), record("Vancouver")),
            ("9350001.00".to_string(), shape, record("North Vancouver")),
        ];
        let ids: Vec<String> = select_metro(records, "Vancouver").into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["9330001.00", "9330002.00"]);
    }

    #[test]
    fn amenities_are_split_by_category() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("amenities.json.gz");
        let rows = vec![
            serde_json::json!({"lat": 49.0, "lon": -123.0, "amenity": "cafe", "name": "A"}),
            serde_json::json!({"lat": 49.0, "lon": -123.0, "amenity": "pub", "name": "B"}),
            serde_json::json!({"lat": 49.0, "lon": -123.0, "amenity": "bench"}),
            serde_json::json!({"lat": 49.0, "lon": -123.0, "amenity": "fast_food", "name": "C"}),
            serde_json::json!({"lat": 49.0, "lon": -123.0, "name": "no amenity"}),
        ];
        data::write_json_lines(&input, &rows).unwrap();

        let out = dir.path().to_path_buf();
        let written = categorize(&input, &CategoryConfig::default(), |c| out.join(format!("data_{}.json.gz", c))).unwrap();
        assert_eq!(written, vec![out.join("data_entertainment.json.gz"), out.join("data_food.json.gz")]);

        let food: Vec<JsonObject> = data::read_json_lines(&out.join("data_food.json.gz")).unwrap();
        assert_eq!(food.len(), 2);
        assert!(food.iter().all(|r| r["category"] == "food"));
        assert!(!out.join("data_schools.json.gz").exists());
    }

    #[test]
    fn listings_are_deduplicated_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("listings.csv");
        let output = dir.path().join("cleaned").join("listings.csv");
        fs::write(
            &input,
            "id,name,host_name,latitude,longitude,price,minimum_nights,number_of_reviews,reviews_per_month,availability_365\n\
             1,Loft,Ann,49.28,-123.12,100,2,50,1.5,200\n\
             1,Loft again,Ann,49.28,-123.12,100,2,50,1.5,200\n\
             2,,Bob,49.28,-123.12,100,2,50,1.5,200\n\
             3,Few reviews,Cy,49.28,-123.12,100,2,3,1.5,200\n\
             4,Long stay,Di,49.28,-123.12,100,90,50,1.5,200\n\
             5,Booked up,Ed,49.28,-123.12,100,2,50,1.5,5\n\
             6,\"Suite, view\",Fi,49.29,-123.11,250,30,10,0.5,30\n\
             7,No price,Gu,49.29,-123.11,,3,40,2.0,100\n",
        )
        .unwrap();

        let (kept, read) = clean_listings(&input, &output, &ListingFilterConfig::default()).unwrap();
        assert_eq!((kept, read), (2, 8));

        let mut rdr = csv::Reader::from_path(&output).unwrap();
        assert!(!rdr.headers().unwrap().iter().any(|h| h == "host_name"));
        let names: Vec<String> = rdr.records().map(|r| r.unwrap()[1].to_string()).collect();
        assert_eq!(names, vec!["Loft", "Suite, view"]);

        // the cleaned file feeds the listing loader
        let listings = data::load_listings(&output).unwrap();
        assert_eq!(listings[1].id.as_deref(), Some("6"));
    }

    #[test]
    fn listings_without_a_required_column_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("listings.csv");
        fs::write(&input, "id,name\n1,Loft\n").unwrap();
        assert!(clean_listings(&input, &dir.path().join("out.csv"), &ListingFilterConfig::default()).is_err());
    }
}
