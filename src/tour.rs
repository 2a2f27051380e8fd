//! Tour planning helpers: the listing with the most amenities of a
//! category nearby, and the amenities around each geotagged photo.

use crate::data;
use crate::distance::{count_within_radius, within_radius};
use crate::photo::{list_photos, read_photo_gps};
use crate::session::Session;
use crate::types::{AmenityMatch, PointOfInterest};
use crate::webmap::{Layer, Marker, MarkerStyle, WebMap};
use anyhow::{anyhow, Context, Result};
use geo::Point;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

const MAP_ZOOM: u8 = 15;

#[derive(Debug, Serialize)]
struct ListingCount<'a> {
    id: Option<&'a str>,
    name: &'a str,
    latitude: f64,
    longitude: f64,
    amenities_within: usize,
}

/// Counts amenities of `category` within `radius_m` of every listing and
/// maps the listing with the highest count (the first one on ties).
pub fn find_airbnb(session: &mut Session, radius_m: f64, category: &str) -> Result<PathBuf> {
    let listings = data::load_listings(&session.config.input.listings)?;
    if listings.is_empty() {
        return Err(anyhow!("No listings in {:?}", session.config.input.listings));
    }
    let amenities = data::load_points(&session.config.category_file(category))
        .with_context(|| format!("Failed to load amenities for category '{}'", category))?;
    let locations: Vec<Point<f64>> = amenities.iter().map(|a| a.location).collect();

    let counts: Vec<usize> = listings
        .par_iter()
        .map(|listing| count_within_radius(listing.location(), &locations, radius_m))
        .collect::<Result<_, _>>()?;

    let mut best = 0;
    for (i, count) in counts.iter().enumerate() {
        if *count > counts[best] {
            best = i;
        }
    }
    let top = &listings[best];
    info!("{} has {} {} amenities within {} m", top.name, counts[best], category, radius_m);

    let rows: Vec<ListingCount> = listings
        .iter()
        .zip(&counts)
        .map(|(l, &amenities_within)| ListingCount {
            id: l.id.as_deref(),
            name: &l.name,
            latitude: l.latitude,
            longitude: l.longitude,
            amenities_within,
        })
        .collect();
    let counts_path = session.data(&format!("listing_counts_{}.csv", category));
    let mut writer = csv::Writer::from_path(&counts_path)
        .with_context(|| format!("Failed to create CSV file: {:?}", counts_path))?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    session.record(&counts_path);

    let mut map = WebMap::new(format!("{} near {}", category, top.name), top.location(), MAP_ZOOM);
    map.add(Layer::Markers {
        markers: vec![Marker::new(top.location(), MarkerStyle::Dot { color: "red".into() }).with_popup(&top.name)],
    });
    map.add(Layer::Cluster {
        markers: amenities.iter().map(amenity_marker).collect(),
    });
    info!("Mapping {} markers", map.marker_count());

    let map_path = session.map(&format!("map_{}_hotels.html", category));
    map.save(&map_path)?;
    session.record(&map_path);
    println!("\nMap generated: {}", map_path.display());
    Ok(map_path)
}

fn amenity_marker(amenity: &PointOfInterest) -> Marker {
    let marker = Marker::new(amenity.location, MarkerStyle::Pin);
    match &amenity.name {
        Some(name) => marker.with_popup(name),
        None => marker,
    }
}

/// First letter upper-cased, the rest lower-cased.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Finds amenities of `amenity_type` within `radius_m` of every geotagged
/// photo in `photo_dir`, saves the matches per photo and maps them all.
pub fn find_amenity(session: &mut Session, photo_dir: &Path, radius_m: f64, amenity_type: &str) -> Result<PathBuf> {
    let photos = list_photos(photo_dir)?;
    let amenities: Vec<PointOfInterest> = data::load_points(&session.config.category_file(amenity_type))?
        .into_iter()
        .filter(|a| a.name.is_some())
        .collect();
    let locations: Vec<Point<f64>> = amenities.iter().map(|a| a.location).collect();

    let photo_style = match &session.config.output.photo_icon {
        Some(url) => MarkerStyle::Image { url: url.clone(), size: 30 },
        None => MarkerStyle::Dot { color: "green".into() },
    };

    let mut map: Option<WebMap> = None;
    let mut markers = Vec::new();
    for photo in &photos {
        let file_name = photo.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let Some(position) = read_photo_gps(photo) else {
            continue;
        };
        println!("\nGPS coordinates read from {}: ({}, {})", file_name, position.y(), position.x());

        let matches: Vec<AmenityMatch> = within_radius(position, &locations, radius_m)?
            .into_iter()
            .map(|(i, distance)| AmenityMatch {
                amenity: amenities[i].amenity.clone(),
                name: amenities[i].name.clone(),
                distance,
                location: amenities[i].location,
            })
            .collect();
        info!("{} {} amenities within {} m of {}", matches.len(), amenity_type, radius_m, file_name);

        let stem = photo.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let matches_path = session.data(&format!("matches_{}_{}.json.gz", amenity_type, stem));
        data::write_json_lines(&matches_path, &matches)?;
        session.record(&matches_path);

        map.get_or_insert_with(|| WebMap::new(format!("{} near photos", amenity_type), position, MAP_ZOOM));
        markers.push(Marker::new(position, photo_style.clone()).with_popup(&file_name));
        for m in &matches {
            let popup = format!(
                "{} ({}) - Distance: {:.2} meters",
                m.name.as_deref().unwrap_or_default(),
                capitalize(m.amenity.as_deref().unwrap_or(amenity_type)),
                m.distance
            );
            markers.push(Marker::new(m.location, MarkerStyle::Pin).with_popup(popup));
        }
    }

    let mut map = map.ok_or_else(|| anyhow!("No photo in {:?} carries GPS coordinates", photo_dir))?;
    map.add(Layer::Markers { markers });
    info!("Mapping {} markers", map.marker_count());

    let dir_name = photo_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photos".to_string());
    let map_path = session.map(&format!("map_{}_{}.html", amenity_type, dir_name));
    map.save(&map_path)?;
    session.record(&map_path);
    println!("\nMap generated: {}", map_path.display());
    Ok(map_path)
}
