use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Statistics Canada Lambert, the projection the tract boundaries ship in.
pub const STATCAN_LAMBERT: &str = "+proj=lcc +lat_1=49 +lat_2=77 +lat_0=63.390675 +lon_0=-91.8666666666667 \
     +x_0=6200000 +y_0=3000000 +ellps=GRS80 +datum=NAD83 +units=m +no_defs";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub statistics: StatisticsConfig,
    pub output: OutputConfig,
    pub listings: ListingFilterConfig,
    pub categories: CategoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub tracts: PathBuf,
    pub tract_id_column: String,
    /// proj4 string or `EPSG:<code>`
    pub tract_crs: String,
    pub restaurants: PathBuf,
    pub amenities: PathBuf,
    pub listings: PathBuf,
    pub data_dir: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            tracts: PathBuf::from("data/vancouver_census_tract.geojson"),
            tract_id_column: "CTUID".to_string(),
            tract_crs: STATCAN_LAMBERT.to_string(),
            restaurants: PathBuf::from("data/all_restaurants.json.gz"),
            amenities: PathBuf::from("data/amenities-vancouver.json.gz"),
            listings: PathBuf::from("data/cleaned_listings/listings.csv"),
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatisticsConfig {
    pub neighbours: usize,
    pub permutations: usize,
    pub significance: f64,
    pub seed: u64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        StatisticsConfig {
            neighbours: 8,
            permutations: 999,
            significance: 0.05,
            seed: 12345,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub visuals_dir: PathBuf,
    pub maps_dir: PathBuf,
    pub image_width: u32,
    pub image_height: u32,
    /// Icon used for photo locations on web maps; a coloured dot when unset.
    pub photo_icon: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            visuals_dir: PathBuf::from("visuals"),
            maps_dir: PathBuf::from("maps"),
            image_width: 1500,
            image_height: 1200,
            photo_icon: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ListingFilterConfig {
    pub min_reviews: f64,
    pub min_reviews_per_month: f64,
    pub max_minimum_nights: f64,
    pub min_availability: f64,
}

impl Default for ListingFilterConfig {
    fn default() -> Self {
        ListingFilterConfig {
            min_reviews: 10.0,
            min_reviews_per_month: 0.5,
            max_minimum_nights: 30.0,
            min_availability: 30.0,
        }
    }
}

/// Category name -> OSM amenity types belonging to it.
#[derive(Debug, Deserialize, Clone)]
#[serde(transparent)]
pub struct CategoryConfig(pub BTreeMap<String, Vec<String>>);

impl CategoryConfig {
    /// The category an amenity type belongs to, if any.
    pub fn category_of(&self, amenity: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, types)| types.iter().any(|t| t == amenity))
            .map(|(name, _)| name.as_str())
    }
}

impl Default for CategoryConfig {
    fn default() -> Self {
        let table: [(&str, &[&str]); 5] = [
            ("tourism", &["Observation Platform", "cinema", "clock", "arts_centre", "park", "townhall"]),
            ("food", &[
                "restaurant", "cafe", "bbq", "food_court", "ice_cream", "vending_machine", "bistro",
                "fast_food", "bar",
            ]),
            ("transportation", &["bicycle_rental", "bus_station", "ferry_terminal", "taxi"]),
            ("entertainment", &[
                "spa", "casino", "leisure", "nightclub", "theatre", "playground", "pub", "gym",
                "social_centre", "gambling", "exhibition_centre", "events_venue", "community_centre",
                "conference_centre", "music_venue", "planetarium",
            ]),
            ("schools", &["university", "college", "school", "library", "research_institute"]),
        ];
        CategoryConfig(
            table
                .iter()
                .map(|(name, types)| (name.to_string(), types.iter().map(|t| t.to_string()).collect()))
                .collect(),
        )
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise falls back to the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            info!("No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    pub fn category_file(&self, category: &str) -> PathBuf {
        self.input.data_dir.join(format!("data_{}.json.gz", category))
    }
}
