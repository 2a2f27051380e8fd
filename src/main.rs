pub mod types;
pub mod config;
pub mod error;
pub mod crs;
pub mod distance;
pub mod data;
pub mod photo;
pub mod join;
pub mod aggregate;
pub mod stats;
pub mod autocorrelation;
pub mod render;
pub mod webmap;
pub mod session;
pub mod distribution;
pub mod tour;
pub mod prepare;

use clap::{Parser, Subcommand};
use session::Session;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file; built-in defaults are used when it is missing
    #[arg(short, long, value_name = "FILE", default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chain vs. non-chain restaurants per census tract, with statistics and maps
    Distribution,
    /// Find the listing with the most amenities of a category nearby
    FindAirbnb {
        /// Search radius in meters
        radius: f64,
        /// Category name, e.g. food
        category: String,
    },
    /// Map amenities around each geotagged photo in a directory
    FindAmenity {
        photo_dir: PathBuf,
        /// Search radius in meters
        radius: f64,
        /// Amenity category file to search, e.g. food
        amenity_type: String,
    },
    /// Convert an OSM XML extract to gzipped JSON lines
    OsmToJson {
        input: PathBuf,
        output: PathBuf,
    },
    /// Extract one metropolitan area's tracts from a census shapefile
    ExtractTracts {
        shapefile: PathBuf,
        output: PathBuf,
        #[arg(default_value = "Vancouver")]
        metro: String,
    },
    /// Split the amenity dump into per-category files
    Categorize,
    /// Deduplicate and filter the raw listings CSV
    CleanListings {
        input: PathBuf,
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let app_config = config::AppConfig::load_or_default(&cli.config)?;
    let mut session = Session::start(app_config)?;

    match &cli.command {
        Commands::Distribution => {
            distribution::run(&mut session)?;
        }
        Commands::FindAirbnb { radius, category } => {
            tour::find_airbnb(&mut session, *radius, category)?;
        }
        Commands::FindAmenity { photo_dir, radius, amenity_type } => {
            tour::find_amenity(&mut session, photo_dir, *radius, amenity_type)?;
        }
        Commands::OsmToJson { input, output } => {
            let nodes = prepare::osm_to_json(input, output)?;
            session.record(output);
            println!("Wrote {} nodes to {}", nodes, output.display());
        }
        Commands::ExtractTracts { shapefile, output, metro } => {
            let id_column = session.config.input.tract_id_column.clone();
            let count = prepare::extract_tracts(shapefile, output, metro, &id_column)?;
            session.record(output);
            println!("Wrote {} {} tracts to {}", count, metro, output.display());
        }
        Commands::Categorize => {
            let config = session.config.clone();
            let written = prepare::categorize(&config.input.amenities, &config.categories, |c| config.category_file(c))?;
            for path in &written {
                session.record(path);
                println!("Wrote {}", path.display());
            }
        }
        Commands::CleanListings { input, output } => {
            let filter = session.config.listings.clone();
            let (kept, read) = prepare::clean_listings(input, output, &filter)?;
            session.record(output);
            println!("Kept {} of {} listings in {}", kept, read, output.display());
        }
    }

    session.finish();
    Ok(())
}
