//! Restaurant distribution across census tracts: chain share per tract,
//! the chi-square test, chain density hot spots (Moran's I and LISA) and
//! the charts and maps that go with them.

use crate::aggregate::{aggregate, chain_densities, ContingencyTable};
use crate::autocorrelation::{global_moran, local_moran, LocalMoran, SpatialWeights};
use crate::crs::Crs;
use crate::data;
use crate::join::spatial_join;
use crate::render;
use crate::session::Session;
use crate::stats::chi2_test;
use crate::types::{JoinedRecord, Tract, TractValue};
use crate::webmap::{Layer, WebMap};
use anyhow::{anyhow, Context, Result};
use geo::{Centroid, MultiPolygon, Point};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Aggregate rows shown in the bar chart.
const TOP_ROWS: usize = 20;

#[derive(Debug, Serialize)]
struct LisaRow<'a> {
    tract_id: &'a str,
    chain_density: f64,
    local_i: f64,
    quadrant: &'static str,
    p_sim: f64,
    significant: bool,
}

pub fn run(session: &mut Session) -> Result<()> {
    let input = session.config.input.clone();
    let tract_crs = session.tract_crs.clone();

    let tracts = data::load_tracts(&input.tracts, &input.tract_id_column, &tract_crs)?;
    let restaurants = data::load_points(&input.restaurants)?;

    let joined = spatial_join(&restaurants, &Crs::Wgs84, &tracts, &tract_crs);
    let table = ContingencyTable::from_joined(&joined);
    if table.is_empty() {
        return Err(anyhow!("No restaurant falls inside any census tract"));
    }
    info!("{} restaurants joined to {} tracts", table.total(), table.tract_ids.len());

    let records = aggregate(&table, &tracts);

    let csv_path = session.visual("restaurants_by_tract.csv");
    write_csv(&csv_path, &records)?;
    session.record(&csv_path);

    let bars = session.visual("bargraph_top20.png");
    let (width, height) = (session.config.output.image_width, session.config.output.image_height);
    render::bar_chart(&bars, &records, TOP_ROWS, width, height)?;
    session.record(&bars);

    let chi2 = chi2_test(&table, true).context("Chi-square test failed")?;
    println!("Chi-square statistic: {}", chi2.statistic);
    println!("p-value: {}", chi2.p_value);

    plot_tract_points(session, &tracts, &tract_crs, &joined)?;
    plot_heatmaps(session, &tracts, &tract_crs, &joined)?;

    let densities = chain_densities(&records, &tracts);
    density_analysis(session, &tract_crs, &densities)?;
    Ok(())
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {:?}", path))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

fn to_mercator(crs: &Crs, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    crs.transform_multipolygon(&Crs::WebMercator, geometry)
}

fn plot_tract_points(session: &mut Session, tracts: &[Tract], crs: &Crs, joined: &[JoinedRecord]) -> Result<()> {
    let (width, height) = (session.config.output.image_width, session.config.output.image_height);
    let shapes: Vec<MultiPolygon<f64>> = tracts.iter().map(|t| to_mercator(crs, &t.geometry)).collect();

    for (label, is_chain) in [("Chain", true), ("Non-Chain", false)] {
        let points: Vec<Point<f64>> = joined
            .iter()
            .filter(|r| r.is_chain == is_chain)
            .map(|r| crs.transform_point(&Crs::WebMercator, r.location))
            .collect();
        let path = session.visual(&format!("census_tract_map_with_{}.png", label));
        render::tract_points_map(&path, &shapes, &points, width, height)?;
        session.record(&path);
    }
    Ok(())
}

fn plot_heatmaps(session: &mut Session, tracts: &[Tract], crs: &Crs, joined: &[JoinedRecord]) -> Result<()> {
    let centroids: Vec<Point<f64>> = tracts
        .iter()
        .filter_map(|t| t.geometry.centroid())
        .map(|c| crs.transform_point(&Crs::Wgs84, c))
        .collect();
    let n = centroids.len().max(1) as f64;
    let center = Point::new(
        centroids.iter().map(|p| p.x()).sum::<f64>() / n,
        centroids.iter().map(|p| p.y()).sum::<f64>() / n,
    );

    for (name, is_chain) in [("chains_heatmap.html", true), ("non_chains_heatmap.html", false)] {
        let points: Vec<Point<f64>> = joined
            .iter()
            .filter(|r| r.is_chain == is_chain)
            .map(|r| crs.transform_point(&Crs::Wgs84, r.location))
            .collect();
        let mut map = WebMap::new(name.trim_end_matches(".html"), center, 10);
        map.add(Layer::heat(&points));
        let path = session.visual(name);
        map.save(&path)?;
        session.record(&path);
    }
    Ok(())
}

fn density_analysis(session: &mut Session, crs: &Crs, densities: &[TractValue]) -> Result<()> {
    let (width, height) = (session.config.output.image_width, session.config.output.image_height);
    let stats = session.config.statistics.clone();

    let units: Vec<(&TractValue, Point<f64>)> = densities
        .iter()
        .filter_map(|unit| unit.geometry.centroid().map(|c| (unit, c)))
        .collect();
    let mercator: Vec<TractValue> = units
        .iter()
        .map(|(unit, _)| TractValue {
            tract_id: unit.tract_id.clone(),
            geometry: to_mercator(crs, &unit.geometry),
            value: unit.value,
        })
        .collect();

    let choropleth = session.visual("chains_choropleth.png");
    render::choropleth(&choropleth, &mercator, width, height)?;
    session.record(&choropleth);

    let values: Vec<f64> = units.iter().map(|(unit, _)| unit.value).collect();
    let centroids: Vec<Point<f64>> = units.iter().map(|(_, c)| *c).collect();
    let mut weights = SpatialWeights::knn(&centroids, stats.neighbours)?;
    weights.row_standardize();

    let moran = global_moran(&values, &weights, stats.permutations, session.rng())?;
    println!("Moran's I: {}", moran.i);
    println!("p-value: {}", moran.p_sim);
    info!("Moran's I expected {:.4}, z_sim {:.3}", moran.expected, moran.z_sim);

    if values.iter().all(|v| *v == values[0]) {
        warn!("Chain density is the same in every tract; skipping the LISA outputs");
        return Ok(());
    }

    let lisa: Vec<LocalMoran> =
        local_moran(&values, &weights, stats.permutations, stats.significance, session.rng())?;

    let z: Vec<f64> = lisa.iter().map(|l| l.z).collect();
    let lag: Vec<f64> = lisa.iter().map(|l| l.lag).collect();
    let global_scatter = session.visual("morans_global_scatter.png");
    render::moran_scatter(&global_scatter, &z, &lag, moran.i, width, height)?;
    session.record(&global_scatter);

    let lisa_scatter = session.visual("morans_lisa_scatter.png");
    render::lisa_scatter(&lisa_scatter, &lisa, width, height)?;
    session.record(&lisa_scatter);

    let geometries: Vec<MultiPolygon<f64>> = mercator.into_iter().map(|u| u.geometry).collect();
    let cluster_map = session.visual("morans_lisa_cluster.png");
    render::lisa_cluster_map(&cluster_map, &geometries, &lisa, width, height)?;
    session.record(&cluster_map);

    let rows: Vec<LisaRow> = units
        .iter()
        .zip(&lisa)
        .map(|((unit, _), local)| LisaRow {
            tract_id: &unit.tract_id,
            chain_density: unit.value,
            local_i: local.statistic,
            quadrant: local.quadrant.label(),
            p_sim: local.p_sim,
            significant: local.significant,
        })
        .collect();
    let significant = rows.iter().filter(|r| r.significant).count();
    info!("{} of {} tracts have a significant local Moran's I", significant, rows.len());

    let lisa_csv = session.visual("lisa_by_tract.csv");
    write_csv(&lisa_csv, &rows)?;
    session.record(&lisa_csv);
    Ok(())
}
