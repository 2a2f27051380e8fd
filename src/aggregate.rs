//! Tract × chain-flag tabulation, per-tract totals and densities.

use crate::types::{AggregateRecord, JoinedRecord, Tract, TractValue};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Cross-tabulation of joined points: rows are tract ids (ascending),
/// columns are `[non-chain, chain]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContingencyTable {
    pub tract_ids: Vec<String>,
    pub counts: Vec<[u64; 2]>,
}

impl ContingencyTable {
    pub fn from_joined(records: &[JoinedRecord]) -> Self {
        let mut rows: BTreeMap<&str, [u64; 2]> = BTreeMap::new();
        for record in records {
            rows.entry(record.tract_id.as_str()).or_default()[usize::from(record.is_chain)] += 1;
        }
        ContingencyTable {
            tract_ids: rows.keys().map(|id| id.to_string()).collect(),
            counts: rows.values().copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|row| row[0] + row[1]).sum()
    }

    /// Observed counts as a dense matrix, for the chi-square test.
    pub fn matrix(&self) -> Vec<Vec<f64>> {
        self.counts.iter().map(|row| row.iter().map(|&c| c as f64).collect()).collect()
    }
}

/// One record per (tract, chain flag) in the table, zero counts included,
/// sorted by per-tract total (descending), then tract id, non-chain first.
pub fn aggregate(table: &ContingencyTable, tracts: &[Tract]) -> Vec<AggregateRecord> {
    let areas: HashMap<&str, f64> = tracts.iter().map(|t| (t.id.as_str(), t.area_km2)).collect();

    let mut records: Vec<AggregateRecord> = table
        .tract_ids
        .iter()
        .zip(&table.counts)
        .flat_map(|(id, row)| {
            let total = row[0] + row[1];
            let area = areas.get(id.as_str()).copied();
            [false, true].into_iter().map(move |is_chain| {
                let count = row[usize::from(is_chain)];
                AggregateRecord {
                    tract_id: id.clone(),
                    is_chain,
                    count,
                    total_count: total,
                    density: density(count, area),
                }
            })
        })
        .collect();

    records.sort_by(|a, b| {
        b.total_count
            .cmp(&a.total_count)
            .then_with(|| a.tract_id.cmp(&b.tract_id))
            .then_with(|| a.is_chain.cmp(&b.is_chain))
    });
    records
}

/// Count per km²; undefined for unknown or zero-area tracts.
pub fn density(count: u64, area_km2: Option<f64>) -> Option<f64> {
    match area_km2 {
        Some(area) if area > 0.0 => Some(count as f64 / area),
        _ => None,
    }
}

/// Chain densities joined back to tract geometry, in record order.
/// Tracts whose density is undefined are left out.
pub fn chain_densities(records: &[AggregateRecord], tracts: &[Tract]) -> Vec<TractValue> {
    let by_id: HashMap<&str, &Tract> = tracts.iter().map(|t| (t.id.as_str(), t)).collect();

    records
        .iter()
        .filter(|r| r.is_chain)
        .filter_map(|r| {
            let Some(value) = r.density else {
                warn!("Tract {} has no area; leaving it out of the density analysis", r.tract_id);
                return None;
            };
            let tract = by_id.get(r.tract_id.as_str())?;
            Some(TractValue {
                tract_id: r.tract_id.clone(),
                geometry: tract.geometry.clone(),
                value,
            })
        })
        .collect()
}
