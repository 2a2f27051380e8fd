use crate::crs::Crs;
use crate::types::{JoinedRecord, PointOfInterest, Tract};
use geo::algorithm::contains::Contains;
use geo::bounding_rect::BoundingRect;
use geo::Point;
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashSet;
use tracing::{debug, info};

// Bounding box of one tract, pointing back into the tract slice.
struct TractIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for TractIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Point-in-polygon lookup over a set of tracts.
pub struct TractLocator<'a> {
    tracts: &'a [Tract],
    tree: RTree<TractIndex>,
}

impl<'a> TractLocator<'a> {
    pub fn new(tracts: &'a [Tract]) -> Self {
        let items: Vec<TractIndex> = tracts
            .iter()
            .enumerate()
            .filter_map(|(i, tract)| {
                // empty geometries have no box and can contain nothing
                let rect = tract.geometry.bounding_rect()?;
                Some(TractIndex {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();
        TractLocator { tracts, tree: RTree::bulk_load(items) }
    }

    /// The tract whose interior contains `point` (tract CRS). With
    /// non-overlapping tracts there is at most one; otherwise the lowest
    /// index wins.
    pub fn locate(&self, point: Point<f64>) -> Option<&'a Tract> {
        let envelope = AABB::from_point([point.x(), point.y()]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|candidate| self.tracts[candidate.index].geometry.contains(&point))
            .map(|candidate| candidate.index)
            .min()
            .map(|i| &self.tracts[i])
    }
}

/// Inner spatial join: reprojects `points` from `point_crs` to `tract_crs`
/// and keeps the ones that fall inside a tract.
pub fn spatial_join(
    points: &[PointOfInterest],
    point_crs: &Crs,
    tracts: &[Tract],
    tract_crs: &Crs,
) -> Vec<JoinedRecord> {
    let locator = TractLocator::new(tracts);

    let joined: Vec<JoinedRecord> = points
        .par_iter()
        .filter_map(|poi| {
            let projected = point_crs.transform_point(tract_crs, poi.location);
            let tract = locator.locate(projected)?;
            Some(JoinedRecord {
                tract_id: tract.id.clone(),
                is_chain: poi.is_chain(),
                name: poi.name.clone(),
                location: projected,
            })
        })
        .collect();

    debug!("{} of {} points fell outside every tract", points.len() - joined.len(), points.len());
    let occupied: HashSet<&str> = joined.iter().map(|r| r.tract_id.as_str()).collect();
    info!(
        "Joined {} points into {} tracts ({} tracts contain none)",
        joined.len(),
        occupied.len(),
        tracts.len() - occupied.len().min(tracts.len())
    );
    joined
}
