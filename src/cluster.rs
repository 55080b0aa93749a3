/// Geographic thinning of the candidate station set.
///
/// Stations are grouped by single-linkage under great-circle distance: two
/// stations share a cluster when a chain of stations, each within the
/// radius of the next, connects them (density clustering with a minimum
/// cluster size of one). Each cluster is then represented by its station
/// with the best data coverage.
///
/// Neighbour lookups go through an R-tree over unit vectors on the sphere,
/// where great-circle distance maps monotonically to chord length.

use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::model::{central_angle, Station, KMS_PER_RADIAN};

type SpherePoint = GeomWithData<[f64; 3], usize>;

fn unit_vector(station: &Station) -> [f64; 3] {
    let (lat, lon) = (station.latitude.to_radians(), station.longitude.to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

/// Clusters `stations` with the given linkage radius.
///
/// Returns clusters of indices into `stations`. Clusters are ordered by
/// their first member and members keep input order. Every station belongs
/// to exactly one cluster.
pub fn cluster(stations: &[Station], radius_km: f64) -> Vec<Vec<usize>> {
    let eps = radius_km / KMS_PER_RADIAN;
    // Chord for the angle, padded so the exact haversine check decides ties.
    let chord = 2.0 * (eps.min(std::f64::consts::PI) / 2.0).sin() + 1e-9;

    let tree = RTree::bulk_load(
        stations
            .iter()
            .enumerate()
            .map(|(i, s)| SpherePoint::new(unit_vector(s), i))
            .collect(),
    );

    let mut labels: Vec<Option<usize>> = vec![None; stations.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for seed in 0..stations.len() {
        if labels[seed].is_some() {
            continue;
        }
        let label = clusters.len();
        labels[seed] = Some(label);
        let mut members = vec![seed];
        let mut frontier = vec![seed];

        while let Some(i) = frontier.pop() {
            let here = &stations[i];
            for neighbour in tree.locate_within_distance(unit_vector(here), chord * chord) {
                let j = neighbour.data;
                if labels[j].is_some() {
                    continue;
                }
                let there = &stations[j];
                if central_angle(here.latitude, here.longitude, there.latitude, there.longitude) <= eps {
                    labels[j] = Some(label);
                    members.push(j);
                    frontier.push(j);
                }
            }
        }

        members.sort_unstable();
        clusters.push(members);
    }

    clusters
}

/// Index of the best-covered station in each cluster.
///
/// Ties go to the member that comes first in the cluster.
pub fn representatives(stations: &[Station], clusters: &[Vec<usize>]) -> Vec<usize> {
    clusters
        .iter()
        .filter_map(|members| {
            members.iter().copied().reduce(|best, i| {
                if stations[i].data_coverage > stations[best].data_coverage {
                    i
                } else {
                    best
                }
            })
        })
        .collect()
}

/// Applies one clustering pass per radius, each over the previous pass's
/// representatives.
///
/// Each pass lists its representatives in cluster order, and the next pass
/// sees them in that order, so a coverage tie in a later pass goes to the
/// station whose cluster came first.
pub fn refine(stations: &[Station], radii_km: &[f64]) -> Vec<Station> {
    let mut survivors: Vec<usize> = (0..stations.len()).collect();

    for &radius in radii_km {
        let subset: Vec<Station> = survivors.iter().map(|&i| stations[i].clone()).collect();
        let clusters = cluster(&subset, radius);
        let next: Vec<usize> = representatives(&subset, &clusters)
            .into_iter()
            .map(|i| survivors[i])
            .collect();

        log::debug!("Clustering at {} km: {} -> {} stations", radius, survivors.len(), next.len());
        survivors = next;
    }

    survivors.into_iter().map(|i| stations[i].clone()).collect()
}
