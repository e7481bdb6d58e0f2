// src/corridor.rs

use crate::types::{round2, CorridorGroupConfig, CorridorPlan, CorridorRow};
use std::collections::BTreeSet;
use tracing::warn;

/// Derives per-node signal offsets for green-wave corridors.
///
/// Pure function of static configuration: the ordered node list, a sparse
/// symmetric table of adjacent-hop distances, and one assumed propagation
/// speed. Offsets are measured from a master node; nodes downstream of the
/// master (later in list order) get positive offsets, upstream nodes get
/// negative ones.
pub struct CorridorSynchronizer {
    speed_mps: f64,
}

impl CorridorSynchronizer {
    pub fn new(approach_speed_kmh: f64) -> Self {
        Self {
            speed_mps: approach_speed_kmh / 3.6,
        }
    }

    pub fn plan(
        &self,
        groups: &[CorridorGroupConfig],
        known_intersections: &BTreeSet<String>,
    ) -> Vec<CorridorPlan> {
        groups
            .iter()
            .filter_map(|group| self.plan_group(group, known_intersections))
            .collect()
    }

    pub fn plan_group(
        &self,
        group: &CorridorGroupConfig,
        known_intersections: &BTreeSet<String>,
    ) -> Option<CorridorPlan> {
        let nodes = &group.intersections;
        if nodes.is_empty() {
            warn!("corridor group '{}' has no nodes, skipping", group.name);
            return None;
        }

        // Preferred master when it is actually part of the group, else the
        // structurally-middle node.
        let master_index = group
            .master
            .as_ref()
            .and_then(|m| nodes.iter().position(|n| n == m))
            .unwrap_or(nodes.len() / 2);

        let mut cumulative = vec![0.0f64; nodes.len()];
        for i in master_index + 1..nodes.len() {
            cumulative[i] = cumulative[i - 1] + self.hop(group, &nodes[i - 1], &nodes[i]);
        }
        for i in (0..master_index).rev() {
            cumulative[i] = cumulative[i + 1] - self.hop(group, &nodes[i], &nodes[i + 1]);
        }

        let rows = nodes
            .iter()
            .zip(&cumulative)
            .map(|(node, distance)| CorridorRow {
                node: node.clone(),
                cumulative_m: *distance,
                distance_m: distance.abs(),
                travel_time_s: round2(distance.abs() / self.speed_mps),
                offset_s: (distance / self.speed_mps).round() as i64,
                exists: known_intersections.contains(node),
            })
            .collect();

        Some(CorridorPlan {
            group: group.name.clone(),
            master: nodes[master_index].clone(),
            rows,
        })
    }

    /// Adjacent-hop distance, symmetric lookup. A missing entry is a
    /// configuration gap, not a fatal error: it contributes 0 m.
    fn hop(&self, group: &CorridorGroupConfig, a: &str, b: &str) -> f64 {
        let found = group.distances.iter().find(|d| {
            (d.between[0] == a && d.between[1] == b) || (d.between[0] == b && d.between[1] == a)
        });
        match found {
            Some(distance) => distance.meters,
            None => {
                warn!(
                    "corridor group '{}': no distance between '{}' and '{}', assuming 0 m",
                    group.name, a, b
                );
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HopDistance;

    fn hop_distance(a: &str, b: &str, meters: f64) -> HopDistance {
        HopDistance {
            between: [a.to_string(), b.to_string()],
            meters,
        }
    }

    fn chain() -> CorridorGroupConfig {
        CorridorGroupConfig {
            name: "main-street".to_string(),
            intersections: vec![
                "A".to_string(),
                "B".to_string(),
                "C".to_string(),
                "D".to_string(),
            ],
            master: Some("A".to_string()),
            distances: vec![
                hop_distance("A", "B", 300.0),
                hop_distance("B", "C", 600.0),
                hop_distance("C", "D", 800.0),
            ],
        }
    }

    fn known(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_master_has_zero_distance_and_offset() {
        let sync = CorridorSynchronizer::new(30.0);
        let plan = sync.plan_group(&chain(), &known(&[])).unwrap();

        assert_eq!(plan.master, "A");
        let master_row = &plan.rows[0];
        assert_eq!(master_row.cumulative_m, 0.0);
        assert_eq!(master_row.offset_s, 0);
        assert_eq!(master_row.travel_time_s, 0.0);
    }

    #[test]
    fn test_four_node_chain_offsets_at_30_kmh() {
        // 30 km/h = 8.33 m/s. Two hops downstream of A is 900 m,
        // so C starts round(900 / 8.33) = 108 s after the master.
        let sync = CorridorSynchronizer::new(30.0);
        let plan = sync.plan_group(&chain(), &known(&[])).unwrap();

        assert_eq!(plan.rows[1].cumulative_m, 300.0);
        assert_eq!(plan.rows[1].offset_s, 36);
        assert_eq!(plan.rows[2].cumulative_m, 900.0);
        assert_eq!(plan.rows[2].offset_s, 108);
        assert_eq!(plan.rows[3].cumulative_m, 1700.0);
        assert_eq!(plan.rows[3].offset_s, 204);
    }

    #[test]
    fn test_middle_master_when_preference_absent() {
        let mut group = chain();
        group.master = Some("Z".to_string()); // not in the group

        let sync = CorridorSynchronizer::new(30.0);
        let plan = sync.plan_group(&group, &known(&[])).unwrap();

        // Structural middle of 4 nodes is index 2
        assert_eq!(plan.master, "C");
        assert_eq!(plan.rows[2].offset_s, 0);
    }

    #[test]
    fn test_upstream_nodes_get_negative_offsets() {
        let mut group = chain();
        group.master = None; // middle master: C

        let sync = CorridorSynchronizer::new(30.0);
        let plan = sync.plan_group(&group, &known(&[])).unwrap();

        assert_eq!(plan.rows[0].cumulative_m, -900.0);
        assert!(plan.rows[0].offset_s < 0);
        assert_eq!(plan.rows[1].cumulative_m, -600.0);
        assert_eq!(plan.rows[3].cumulative_m, 800.0);
        assert!(plan.rows[3].offset_s > 0);
        // Absolute distance stays unsigned
        assert_eq!(plan.rows[0].distance_m, 900.0);
    }

    #[test]
    fn test_missing_hop_distance_defaults_to_zero() {
        let mut group = chain();
        group.distances.remove(1); // drop B-C

        let sync = CorridorSynchronizer::new(30.0);
        let plan = sync.plan_group(&group, &known(&[])).unwrap();

        // C collapses onto B; D still adds its own hop
        assert_eq!(plan.rows[2].cumulative_m, 300.0);
        assert_eq!(plan.rows[3].cumulative_m, 1100.0);
    }

    #[test]
    fn test_symmetric_distance_lookup() {
        let mut group = chain();
        group.distances[0] = hop_distance("B", "A", 300.0); // reversed entry

        let sync = CorridorSynchronizer::new(30.0);
        let plan = sync.plan_group(&group, &known(&[])).unwrap();
        assert_eq!(plan.rows[1].cumulative_m, 300.0);
    }

    #[test]
    fn test_exists_flag_reports_live_intersections() {
        let sync = CorridorSynchronizer::new(30.0);
        let plan = sync.plan_group(&chain(), &known(&["A", "C"])).unwrap();

        assert!(plan.rows[0].exists);
        assert!(!plan.rows[1].exists);
        assert!(plan.rows[2].exists);
        assert!(!plan.rows[3].exists);
    }

    #[test]
    fn test_planning_is_idempotent() {
        let sync = CorridorSynchronizer::new(30.0);
        let live = known(&["A", "B"]);
        let first = sync.plan(&[chain()], &live);
        let second = sync.plan(&[chain()], &live);
        assert_eq!(first, second);
    }

    #[test]
    fn test_single_node_group_is_its_own_master() {
        let group = CorridorGroupConfig {
            name: "lonely".to_string(),
            intersections: vec!["A".to_string()],
            master: None,
            distances: Vec::new(),
        };
        let sync = CorridorSynchronizer::new(30.0);
        let plan = sync.plan_group(&group, &known(&[])).unwrap();
        assert_eq!(plan.master, "A");
        assert_eq!(plan.rows.len(), 1);
        assert_eq!(plan.rows[0].offset_s, 0);
    }
}
