mod common;

use common::SimHarness;
use island_sim::*;

#[test]
fn chain_of_three_forms_one_island() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let b = h.dynamic(1);
    let c = h.dynamic(2);
    h.contact(a, b);
    h.contact(b, c);
    h.step();

    assert_eq!(h.sim.island_count(), 1);
    assert_eq!(h.island_nodes(a), 3);
    assert_eq!(h.island_edges(a), 2);
    assert_eq!(h.sim.island_id(a), h.sim.island_id(c));
    h.assert_consistent();
}

#[test]
fn removing_bridge_edge_splits_off_single_node() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let b = h.dynamic(1);
    let c = h.dynamic(2);
    let ab = h.contact(a, b);
    h.contact(b, c);
    h.step();

    h.sim.remove_connection(ab);
    h.settle();

    assert_eq!(h.sim.island_count(), 2);
    assert_ne!(h.sim.island_id(a), h.sim.island_id(b));
    assert_eq!(h.sim.island_id(b), h.sim.island_id(c));
    assert_eq!(h.island_nodes(a), 1);
    assert_eq!(h.island_edges(a), 0);
    assert_eq!(h.island_nodes(b), 2);
    assert_eq!(h.island_edges(b), 1);
    assert!(h.sim.edge(ab).is_destroyed());
    h.assert_consistent();
}

#[test]
fn static_contact_never_creates_an_island() {
    let mut h = SimHarness::new();
    let d = h.dynamic(0);
    let edge = h.contact(NodeIndex::STATIC, d);
    h.step();

    assert_eq!(h.sim.island_id(d), None);
    assert_eq!(h.sim.island_count(), 0);
    assert_eq!(h.sim.node(d).static_touch_count, 1);
    assert!(h.sim.edge(edge).is_inserted());
    assert!(h.sim.edge(edge).is_active());
    h.assert_consistent();
}

#[test]
fn merge_sums_nodes_edges_and_static_touch() {
    let mut h = SimHarness::new();
    let n: Vec<NodeIndex> = (0..5).map(|slot| h.dynamic(slot)).collect();
    h.contact(n[0], n[1]);
    h.contact(n[2], n[3]);
    h.contact(n[3], n[4]);
    h.contact(NodeIndex::STATIC, n[0]);
    h.contact(n[4], NodeIndex::STATIC);
    h.step();

    assert_eq!(h.sim.island_count(), 2);
    assert_eq!(h.island_nodes(n[0]) + h.island_nodes(n[2]), 5);

    h.contact(n[1], n[2]);
    h.step();

    assert_eq!(h.sim.island_count(), 1);
    assert_eq!(h.island_nodes(n[0]), 5);
    // Four dynamic contacts plus the two static ones.
    assert_eq!(h.island_edges(n[0]), 6);
    assert_eq!(h.sim.island_static_touch_count(n[2]), 2);
    h.assert_consistent();
}

#[test]
fn node_joining_island_brings_its_static_contacts() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let b = h.dynamic(1);
    h.contact(NodeIndex::STATIC, b);
    h.step();
    assert_eq!(h.sim.island_id(b), None);

    h.contact(a, b);
    h.step();

    assert_eq!(h.sim.island_static_touch_count(a), 1);
    assert_eq!(h.island_edges(a), 2);
    h.assert_consistent();
}

fn ring(h: &mut SimHarness, len: u32) -> (Vec<NodeIndex>, Vec<EdgeIndex>) {
    let nodes: Vec<NodeIndex> = (0..len).map(|slot| h.dynamic(slot)).collect();
    let edges = (0..len as usize)
        .map(|i| h.contact(nodes[i], nodes[(i + 1) % len as usize]))
        .collect();
    h.step();
    (nodes, edges)
}

#[test]
fn cycle_survives_one_removal() {
    let mut h = SimHarness::new();
    let (nodes, edges) = ring(&mut h, 6);
    assert_eq!(h.sim.island_count(), 1);

    h.sim.remove_connection(edges[2]);
    h.settle();

    assert_eq!(h.sim.island_count(), 1);
    assert_eq!(h.island_nodes(nodes[0]), 6);
    assert_eq!(h.island_edges(nodes[0]), 5);
    h.assert_consistent();
}

#[test]
fn cycle_splits_after_two_non_adjacent_removals() {
    let mut h = SimHarness::new();
    let (nodes, edges) = ring(&mut h, 6);

    h.sim.remove_connection(edges[2]);
    h.settle();
    h.sim.remove_connection(edges[5]);
    h.settle();

    assert_eq!(h.sim.island_count(), 2);
    let first = h.sim.island_id(nodes[0]);
    for &node in &nodes[0..3] {
        assert_eq!(h.sim.island_id(node), first);
    }
    let second = h.sim.island_id(nodes[3]);
    assert_ne!(first, second);
    for &node in &nodes[3..6] {
        assert_eq!(h.sim.island_id(node), second);
    }
    assert_eq!(h.island_nodes(nodes[0]) + h.island_nodes(nodes[3]), 6);
    h.assert_consistent();
}

#[test]
fn both_removals_in_one_pass_split_the_cycle() {
    let mut h = SimHarness::new();
    let (nodes, edges) = ring(&mut h, 8);

    h.sim.remove_connection(edges[1]);
    h.sim.remove_connection(edges[5]);
    h.settle();

    assert_eq!(h.sim.island_count(), 2);
    assert_eq!(h.island_nodes(nodes[2]), 4);
    assert_eq!(h.island_nodes(nodes[6]), 4);
    assert_eq!(h.island_edges(nodes[2]) + h.island_edges(nodes[6]), 6);
    h.assert_consistent();
}

#[test]
fn lost_edge_pass_without_removals_is_idempotent() {
    let mut h = SimHarness::new();
    let (nodes, edges) = ring(&mut h, 5);
    h.sim.remove_connection(edges[0]);
    h.settle();

    let ids = h.sim.island_ids().to_vec();
    let routes: Vec<NodeIndex> = nodes.iter().map(|&n| h.sim.fast_route(n)).collect();
    let hops: Vec<u32> = nodes.iter().map(|&n| h.sim.hop_count(n)).collect();

    for _ in 0..3 {
        h.settle();
    }

    assert_eq!(h.sim.island_ids(), ids.as_slice());
    for (i, &node) in nodes.iter().enumerate() {
        assert_eq!(h.sim.fast_route(node), routes[i]);
        assert_eq!(h.sim.hop_count(node), hops[i]);
        assert!(!h.sim.is_node_dirty(node));
    }
    h.assert_consistent();
}

#[test]
fn kinematic_pair_stays_out_of_dynamic_lists() {
    let mut h = SimHarness::new();
    let k1 = h.kinematic(0, true);
    let k2 = h.kinematic(1, true);
    let contact = h.contact(k1, k2);
    let joint = h.connect(k1, k2, EdgeType::Constraint);
    h.step();

    assert!(h.sim.active_nodes(NodeType::RigidBody).is_empty());
    assert_eq!(h.sim.active_kinematics().len(), 2);
    assert_eq!(h.sim.island_count(), 0);
    assert!(h.sim.edge(contact).is_active());
    assert!(!h.sim.edge(joint).is_active());
    assert_eq!(h.sim.active_edge_count(EdgeType::Constraint), 0);
    h.assert_consistent();
}

#[test]
fn kinematic_does_not_bridge_islands() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let k = h.kinematic(1, true);
    let b = h.dynamic(2);
    h.contact(a, k);
    h.contact(k, b);
    h.step();

    assert_eq!(h.sim.island_count(), 0);
    assert_eq!(h.sim.island_id(k), None);
    assert_eq!(h.sim.node(k).active_ref_count, 2);
    h.assert_consistent();
}

#[test]
fn set_kinematic_splits_and_set_dynamic_rejoins() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let b = h.dynamic(1);
    let c = h.dynamic(2);
    h.contact(a, b);
    h.contact(b, c);
    h.step();

    h.sim.set_kinematic(b);
    h.settle();
    h.step();

    assert_eq!(h.sim.island_id(b), None);
    assert_eq!(h.sim.island_count(), 2);
    assert_ne!(h.sim.island_id(a), h.sim.island_id(c));
    assert_eq!(h.island_edges(a), 1);
    assert_eq!(h.island_edges(c), 1);
    assert!(h.sim.active_kinematics().contains(&b));
    assert!(!h.sim.active_nodes(NodeType::RigidBody).contains(&b));
    h.assert_consistent();

    h.sim.set_dynamic(b);
    h.step();

    assert_eq!(h.sim.island_count(), 1);
    assert_eq!(h.island_nodes(b), 3);
    assert_eq!(h.island_edges(b), 2);
    assert!(h.sim.active_kinematics().is_empty());
    assert!(h.sim.active_nodes(NodeType::RigidBody).contains(&b));
    h.assert_consistent();
}

#[test]
fn readding_pending_edge_cancels_removal() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let b = h.dynamic(1);
    let edge = h.contact(a, b);
    h.step();

    h.sim.remove_connection(edge);
    h.sim.add_connection(a, b, EdgeType::ContactManager, edge);
    h.settle();

    assert!(h.sim.edge(edge).is_inserted());
    assert_eq!(h.sim.island_count(), 1);
    assert_eq!(h.island_edges(a), 1);
    h.assert_consistent();
}

#[test]
fn destroyed_node_releases_its_island() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let b = h.dynamic(1);
    let edge = h.contact(a, b);
    h.step();

    h.sim.remove_connection(edge);
    h.sim.remove_destroyed_edges();
    h.sim.process_lost_edges(&[a], false, false, u32::MAX);

    assert!(h.sim.node(a).is_deleted());
    assert_eq!(h.sim.island_id(a), None);
    assert_eq!(h.sim.island_count(), 1);
    assert_eq!(h.island_nodes(b), 1);
    assert!(!h.sim.active_nodes(NodeType::RigidBody).contains(&a));
    h.assert_consistent();
}

#[test]
fn preallocated_edges_link_after_combining_step() {
    let mut h = SimHarness::new();
    let nodes: Vec<NodeIndex> = (0..4).map(|slot| h.dynamic(slot)).collect();
    h.sim.preallocate_connections(2);
    {
        let mut cpu = h.cpu.write();
        cpu.reserve_edge(2, 16);
        for i in 0..3u32 {
            cpu.set_edge_nodes(i, nodes[i as usize], nodes[i as usize + 1]);
        }
    }
    let mut queued = Vec::new();
    for i in 0..3u32 {
        let (a, b) = (nodes[i as usize], nodes[i as usize + 1]);
        if h.sim
            .add_connection_preallocated(a, b, EdgeType::ContactManager, i)
        {
            queued.push(i);
        }
    }
    assert_eq!(queued.len(), 3);
    h.sim.add_delayed_dirty_edges(&queued);
    h.step();

    assert_eq!(h.sim.island_count(), 1);
    assert_eq!(h.island_nodes(nodes[0]), 4);
    assert_eq!(h.island_edges(nodes[3]), 3);
    h.assert_consistent();
}

#[test]
fn island_ids_are_recycled() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let b = h.dynamic(1);
    let edge = h.contact(a, b);
    h.step();
    let first = h.sim.island_id(a);

    h.sim.remove_connection(edge);
    h.sim.remove_destroyed_edges();
    h.sim.process_lost_edges(&[a, b], false, false, u32::MAX);
    assert_eq!(h.sim.island_count(), 0);

    let c = h.dynamic(2);
    let d = h.dynamic(3);
    h.contact(c, d);
    h.step();
    assert_eq!(h.sim.island_id(c), first);
}

#[test]
fn removing_kinematic_edge_while_turning_dynamic_keeps_lists_intact() {
    let mut h = SimHarness::new();
    let k = h.kinematic(0, true);
    let a = h.dynamic(1);
    let b = h.dynamic(2);
    let ka = h.contact(k, a);
    h.contact(a, b);
    h.step();
    assert_eq!(h.island_edges(a), 2);

    h.sim.remove_connection(ka);
    h.sim.set_dynamic(k);
    let c = h.dynamic(3);
    h.contact(k, c);
    h.step();
    h.assert_consistent();
    h.settle();

    assert!(h.sim.edge(ka).is_destroyed());
    assert_eq!(h.island_edges(a), 1);
    assert_eq!(h.island_nodes(a), 2);
    assert_eq!(h.sim.island_id(k), h.sim.island_id(c));
    assert_ne!(h.sim.island_id(k), h.sim.island_id(a));
    assert_eq!(h.island_edges(k), 1);
    h.assert_consistent();
}

#[test]
fn turning_dynamic_moves_kinematic_edges_to_own_island() {
    let mut h = SimHarness::new();
    let k = h.kinematic(0, true);
    let a = h.dynamic(1);
    let b = h.dynamic(2);
    let ka = h.contact(k, a);
    h.contact(a, b);
    h.step();

    h.sim.set_dynamic(k);
    h.step();
    h.settle();

    assert!(h.sim.edge(ka).is_inserted());
    assert_eq!(h.sim.island_count(), 1);
    assert_eq!(h.island_nodes(k), 3);
    assert_eq!(h.island_edges(k), 2);

    h.sim.remove_connection(ka);
    h.settle();
    assert_ne!(h.sim.island_id(k), h.sim.island_id(a));
    assert_eq!(h.island_edges(a), 1);
    h.assert_consistent();
}

#[test]
fn static_touch_count_saturates_with_island_sum() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let b = h.dynamic(1);
    h.contact(a, b);
    h.step();

    let statics: Vec<EdgeIndex> = (0..u16::MAX as u32 + 4)
        .map(|_| h.contact(a, NodeIndex::STATIC))
        .collect();
    h.step();

    assert_eq!(h.sim.node(a).static_touch_count, u16::MAX);
    assert_eq!(h.sim.island_static_touch_count(a), u16::MAX as u32);
    h.assert_consistent();

    for &edge in &statics[..8] {
        h.sim.remove_connection(edge);
    }
    h.settle();

    assert_eq!(h.sim.node(a).static_touch_count, u16::MAX - 8);
    assert_eq!(h.sim.island_static_touch_count(b), (u16::MAX - 8) as u32);
    h.assert_consistent();
}
