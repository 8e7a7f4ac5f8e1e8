mod common;

use common::SimHarness;
use island_sim::*;

#[test]
fn island_sleeps_once_every_node_is_ready() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let b = h.dynamic(1);
    let edge = h.contact(a, b);
    h.step();
    let island = h.sim.island_id(a).expect("pair should share an island");
    assert!(h.sim.is_island_awake(island));

    h.sim.deactivate_node(a);
    h.sleep_pass();
    assert!(h.sim.is_island_awake(island), "b still wants to move");

    h.sim.deactivate_node(b);
    h.sleep_pass();

    assert!(!h.sim.is_island_awake(island));
    assert!(h.sim.active_islands().is_empty());
    assert!(h.sim.active_nodes(NodeType::RigidBody).is_empty());
    let sleeping = h.sim.nodes_to_deactivate(NodeType::RigidBody);
    assert_eq!(sleeping.len(), 2);
    assert!(sleeping.contains(&a) && sleeping.contains(&b));
    assert_eq!(h.sim.deactivating_edges(EdgeType::ContactManager), &[edge]);
    assert!(!h.sim.edge(edge).is_active());
    assert_eq!(h.sim.active_edge_count(EdgeType::ContactManager), 0);
    assert!(h.sim.validate_deactivations());
    h.assert_consistent();
}

#[test]
fn activating_one_node_wakes_the_whole_island() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let b = h.dynamic(1);
    let edge = h.contact(a, b);
    h.step();
    h.sim.deactivate_node(a);
    h.sim.deactivate_node(b);
    h.sleep_pass();

    h.sim.activate_node(a);
    assert!(h.sim.node(a).is_activating());
    h.step();

    let island = h.sim.island_id(a).expect("island survives sleep");
    assert!(h.sim.is_island_awake(island));
    assert!(h.sim.node(a).is_active());
    assert!(h.sim.node(b).is_active());
    let woken = h.sim.nodes_to_activate(NodeType::RigidBody);
    assert_eq!(woken.len(), 2);
    assert!(h.sim.activated_edges(EdgeType::ContactManager).contains(&edge));
    assert!(h.sim.edge(edge).is_active());
    h.assert_consistent();
}

#[test]
fn new_active_edge_wakes_sleeping_island() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let b = h.dynamic(1);
    h.contact(a, b);
    h.step();
    h.sim.deactivate_node(a);
    h.sim.deactivate_node(b);
    h.sleep_pass();
    assert!(h.sim.active_islands().is_empty());

    let c = h.dynamic(2);
    h.contact(b, c);
    h.step();

    assert_eq!(h.sim.island_count(), 1);
    assert_eq!(h.sim.active_islands().len(), 1);
    assert!(h.sim.node(a).is_active());
    assert!(h.sim.node(b).is_active());
    assert!(h.sim.node(c).is_active());
    h.assert_consistent();
}

#[test]
fn merging_awake_into_sleeping_island_wakes_it() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    let b = h.dynamic(1);
    let c = h.dynamic(2);
    h.contact(a, b);
    h.contact(b, c);
    h.step();
    for node in [a, b, c] {
        h.sim.deactivate_node(node);
    }
    h.sleep_pass();
    assert!(h.sim.active_islands().is_empty());

    let d = h.dynamic(3);
    let e = h.dynamic(4);
    h.contact(d, e);
    h.step();
    assert_eq!(h.sim.active_islands().len(), 1);

    h.contact(e, a);
    h.step();

    assert_eq!(h.sim.island_count(), 1);
    assert_eq!(h.sim.active_islands().len(), 1);
    for node in [a, b, c, d, e] {
        assert!(h.sim.node(node).is_active());
    }
    h.assert_consistent();
}

#[test]
fn lone_node_sleeps_with_its_static_contact() {
    let mut h = SimHarness::new();
    let d = h.dynamic(0);
    let ground = h.contact(d, NodeIndex::STATIC);
    h.step();
    assert!(h.sim.edge(ground).is_active());

    h.sim.deactivate_node(d);
    h.sleep_pass();

    assert!(!h.sim.node(d).is_active());
    assert_eq!(h.sim.nodes_to_deactivate(NodeType::RigidBody), &[d]);
    assert_eq!(h.sim.deactivating_edges(EdgeType::ContactManager), &[ground]);
    assert!(!h.sim.edge(ground).is_active());

    h.sim.activate_node(d);
    h.step();
    assert!(h.sim.node(d).is_active());
    assert!(h.sim.edge(ground).is_active());
}

#[test]
fn kinematic_is_listed_while_edges_reference_it() {
    let mut h = SimHarness::new();
    let k = h.kinematic(0, false);
    let d = h.dynamic(1);
    let edge = h.contact(k, d);
    h.step();

    assert!(!h.sim.node(k).is_active());
    assert_eq!(h.sim.node(k).active_ref_count, 1);
    assert_eq!(h.sim.active_kinematics(), &[k]);
    assert_eq!(h.sim.active_nodes(NodeType::RigidBody), &[d]);

    h.sim.remove_connection(edge);
    h.settle();

    assert_eq!(h.sim.node(k).active_ref_count, 0);
    assert!(h.sim.active_kinematics().is_empty());
    assert_eq!(h.sim.active_node_index(k), INVALID_NODE);
}

#[test]
fn awake_kinematic_holds_touched_island_awake() {
    let mut h = SimHarness::new();
    let k = h.kinematic(0, true);
    let a = h.dynamic(1);
    let b = h.dynamic(2);
    h.contact(a, b);
    h.contact(k, a);
    h.step();
    let island = h.sim.island_id(a).expect("a and b share an island");

    h.sim.deactivate_node(a);
    h.sim.deactivate_node(b);
    h.sleep_pass();
    assert!(h.sim.is_island_awake(island));
    assert!(h.sim.nodes_to_deactivate(NodeType::RigidBody).is_empty());

    h.sim.deactivate_node(k);
    h.sleep_pass();

    assert!(!h.sim.is_island_awake(island));
    assert!(!h.sim.node(k).is_active());
    assert_eq!(h.sim.node(k).active_ref_count, 0);
    assert!(h.sim.active_kinematics().is_empty());
    assert_eq!(h.sim.nodes_to_deactivate(NodeType::RigidBody).len(), 2);
    h.assert_consistent();
}

#[test]
fn second_wake_pass_accumulates_activations() {
    let mut h = SimHarness::new();
    let a = h.dynamic(0);
    h.step();
    assert_eq!(h.sim.nodes_to_activate(NodeType::RigidBody), &[a]);

    let b = h.dynamic(1);
    h.sim.wake_islands2();
    assert_eq!(h.sim.nodes_to_activate(NodeType::RigidBody), &[a, b]);

    h.sim.wake_islands();
    assert!(h.sim.nodes_to_activate(NodeType::RigidBody).is_empty());
    assert_eq!(h.sim.active_nodes(NodeType::RigidBody).len(), 2);
}

#[test]
fn cancelled_activation_leaves_node_asleep() {
    let mut h = SimHarness::new();
    let node = NodeIndex::new(0);
    h.sim
        .add_node(false, false, NodeType::Articulation, node, None);
    h.sim.activate_node(node);
    h.sim.deactivate_node(node);
    h.step();

    assert!(!h.sim.node(node).is_active());
    assert!(!h.sim.node(node).is_activating());
    assert!(h.sim.node(node).is_ready_for_sleeping());
    assert!(h.sim.active_nodes(NodeType::Articulation).is_empty());
}
