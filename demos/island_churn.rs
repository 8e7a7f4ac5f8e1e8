use island_sim::*;

fn main() {
    let mut manager = SimpleIslandManager::default();

    let bodies: Vec<NodeIndex> = (0..16)
        .map(|i| manager.add_node(true, false, NodeType::RigidBody, Some(i)))
        .collect();
    let mut contacts = Vec::new();
    for pair in bodies.windows(2) {
        let edge =
            manager.add_contact_manager(EdgePayload::default(), pair[0], pair[1], EdgeType::ContactManager);
        manager.set_edge_connected(edge, EdgeType::ContactManager);
        contacts.push(edge);
    }
    for &body in &bodies {
        manager.add_contact_manager(EdgePayload::default(), body, NodeIndex::STATIC, EdgeType::ContactManager);
    }

    for frame in 0..120 {
        if frame == 30 {
            manager.remove_connection(contacts[7]);
        }
        if frame == 60 {
            for &body in &bodies {
                manager.put_node_to_sleep(body);
            }
        }
        if frame == 90 {
            manager.activate_node(bodies[0]);
        }

        manager.first_pass_island_gen();
        manager.additional_speculative_activation();
        manager.second_pass_island_gen();
        manager.third_pass_island_gen();

        if frame % 30 == 0 || frame == 119 {
            let accurate = manager.accurate_island_sim();
            println!(
                "frame {frame}: {} islands, {} awake, {} active bodies",
                accurate.island_count(),
                accurate.active_islands().len(),
                accurate.active_nodes(NodeType::RigidBody).len()
            );
        }
    }

    if let Err(err) = manager.check_internal_consistency() {
        eprintln!("island graph inconsistent: {err}");
    }
}
