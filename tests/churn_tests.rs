mod common;

use common::SimHarness;
use island_sim::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

const BODIES: u32 = 24;
const FRAMES: usize = 300;

struct LiveEdge {
    edge: EdgeIndex,
    node1: NodeIndex,
    node2: NodeIndex,
}

struct Churn {
    h: SimHarness,
    rng: ChaCha8Rng,
    bodies: Vec<NodeIndex>,
    live: Vec<LiveEdge>,
    seed: u64,
}

impl Churn {
    fn new(seed: u64) -> Self {
        let mut h = SimHarness::new();
        let bodies = (0..BODIES).map(|slot| h.dynamic(slot)).collect();
        Self {
            h,
            rng: ChaCha8Rng::seed_from_u64(seed),
            bodies,
            live: Vec::new(),
            seed,
        }
    }

    fn random_body(&mut self) -> NodeIndex {
        self.bodies[self.rng.gen_range(0..self.bodies.len())]
    }

    fn add_edge(&mut self) {
        let node1 = self.random_body();
        let node2 = if self.rng.gen_bool(0.15) {
            NodeIndex::STATIC
        } else {
            let mut other = self.random_body();
            while other.index() == node1.index() {
                other = self.random_body();
            }
            other
        };
        let ty = if self.rng.gen_bool(0.2) {
            EdgeType::Constraint
        } else {
            EdgeType::ContactManager
        };
        let edge = self.h.connect(node1, node2, ty);
        self.live.push(LiveEdge { edge, node1, node2 });
    }

    fn remove_edge_at(&mut self, position: usize) {
        let removed = self.live.swap_remove(position);
        self.h.sim.remove_connection(removed.edge);
    }

    fn remove_random_edge(&mut self) {
        if !self.live.is_empty() {
            let position = self.rng.gen_range(0..self.live.len());
            self.remove_edge_at(position);
        }
    }

    fn toggle_kinematic(&mut self, node: NodeIndex) {
        if self.h.sim.node(node).is_kinematic() {
            self.h.sim.set_dynamic(node);
        } else {
            self.h.sim.set_kinematic(node);
        }
    }

    /// Flips a body between kinematic and dynamic in the same frame as
    /// removing one of its edges, in either order.
    fn toggle_with_removal(&mut self) {
        let node = self.random_body();
        let touching: Vec<usize> = self
            .live
            .iter()
            .enumerate()
            .filter(|(_, e)| e.node1.index() == node.index() || e.node2.index() == node.index())
            .map(|(position, _)| position)
            .collect();
        let remove_first = self.rng.gen_bool(0.5);
        if remove_first && !touching.is_empty() {
            let position = touching[self.rng.gen_range(0..touching.len())];
            self.remove_edge_at(position);
            self.toggle_kinematic(node);
        } else {
            self.toggle_kinematic(node);
            if !touching.is_empty() {
                let position = touching[self.rng.gen_range(0..touching.len())];
                self.remove_edge_at(position);
            }
        }
    }

    fn frame(&mut self, frame: usize) {
        let ops = self.rng.gen_range(1..=6);
        for _ in 0..ops {
            match self.rng.gen_range(0..100) {
                0..=39 => self.add_edge(),
                40..=59 => self.remove_random_edge(),
                60..=74 => self.toggle_with_removal(),
                75..=84 => {
                    let node = self.random_body();
                    self.toggle_kinematic(node);
                }
                85..=92 => {
                    let node = self.random_body();
                    self.h.sim.deactivate_node(node);
                }
                _ => {
                    let node = self.random_body();
                    self.h.sim.activate_node(node);
                }
            }
        }
        if frame % 25 == 24 {
            for &node in &self.bodies {
                self.h.sim.deactivate_node(node);
            }
        }

        self.h.step();
        self.check(frame, "new edges");

        if frame % 5 == 4 {
            self.h.sleep_pass();
            self.check(frame, "sleep pass");
            assert!(
                self.h.sim.validate_deactivations(),
                "seed {} frame {frame}: reported deactivations still active",
                self.seed
            );
        } else {
            self.h.settle();
            self.check(frame, "lost edges");
        }
        self.check_partitions(frame);
    }

    fn check(&self, frame: usize, pass: &str) {
        if let Err(err) = self.h.sim.check_internal_consistency() {
            panic!("seed {} frame {frame} after {pass}: {err}", self.seed);
        }
    }

    /// Islands must be exactly the connected components of the live edges
    /// whose endpoints are both dynamic.
    fn check_partitions(&self, frame: usize) {
        let mut parent: Vec<usize> = (0..self.bodies.len()).collect();
        let is_dynamic = |node: NodeIndex| node.is_valid() && !self.h.sim.node(node).is_kinematic();
        for live in &self.live {
            if is_dynamic(live.node1) && is_dynamic(live.node2) {
                let root1 = find(&mut parent, live.node1.slot());
                let root2 = find(&mut parent, live.node2.slot());
                parent[root1] = root2;
            }
        }
        let mut sizes = vec![0u32; self.bodies.len()];
        for slot in 0..self.bodies.len() {
            sizes[find(&mut parent, slot)] += 1;
        }

        let mut component_islands: HashMap<usize, Option<IslandId>> = HashMap::new();
        let mut island_components: HashMap<IslandId, usize> = HashMap::new();
        for &node in &self.bodies {
            let island = self.h.sim.island_id(node);
            if self.h.sim.node(node).is_kinematic() {
                assert_eq!(island, None, "seed {} frame {frame}: kinematic {} in an island", self.seed, node.index());
                continue;
            }
            let component = find(&mut parent, node.slot());
            let size = sizes[component];
            if size > 1 {
                assert!(
                    island.is_some(),
                    "seed {} frame {frame}: node {} has dynamic neighbours but no island",
                    self.seed,
                    node.index()
                );
            }
            if island.is_some() {
                assert_eq!(
                    self.h.island_nodes(node),
                    size,
                    "seed {} frame {frame}: island of node {} has the wrong size",
                    self.seed,
                    node.index()
                );
            }
            let expected = *component_islands.entry(component).or_insert(island);
            assert_eq!(
                island,
                expected,
                "seed {} frame {frame}: connected node {} sits in another island",
                self.seed,
                node.index()
            );
            if let Some(island_id) = island {
                let owner = *island_components.entry(island_id).or_insert(component);
                assert_eq!(
                    owner,
                    component,
                    "seed {} frame {frame}: island {island_id} spans disconnected bodies",
                    self.seed
                );
            }
        }
    }
}

fn find(parent: &mut [usize], mut slot: usize) -> usize {
    while parent[slot] != slot {
        parent[slot] = parent[parent[slot]];
        slot = parent[slot];
    }
    slot
}

#[test]
fn seeded_churn_keeps_islands_matching_components() {
    for seed in 0..4 {
        let mut churn = Churn::new(seed);
        for frame in 0..FRAMES {
            churn.frame(frame);
        }
    }
}

#[test]
fn churn_without_static_contacts_or_sleep() {
    let mut churn = Churn::new(0x5eed);
    for frame in 0..FRAMES {
        let ops = churn.rng.gen_range(1..=4);
        for _ in 0..ops {
            if churn.rng.gen_bool(0.5) {
                let node1 = churn.random_body();
                let mut node2 = churn.random_body();
                while node2.index() == node1.index() {
                    node2 = churn.random_body();
                }
                let edge = churn.h.contact(node1, node2);
                churn.live.push(LiveEdge { edge, node1, node2 });
            } else {
                churn.toggle_with_removal();
            }
        }
        churn.h.step();
        churn.check(frame, "new edges");
        churn.h.settle();
        churn.check(frame, "lost edges");
        churn.check_partitions(frame);
    }
}
