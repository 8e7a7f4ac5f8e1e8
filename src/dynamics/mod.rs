//! Island generation: the incremental island sim and the manager that pairs two of them.

pub mod island_sim;
pub mod simple_island_manager;

pub use island_sim::IslandSim;
pub use simple_island_manager::{EdgePayload, SimpleIslandManager};
