//! Utility helpers: handle allocation, bit sets, and logging.

pub mod bitmap;
pub mod handle_manager;
pub mod logging;

pub use bitmap::BitMap;
pub use handle_manager::{Handle, HandleManager};
pub use logging::ScopedTimer;
