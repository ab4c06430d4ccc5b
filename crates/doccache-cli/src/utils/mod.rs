//! Shared helpers for command implementations

pub mod logging;
pub mod session;

pub use logging::initialize_logging;
pub use session::{Locations, Session, load_config};
