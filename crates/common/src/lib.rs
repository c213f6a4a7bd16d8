pub mod detections;
pub mod events;
pub mod site;
pub mod validation;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
