pub mod context;
pub mod control;
pub mod error;
pub mod logging;

pub use tracing;
