//! Domain models shared across the watcher.

pub mod alert;
pub mod position;
pub mod quote;
pub mod universe;

pub use alert::{Alert, AlertKey, Category, Direction};
pub use position::{Position, PositionStatus};
pub use quote::Quote;
pub use universe::{BaselineMode, LoadedUniverse, UniverseConfig};
