//! Driver plug-ins that execute a [`cmdgate_core::Command`]: a local
//! subprocess driver and a container driver.

pub mod container;
pub mod driver;
pub mod local;

pub use container::ContainerDriver;
pub use driver::{Driver, Output, Streams};
pub use local::LocalDriver;
