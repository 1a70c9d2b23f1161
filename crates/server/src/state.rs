//! Shared application state: the driver instances routes dispatch to.
//!
//! The container driver connects to the Docker daemon lazily and only on
//! first use, so a gateway with no container-backed routes never needs a
//! working daemon socket.

use cmdgate_core::{Command, DriverError, DriverKind};
use cmdgate_drivers::{ContainerDriver, Driver, LocalDriver};
use tokio::sync::OnceCell;

pub struct AppState {
    local: LocalDriver,
    container: OnceCell<Result<ContainerDriver, String>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            local: LocalDriver,
            container: OnceCell::new(),
        }
    }

    pub async fn driver_for(&self, command: &Command) -> Result<&dyn Driver, DriverError> {
        match command.driver {
            DriverKind::Local => Ok(&self.local as &dyn Driver),
            DriverKind::Container => {
                let result = self
                    .container
                    .get_or_init(|| async {
                        ContainerDriver::connect().map_err(|e| e.to_string())
                    })
                    .await;
                match result {
                    Ok(driver) => Ok(driver as &dyn Driver),
                    Err(msg) => Err(DriverError::Container(msg.clone())),
                }
            }
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
