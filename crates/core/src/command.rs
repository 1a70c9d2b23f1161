//! The resolved, immutable `Command` — the unit a driver executes.

use crate::error::ConfigError;
use crate::raw_config::RawCommand;

/// Which driver plug-in runs a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Local,
    Container,
}

impl DriverKind {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "local" => Some(DriverKind::Local),
            "container" => Some(DriverKind::Container),
            _ => None,
        }
    }
}

/// A stable, immutable command definition shared by every route that binds it.
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub driver: DriverKind,
    pub command: String,
    pub image: String,
    pub inline: String,
}

impl Command {
    /// Resolve a [`RawCommand`] parsed from YAML into an immutable `Command`,
    /// validating the driver name and the "at least one of command/inline" invariant.
    pub fn resolve(name: &str, raw: &RawCommand) -> Result<Self, ConfigError> {
        if raw.command.is_empty() && raw.inline.is_empty() {
            return Err(ConfigError::EmptyCommand {
                name: name.to_string(),
            });
        }
        let driver = DriverKind::parse(&raw.driver).ok_or_else(|| ConfigError::UnsupportedDriver {
            path: name.to_string(),
            driver: raw.driver.clone(),
        })?;
        Ok(Command {
            name: name.to_string(),
            driver,
            command: raw.command.clone(),
            image: raw.image.clone(),
            inline: raw.inline.clone(),
        })
    }

    /// For the local driver, `inline` takes precedence over `command` when both are set.
    pub fn uses_inline(&self) -> bool {
        !self.inline.is_empty()
    }
}
