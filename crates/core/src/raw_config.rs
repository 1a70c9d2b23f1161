//! YAML-shaped configuration DTOs.
//!
//! These types mirror the on-disk document exactly, including its
//! polymorphic fields (`command` as a string-or-mapping, `method` as a
//! string-or-list). They are deliberately dumb: [`crate::route::resolve`]
//! is where references get looked up and defaults get applied.

use indexmap::IndexMap;
use serde::Deserialize;

/// Top-level YAML document: a command table plus a route tree.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfig {
    #[serde(default)]
    pub commands: IndexMap<String, RawCommand>,
    #[serde(default)]
    pub routes: IndexMap<String, RawRoute>,
}

impl RawConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, crate::error::ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::error::ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| crate::error::ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_yaml_str(&text)
    }
}

/// A named or inline command definition, as written under `commands:`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawCommand {
    #[serde(default)]
    pub command: String,
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub inline: String,
}

fn default_driver() -> String {
    "local".to_string()
}

/// `route.command` is either a name referencing `commands:`, or an inline
/// command mapping written directly on the route.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandRef {
    Named(String),
    Inline(RawCommand),
}

/// `route.method` is either a single method string or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MethodSpec {
    One(String),
    Many(Vec<String>),
}

impl MethodSpec {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            MethodSpec::One(m) => vec![m],
            MethodSpec::Many(ms) => ms,
        }
    }
}

fn default_method() -> MethodSpec {
    MethodSpec::Many(vec!["GET".to_string()])
}

/// `route.type`, defaulting to `basic`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RawRouteType {
    #[default]
    Basic,
    Resource,
}

/// One entry under `routes:` (or nested under another route's `routes:`).
#[derive(Debug, Clone, Deserialize)]
pub struct RawRoute {
    pub command: CommandRef,
    #[serde(default = "default_method")]
    pub method: MethodSpec,
    #[serde(default, rename = "type")]
    pub kind: RawRouteType,
    #[serde(default)]
    pub routes: IndexMap<String, RawRoute>,
}
