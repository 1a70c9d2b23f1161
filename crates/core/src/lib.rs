//! Core domain types for the routing-and-pipeline engine: the route tree,
//! the command model, the tag codec, and the per-request environment.
//!
//! This crate has no knowledge of HTTP transport or process execution; it
//! is consumed by `cmdgate-drivers` (execution) and `cmdgate-server`
//! (transport) alike.

pub mod command;
pub mod env;
pub mod error;
pub mod raw_config;
pub mod route;
pub mod tags;

pub use command::{Command, DriverKind};
pub use env::Environment;
pub use error::{ConfigError, DriverError, ExecutionError, TagError};
pub use raw_config::RawConfig;
pub use route::{collect_endpoints, resolve, Endpoint, ResolvedConfig, RouteNode};
pub use tags::{apply_between_stage, parse_tags, resolve_terminal, TagMap};
