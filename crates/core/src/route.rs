//! The route tree and the builder that flattens it into concrete endpoints.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::command::Command;
use crate::error::ConfigError;
use crate::raw_config::{CommandRef, RawConfig, RawRoute, RawRouteType};

/// A node in the route tree.
///
/// `Root` exists only to own the top-level routes; it can never itself
/// handle a request. `Basic` and `Resource` share the same shape (a bound
/// command and children) but expand into different endpoint matrices — see
/// [`collect_endpoints`].
#[derive(Debug, Clone)]
pub enum RouteNode {
    Root {
        children: IndexMap<String, RouteNode>,
    },
    Basic {
        segment: String,
        methods: Vec<http::Method>,
        command: Arc<Command>,
        children: IndexMap<String, RouteNode>,
    },
    Resource {
        segment: String,
        command: Arc<Command>,
        children: IndexMap<String, RouteNode>,
    },
}

/// The fully resolved configuration: every named command, plus the route
/// tree built from it.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub commands: IndexMap<String, Arc<Command>>,
    pub root: RouteNode,
}

/// One concrete (method, path) endpoint and the pipeline bound to it.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: http::Method,
    pub path: String,
    pub pipeline: Vec<Arc<Command>>,
    /// Axum path-parameter names, outermost resource first, that each carry
    /// one resource's instance id. Every one of these is surfaced to the
    /// pipeline as `HTTP_PARAM_ID`, the innermost shadowing the outermost —
    /// they cannot all literally be named `id` in one route pattern (axum
    /// rejects a duplicate parameter name within a single route), so nested
    /// resources get a disambiguated name (`<segment>_id`) that this list
    /// maps back to the one logical `id`.
    pub id_params: Vec<String>,
}

/// Resolve a parsed YAML document into a [`ResolvedConfig`].
pub fn resolve(raw: RawConfig) -> Result<ResolvedConfig, ConfigError> {
    let mut commands = IndexMap::new();
    for (name, raw_cmd) in &raw.commands {
        commands.insert(name.clone(), Arc::new(Command::resolve(name, raw_cmd)?));
    }

    let mut inline_counter = 0usize;
    let children = resolve_children(&raw.routes, &mut commands, &mut inline_counter)?;
    Ok(ResolvedConfig {
        commands,
        root: RouteNode::Root { children },
    })
}

fn resolve_command_ref(
    path_hint: &str,
    cmd_ref: &CommandRef,
    commands: &mut IndexMap<String, Arc<Command>>,
    inline_counter: &mut usize,
) -> Result<Arc<Command>, ConfigError> {
    match cmd_ref {
        CommandRef::Named(name) => commands
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownCommand {
                path: path_hint.to_string(),
                name: name.clone(),
            }),
        CommandRef::Inline(raw_cmd) => {
            *inline_counter += 1;
            let synthetic_name = format!("{path_hint}#inline{inline_counter}");
            let cmd = Arc::new(Command::resolve(&synthetic_name, raw_cmd)?);
            commands.insert(synthetic_name.clone(), cmd.clone());
            Ok(cmd)
        }
    }
}

fn resolve_methods(path_hint: &str, raw_route: &RawRoute) -> Result<Vec<http::Method>, ConfigError> {
    let names = raw_route.method.clone().into_vec();
    if names.is_empty() {
        return Err(ConfigError::EmptyMethods {
            path: path_hint.to_string(),
        });
    }
    names
        .iter()
        .map(|name| {
            name.parse::<http::Method>()
                .map_err(|_| ConfigError::InvalidMethod {
                    path: path_hint.to_string(),
                    method: name.clone(),
                })
        })
        .collect()
}

fn resolve_children(
    raw_routes: &IndexMap<String, RawRoute>,
    commands: &mut IndexMap<String, Arc<Command>>,
    inline_counter: &mut usize,
) -> Result<IndexMap<String, RouteNode>, ConfigError> {
    let mut out = IndexMap::new();
    for (segment, raw_route) in raw_routes {
        let command = resolve_command_ref(segment, &raw_route.command, commands, inline_counter)?;
        let children = resolve_children(&raw_route.routes, commands, inline_counter)?;
        let node = match raw_route.kind {
            RawRouteType::Basic => {
                let methods = resolve_methods(segment, raw_route)?;
                RouteNode::Basic {
                    segment: segment.clone(),
                    methods,
                    command,
                    children,
                }
            }
            RawRouteType::Resource => RouteNode::Resource {
                segment: segment.clone(),
                command,
                children,
            },
        };
        out.insert(segment.clone(), node);
    }
    Ok(out)
}

/// Join a path prefix and a segment with `/`, collapsing adjacent slashes.
/// The literal `*` segment contributes to the pipeline but is dropped from
/// the accumulated path, making it a grouping-only node.
pub fn join_path(prefix: &str, segment: &str) -> String {
    if segment == "*" {
        return collapse(prefix);
    }
    collapse(&format!("{prefix}/{segment}"))
}

fn collapse(path: &str) -> String {
    let mut out = String::new();
    for seg in path.split('/') {
        if seg.is_empty() {
            continue;
        }
        out.push('/');
        out.push_str(seg);
    }
    if out.is_empty() {
        "/".to_string()
    } else {
        out
    }
}

/// Walk the route tree depth-first and flatten it into one [`Endpoint`] per
/// registered (method, concrete-path) leaf, per §4.4's algorithm.
pub fn collect_endpoints(root: &RouteNode) -> Result<Vec<Endpoint>, ConfigError> {
    let RouteNode::Root { children } = root else {
        unreachable!("collect_endpoints is only called on a Root node");
    };

    let mut endpoints = Vec::new();
    let mut seen = HashSet::new();
    for (segment, child) in children {
        walk(segment, child, "", &[], &[], 0, &mut endpoints, &mut seen)?;
    }
    Ok(endpoints)
}

/// The axum-literal name for a resource's instance-id parameter. The
/// outermost resource in a path gets the plain `id`; nested resources get
/// `<segment>_id` so a single route pattern never repeats a parameter name
/// (axum panics at router-build time if it does).
fn id_param_name(segment: &str, resource_depth: usize) -> String {
    if resource_depth == 0 {
        "id".to_string()
    } else {
        format!("{segment}_id")
    }
}

#[allow(clippy::too_many_arguments)]
fn walk(
    segment: &str,
    node: &RouteNode,
    prefix: &str,
    pipeline: &[Arc<Command>],
    id_params: &[String],
    resource_depth: usize,
    endpoints: &mut Vec<Endpoint>,
    seen: &mut HashSet<(String, String)>,
) -> Result<(), ConfigError> {
    let path = join_path(prefix, segment);

    match node {
        RouteNode::Root { .. } => unreachable!("a route tree cannot nest another root"),
        RouteNode::Basic {
            methods,
            command,
            children,
            ..
        } => {
            let mut pipeline = pipeline.to_vec();
            pipeline.push(command.clone());

            if children.is_empty() {
                for method in methods {
                    register(
                        endpoints,
                        seen,
                        method.clone(),
                        path.clone(),
                        pipeline.clone(),
                        id_params.to_vec(),
                    )?;
                }
            } else {
                for (child_segment, child) in children {
                    walk(
                        child_segment,
                        child,
                        &path,
                        &pipeline,
                        id_params,
                        resource_depth,
                        endpoints,
                        seen,
                    )?;
                }
            }
        }
        RouteNode::Resource {
            command, children, ..
        } => {
            let mut pipeline = pipeline.to_vec();
            pipeline.push(command.clone());

            for method in [http::Method::GET, http::Method::POST] {
                register(
                    endpoints,
                    seen,
                    method,
                    path.clone(),
                    pipeline.clone(),
                    id_params.to_vec(),
                )?;
            }

            let id_name = id_param_name(segment, resource_depth);
            let instance_path = join_path(&path, &format!("{{{id_name}}}"));
            let mut nested_id_params = id_params.to_vec();
            nested_id_params.push(id_name);

            for method in [
                http::Method::GET,
                http::Method::PUT,
                http::Method::PATCH,
                http::Method::DELETE,
            ] {
                register(
                    endpoints,
                    seen,
                    method,
                    instance_path.clone(),
                    pipeline.clone(),
                    nested_id_params.clone(),
                )?;
            }

            for (child_segment, child) in children {
                walk(
                    child_segment,
                    child,
                    &instance_path,
                    &pipeline,
                    &nested_id_params,
                    resource_depth + 1,
                    endpoints,
                    seen,
                )?;
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn register(
    endpoints: &mut Vec<Endpoint>,
    seen: &mut HashSet<(String, String)>,
    method: http::Method,
    path: String,
    pipeline: Vec<Arc<Command>>,
    id_params: Vec<String>,
) -> Result<(), ConfigError> {
    let key = (method.to_string(), path.clone());
    if !seen.insert(key) {
        return Err(ConfigError::DuplicateEndpoint {
            method: method.to_string(),
            path,
        });
    }
    endpoints.push(Endpoint {
        method,
        path,
        pipeline,
        id_params,
    });
    Ok(())
}
