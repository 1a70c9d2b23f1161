//! Builds the axum [`Router`] from a resolved route tree (§4.4).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use cmdgate_core::{collect_endpoints, ConfigError, ResolvedConfig};
use indexmap::IndexMap;
use tower_http::cors::CorsLayer;

use crate::pipeline::execute_pipeline;
use crate::state::AppState;

/// Build the complete application router: one handler per (method,
/// concrete-path) endpoint produced by [`collect_endpoints`].
pub fn build_router(config: &ResolvedConfig, state: Arc<AppState>) -> Result<Router, ConfigError> {
    let endpoints = collect_endpoints(&config.root)?;

    let mut grouped: IndexMap<String, MethodRouter<Arc<AppState>>> = IndexMap::new();
    for endpoint in endpoints {
        let pipeline = endpoint.pipeline;
        let id_params = endpoint.id_params;
        let filter = method_filter(&endpoint.method);
        let handler = move |State(state): State<Arc<AppState>>,
                             Path(params): Path<HashMap<String, String>>,
                             req: Request| {
            let pipeline = pipeline.clone();
            let id_params = id_params.clone();
            async move { execute_pipeline(state, pipeline, id_params, params, req).await }
        };

        let entry = grouped
            .entry(endpoint.path.clone())
            .or_insert_with(MethodRouter::new);
        *entry = entry.clone().on(filter, handler);
    }

    let mut router = Router::new();
    for (path, method_router) in grouped {
        router = router.route(&path, method_router);
    }

    Ok(router.layer(CorsLayer::permissive()).with_state(state))
}

fn method_filter(method: &http::Method) -> MethodFilter {
    match *method {
        http::Method::GET => MethodFilter::GET,
        http::Method::POST => MethodFilter::POST,
        http::Method::PUT => MethodFilter::PUT,
        http::Method::PATCH => MethodFilter::PATCH,
        http::Method::DELETE => MethodFilter::DELETE,
        http::Method::HEAD => MethodFilter::HEAD,
        http::Method::OPTIONS => MethodFilter::OPTIONS,
        http::Method::TRACE => MethodFilter::TRACE,
        _ => MethodFilter::GET,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdgate_core::{raw_config::RawConfig, route::resolve};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn build(yaml: &str) -> Router {
        let raw = RawConfig::from_yaml_str(yaml).unwrap();
        let resolved = resolve(raw).unwrap();
        build_router(&resolved, Arc::new(AppState::new())).unwrap()
    }

    #[tokio::test]
    async fn single_get_returns_command_output() {
        let app = build(
            r#"
commands:
  hello:
    command: "echo hello"
routes:
  hello:
    command: hello
"#,
        );
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/hello")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello\n");
    }

    #[tokio::test]
    async fn status_and_content_type_tags_are_applied() {
        let app = build(
            r#"
commands:
  create_user:
    inline: |
      #!/bin/sh
      printf 'HTTP_CONTENT_TYPE: application/json\nHTTP_STATUS_CODE: 201\n\n{"ok":true}\n'
routes:
  users:
    command: create_user
    method: POST
"#,
        );
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/users")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::CREATED);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"{\"ok\":true}\n");
    }

    #[tokio::test]
    async fn unregistered_path_is_404() {
        let app = build(
            r#"
commands:
  hello:
    command: "echo hello"
routes:
  hello:
    command: hello
"#,
        );
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/missing")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn authentication_short_circuit_halts_pipeline() {
        let app = build(
            r#"
commands:
  guard:
    inline: |
      #!/bin/sh
      if [ -z "$HTTP_HEADER_AUTHORIZATION" ]; then
        printf 'HTTP_STATUS_CODE: 401\nHALT: true\n\n'
      fi
  resource:
    command: "echo '{\"ok\":true}'"
routes:
  secret:
    command: guard
    routes:
      inner:
        command: resource
"#,
        );

        let unauthorized = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/secret/inner")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(unauthorized.status(), http::StatusCode::UNAUTHORIZED);

        let authorized = app
            .oneshot(
                Request::builder()
                    .uri("/secret/inner")
                    .header("Authorization", "secret")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(authorized.status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn resource_child_sees_shadowed_path_param() {
        let app = build(
            r#"
commands:
  articles:
    command: "echo articles"
  comments:
    inline: |
      #!/bin/sh
      printf 'HTTP_CONTENT_TYPE: text/plain\n\n'
      printf "$HTTP_PARAM_ID"
routes:
  articles:
    type: resource
    command: articles
    routes:
      comments:
        type: resource
        command: comments
"#,
        );
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/articles/1/comments/2")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"2");
    }

    #[tokio::test]
    async fn malformed_tag_prelude_is_500() {
        let app = build(
            r#"
commands:
  broken:
    inline: |
      #!/bin/sh
      printf 'HTTP_STATUS_CODE: 200\njunk line\n\nbody'
routes:
  broken:
    command: broken
"#,
        );
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/broken")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("blank line"));
    }
}
