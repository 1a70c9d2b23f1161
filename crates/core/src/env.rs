//! The per-request environment: an ordered sequence of `KEY=VALUE` strings
//! threaded through a pipeline, materialized from the HTTP request and
//! extended by between-stage `ENV_SET` tags.

use indexmap::IndexMap;

/// An ordered, append-only sequence of `KEY=VALUE` pairs.
///
/// Cloning an `Environment` is a deep copy of the pair list, which is what
/// lets each request own an independent copy while still being cheap to
/// build incrementally.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pairs: Vec<String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, value: &str) {
        self.pairs.push(format!("{key}={value}"));
    }

    /// Append an already-formatted `KEY=VALUE` pair, as produced by an
    /// `ENV_SET` tag.
    pub fn push_raw(&mut self, pair: String) {
        self.pairs.push(pair);
    }

    pub fn as_pairs(&self) -> &[String] {
        &self.pairs
    }

    /// Split each pair on its first `=` for handing to a process spawner's
    /// `envs()` call. Pairs without `=` are skipped (construction guards
    /// against this, so this only matters for hand-built environments).
    pub fn to_envp(&self) -> Vec<(String, String)> {
        self.pairs
            .iter()
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

/// Uppercase a header or path-parameter name and replace `-` with `_`, the
/// CGI-style normalization used for `HTTP_HEADER_*` and `HTTP_PARAM_*`.
fn normalize_name(name: &str) -> String {
    name.to_uppercase().replace('-', "_")
}

/// Build the initial environment for a request: method, URL and its
/// components, headers, and path parameters.
///
/// `params` is an ordered list rather than a map so a caller can deliberately
/// repeat a logical name (e.g. nested resources both contributing an `id`)
/// and have the later entry shadow the earlier one, the same "last one wins"
/// rule `ENV_SET` follows.
pub fn from_request(
    method: &http::Method,
    uri: &http::Uri,
    headers: &http::HeaderMap,
    params: &[(String, String)],
) -> Environment {
    let mut env = Environment::new();

    env.push("HTTP_METHOD", method.as_str());
    env.push("HTTP_URL", &uri.to_string());
    env.push("HTTP_URL_SCHEME", uri.scheme_str().unwrap_or("http"));
    env.push("HTTP_URL_HOST", uri.host().unwrap_or(""));
    env.push(
        "HTTP_URL_PORT",
        &uri.port_u16().map(|p| p.to_string()).unwrap_or_default(),
    );
    env.push("HTTP_URL_PATH", uri.path());
    env.push("HTTP_URL_QUERY", uri.query().unwrap_or(""));
    env.push("HTTP_URL_FRAGMENT", "");

    if let Some((user, pass)) = basic_auth_userinfo(headers) {
        env.push("HTTP_URL_USERNAME", &user);
        env.push("HTTP_URL_PASSWORD", &pass);
    }

    for (name, joined) in grouped_headers(headers) {
        env.push(&format!("HTTP_HEADER_{}", normalize_name(&name)), &joined);
    }

    for (name, value) in params {
        env.push(&format!("HTTP_PARAM_{}", normalize_name(name)), value);
    }

    env
}

/// Group a `HeaderMap`'s possibly-repeated values per name, joined with
/// `", "`, preserving first-seen order.
fn grouped_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    let mut order = Vec::new();
    let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
    for (name, value) in headers {
        let name = name.as_str().to_string();
        let value = value.to_str().unwrap_or("").to_string();
        if !grouped.contains_key(&name) {
            order.push(name.clone());
        }
        grouped.entry(name).or_default().push(value);
    }
    order
        .into_iter()
        .map(|name| {
            let joined = grouped[&name].join(", ");
            (name, joined)
        })
        .collect()
}

/// Decode `Authorization: Basic <base64>` into `(username, password)`.
///
/// HTTP servers never see literal URI userinfo on the request line; the
/// Basic-auth header is the practical carrier of that information.
fn basic_auth_userinfo(headers: &http::HeaderMap) -> Option<(String, String)> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue, Method, Uri};

    #[test]
    fn builds_method_and_url_components() {
        let uri: Uri = "http://example.com:8080/users?active=1".parse().unwrap();
        let headers = HeaderMap::new();
        let env = from_request(&Method::GET, &uri, &headers, &[]);
        assert!(env.as_pairs().contains(&"HTTP_METHOD=GET".to_string()));
        assert!(env.as_pairs().contains(&"HTTP_URL_SCHEME=http".to_string()));
        assert!(env.as_pairs().contains(&"HTTP_URL_HOST=example.com".to_string()));
        assert!(env.as_pairs().contains(&"HTTP_URL_PORT=8080".to_string()));
        assert!(env.as_pairs().contains(&"HTTP_URL_PATH=/users".to_string()));
        assert!(env
            .as_pairs()
            .contains(&"HTTP_URL_QUERY=active=1".to_string()));
    }

    #[test]
    fn joins_repeated_headers_and_normalizes_names() {
        let uri: Uri = "/".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.append("X-Custom-Id", HeaderValue::from_static("a"));
        headers.append("X-Custom-Id", HeaderValue::from_static("b"));
        let env = from_request(&Method::GET, &uri, &headers, &[]);
        assert!(env
            .as_pairs()
            .contains(&"HTTP_HEADER_X_CUSTOM_ID=a, b".to_string()));
    }

    #[test]
    fn path_params_are_prefixed_and_normalized() {
        let uri: Uri = "/articles/1".parse().unwrap();
        let headers = HeaderMap::new();
        let params = vec![("id".to_string(), "1".to_string())];
        let env = from_request(&Method::GET, &uri, &headers, &params);
        assert!(env.as_pairs().contains(&"HTTP_PARAM_ID=1".to_string()));
    }

    #[test]
    fn repeated_logical_param_name_has_last_value_win() {
        let uri: Uri = "/articles/1/comments/2".parse().unwrap();
        let headers = HeaderMap::new();
        let params = vec![
            ("id".to_string(), "1".to_string()),
            ("id".to_string(), "2".to_string()),
        ];
        let env = from_request(&Method::GET, &uri, &headers, &params);
        let values: Vec<_> = env
            .as_pairs()
            .iter()
            .filter(|p| p.starts_with("HTTP_PARAM_ID="))
            .collect();
        assert_eq!(values, vec!["HTTP_PARAM_ID=1", "HTTP_PARAM_ID=2"]);
        assert_eq!(env.to_envp().last().unwrap().1, "2");
    }

    #[test]
    fn decodes_basic_auth_userinfo() {
        let uri: Uri = "/".parse().unwrap();
        let mut headers = HeaderMap::new();
        // "alice:secret" base64-encoded
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic YWxpY2U6c2VjcmV0"),
        );
        let env = from_request(&Method::GET, &uri, &headers, &[]);
        assert!(env
            .as_pairs()
            .contains(&"HTTP_URL_USERNAME=alice".to_string()));
        assert!(env
            .as_pairs()
            .contains(&"HTTP_URL_PASSWORD=secret".to_string()));
    }

    #[test]
    fn env_set_tag_appends_raw_pair() {
        let mut env = Environment::new();
        env.push("A", "1");
        env.push_raw("B=2".to_string());
        assert_eq!(env.as_pairs(), &["A=1".to_string(), "B=2".to_string()]);
        assert_eq!(
            env.to_envp(),
            vec![("A".to_string(), "1".to_string()), ("B".to_string(), "2".to_string())]
        );
    }
}
