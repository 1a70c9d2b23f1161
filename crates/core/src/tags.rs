//! The tag codec: the in-band protocol carried in a stage's standard output.
//!
//! A stage's stdout begins with zero or more `KEY: value` lines (the
//! "prelude"), ended by a blank line or the first line that doesn't match
//! the tag grammar. Everything after the prelude is the stage's body.

use bytes::Bytes;
use indexmap::IndexMap;

use crate::env::Environment;
use crate::error::TagError;

/// A mapping from uppercase-identifier keys to an ordered list of values,
/// in the order they appeared in a stage's stdout.
pub type TagMap = IndexMap<String, Vec<String>>;

/// The result of parsing a stage's stdout prelude.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub tags: TagMap,
    pub body: Bytes,
}

/// Parse the leading tag prelude out of a stage's raw stdout.
///
/// Operates on bytes, not `str`, because the body following the prelude is
/// not required to be valid UTF-8.
pub fn parse_tags(output: &[u8]) -> Result<ParsedOutput, TagError> {
    let mut tags: TagMap = IndexMap::new();
    let mut tags_seen = false;
    let mut pos = 0usize;

    loop {
        if pos >= output.len() {
            return Ok(ParsedOutput {
                tags,
                body: Bytes::new(),
            });
        }

        let rest = &output[pos..];
        let (line, consumed, has_newline) = match rest.iter().position(|&b| b == b'\n') {
            Some(idx) => (&rest[..idx], idx + 1, true),
            None => (rest, rest.len(), false),
        };

        if line.is_empty() {
            let body_start = pos + consumed;
            return Ok(ParsedOutput {
                tags,
                body: Bytes::copy_from_slice(&output[body_start..]),
            });
        }

        if let Some((key, value)) = parse_tag_line(line) {
            tags.entry(key).or_default().push(value);
            tags_seen = true;
            pos += consumed;
            if !has_newline {
                return Ok(ParsedOutput {
                    tags,
                    body: Bytes::new(),
                });
            }
            continue;
        }

        if tags_seen {
            return Err(TagError::MissingBlankLine);
        }
        return Ok(ParsedOutput {
            tags: TagMap::new(),
            body: Bytes::copy_from_slice(output),
        });
    }
}

/// Match `^[A-Z_]+: .*$` against one line and split it into key/value.
fn parse_tag_line(line: &[u8]) -> Option<(String, String)> {
    let sep = line.windows(2).position(|w| w == b": ")?;
    let key_bytes = &line[..sep];
    if key_bytes.is_empty()
        || !key_bytes
            .iter()
            .all(|&b| b.is_ascii_uppercase() || b == b'_')
    {
        return None;
    }
    let key = String::from_utf8(key_bytes.to_vec()).ok()?;
    let value = String::from_utf8_lossy(&line[sep + 2..]).into_owned();
    Some((key, value))
}

/// The result of applying one stage's between-stage tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct BetweenStageOutcome {
    pub halt: bool,
}

/// Apply a stage's tags to the accumulated environment and terminal-tag map.
///
/// `ENV_SET` and `HALT` take the *last* value seen for the key (matching the
/// wire format's "last one wins" convention); everything else is copied
/// wholesale into `terminal`, overwriting any prior value list for that key.
pub fn apply_between_stage(
    tags: &TagMap,
    env: &mut Environment,
    terminal: &mut TagMap,
) -> Result<BetweenStageOutcome, TagError> {
    let mut outcome = BetweenStageOutcome::default();

    for (key, values) in tags {
        let Some(last) = values.last() else {
            continue;
        };

        match key.as_str() {
            "ENV_SET" => match last.split_once('=') {
                Some((k, _)) if !k.is_empty() => env.push_raw(last.clone()),
                _ => return Err(TagError::MalformedEnvSet(last.clone())),
            },
            "DEBUG" => {
                for v in values {
                    tracing::info!(value = %v, "DEBUG tag");
                }
            }
            "HALT" => match last.as_str() {
                "true" => outcome.halt = true,
                "false" => outcome.halt = false,
                other => return Err(TagError::MalformedHalt(other.to_string())),
            },
            other => {
                terminal.insert(other.to_string(), values.clone());
            }
        }
    }

    Ok(outcome)
}

/// One terminal-tag effect on the HTTP response, resolved from the
/// accumulated terminal-tag map using the last value for each key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEffect {
    ContentType(String),
    StatusCode(u16),
    Redirect(String),
}

/// Resolve the terminal-tag map into the effects the server crate applies
/// to the response. Order among distinct keys is unspecified; callers
/// should set headers before writing the status.
pub fn resolve_terminal(terminal: &TagMap) -> Result<Vec<TerminalEffect>, crate::error::ExecutionError> {
    let mut effects = Vec::new();
    for (key, values) in terminal {
        let Some(last) = values.last() else {
            continue;
        };
        match key.as_str() {
            "HTTP_CONTENT_TYPE" => effects.push(TerminalEffect::ContentType(last.clone())),
            "HTTP_STATUS_CODE" => {
                let code: u16 = last
                    .parse()
                    .ok()
                    .filter(|c| (100..=599).contains(c))
                    .ok_or_else(|| crate::error::ExecutionError::BadStatusCode(last.clone()))?;
                effects.push(TerminalEffect::StatusCode(code));
            }
            "HTTP_REDIRECT" => {
                effects.push(TerminalEffect::Redirect(last.clone()));
                effects.push(TerminalEffect::StatusCode(303));
            }
            _ => {}
        }
    }
    Ok(effects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tags_and_body() {
        let out = parse_tags(
            b"HTTP_CONTENT_TYPE: application/json\nHTTP_STATUS_CODE: 201\n\n{\"ok\":true}\n",
        )
        .unwrap();
        assert_eq!(out.tags["HTTP_CONTENT_TYPE"], vec!["application/json"]);
        assert_eq!(out.tags["HTTP_STATUS_CODE"], vec!["201"]);
        assert_eq!(&out.body[..], b"{\"ok\":true}\n");
    }

    #[test]
    fn empty_output_is_empty_tags_and_body() {
        let out = parse_tags(b"").unwrap();
        assert!(out.tags.is_empty());
        assert!(out.body.is_empty());
    }

    #[test]
    fn prelude_without_trailing_blank_line_is_valid_with_empty_body() {
        let out = parse_tags(b"HTTP_STATUS_CODE: 200\n").unwrap();
        assert_eq!(out.tags["HTTP_STATUS_CODE"], vec!["200"]);
        assert!(out.body.is_empty());

        let out = parse_tags(b"HTTP_STATUS_CODE: 200").unwrap();
        assert_eq!(out.tags["HTTP_STATUS_CODE"], vec!["200"]);
        assert!(out.body.is_empty());
    }

    #[test]
    fn lowercase_key_is_treated_as_body() {
        let out = parse_tags(b"hello: world\nrest of body").unwrap();
        assert!(out.tags.is_empty());
        assert_eq!(&out.body[..], b"hello: world\nrest of body");
    }

    #[test]
    fn non_tag_line_after_tags_without_blank_separator_is_an_error() {
        let err = parse_tags(b"HTTP_STATUS_CODE: 200\njunk line\n\nbody").unwrap_err();
        assert_eq!(err, TagError::MissingBlankLine);
    }

    #[test]
    fn repeated_keys_accumulate_in_order() {
        let out = parse_tags(b"DEBUG: one\nDEBUG: two\n\n").unwrap();
        assert_eq!(out.tags["DEBUG"], vec!["one", "two"]);
    }

    #[test]
    fn between_stage_env_set_appends_last_value() {
        let mut tags = TagMap::new();
        tags.insert("ENV_SET".to_string(), vec!["A=1".to_string(), "B=2".to_string()]);
        let mut env = Environment::new();
        let mut terminal = TagMap::new();
        apply_between_stage(&tags, &mut env, &mut terminal).unwrap();
        assert_eq!(env.as_pairs(), &["B=2".to_string()]);
    }

    #[test]
    fn between_stage_rejects_malformed_env_set() {
        let mut tags = TagMap::new();
        tags.insert("ENV_SET".to_string(), vec!["not-a-pair".to_string()]);
        let mut env = Environment::new();
        let mut terminal = TagMap::new();
        let err = apply_between_stage(&tags, &mut env, &mut terminal).unwrap_err();
        assert!(matches!(err, TagError::MalformedEnvSet(_)));
    }

    #[test]
    fn between_stage_halt_uses_last_value() {
        let mut tags = TagMap::new();
        tags.insert("HALT".to_string(), vec!["true".to_string(), "false".to_string()]);
        let mut env = Environment::new();
        let mut terminal = TagMap::new();
        let outcome = apply_between_stage(&tags, &mut env, &mut terminal).unwrap();
        assert!(!outcome.halt);
    }

    #[test]
    fn between_stage_other_keys_land_in_terminal_map() {
        let mut tags = TagMap::new();
        tags.insert("HTTP_STATUS_CODE".to_string(), vec!["201".to_string()]);
        let mut env = Environment::new();
        let mut terminal = TagMap::new();
        apply_between_stage(&tags, &mut env, &mut terminal).unwrap();
        assert_eq!(terminal["HTTP_STATUS_CODE"], vec!["201"]);
    }

    #[test]
    fn between_stage_is_idempotent_without_env_set() {
        let mut tags = TagMap::new();
        tags.insert("HTTP_STATUS_CODE".to_string(), vec!["201".to_string()]);
        tags.insert("HALT".to_string(), vec!["true".to_string()]);

        let mut env1 = Environment::new();
        let mut terminal1 = TagMap::new();
        apply_between_stage(&tags, &mut env1, &mut terminal1).unwrap();
        apply_between_stage(&tags, &mut env1, &mut terminal1).unwrap();

        let mut env2 = Environment::new();
        let mut terminal2 = TagMap::new();
        apply_between_stage(&tags, &mut env2, &mut terminal2).unwrap();

        assert_eq!(env1.as_pairs(), env2.as_pairs());
        assert_eq!(terminal1, terminal2);
    }

    #[test]
    fn resolve_terminal_rejects_out_of_range_status() {
        let mut terminal = TagMap::new();
        terminal.insert("HTTP_STATUS_CODE".to_string(), vec!["99999".to_string()]);
        let err = resolve_terminal(&terminal).unwrap_err();
        assert!(matches!(err, crate::error::ExecutionError::BadStatusCode(_)));
    }

    #[test]
    fn resolve_terminal_redirect_sets_status_303() {
        let mut terminal = TagMap::new();
        terminal.insert("HTTP_REDIRECT".to_string(), vec!["/elsewhere".to_string()]);
        let effects = resolve_terminal(&terminal).unwrap();
        assert!(effects.contains(&TerminalEffect::Redirect("/elsewhere".to_string())));
        assert!(effects.contains(&TerminalEffect::StatusCode(303)));
    }
}
