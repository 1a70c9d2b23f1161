use thiserror::Error;

/// Errors raised while loading and resolving the YAML configuration document.
///
/// These are fatal at startup: the CLI layer wraps them in an `anyhow::Error`
/// with additional context and exits with status 1.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(std::path::PathBuf, std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("route '{path}' references unknown command '{name}'")]
    UnknownCommand { path: String, name: String },

    #[error("command '{name}' has neither 'command' nor 'inline' set")]
    EmptyCommand { name: String },

    #[error("route '{path}' has no HTTP methods")]
    EmptyMethods { path: String },

    #[error("route '{path}' declares unsupported driver '{driver}'")]
    UnsupportedDriver { path: String, driver: String },

    #[error("route '{path}' declares an invalid HTTP method '{method}'")]
    InvalidMethod { path: String, method: String },

    #[error("duplicate endpoint: {method} {path}")]
    DuplicateEndpoint { method: String, path: String },
}

/// Errors raised by the tag codec while parsing a stage's stdout, or while
/// applying between-stage tags to the accumulated environment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("tags and output must be separated with a blank line")]
    MissingBlankLine,

    #[error("ENV_SET value '{0}' is not of the form KEY=VALUE")]
    MalformedEnvSet(String),

    #[error("HALT value '{0}' must be 'true' or 'false'")]
    MalformedHalt(String),
}

/// Errors raised by a driver while executing a command. A non-zero exit
/// status is *not* a `DriverError` — it is surfaced as a normal outcome.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("container driver error: {0}")]
    Container(String),

    #[error("invalid command syntax: {0}")]
    InvalidCommandSyntax(String),
}

/// Errors surfaced by the pipeline executor for a single request. Every
/// variant maps to an HTTP 500 response; the executor never lets one of
/// these escape as a panic.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Tag(#[from] TagError),

    #[error("command exited with status {status}")]
    NonZeroExit { status: i64, body: bytes::Bytes },

    #[error("unparseable HTTP_STATUS_CODE value '{0}'")]
    BadStatusCode(String),
}
