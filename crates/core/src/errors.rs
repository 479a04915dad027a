//! Error types for the RoleSync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Sheets(#[from] SheetsError),

    #[error(transparent)]
    Discord(#[from] DiscordError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

// ---------------------------------------------------------------------------
// Google Sheets API errors
// ---------------------------------------------------------------------------

/// Errors from Google Sheets REST API interactions.
#[derive(Debug, Error)]
pub enum SheetsError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("Sheets HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("Sheets API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// The API key is missing, invalid, or lacks access to the spreadsheet.
    #[error("Sheets authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The request URL could not be built.
    #[error("invalid Sheets request URL: {0}")]
    InvalidUrl(String),
}

// ---------------------------------------------------------------------------
// Discord API errors
// ---------------------------------------------------------------------------

/// Errors from Discord REST API interactions.
#[derive(Debug, Error)]
pub enum DiscordError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("Discord HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("Discord API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Bot token is missing or invalid, or the bot lacks a permission.
    #[error("Discord authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("Discord rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: String },

    /// The bot is not a member of any guild.
    #[error("bot isn't a member of any server")]
    NoGuild,
}

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// Failure to retrieve sheet rows, the roster, or the role catalog.
///
/// Fatal for the run: nothing useful can be reconciled without the inputs.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("sheet fetch failed: {0}")]
    Sheets(#[from] SheetsError),

    #[error("guild fetch failed: {0}")]
    Discord(#[from] DiscordError),
}

/// Failure to mutate one member's roles.
///
/// Isolated to that member; the apply loop logs it and moves on.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("role update rejected by Discord: {0}")]
    Discord(#[from] DiscordError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading, validation, and role label lookup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// A sheet row names a role label with no entry in `[roles.labels]`.
    #[error("role label '{label}' for '{identity}' is not mapped in [roles.labels]")]
    UnmappedRoleLabel { label: String, identity: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Reconciler errors
// ---------------------------------------------------------------------------

/// Errors that abort a reconciliation run before or during planning.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("reconcile fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("reconcile config error: {0}")]
    Config(#[from] ConfigError),
}
