//! TOML-based configuration system for RoleSync.
//!
//! Secrets (the Sheets API key and the Discord bot token) are stored as
//! `_env` fields that reference environment variable names. The actual
//! secrets are resolved at runtime via [`AppConfig::resolve_env_vars`].

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Per-run settings.
    #[serde(default)]
    pub run: RunConfig,

    /// Spreadsheet sources.
    pub sheets: SheetsConfig,

    /// Discord connection settings.
    pub discord: DiscordConfig,

    /// Role naming and label mapping.
    pub roles: RolesConfig,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Per-run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Compute and log the plan without touching the guild.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Sheets
// ---------------------------------------------------------------------------

/// Google Sheets sources for the four row sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    /// Sheets API base URL (default `https://sheets.googleapis.com/v4`).
    #[serde(default = "default_sheets_api_url")]
    pub api_url: String,

    /// Environment variable holding the Google API key.
    pub api_key_env: String,

    /// Spreadsheet holding the builder list.
    pub builders_spreadsheet_id: String,

    /// A1 range of the builder list (e.g. `Builders!A2:A`).
    pub builders_range: String,

    /// Spreadsheet holding the others, coworkers, and banned lists.
    pub others_spreadsheet_id: String,

    /// A1 range of `[username, role label]` rows.
    pub others_range: String,

    /// A1 range of `[username, weeks]` rows.
    pub coworkers_range: String,

    /// A1 range of banned usernames.
    pub banned_range: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Resolved API key (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_sheets_api_url() -> String {
    "https://sheets.googleapis.com/v4".into()
}

// ---------------------------------------------------------------------------
// Discord
// ---------------------------------------------------------------------------

/// Discord bot and guild settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Discord API base URL (default `https://discord.com/api/v10`).
    #[serde(default = "default_discord_api_url")]
    pub api_url: String,

    /// Environment variable holding the bot token.
    pub token_env: String,

    /// Guild to reconcile. When unset, the first guild the bot belongs to.
    #[serde(default)]
    pub guild_id: Option<String>,

    /// Name of the role every member implicitly holds; never stripped.
    #[serde(default = "default_default_role")]
    pub default_role: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Resolved bot token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_discord_api_url() -> String {
    "https://discord.com/api/v10".into()
}
fn default_default_role() -> String {
    "@everyone".into()
}
fn default_request_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// How sheet rows translate into guild role names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesConfig {
    /// Role granted to every builder.
    pub builder_role: String,

    /// Prefix of the synthetic coworker roles; the week marker is appended.
    #[serde(default = "default_coworker_prefix")]
    pub coworker_role_prefix: String,

    /// Substrings looked for in the coworker "weeks" cell.
    #[serde(default = "default_coworker_weeks")]
    pub coworker_weeks: Vec<String>,

    /// Sheet role label -> guild role name.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

fn default_coworker_prefix() -> String {
    "cm24-coworker".into()
}
fn default_coworker_weeks() -> Vec<String> {
    vec!["1".into(), "2".into()]
}

impl RolesConfig {
    /// Guild role name for a sheet label, if mapped.
    pub fn role_for_label(&self, label: &str) -> Option<&str> {
        self.labels.get(label).map(String::as_str)
    }

    /// Synthetic role name for a coworker week marker.
    pub fn coworker_role(&self, week: &str) -> String {
        format!("{}{}", self.coworker_role_prefix, week)
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve the `*_env` fields from environment variables.
    ///
    /// Both secrets are required for a run, so a missing variable is an
    /// error rather than a warning.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        self.sheets.api_key = Some(resolve_required_env(
            &self.sheets.api_key_env,
            "sheets.api_key_env",
        )?);
        self.discord.token = Some(resolve_required_env(
            &self.discord.token_env,
            "discord.token_env",
        )?);

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("sheets.builders_spreadsheet_id", &self.sheets.builders_spreadsheet_id),
            ("sheets.builders_range", &self.sheets.builders_range),
            ("sheets.others_spreadsheet_id", &self.sheets.others_spreadsheet_id),
            ("sheets.others_range", &self.sheets.others_range),
            ("sheets.coworkers_range", &self.sheets.coworkers_range),
            ("sheets.banned_range", &self.sheets.banned_range),
            ("roles.builder_role", &self.roles.builder_role),
            ("discord.default_role", &self.discord.default_role),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "must not be empty".into(),
                });
            }
        }

        if let Some((label, _)) = self.roles.labels.iter().find(|(_, name)| name.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: format!("roles.labels.{label}"),
                detail: "role name must not be empty".into(),
            });
        }
        if self.roles.coworker_weeks.iter().any(|w| w.is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "roles.coworker_weeks".into(),
                detail: "week markers must not be empty".into(),
            });
        }
        if matches!(self.discord.guild_id.as_deref(), Some(id) if id.parse::<u64>().is_err()) {
            return Err(ConfigError::InvalidValue {
                field: "discord.guild_id".into(),
                detail: "guild id must be a numeric snowflake".into(),
            });
        }
        let timeouts = [
            ("sheets.request_timeout_secs", self.sheets.request_timeout_secs),
            ("discord.request_timeout_secs", self.discord.request_timeout_secs),
        ];
        if let Some((field, _)) = timeouts.into_iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::InvalidValue {
                field: field.into(),
                detail: "request timeout must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Read an environment variable that must be set and non-empty.
fn resolve_required_env(env_name: &str, field: &str) -> Result<String, ConfigError> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Ok(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            Err(ConfigError::EnvVarMissing {
                var: env_name.into(),
                field: field.into(),
            })
        }
        Err(_) => Err(ConfigError::EnvVarMissing {
            var: env_name.into(),
            field: field.into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[run]
log_level = "debug"
dry_run = true

[sheets]
api_url = "https://sheets.example.com/v4"
api_key_env = "GOOGLE_API_KEY"
builders_spreadsheet_id = "builders-sheet"
builders_range = "Builders!A2:A"
others_spreadsheet_id = "others-sheet"
others_range = "Others!A2:B"
coworkers_range = "Coworkers!A2:B"
banned_range = "Banned!A2:A"

[discord]
token_env = "DISCORD_TOKEN"
guild_id = "123456789012345678"
default_role = "@everyone"

[roles]
builder_role = "builder"
coworker_role_prefix = "coworkerWeek"
coworker_weeks = ["1", "2", "3"]

[roles.labels]
mentor = "MENTOR"
judge = "Judge"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert!(config.run.dry_run);
        assert_eq!(config.sheets.others_range, "Others!A2:B");
        assert_eq!(config.discord.guild_id.as_deref(), Some("123456789012345678"));
        assert_eq!(config.roles.role_for_label("mentor"), Some("MENTOR"));
        assert_eq!(config.roles.role_for_label("wizard"), None);
        assert_eq!(config.roles.coworker_role("3"), "coworkerWeek3");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rolesync.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.run.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/rolesync.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_rejects_empty_range() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.sheets.banned_range = "  ".into();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "sheets.banned_range"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_guild_id() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.discord.guild_id = Some("my-server".into());
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "discord.guild_id"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_label_target() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.roles.labels.insert("ghost".into(), String::new());
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "roles.labels.ghost"
        ));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("TEST_ROLESYNC_API_KEY", "AIza-test");
        std::env::set_var("TEST_ROLESYNC_TOKEN", "bot-token");

        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.sheets.api_key_env = "TEST_ROLESYNC_API_KEY".into();
        config.discord.token_env = "TEST_ROLESYNC_TOKEN".into();
        config.resolve_env_vars().unwrap();

        assert_eq!(config.sheets.api_key.as_deref(), Some("AIza-test"));
        assert_eq!(config.discord.token.as_deref(), Some("bot-token"));

        std::env::remove_var("TEST_ROLESYNC_API_KEY");
        std::env::remove_var("TEST_ROLESYNC_TOKEN");
    }

    #[test]
    fn test_validate_rejects_zero_sheets_timeout() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.sheets.request_timeout_secs = 0;
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "sheets.request_timeout_secs"
        ));
    }

    #[test]
    fn test_load_and_resolve() {
        std::env::set_var("TEST_ROLESYNC_LOAD_KEY", "AIza-load");
        std::env::set_var("TEST_ROLESYNC_LOAD_TOKEN", "bot-load");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rolesync.toml");
        let toml_str = sample_toml()
            .replace("GOOGLE_API_KEY", "TEST_ROLESYNC_LOAD_KEY")
            .replace("DISCORD_TOKEN", "TEST_ROLESYNC_LOAD_TOKEN")
            .replace("[discord]\n", "[discord]\nrequest_timeout_secs = 10\n");
        std::fs::write(&path, toml_str).unwrap();

        let config = AppConfig::load_and_resolve(&path).expect("load_and_resolve failed");
        assert_eq!(config.sheets.api_key.as_deref(), Some("AIza-load"));
        assert_eq!(config.discord.token.as_deref(), Some("bot-load"));
        assert_eq!(config.sheets.request_timeout_secs, 30);
        assert_eq!(config.discord.request_timeout_secs, 10);

        std::env::remove_var("TEST_ROLESYNC_LOAD_KEY");
        std::env::remove_var("TEST_ROLESYNC_LOAD_TOKEN");
    }

    #[test]
    fn test_resolve_env_vars_missing() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.sheets.api_key_env = "TEST_ROLESYNC_NEVER_SET".into();
        let result = config.resolve_env_vars();
        assert!(matches!(
            result,
            Err(ConfigError::EnvVarMissing { ref var, .. }) if var == "TEST_ROLESYNC_NEVER_SET"
        ));
    }

    #[test]
    fn test_defaults() {
        let minimal = r#"
[sheets]
api_key_env = "K"
builders_spreadsheet_id = "a"
builders_range = "A:A"
others_spreadsheet_id = "b"
others_range = "A:B"
coworkers_range = "C:D"
banned_range = "E:E"
[discord]
token_env = "T"
[roles]
builder_role = "builder"
"#;
        let config: AppConfig = toml::from_str(minimal).unwrap();
        assert_eq!(config.run.log_level, "info");
        assert!(!config.run.dry_run);
        assert_eq!(config.sheets.api_url, "https://sheets.googleapis.com/v4");
        assert_eq!(config.discord.api_url, "https://discord.com/api/v10");
        assert_eq!(config.discord.default_role, "@everyone");
        assert_eq!(config.sheets.request_timeout_secs, 30);
        assert!(config.discord.guild_id.is_none());
        assert_eq!(config.roles.coworker_role("1"), "cm24-coworker1");
        assert_eq!(config.roles.coworker_weeks, vec!["1", "2"]);
        assert!(config.validate().is_ok());
    }
}
