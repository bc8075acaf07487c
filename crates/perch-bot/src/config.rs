use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use crate::reactions::ReactionConfig;
use crate::DEFAULT_PREFIX;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_prefix(value: &str) -> Result<String, String> {
    if value.trim().is_empty() {
        return Err("command prefix must not be empty".to_string());
    }
    Ok(value.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "perch",
    about = "Chat-room bot that runs commands and reports GitHub activity",
    version
)]
pub struct Cli {
    #[arg(
        long = "webhook-bind",
        env = "PERCH_WEBHOOK_BIND",
        default_value = "127.0.0.1:8080",
        help = "Socket address for the GitHub webhook endpoint"
    )]
    pub webhook_bind: SocketAddr,

    #[arg(
        long = "webhook-secret",
        env = "PERCH_WEBHOOK_SECRET",
        hide_env_values = true,
        help = "Shared secret used to verify x-hub-signature-256 on webhook deliveries"
    )]
    pub webhook_secret: String,

    #[arg(
        long = "github-api-base",
        env = "PERCH_GITHUB_API_BASE",
        default_value = "https://api.github.com",
        help = "GitHub REST API base URL"
    )]
    pub github_api_base: String,

    #[arg(
        long = "github-token",
        env = "PERCH_GITHUB_TOKEN",
        hide_env_values = true,
        help = "Bearer token for GitHub API calls"
    )]
    pub github_token: String,

    #[arg(
        long = "github-owner",
        env = "PERCH_GITHUB_OWNER",
        help = "Account owning the repositories targeted by issue commands"
    )]
    pub github_owner: String,

    #[arg(
        long = "github-request-timeout-ms",
        env = "PERCH_GITHUB_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Timeout for each GitHub API request in milliseconds"
    )]
    pub github_request_timeout_ms: u64,

    #[arg(
        long = "github-retry-max-attempts",
        env = "PERCH_GITHUB_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Maximum attempts for retryable GitHub API failures"
    )]
    pub github_retry_max_attempts: usize,

    #[arg(
        long = "github-retry-base-delay-ms",
        env = "PERCH_GITHUB_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base backoff delay for GitHub API retries in milliseconds"
    )]
    pub github_retry_base_delay_ms: u64,

    #[arg(
        long = "database-path",
        env = "PERCH_DATABASE_PATH",
        help = "SQLite database file; the store is kept in memory when omitted"
    )]
    pub database_path: Option<PathBuf>,

    #[arg(
        long = "command-prefix",
        env = "PERCH_COMMAND_PREFIX",
        default_value = DEFAULT_PREFIX,
        value_parser = parse_prefix,
        help = "Text that marks a chat message as a command"
    )]
    pub command_prefix: String,

    #[arg(
        long = "bot-user-id",
        env = "PERCH_BOT_USER_ID",
        default_value_t = 0,
        help = "Chat user id of the bot itself"
    )]
    pub bot_user_id: u64,

    #[arg(
        long = "admin-user-id",
        env = "PERCH_ADMIN_USER_ID",
        help = "Chat user id given a protected membership in the admin group at startup"
    )]
    pub admin_user_id: Option<u64>,

    #[arg(
        long = "admin-name",
        env = "PERCH_ADMIN_NAME",
        default_value = "admin",
        help = "Display name recorded for --admin-user-id when the user is not known yet"
    )]
    pub admin_name: String,

    #[arg(
        long = "operator-user-id",
        env = "PERCH_OPERATOR_USER_ID",
        default_value_t = 1,
        help = "Chat user id of the console operator"
    )]
    pub operator_user_id: u64,

    #[arg(
        long = "operator-name",
        env = "PERCH_OPERATOR_NAME",
        default_value = "operator",
        help = "Display name of the console operator"
    )]
    pub operator_name: String,

    #[arg(
        long = "config",
        env = "PERCH_CONFIG",
        help = "TOML file with ignored repositories and reactions"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
/// Settings that do not fit on a command line.
pub struct SupplementaryConfig {
    /// Repository names whose webhook deliveries are acknowledged and dropped.
    #[serde(default)]
    pub ignored_repositories: BTreeSet<String>,
    #[serde(default)]
    pub reactions: Vec<ReactionConfig>,
}

impl SupplementaryConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse supplementary config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Loads `path` when given, else the empty configuration.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;

    use super::{Cli, SupplementaryConfig};

    const REQUIRED: [&str; 7] = [
        "perch",
        "--webhook-secret",
        "s3cret",
        "--github-token",
        "ghp_test",
        "--github-owner",
        "perch-org",
    ];

    #[test]
    fn unit_cli_defaults_match_documented_values() {
        let cli = Cli::try_parse_from(REQUIRED).expect("parse");
        assert_eq!(cli.webhook_bind.to_string(), "127.0.0.1:8080");
        assert_eq!(cli.github_api_base, "https://api.github.com");
        assert_eq!(cli.command_prefix, "!!/");
        assert_eq!(cli.github_retry_max_attempts, 4);
        assert!(cli.database_path.is_none());
        assert!(cli.admin_user_id.is_none());
    }

    #[test]
    fn regression_cli_rejects_zero_retry_attempts_and_empty_prefix() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--github-retry-max-attempts", "0"]);
        assert!(Cli::try_parse_from(args).is_err());

        let mut args = REQUIRED.to_vec();
        args.extend(["--command-prefix", " "]);
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn functional_supplementary_config_reads_reactions_and_ignored_repositories() {
        let config = SupplementaryConfig::parse(
            r#"
ignored_repositories = ["sandbox"]

[[reactions]]
pattern = "(?i)good bot"
messages = ["thanks!"]

[[reactions]]
pattern = 'what is (?P<name>\w+)\?'
command = "trick show"
reply_to_self = true
"#,
        )
        .expect("parse");
        assert!(config.ignored_repositories.contains("sandbox"));
        assert_eq!(config.reactions.len(), 2);
        assert_eq!(config.reactions[0].messages, vec!["thanks!".to_string()]);
        assert!(!config.reactions[0].reply_to_self);
        assert_eq!(config.reactions[1].command.as_deref(), Some("trick show"));
        assert!(config.reactions[1].reply_to_self);
    }

    #[test]
    fn regression_supplementary_config_rejects_unknown_keys() {
        assert!(SupplementaryConfig::parse("ignored = []").is_err());
    }

    #[test]
    fn functional_load_optional_reads_file_or_defaults() {
        assert_eq!(
            SupplementaryConfig::load_optional(None).expect("default"),
            SupplementaryConfig::default()
        );
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "ignored_repositories = [\"docs\"]").expect("write");
        let config = SupplementaryConfig::load_optional(Some(file.path())).expect("load");
        assert!(config.ignored_repositories.contains("docs"));
        assert!(config.reactions.is_empty());
    }
}
