//! Command-line and environment configuration.
//!
//! Every flag can also be supplied as an action input, i.e. an `INPUT_<NAME>`
//! environment variable, so the binary runs unchanged as a workflow step.
//! [`Cli`] is the raw surface; [`Settings`] is the validated form the rest of
//! the crate consumes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::git::checkout::remote_url;
use crate::git::{CommitIdentity, GitError};
use crate::ledger::{DEFAULT_BRANCH, RetryConfig};
use crate::pipeline::{SignatureCheck, WebhookRequest};
use crate::types::ExecutionMode;
use crate::webhooks::{Provider, SignatureError};

/// Directory under `RUNNER_TEMP` (or the current directory) used when no
/// workspace is configured.
pub const DEFAULT_WORKSPACE_DIR: &str = ".webhook-ledger";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Provider(#[from] SignatureError),

    #[error("payload is empty")]
    EmptyPayload,

    #[error("{0} is required unless signature verification is skipped")]
    MissingCredential(&'static str),

    #[error("invalid ledger branch name: {0:?}")]
    InvalidBranch(String),

    #[error("invalid committer identity: {0}")]
    Identity(#[source] GitError),

    #[error("failed to resolve remote {remote:?}: {source}")]
    Remote {
        remote: String,
        #[source]
        source: GitError,
    },
}

/// Result type for configuration.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Records a signed webhook exactly once in a shared ledger branch.
#[derive(Debug, Clone, Parser)]
#[command(name = "webhook-ledger", version, about)]
pub struct Cli {
    /// Webhook provider (stripe or razorpay).
    #[arg(long, env = "INPUT_PROVIDER")]
    pub provider: String,

    /// Raw webhook payload, exactly as signed.
    #[arg(long, env = "INPUT_PAYLOAD", hide_env_values = true)]
    pub payload: String,

    /// Signature header value sent by the provider.
    #[arg(long, env = "INPUT_SIGNATURE", default_value = "")]
    pub signature: String,

    /// Shared webhook signing secret.
    #[arg(long, env = "INPUT_SECRET", default_value = "", hide_env_values = true)]
    pub secret: String,

    /// Branch holding the ledger.
    #[arg(long, env = "INPUT_LEDGER_BRANCH", default_value = DEFAULT_BRANCH)]
    pub ledger_branch: String,

    /// Skip signature verification ("true" to skip; local runs only).
    #[arg(
        long,
        env = "INPUT_SKIP_SIGNATURE",
        default_value = "false",
        action = clap::ArgAction::Set,
        value_parser = parse_flag
    )]
    pub skip_signature: bool,

    /// `shared` (remote markers and ledger) or `local` (local files only).
    #[arg(long, env = "INPUT_MODE", default_value = "shared")]
    pub mode: ExecutionMode,

    /// Directory for the journal, local markers and the ledger checkout.
    #[arg(long, env = "INPUT_WORKSPACE", value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    /// Remote name (resolved in --repository) or URL of the shared remote.
    #[arg(long, env = "INPUT_REMOTE", default_value = "origin")]
    pub remote: String,

    /// Repository whose remotes are used to resolve --remote.
    #[arg(long, env = "INPUT_REPOSITORY", default_value = ".", value_name = "PATH")]
    pub repository: PathBuf,

    /// Total attempts at pushing a ledger entry.
    #[arg(long, env = "INPUT_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[arg(long, env = "INPUT_RETRY_INITIAL_MS", default_value_t = 1000)]
    pub retry_initial_ms: u64,

    /// Upper bound on any single retry delay, in milliseconds.
    #[arg(long, env = "INPUT_RETRY_MAX_MS", default_value_t = 8000)]
    pub retry_max_ms: u64,

    #[arg(long, env = "INPUT_COMMITTER_NAME", default_value = "webhook-ledger[bot]")]
    pub committer_name: String,

    #[arg(
        long,
        env = "INPUT_COMMITTER_EMAIL",
        default_value = "webhook-ledger@users.noreply.github.com"
    )]
    pub committer_email: String,
}

/// Action inputs are strings; only a case-insensitive "true" enables a flag.
fn parse_flag(s: &str) -> std::result::Result<bool, String> {
    Ok(s.trim().eq_ignore_ascii_case("true"))
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub request: WebhookRequest,
    pub mode: ExecutionMode,
    pub workspace: PathBuf,
    pub remote: String,
    pub repository: PathBuf,
    pub retry: RetryConfig,
    pub identity: CommitIdentity,
}

impl Settings {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let provider: Provider = cli.provider.parse()?;

        if cli.payload.trim().is_empty() {
            return Err(ConfigError::EmptyPayload);
        }

        let check = if cli.skip_signature {
            SignatureCheck::Skip
        } else {
            if cli.signature.trim().is_empty() {
                return Err(ConfigError::MissingCredential("signature"));
            }
            if cli.secret.is_empty() {
                return Err(ConfigError::MissingCredential("secret"));
            }
            SignatureCheck::Verify {
                signature: cli.signature,
                secret: cli.secret,
            }
        };

        let ledger_branch = cli.ledger_branch.trim().to_string();
        validate_branch(&ledger_branch)?;

        let identity = CommitIdentity::new(cli.committer_name, cli.committer_email);
        identity.validate().map_err(ConfigError::Identity)?;

        let workspace = cli.workspace.unwrap_or_else(default_workspace);

        let retry = RetryConfig {
            initial_delay: Duration::from_millis(cli.retry_initial_ms),
            max_delay: Duration::from_millis(cli.retry_max_ms.max(cli.retry_initial_ms)),
            ..RetryConfig::default()
        }
        .with_max_attempts(cli.max_attempts);

        Ok(Settings {
            request: WebhookRequest {
                provider,
                payload: cli.payload,
                check,
                ledger_branch,
            },
            mode: cli.mode,
            workspace,
            remote: cli.remote,
            repository: cli.repository,
            retry,
            identity,
        })
    }

    /// The URL of the shared remote.
    ///
    /// A value that looks like a URL or names an existing path is used as is;
    /// anything else is taken as a remote name in the configured repository.
    pub fn resolve_remote_url(&self) -> Result<String> {
        if looks_like_url(&self.remote) || Path::new(&self.remote).exists() {
            return Ok(self.remote.clone());
        }
        remote_url(&self.repository, &self.remote).map_err(|source| ConfigError::Remote {
            remote: self.remote.clone(),
            source,
        })
    }
}

fn default_workspace() -> PathBuf {
    match std::env::var_os("RUNNER_TEMP").filter(|v| !v.is_empty()) {
        Some(tmp) => PathBuf::from(tmp).join(DEFAULT_WORKSPACE_DIR),
        None => PathBuf::from(DEFAULT_WORKSPACE_DIR),
    }
}

fn looks_like_url(s: &str) -> bool {
    s.contains("://") || (s.contains('@') && s.contains(':'))
}

/// Rejects names git would refuse for a branch. Not exhaustive; git has the
/// final say when the branch is first pushed.
fn validate_branch(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('-')
        || name.starts_with('/')
        || name.ends_with('/')
        || name.ends_with('.')
        || name.ends_with(".lock")
        || name.contains("..")
        || name.contains("@{")
        || name.contains("//")
        || name
            .chars()
            .any(|c| c.is_ascii_control() || " ~^:?*[\\".contains(c));
    if invalid {
        return Err(ConfigError::InvalidBranch(name.to_string()));
    }
    Ok(())
}
