use std::future::Future;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info, warn};

use crate::database_ops::catalog::{Statement, StatementOutput};
use crate::database_ops::config::DbConfig;
use crate::database_ops::db::with_session;
use crate::database_ops::error::CatalogError;
use crate::database_ops::product::Language;
use crate::report::{self, ReportKind};

/// Exit code for an invocation interrupted with ctrl-c.
pub const EXIT_CANCELLED: i32 = 130;

/// Options shared by every operation of one invocation.
#[derive(Debug, Clone, Default)]
pub struct InvocationConfig {
    /// Optional override for the Postgres connection string.
    pub database_url: Option<String>,
    /// Accept server certificates without verification. Explicit opt-in only.
    pub insecure_skip_tls_verify: bool,
    /// Language used for localized fields in reports.
    pub lang: Language,
    pub report: ReportKind,
    /// Print the typed result as JSON instead of the text report.
    pub json: bool,
}

impl InvocationConfig {
    pub fn db_config(&self) -> Result<DbConfig> {
        let cfg = DbConfig::from_env(self.database_url.as_deref())?;
        Ok(if self.insecure_skip_tls_verify {
            cfg.with_insecure_skip_verify()
        } else {
            cfg
        })
    }

    /// Text report or pretty JSON, one entry per output line.
    pub fn render(&self, output: &StatementOutput) -> Result<Vec<String>> {
        if self.json {
            let text = serde_json::to_string_pretty(output).context("serialize statement output")?;
            return Ok(text.lines().map(str::to_string).collect());
        }
        Ok(report::render(output, self.lang, self.report))
    }
}

/// Run one statement in its own session. Invalid arguments fail before any
/// connection is attempted.
pub async fn execute(cfg: &InvocationConfig, statement: Statement) -> Result<StatementOutput> {
    statement.validate()?;
    let db = cfg.db_config()?;
    info!(
        statement = statement.name(),
        params = %statement.describe(),
        db = %db.redacted_target(),
        "dispatching"
    );
    let output = with_session(&db, move |session| {
        Box::pin(async move { statement.run(session).await })
    })
    .await?;
    Ok(output)
}

/// Execute and render. Nothing is printed here, so an interrupted invocation
/// leaves no partial report behind.
pub async fn run(cfg: &InvocationConfig, statement: Statement) -> Result<Vec<String>> {
    let output = execute(cfg, statement).await?;
    cfg.render(&output)
}

/// Race `fut` against ctrl-c. The losing future is dropped, which closes any
/// session it still holds.
pub async fn until_ctrl_c<T, F>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        res = fut => res,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            Err(anyhow!(Cancelled))
        }
    }
}

/// Marker error for an invocation stopped by the user.
#[derive(Debug, thiserror::Error)]
#[error("cancelled by user; partial results discarded")]
pub struct Cancelled;

/// Map any invocation error to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<Cancelled>().is_some() {
        return EXIT_CANCELLED;
    }
    err.downcast_ref::<CatalogError>()
        .map(CatalogError::exit_code)
        .unwrap_or(1)
}

/// Log a failed invocation, echo it on stderr, and return the exit code the
/// binary should terminate with.
pub fn report_failure(bin: &str, err: &anyhow::Error) -> i32 {
    let code = exit_code(err);
    error!(bin, exit_code = code, "{err:#}");
    eprintln!("{bin}: error: {err:#}");
    code
}
