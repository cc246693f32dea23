use anyhow::Result;
use tracing::info;

use crate::cli::dispatch::InvocationConfig;
use crate::database_ops::catalog::{count_all_types, translation_coverage, StatementOutput};
use crate::database_ops::db::with_session;

#[derive(Debug, Clone, Default)]
pub struct TypeCountsConfig {
    pub invocation: InvocationConfig,
    /// Also report description coverage for the invocation language.
    pub with_coverage: bool,
}

/// Active counts per type, optionally followed by translation coverage. Both
/// statements share one session.
pub async fn run(cfg: &TypeCountsConfig) -> Result<Vec<String>> {
    let db = cfg.invocation.db_config()?;
    let lang = cfg.invocation.lang;
    let with_coverage = cfg.with_coverage;
    info!(db = %db.redacted_target(), with_coverage, "type counts");

    let (counts, coverage) = with_session(&db, move |s| {
        Box::pin(async move {
            let counts = count_all_types(s).await?;
            let coverage = if with_coverage {
                Some(translation_coverage(s, lang).await?)
            } else {
                None
            };
            Ok((counts, coverage))
        })
    })
    .await?;

    let mut lines = cfg.invocation.render(&StatementOutput::TypeCounts(counts))?;
    if let Some(coverage) = coverage {
        lines.push(String::new());
        lines.extend(cfg.invocation.render(&StatementOutput::Coverage(coverage))?);
    }
    Ok(lines)
}
