use anyhow::Result;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::cli::dispatch::InvocationConfig;
use crate::database_ops::catalog::{fetch_by_id, StatementOutput};
use crate::database_ops::db::with_session;
use crate::database_ops::error::CatalogResult;
use crate::database_ops::product::Product;
use crate::report;

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct BulkInspectConfig {
    pub invocation: InvocationConfig,
    pub ids: Vec<i64>,
    /// Sessions open at the same time. Values below 1 are treated as 1.
    pub concurrency: usize,
}

/// Per-id outcome; ids that match nothing are reported, not fatal.
#[derive(Debug)]
pub enum Inspected {
    Found(Product),
    Missing(i64),
}

/// Fetch every id, each in its own session, at most `concurrency` at a time.
/// Results come back in input order. Any error other than not-found aborts the
/// whole batch.
pub async fn inspect(cfg: &BulkInspectConfig) -> Result<Vec<Inspected>> {
    let db = cfg.invocation.db_config()?;
    let concurrency = cfg.concurrency.max(1);
    info!(ids = cfg.ids.len(), concurrency, db = %db.redacted_target(), "bulk inspect");

    let results: Vec<(i64, CatalogResult<Product>)> = stream::iter(cfg.ids.iter().copied())
        .map(|id| {
            let db = &db;
            async move {
                let res = with_session(db, move |s| Box::pin(fetch_by_id(s, id))).await;
                (id, res)
            }
        })
        .buffered(concurrency)
        .collect()
        .await;

    let mut out = Vec::with_capacity(results.len());
    for (id, res) in results {
        match res {
            Ok(product) => out.push(Inspected::Found(product)),
            Err(e) if e.is_not_found() => {
                warn!(id, "bulk inspect: id not found");
                out.push(Inspected::Missing(id));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(out)
}

/// Render bulk results: detail (or JSON) blocks for hits, one line per miss.
pub fn render(cfg: &InvocationConfig, inspected: Vec<Inspected>) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for (i, item) in inspected.into_iter().enumerate() {
        if i > 0 {
            lines.push(String::new());
        }
        match item {
            Inspected::Found(product) => lines.extend(cfg.render(&StatementOutput::Product(product))?),
            Inspected::Missing(id) => lines.push(report::format_not_found(id)),
        }
    }
    Ok(lines)
}

pub async fn run(cfg: &BulkInspectConfig) -> Result<Vec<String>> {
    let inspected = inspect(cfg).await?;
    render(&cfg.invocation, inspected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::product::ProductType;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn product(id: i64) -> Product {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Product {
            id,
            product_type: ProductType::McpServer,
            name: "Google Drive".into(),
            name_localized: BTreeMap::new(),
            description: None,
            description_localized: BTreeMap::new(),
            stars_numeric: 1,
            is_active: true,
            is_featured: false,
            category: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn misses_are_reported_inline_in_order() {
        let cfg = InvocationConfig::default();
        let lines = render(
            &cfg,
            vec![Inspected::Missing(1), Inspected::Found(product(529)), Inspected::Missing(2)],
        )
        .unwrap();
        assert_eq!(lines[0], "#1 <not found>");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "#529 Google Drive");
        assert_eq!(lines.last().unwrap(), "#2 <not found>");
    }

    #[tokio::test]
    async fn empty_batch_needs_no_connection() {
        let cfg = BulkInspectConfig {
            invocation: InvocationConfig {
                database_url: Some("postgres://u:p@192.0.2.1:5432/db".into()),
                ..InvocationConfig::default()
            },
            ids: Vec::new(),
            concurrency: 0,
        };
        assert!(inspect(&cfg).await.unwrap().is_empty());
    }
}
