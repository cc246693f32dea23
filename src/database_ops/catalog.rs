//! Query runner over the `products` table.
//!
//! Every value travels as a bound parameter. The only identifiers spliced into SQL
//! text are localized column names, and those are generated from `LocalizedField`
//! and `Language`, never from caller strings.
use std::collections::HashMap;

use serde::Serialize;
use sqlx::{Connection, Row};
use tracing::{debug, error, info, instrument, warn};

use crate::database_ops::db::Session;
use crate::database_ops::error::{CatalogError, CatalogResult};
use crate::database_ops::product::{
    product_columns, Language, LocalizedField, Product, ProductType, TranslationCoverage,
    TypeCount,
};

/// Default row cap for listings when the caller does not pass one.
pub const DEFAULT_LIST_LIMIT: i64 = 10;

const ACTIVE_ORDER: &str = "ORDER BY COALESCE(stars_numeric, 0) DESC, id ASC";

/// A Query Runner operation together with its typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    FetchById {
        id: i64,
    },
    FetchByType {
        product_type: ProductType,
        /// `None` is unbounded.
        limit: Option<i64>,
    },
    FetchRange {
        from: i64,
        to: i64,
        limit: Option<i64>,
    },
    CountByType {
        product_type: ProductType,
    },
    CountAllTypes,
    TranslationCoverage {
        lang: Language,
    },
    MissingTranslations {
        lang: Language,
        product_type: Option<ProductType>,
        limit: Option<i64>,
    },
    UpdateLocalizedField {
        id: i64,
        field: LocalizedField,
        lang: Language,
        /// `None` clears the field back to NULL.
        value: Option<String>,
    },
}

/// Typed result of running a `Statement`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StatementOutput {
    Product(Product),
    Products(Vec<Product>),
    Count(TypeCount),
    TypeCounts(Vec<TypeCount>),
    Coverage(Vec<TranslationCoverage>),
    Updated(Product),
}

impl Statement {
    /// Stable identifier used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Statement::FetchById { .. } => "fetch-by-id",
            Statement::FetchByType { .. } => "fetch-by-type",
            Statement::FetchRange { .. } => "fetch-range",
            Statement::CountByType { .. } => "count-by-type",
            Statement::CountAllTypes => "count-all-types",
            Statement::TranslationCoverage { .. } => "translation-coverage",
            Statement::MissingTranslations { .. } => "missing-translations",
            Statement::UpdateLocalizedField { .. } => "update-localized-field",
        }
    }

    /// Parameter summary for diagnostics. Free text is reduced to its length.
    pub fn describe(&self) -> String {
        fn limit(l: &Option<i64>) -> String {
            l.map(|n| n.to_string()).unwrap_or_else(|| "none".into())
        }
        match self {
            Statement::FetchById { id } => format!("id={id}"),
            Statement::FetchByType {
                product_type,
                limit: l,
            } => format!("product_type={product_type} limit={}", limit(l)),
            Statement::FetchRange { from, to, limit: l } => {
                format!("from={from} to={to} limit={}", limit(l))
            }
            Statement::CountByType { product_type } => format!("product_type={product_type}"),
            Statement::CountAllTypes => "all types".to_string(),
            Statement::TranslationCoverage { lang } => format!("lang={lang}"),
            Statement::MissingTranslations {
                lang,
                product_type,
                limit: l,
            } => format!(
                "lang={lang} product_type={} limit={}",
                product_type.map(|t| t.as_str()).unwrap_or("any"),
                limit(l)
            ),
            Statement::UpdateLocalizedField {
                id,
                field,
                lang,
                value,
            } => format!(
                "id={id} field={} value={}",
                field.column(*lang),
                redact_value(value.as_deref())
            ),
        }
    }

    /// Argument checks that need no database round trip.
    pub fn validate(&self) -> CatalogResult<()> {
        fn positive(limit: &Option<i64>) -> CatalogResult<()> {
            match limit {
                Some(n) if *n <= 0 => Err(CatalogError::InvalidArgument(format!(
                    "limit must be positive, got {n}"
                ))),
                _ => Ok(()),
            }
        }
        match self {
            Statement::FetchByType { limit, .. } | Statement::MissingTranslations { limit, .. } => {
                positive(limit)
            }
            Statement::FetchRange { from, to, limit } => {
                if from > to {
                    return Err(CatalogError::InvalidArgument(format!(
                        "range start {from} is after range end {to}"
                    )));
                }
                positive(limit)
            }
            Statement::UpdateLocalizedField {
                value: Some(v),
                field,
                lang,
                ..
            } if v.trim().is_empty() => Err(CatalogError::InvalidArgument(format!(
                "refusing to write a blank {}; clear the field instead",
                field.column(*lang)
            ))),
            _ => Ok(()),
        }
    }

    /// Validate, then execute on `session`.
    pub async fn run(&self, session: &mut Session) -> CatalogResult<StatementOutput> {
        self.validate()?;
        let out = match self {
            Statement::FetchById { id } => StatementOutput::Product(fetch_by_id(session, *id).await?),
            Statement::FetchByType {
                product_type,
                limit,
            } => StatementOutput::Products(fetch_by_type(session, *product_type, *limit).await?),
            Statement::FetchRange { from, to, limit } => {
                StatementOutput::Products(fetch_range(session, *from, *to, *limit).await?)
            }
            Statement::CountByType { product_type } => StatementOutput::Count(TypeCount {
                product_type: *product_type,
                count: count_by_type(session, *product_type).await?,
            }),
            Statement::CountAllTypes => StatementOutput::TypeCounts(count_all_types(session).await?),
            Statement::TranslationCoverage { lang } => {
                StatementOutput::Coverage(translation_coverage(session, *lang).await?)
            }
            Statement::MissingTranslations {
                lang,
                product_type,
                limit,
            } => StatementOutput::Products(
                missing_translations(session, *lang, *product_type, *limit).await?,
            ),
            Statement::UpdateLocalizedField {
                id,
                field,
                lang,
                value,
            } => StatementOutput::Updated(
                update_localized_field(session, *id, *field, *lang, value.as_deref()).await?,
            ),
        };
        Ok(out)
    }
}

fn redact_value(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("<{} chars>", v.chars().count()),
        None => "NULL".to_string(),
    }
}

fn query_error(statement: &Statement) -> impl FnOnce(sqlx::Error) -> CatalogError + '_ {
    move |source| {
        error!(statement = statement.name(), params = %statement.describe(), error = %source, "statement failed");
        CatalogError::Query {
            statement: statement.name(),
            params: statement.describe(),
            source,
        }
    }
}

pub(crate) fn fetch_by_id_sql() -> String {
    format!("SELECT {} FROM products WHERE id = $1", product_columns())
}

pub(crate) fn fetch_by_type_sql() -> String {
    format!(
        "SELECT {} FROM products WHERE is_active = true AND product_type = $1 {ACTIVE_ORDER} LIMIT $2",
        product_columns()
    )
}

pub(crate) fn fetch_range_sql() -> String {
    format!(
        "SELECT {} FROM products WHERE id BETWEEN $1 AND $2 ORDER BY id ASC LIMIT $3",
        product_columns()
    )
}

pub(crate) fn missing_translations_sql(lang: Language) -> String {
    format!(
        "SELECT {} FROM products \
         WHERE is_active = true \
           AND ($1::TEXT IS NULL OR product_type = $1) \
           AND NULLIF(btrim({}), '') IS NULL \
         {ACTIVE_ORDER} LIMIT $2",
        product_columns(),
        LocalizedField::Description.column(lang)
    )
}

pub(crate) fn translation_coverage_sql(lang: Language) -> String {
    format!(
        "SELECT product_type, count(*)::BIGINT AS total, \
                count(*) FILTER (WHERE NULLIF(btrim({}), '') IS NOT NULL)::BIGINT AS translated \
         FROM products \
         WHERE is_active = true AND product_type = ANY($1) \
         GROUP BY product_type",
        LocalizedField::Description.column(lang)
    )
}

/// `updated_at` must move forward even when two writes land inside one clock tick,
/// hence the `GREATEST` against the previous value.
pub(crate) fn update_localized_field_sql(field: LocalizedField, lang: Language) -> String {
    format!(
        "UPDATE products \
         SET {} = $1, \
             updated_at = GREATEST(clock_timestamp(), updated_at + interval '1 microsecond') \
         WHERE id = $2 \
         RETURNING {}",
        field.column(lang),
        product_columns()
    )
}

#[instrument(skip(session))]
pub async fn fetch_by_id(session: &mut Session, id: i64) -> CatalogResult<Product> {
    let stmt = Statement::FetchById { id };
    let sql = fetch_by_id_sql();
    // fetch_all rather than fetch_optional so a duplicated id is caught, not hidden.
    let mut rows: Vec<Product> = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_all(session.conn())
        .await
        .map_err(query_error(&stmt))?;

    match rows.len() {
        0 => Err(CatalogError::NotFound {
            statement: stmt.name(),
            id,
        }),
        1 => {
            let product = rows.remove(0);
            debug!(id, product_type = %product.product_type, "product fetched");
            Ok(product)
        }
        n => {
            error!(alert = true, id, rows = n, "fetch-by-id matched more than one row");
            Err(CatalogError::Query {
                statement: stmt.name(),
                params: stmt.describe(),
                source: sqlx::Error::Protocol(format!("id {id} matched {n} rows")),
            })
        }
    }
}

#[instrument(skip(session))]
pub async fn fetch_by_type(
    session: &mut Session,
    product_type: ProductType,
    limit: Option<i64>,
) -> CatalogResult<Vec<Product>> {
    let stmt = Statement::FetchByType {
        product_type,
        limit,
    };
    stmt.validate()?;
    let rows = sqlx::query_as::<_, Product>(&fetch_by_type_sql())
        .bind(product_type.as_str())
        .bind(limit)
        .fetch_all(session.conn())
        .await
        .map_err(query_error(&stmt))?;
    info!(product_type = %product_type, rows = rows.len(), "fetch-by-type done");
    Ok(rows)
}

#[instrument(skip(session))]
pub async fn fetch_range(
    session: &mut Session,
    from: i64,
    to: i64,
    limit: Option<i64>,
) -> CatalogResult<Vec<Product>> {
    let stmt = Statement::FetchRange { from, to, limit };
    stmt.validate()?;
    let rows = sqlx::query_as::<_, Product>(&fetch_range_sql())
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(session.conn())
        .await
        .map_err(query_error(&stmt))?;
    info!(from, to, rows = rows.len(), "fetch-range done");
    Ok(rows)
}

#[instrument(skip(session))]
pub async fn count_by_type(session: &mut Session, product_type: ProductType) -> CatalogResult<i64> {
    let stmt = Statement::CountByType { product_type };
    let count: i64 = sqlx::query_scalar(
        "SELECT count(*)::BIGINT FROM products WHERE is_active = true AND product_type = $1",
    )
    .bind(product_type.as_str())
    .fetch_one(session.conn())
    .await
    .map_err(query_error(&stmt))?;
    Ok(count)
}

/// Active counts for every known type, zero-filled, in `ProductType::ALL` order.
#[instrument(skip(session))]
pub async fn count_all_types(session: &mut Session) -> CatalogResult<Vec<TypeCount>> {
    let stmt = Statement::CountAllTypes;
    let rows = sqlx::query(
        "SELECT product_type, count(*)::BIGINT AS n \
         FROM products \
         WHERE is_active = true AND product_type = ANY($1) \
         GROUP BY product_type",
    )
    .bind(ProductType::all_as_str())
    .fetch_all(session.conn())
    .await
    .map_err(query_error(&stmt))?;

    let mut by_type: HashMap<String, i64> = HashMap::with_capacity(rows.len());
    for row in rows {
        let ty: String = row.try_get("product_type").map_err(query_error(&stmt))?;
        let n: i64 = row.try_get("n").map_err(query_error(&stmt))?;
        by_type.insert(ty, n);
    }
    Ok(ProductType::ALL
        .into_iter()
        .map(|product_type| TypeCount {
            product_type,
            count: by_type.get(product_type.as_str()).copied().unwrap_or(0),
        })
        .collect())
}

#[instrument(skip(session))]
pub async fn translation_coverage(
    session: &mut Session,
    lang: Language,
) -> CatalogResult<Vec<TranslationCoverage>> {
    let stmt = Statement::TranslationCoverage { lang };
    let rows = sqlx::query(&translation_coverage_sql(lang))
        .bind(ProductType::all_as_str())
        .fetch_all(session.conn())
        .await
        .map_err(query_error(&stmt))?;

    let mut by_type: HashMap<String, (i64, i64)> = HashMap::with_capacity(rows.len());
    for row in rows {
        let ty: String = row.try_get("product_type").map_err(query_error(&stmt))?;
        let total: i64 = row.try_get("total").map_err(query_error(&stmt))?;
        let translated: i64 = row.try_get("translated").map_err(query_error(&stmt))?;
        by_type.insert(ty, (total, translated));
    }
    Ok(ProductType::ALL
        .into_iter()
        .map(|product_type| {
            let (total, translated) = by_type.get(product_type.as_str()).copied().unwrap_or((0, 0));
            TranslationCoverage {
                product_type,
                lang,
                total,
                translated,
            }
        })
        .collect())
}

#[instrument(skip(session))]
pub async fn missing_translations(
    session: &mut Session,
    lang: Language,
    product_type: Option<ProductType>,
    limit: Option<i64>,
) -> CatalogResult<Vec<Product>> {
    let stmt = Statement::MissingTranslations {
        lang,
        product_type,
        limit,
    };
    stmt.validate()?;
    let rows = sqlx::query_as::<_, Product>(&missing_translations_sql(lang))
        .bind(product_type.map(|t| t.as_str()))
        .bind(limit)
        .fetch_all(session.conn())
        .await
        .map_err(query_error(&stmt))?;
    info!(lang = %lang, rows = rows.len(), "missing-translations done");
    Ok(rows)
}

/// Set one localized field of one product and advance `updated_at`.
///
/// Runs in a transaction: exactly one row must match, otherwise nothing is kept.
#[instrument(skip(session, value), fields(value_len = value.map(|v| v.chars().count())))]
pub async fn update_localized_field(
    session: &mut Session,
    id: i64,
    field: LocalizedField,
    lang: Language,
    value: Option<&str>,
) -> CatalogResult<Product> {
    let stmt = Statement::UpdateLocalizedField {
        id,
        field,
        lang,
        value: value.map(str::to_string),
    };
    stmt.validate()?;
    let sql = update_localized_field_sql(field, lang);

    let mut tx = session.conn().begin().await.map_err(query_error(&stmt))?;
    let mut rows: Vec<Product> = sqlx::query_as::<_, Product>(&sql)
        .bind(value)
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(query_error(&stmt))?;

    if let Err(rejected) = check_affected(&stmt, id, rows.len()) {
        // Dropping an unfinished transaction rolls it back too.
        if let Err(e) = tx.rollback().await {
            warn!(id, error = %e, "rollback failed; transaction dropped");
        }
        return Err(rejected);
    }

    tx.commit().await.map_err(query_error(&stmt))?;
    let product = rows.remove(0);
    info!(
        id,
        column = %field.column(lang),
        updated_at = %product.updated_at,
        "localized field updated"
    );
    Ok(product)
}

/// An id-scoped update must touch exactly one row. Anything else is rejected,
/// and more than one row raises an alert before the caller rolls back.
fn check_affected(statement: &Statement, id: i64, affected: usize) -> CatalogResult<()> {
    match affected {
        1 => Ok(()),
        0 => Err(CatalogError::NotFound {
            statement: statement.name(),
            id,
        }),
        n => {
            error!(
                alert = true,
                id,
                affected = n,
                "update matched more than one row; rolling back"
            );
            Err(CatalogError::AmbiguousUpdate {
                id,
                affected: n as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(value: Option<&str>) -> Statement {
        Statement::UpdateLocalizedField {
            id: 529,
            field: LocalizedField::Description,
            lang: Language::Pt,
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn describe_redacts_free_text() {
        let described = update(Some("Integração com Google Drive")).describe();
        assert_eq!(described, "id=529 field=description_pt value=<27 chars>");
        assert!(!described.contains("Google"));
        assert_eq!(update(None).describe(), "id=529 field=description_pt value=NULL");
    }

    #[test]
    fn statement_names_are_stable() {
        assert_eq!(Statement::FetchById { id: 1 }.name(), "fetch-by-id");
        assert_eq!(Statement::CountAllTypes.name(), "count-all-types");
        assert_eq!(update(None).name(), "update-localized-field");
        assert_eq!(
            Statement::FetchRange {
                from: 1,
                to: 2,
                limit: None
            }
            .name(),
            "fetch-range"
        );
    }

    #[test]
    fn validate_rejects_bad_limits_and_ranges() {
        let bad_limit = Statement::FetchByType {
            product_type: ProductType::AiAgent,
            limit: Some(0),
        };
        assert!(matches!(bad_limit.validate(), Err(CatalogError::InvalidArgument(_))));

        let unbounded = Statement::FetchByType {
            product_type: ProductType::AiAgent,
            limit: None,
        };
        assert!(unbounded.validate().is_ok());

        let inverted = Statement::FetchRange {
            from: 10,
            to: 1,
            limit: None,
        };
        assert!(matches!(inverted.validate(), Err(CatalogError::InvalidArgument(_))));
    }

    #[test]
    fn validate_rejects_blank_values_but_allows_clearing() {
        assert!(matches!(update(Some("   ")).validate(), Err(CatalogError::InvalidArgument(_))));
        assert!(update(Some("Texto")).validate().is_ok());
        assert!(update(None).validate().is_ok());
    }

    #[test]
    fn statements_bind_every_value() {
        let by_type = fetch_by_type_sql();
        assert!(by_type.contains("product_type = $1"));
        assert!(by_type.ends_with("ORDER BY COALESCE(stars_numeric, 0) DESC, id ASC LIMIT $2"));
        assert!(fetch_by_id_sql().ends_with("FROM products WHERE id = $1"));
        assert!(fetch_range_sql().contains("id BETWEEN $1 AND $2 ORDER BY id ASC LIMIT $3"));

        let upd = update_localized_field_sql(LocalizedField::Description, Language::Pt);
        assert!(upd.starts_with("UPDATE products SET description_pt = $1,"));
        assert!(upd.contains("WHERE id = $2"));
        assert!(upd.contains("GREATEST(clock_timestamp(), updated_at + interval '1 microsecond')"));
    }

    #[test]
    fn translation_queries_target_the_language_column() {
        assert!(missing_translations_sql(Language::Es).contains("NULLIF(btrim(description_es), '') IS NULL"));
        assert!(translation_coverage_sql(Language::Pt)
            .contains("FILTER (WHERE NULLIF(btrim(description_pt), '') IS NOT NULL)"));
    }

    #[test]
    fn update_must_touch_exactly_one_row() {
        let stmt = update(Some("Texto"));
        assert!(check_affected(&stmt, 529, 1).is_ok());

        let err = check_affected(&stmt, 529, 0).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::NotFound {
                statement: "update-localized-field",
                id: 529
            }
        ));
        assert_eq!(err.exit_code(), 3);

        let err = check_affected(&stmt, 529, 3).unwrap_err();
        assert!(matches!(err, CatalogError::AmbiguousUpdate { id: 529, affected: 3 }));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn output_serializes_with_kind_tag() {
        let out = StatementOutput::Count(TypeCount {
            product_type: ProductType::AiAgent,
            count: 3,
        });
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "count", "data": {"product_type": "ai_agent", "count": 3}})
        );
    }
}
