use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use crate::database_ops::error::CatalogError;

/// Catalog category. The database stores the snake_case spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    McpServer,
    McpClient,
    AiAgent,
    ReadyToUse,
}

impl ProductType {
    pub const ALL: [ProductType; 4] = [
        ProductType::McpServer,
        ProductType::McpClient,
        ProductType::AiAgent,
        ProductType::ReadyToUse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::McpServer => "mcp_server",
            ProductType::McpClient => "mcp_client",
            ProductType::AiAgent => "ai_agent",
            ProductType::ReadyToUse => "ready_to_use",
        }
    }

    pub fn all_as_str() -> Vec<&'static str> {
        Self::ALL.iter().map(|t| t.as_str()).collect()
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = CatalogError;

    /// Accepts the stored spelling plus the short names used on the front end
    /// (`server`, `client`, `agent`, `ready-to-use`).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let norm = raw.trim().to_ascii_lowercase().replace('-', "_");
        match norm.as_str() {
            "mcp_server" | "server" => Ok(ProductType::McpServer),
            "mcp_client" | "client" => Ok(ProductType::McpClient),
            "ai_agent" | "agent" => Ok(ProductType::AiAgent),
            "ready_to_use" => Ok(ProductType::ReadyToUse),
            _ => Err(CatalogError::InvalidArgument(format!(
                "unknown product type '{raw}' (expected one of {})",
                Self::all_as_str().join(", ")
            ))),
        }
    }
}

/// Languages with localized columns (`name_<code>`, `description_<code>`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Pt,
    Es,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Pt, Language::Es];

    pub fn code(self) -> &'static str {
        match self {
            Language::Pt => "pt",
            Language::Es => "es",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = CatalogError;

    /// Only the primary subtag matters: `pt-BR` and `pt_br` both map to `pt`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let primary = raw
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|lang| lang.code() == primary)
            .ok_or_else(|| {
                CatalogError::InvalidArgument(format!(
                    "unsupported language '{raw}' (expected one of {})",
                    Language::ALL.map(|l| l.code()).join(", ")
                ))
            })
    }
}

/// Display fields that have per-language variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalizedField {
    Name,
    Description,
}

impl LocalizedField {
    pub fn base(self) -> &'static str {
        match self {
            LocalizedField::Name => "name",
            LocalizedField::Description => "description",
        }
    }

    /// Column identifier. Built only from enum values, never from user input.
    pub fn column(self, lang: Language) -> String {
        format!("{}_{}", self.base(), lang.code())
    }
}

impl FromStr for LocalizedField {
    type Err = CatalogError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(LocalizedField::Name),
            "description" => Ok(LocalizedField::Description),
            _ => Err(CatalogError::InvalidArgument(format!(
                "unknown localized field '{raw}' (expected name or description)"
            ))),
        }
    }
}

/// One row of the `products` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    pub product_type: ProductType,
    pub name: String,
    pub name_localized: BTreeMap<Language, String>,
    pub description: Option<String>,
    pub description_localized: BTreeMap<Language, String>,
    pub stars_numeric: i64,
    pub is_active: bool,
    pub is_featured: bool,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn localized(&self, field: LocalizedField, lang: Language) -> Option<&str> {
        let map = match field {
            LocalizedField::Name => &self.name_localized,
            LocalizedField::Description => &self.description_localized,
        };
        map.get(&lang).map(String::as_str)
    }
}

/// Empty or whitespace-only text is stored absence, not a value.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Select list shared by every statement that returns products. Casts pin the
/// decoded types regardless of how the table declares them.
pub fn product_columns() -> String {
    let mut cols = vec![
        "id::BIGINT AS id".to_string(),
        "product_type".to_string(),
        "name".to_string(),
        "description".to_string(),
    ];
    for field in [LocalizedField::Name, LocalizedField::Description] {
        for lang in Language::ALL {
            cols.push(field.column(lang));
        }
    }
    cols.extend(
        [
            "COALESCE(stars_numeric, 0)::BIGINT AS stars_numeric",
            "COALESCE(is_active, false) AS is_active",
            "COALESCE(is_featured, false) AS is_featured",
            "category",
            "created_at::TIMESTAMPTZ AS created_at",
            "updated_at::TIMESTAMPTZ AS updated_at",
        ]
        .map(String::from),
    );
    cols.join(", ")
}

fn localized_from_row(
    row: &PgRow,
    field: LocalizedField,
) -> Result<BTreeMap<Language, String>, sqlx::Error> {
    let mut out = BTreeMap::new();
    for lang in Language::ALL {
        let value: Option<String> = row.try_get(field.column(lang).as_str())?;
        if let Some(value) = non_blank(value) {
            out.insert(lang, value);
        }
    }
    Ok(out)
}

impl<'r> FromRow<'r, PgRow> for Product {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let raw_type: String = row.try_get("product_type")?;
        let product_type = raw_type
            .parse::<ProductType>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "product_type".into(),
                source: Box::new(e),
            })?;

        Ok(Product {
            id: row.try_get("id")?,
            product_type,
            name: row.try_get("name")?,
            name_localized: localized_from_row(row, LocalizedField::Name)?,
            description: non_blank(row.try_get("description")?),
            description_localized: localized_from_row(row, LocalizedField::Description)?,
            stars_numeric: row.try_get("stars_numeric")?,
            is_active: row.try_get("is_active")?,
            is_featured: row.try_get("is_featured")?,
            category: non_blank(row.try_get("category")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Active product count for one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    pub product_type: ProductType,
    pub count: i64,
}

/// How many active products of a type carry a description in `lang`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TranslationCoverage {
    pub product_type: ProductType,
    pub lang: Language,
    pub total: i64,
    pub translated: i64,
}

impl TranslationCoverage {
    pub fn missing(&self) -> i64 {
        self.total - self.translated
    }

    pub fn percent(&self) -> f64 {
        coverage_percent(self.translated, self.total)
    }
}

/// Share translated in percent; an empty type counts as fully covered.
pub fn coverage_percent(translated: i64, total: i64) -> f64 {
    if total == 0 {
        100.0
    } else {
        translated as f64 * 100.0 / total as f64
    }
}
