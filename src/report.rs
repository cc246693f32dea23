//! Console rendering of catalog rows. Pure: text in, lines out, no I/O.
use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;

use crate::database_ops::catalog::StatementOutput;
use crate::database_ops::product::{
    coverage_percent, Language, LocalizedField, Product, TranslationCoverage, TypeCount,
};

pub const MISSING: &str = "<missing>";
pub const FALLBACK: &str = "(fallback)";

/// How product rows are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportKind {
    /// One block per product with every field.
    #[default]
    Detail,
    /// One line per product, grouped by type.
    Listing,
}

fn kv(label: &str, value: impl std::fmt::Display) -> String {
    format!("  {:<18}{value}", format!("{label}:"))
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Collapse runs of whitespace (including newlines) so a value fits on one line.
fn one_line(text: &str) -> String {
    text.split_whitespace().join(" ")
}

fn localized_or_missing(product: &Product, field: LocalizedField, lang: Language) -> String {
    product
        .localized(field, lang)
        .map(one_line)
        .unwrap_or_else(|| MISSING.to_string())
}

/// Localized description, or the canonical one explicitly marked as a fallback.
fn description_for(product: &Product, lang: Language) -> String {
    match product.localized(LocalizedField::Description, lang) {
        Some(text) => one_line(text),
        None => match &product.description {
            Some(canonical) => format!("{FALLBACK} {}", one_line(canonical)),
            None => format!("{FALLBACK} {MISSING}"),
        },
    }
}

fn flags(product: &Product) -> String {
    let active = if product.is_active { "active" } else { "inactive" };
    let featured = if product.is_featured {
        "featured"
    } else {
        "not featured"
    };
    format!("{active}, {featured}")
}

pub fn format_product(product: &Product, lang: Language) -> Vec<String> {
    vec![
        format!("#{} {}", product.id, one_line(&product.name)),
        kv(&format!("name[{lang}]"), localized_or_missing(product, LocalizedField::Name, lang)),
        kv("type", product.product_type),
        kv("category", product.category.as_deref().unwrap_or("-")),
        kv("stars", product.stars_numeric),
        kv("flags", flags(product)),
        kv(&format!("description[{lang}]"), description_for(product, lang)),
        kv("created_at", ts(&product.created_at)),
        kv("updated_at", ts(&product.updated_at)),
    ]
}

fn listing_line(product: &Product, lang: Language) -> String {
    format!(
        "  #{:<6} {:>7}  {}  | {} | {lang}: {} [{}]",
        product.id,
        product.stars_numeric,
        one_line(&product.name),
        product.category.as_deref().map(one_line).unwrap_or_else(|| "-".to_string()),
        localized_or_missing(product, LocalizedField::Name, lang),
        flags(product)
    )
}

/// Consecutive rows of the same type share one header; input order is kept.
pub fn format_listing(products: &[Product], lang: Language) -> Vec<String> {
    if products.is_empty() {
        return vec!["(no products)".to_string()];
    }
    let mut out = Vec::with_capacity(products.len() + 4);
    for (product_type, group) in &products.iter().chunk_by(|p| p.product_type) {
        let group: Vec<&Product> = group.collect();
        out.push(format!("== {product_type} ({}) ==", group.len()));
        out.extend(group.into_iter().map(|p| listing_line(p, lang)));
    }
    out
}

pub fn format_products(products: &[Product], lang: Language, kind: ReportKind) -> Vec<String> {
    match kind {
        ReportKind::Listing => format_listing(products, lang),
        ReportKind::Detail if products.is_empty() => vec!["(no products)".to_string()],
        ReportKind::Detail => {
            let mut out = Vec::with_capacity(products.len() * 10);
            for (i, p) in products.iter().enumerate() {
                if i > 0 {
                    out.push(String::new());
                }
                out.extend(format_product(p, lang));
            }
            out
        }
    }
}

/// Placeholder line for an id that matched nothing in a bulk report.
pub fn format_not_found(id: i64) -> String {
    format!("#{id} <not found>")
}

pub fn format_counts(counts: &[TypeCount]) -> Vec<String> {
    let mut out = vec!["active products by type:".to_string()];
    out.extend(
        counts
            .iter()
            .map(|c| format!("  {:<14}{:>8}", c.product_type.as_str(), c.count)),
    );
    let total: i64 = counts.iter().map(|c| c.count).sum();
    out.push(format!("  {:<14}{:>8}", "total", total));
    out
}

fn coverage_line(label: &str, translated: i64, total: i64) -> String {
    format!(
        "  {:<14}{:>6}/{:<6}{:>6.1}%  missing {}",
        label,
        translated,
        total,
        coverage_percent(translated, total),
        total - translated
    )
}

pub fn format_coverage(coverage: &[TranslationCoverage], lang: Language) -> Vec<String> {
    let mut out = vec![format!("description[{lang}] coverage (active products):")];
    out.extend(
        coverage
            .iter()
            .map(|c| coverage_line(c.product_type.as_str(), c.translated, c.total)),
    );
    let total: i64 = coverage.iter().map(|c| c.total).sum();
    let translated: i64 = coverage.iter().map(|c| c.translated).sum();
    out.push(coverage_line("total", translated, total));
    out
}

/// Entry point used by the CLI: any statement output to display lines.
pub fn render(output: &StatementOutput, lang: Language, kind: ReportKind) -> Vec<String> {
    match output {
        StatementOutput::Product(p) => format_products(std::slice::from_ref(p), lang, kind),
        StatementOutput::Products(rows) => format_products(rows, lang, kind),
        StatementOutput::Count(c) => vec![format!(
            "active {} products: {}",
            c.product_type.as_str(),
            c.count
        )],
        StatementOutput::TypeCounts(counts) => format_counts(counts),
        StatementOutput::Coverage(cov) => format_coverage(cov, lang),
        StatementOutput::Updated(p) => {
            let mut out = vec![format!("updated #{} at {}", p.id, ts(&p.updated_at))];
            out.extend(format_products(std::slice::from_ref(p), lang, kind));
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::product::ProductType;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn product(id: i64, product_type: ProductType, stars: i64) -> Product {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Product {
            id,
            product_type,
            name: format!("Product {id}"),
            name_localized: BTreeMap::new(),
            description: Some("Canonical\n  description".into()),
            description_localized: BTreeMap::new(),
            stars_numeric: stars,
            is_active: true,
            is_featured: false,
            category: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn detail_flags_missing_localized_name_and_description_fallback() {
        let lines = format_product(&product(529, ProductType::McpServer, 42), Language::Pt);
        assert_eq!(lines[0], "#529 Product 529");
        assert_eq!(lines[1], "  name[pt]:         <missing>");
        assert_eq!(lines[2], "  type:             mcp_server");
        assert_eq!(lines[3], "  category:         -");
        assert_eq!(lines[4], "  stars:            42");
        assert_eq!(lines[5], "  flags:            active, not featured");
        assert_eq!(lines[6], "  description[pt]:  (fallback) Canonical description");
        assert_eq!(lines[7], "  created_at:       2024-05-01T12:00:00.000000Z");
    }

    #[test]
    fn detail_prefers_localized_values() {
        let mut p = product(529, ProductType::McpServer, 42);
        p.name_localized.insert(Language::Pt, "Integração Google Drive".into());
        p.description_localized
            .insert(Language::Pt, "Acesse arquivos do Drive".into());
        p.category = Some("storage".into());
        p.is_featured = true;
        let lines = format_product(&p, Language::Pt);
        assert_eq!(lines[1], "  name[pt]:         Integração Google Drive");
        assert_eq!(lines[3], "  category:         storage");
        assert_eq!(lines[5], "  flags:            active, featured");
        assert_eq!(lines[6], "  description[pt]:  Acesse arquivos do Drive");

        // Other languages still fall back.
        let lines = format_product(&p, Language::Es);
        assert_eq!(lines[1], "  name[es]:         <missing>");
        assert!(lines[6].contains(FALLBACK));
    }

    #[test]
    fn fallback_without_canonical_description_is_explicit() {
        let mut p = product(1, ProductType::AiAgent, 0);
        p.description = None;
        let lines = format_product(&p, Language::Pt);
        assert_eq!(lines[6], "  description[pt]:  (fallback) <missing>");
    }

    #[test]
    fn listing_groups_consecutive_types() {
        let mut featured = product(3, ProductType::McpServer, 90);
        featured.is_featured = true;
        featured.category = Some("storage".into());
        let mut retired = product(1, ProductType::McpServer, 10);
        retired.is_active = false;
        let rows = vec![featured, retired, product(2, ProductType::AiAgent, 5)];
        let lines = format_listing(&rows, Language::Pt);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "== mcp_server (2) ==");
        assert!(lines[1].starts_with("  #3 "));
        assert!(lines[1].ends_with("| storage | pt: <missing> [active, featured]"));
        assert!(lines[2].ends_with("| - | pt: <missing> [inactive, not featured]"));
        assert_eq!(lines[3], "== ai_agent (1) ==");
        assert!(lines[4].ends_with("[active, not featured]"));
    }

    #[test]
    fn empty_results_say_so() {
        assert_eq!(format_listing(&[], Language::Pt), vec!["(no products)"]);
        assert_eq!(
            format_products(&[], Language::Pt, ReportKind::Detail),
            vec!["(no products)"]
        );
    }

    #[test]
    fn detail_blocks_are_separated_by_one_blank_line() {
        let rows = vec![
            product(1, ProductType::McpClient, 1),
            product(2, ProductType::McpClient, 1),
        ];
        let lines = format_products(&rows, Language::Pt, ReportKind::Detail);
        assert_eq!(lines.len(), 9 * 2 + 1);
        assert_eq!(lines[9], "");
        assert_ne!(lines.last().unwrap(), "");
    }

    #[test]
    fn counts_include_zero_types_and_total() {
        let counts = vec![
            TypeCount {
                product_type: ProductType::McpServer,
                count: 12,
            },
            TypeCount {
                product_type: ProductType::ReadyToUse,
                count: 0,
            },
        ];
        let lines = format_counts(&counts);
        assert_eq!(
            lines,
            vec![
                "active products by type:",
                "  mcp_server          12",
                "  ready_to_use         0",
                "  total               12",
            ]
        );
    }

    #[test]
    fn coverage_reports_percent_and_total() {
        let cov = vec![
            TranslationCoverage {
                product_type: ProductType::McpServer,
                lang: Language::Pt,
                total: 4,
                translated: 3,
            },
            TranslationCoverage {
                product_type: ProductType::AiAgent,
                lang: Language::Pt,
                total: 0,
                translated: 0,
            },
        ];
        let lines = format_coverage(&cov, Language::Pt);
        assert_eq!(lines[0], "description[pt] coverage (active products):");
        assert_eq!(lines[1], "  mcp_server         3/4       75.0%  missing 1");
        assert_eq!(lines[2], "  ai_agent           0/0      100.0%  missing 0");
        assert_eq!(lines[3], "  total              3/4       75.0%  missing 1");
    }

    #[test]
    fn render_is_deterministic() {
        let out = StatementOutput::Products(vec![product(7, ProductType::AiAgent, 3)]);
        assert_eq!(
            render(&out, Language::Pt, ReportKind::Listing),
            render(&out, Language::Pt, ReportKind::Listing)
        );
        let count = StatementOutput::Count(TypeCount {
            product_type: ProductType::AiAgent,
            count: 0,
        });
        assert_eq!(render(&count, Language::Pt, ReportKind::Detail), vec!["active ai_agent products: 0"]);
    }
}
