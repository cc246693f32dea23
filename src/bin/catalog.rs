use anyhow::Result;
use catalog_ops::cli::bulk_inspect::{self, BulkInspectConfig, DEFAULT_CONCURRENCY};
use catalog_ops::cli::dispatch::{self, report_failure, until_ctrl_c, InvocationConfig};
use catalog_ops::cli::type_counts::{self, TypeCountsConfig};
use catalog_ops::database_ops::catalog::{Statement, DEFAULT_LIST_LIMIT};
use catalog_ops::database_ops::product::{Language, LocalizedField, ProductType};
use catalog_ops::report::ReportKind;
use catalog_ops::util::env;
use clap::{ArgGroup, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "catalog", version, about = "Inspect and patch the products catalog")]
struct Cli {
    /// Optional override for the database URL (otherwise DATABASE_URL or DB_* vars)
    #[arg(long, global = true)]
    db_url: Option<String>,
    /// Accept the server certificate without verification (self-signed hosts)
    #[arg(long, global = true, default_value_t = false)]
    insecure_skip_tls_verify: bool,
    /// Language for localized fields (pt, es; region subtags are ignored)
    #[arg(long, global = true, default_value = "pt")]
    lang: Language,
    /// Print results as JSON instead of the text report
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Show one product with every field
    Show {
        id: i64,
        #[arg(long, value_enum, default_value_t = ReportKind::Detail)]
        format: ReportKind,
    },
    /// Show several products, one session per id; missing ids are reported inline
    Inspect {
        #[arg(long = "id", required = true, num_args = 1..)]
        ids: Vec<i64>,
        /// Sessions open at once
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
    },
    /// List active products of one type, best rated first
    List {
        #[arg(long = "type")]
        product_type: ProductType,
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: i64,
        #[arg(long, value_enum, default_value_t = ReportKind::Listing)]
        format: ReportKind,
    },
    /// List products whose id falls in FROM..=TO
    Range {
        from: i64,
        to: i64,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long, value_enum, default_value_t = ReportKind::Listing)]
        format: ReportKind,
    },
    /// Count active products of one type
    Count {
        #[arg(long = "type")]
        product_type: ProductType,
    },
    /// Count active products for every type
    Counts {
        /// Also report description coverage for --lang
        #[arg(long, default_value_t = false)]
        coverage: bool,
    },
    /// Description translation coverage per type for --lang
    Coverage,
    /// Active products without a description in --lang
    Missing {
        #[arg(long = "type")]
        product_type: Option<ProductType>,
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: i64,
    },
    /// Set or clear one localized field of one product
    #[command(group(ArgGroup::new("new_value").required(true).args(["value", "clear"])))]
    Patch {
        #[arg(long)]
        id: i64,
        /// name or description
        #[arg(long)]
        field: LocalizedField,
        #[arg(long)]
        value: Option<String>,
        /// Reset the field to NULL
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
}

async fn run_command(cli: Cli) -> Result<Vec<String>> {
    let mut invocation = InvocationConfig {
        database_url: cli.db_url,
        insecure_skip_tls_verify: cli.insecure_skip_tls_verify,
        lang: cli.lang,
        report: ReportKind::Detail,
        json: cli.json,
    };
    let lang = invocation.lang;

    let statement = match cli.command {
        Commands::Show { id, format } => {
            invocation.report = format;
            Statement::FetchById { id }
        }
        Commands::Inspect { ids, concurrency } => {
            let cfg = BulkInspectConfig {
                invocation,
                ids,
                concurrency,
            };
            return bulk_inspect::run(&cfg).await;
        }
        Commands::List {
            product_type,
            limit,
            format,
        } => {
            invocation.report = format;
            Statement::FetchByType {
                product_type,
                limit: Some(limit),
            }
        }
        Commands::Range {
            from,
            to,
            limit,
            format,
        } => {
            invocation.report = format;
            Statement::FetchRange { from, to, limit }
        }
        Commands::Count { product_type } => Statement::CountByType { product_type },
        Commands::Counts { coverage } => {
            let cfg = TypeCountsConfig {
                invocation,
                with_coverage: coverage,
            };
            return type_counts::run(&cfg).await;
        }
        Commands::Coverage => Statement::TranslationCoverage { lang },
        Commands::Missing {
            product_type,
            limit,
        } => {
            invocation.report = ReportKind::Listing;
            Statement::MissingTranslations {
                lang,
                product_type,
                limit: Some(limit),
            }
        }
        Commands::Patch {
            id,
            field,
            value,
            clear,
        } => Statement::UpdateLocalizedField {
            id,
            field,
            lang,
            value: if clear { None } else { value },
        },
    };

    dispatch::run(&invocation, statement).await
}

#[tokio::main]
async fn main() {
    env::bootstrap_cli("catalog");
    let cli = Cli::parse();

    match until_ctrl_c(run_command(cli)).await {
        Ok(lines) => {
            for line in lines {
                println!("{line}");
            }
        }
        Err(err) => std::process::exit(report_failure("catalog", &err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn patch_requires_value_or_clear() {
        assert!(Cli::try_parse_from(["catalog", "patch", "--id", "529", "--field", "description"]).is_err());
        assert!(Cli::try_parse_from([
            "catalog", "patch", "--id", "529", "--field", "description", "--value", "x", "--clear",
        ])
        .is_err());

        let cli = Cli::try_parse_from([
            "catalog", "--lang", "pt-BR", "patch", "--id", "529", "--field", "description", "--clear",
        ])
        .unwrap();
        assert_eq!(cli.lang, Language::Pt);
        assert!(matches!(cli.command, Commands::Patch { clear: true, value: None, .. }));
    }

    #[test]
    fn list_accepts_short_type_names_and_defaults_limit() {
        let cli = Cli::try_parse_from(["catalog", "list", "--type", "agent"]).unwrap();
        match cli.command {
            Commands::List {
                product_type,
                limit,
                format,
            } => {
                assert_eq!(product_type, ProductType::AiAgent);
                assert_eq!(limit, DEFAULT_LIST_LIMIT);
                assert_eq!(format, ReportKind::Listing);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["catalog", "list", "--type", "plugin"]).is_err());
    }

    #[test]
    fn global_flags_work_after_the_subcommand() {
        let cli = Cli::try_parse_from(["catalog", "show", "529", "--json", "--lang", "es"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.lang, Language::Es);
    }

    #[test]
    fn inspect_collects_repeated_ids() {
        let cli = Cli::try_parse_from(["catalog", "inspect", "--id", "1", "--id", "2", "3"]).unwrap();
        match cli.command {
            Commands::Inspect { ids, concurrency } => {
                assert_eq!(ids, vec![1, 2, 3]);
                assert_eq!(concurrency, DEFAULT_CONCURRENCY);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
