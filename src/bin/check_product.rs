use anyhow::Result;
use catalog_ops::cli::dispatch::{self, report_failure, until_ctrl_c, InvocationConfig};
use catalog_ops::database_ops::catalog::Statement;
use catalog_ops::util::env;

/// Quick lookup of one product: `check_product [ID] [LANG]` (defaults 529, pt).
async fn check(args: Vec<String>) -> Result<Vec<String>> {
    let id = match args.first() {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|e| anyhow::anyhow!("invalid product id '{raw}': {e}"))?,
        None => 529,
    };
    let mut cfg = InvocationConfig::default();
    if let Some(lang) = args.get(1) {
        cfg.lang = lang.parse()?;
    }
    dispatch::run(&cfg, Statement::FetchById { id }).await
}

#[tokio::main]
async fn main() {
    env::bootstrap_cli("check_product");
    let args: Vec<String> = std::env::args().skip(1).collect();

    match until_ctrl_c(check(args)).await {
        Ok(lines) => lines.iter().for_each(|l| println!("{l}")),
        Err(err) => std::process::exit(report_failure("check_product", &err)),
    }
}
