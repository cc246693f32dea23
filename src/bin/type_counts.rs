use catalog_ops::cli::dispatch::{report_failure, until_ctrl_c};
use catalog_ops::cli::type_counts::{run, TypeCountsConfig};
use catalog_ops::util::env;

#[tokio::main]
async fn main() {
    env::bootstrap_cli("type_counts");

    let cfg = TypeCountsConfig {
        with_coverage: env::env_flag("TYPE_COUNTS_COVERAGE", true),
        ..TypeCountsConfig::default()
    };
    match until_ctrl_c(run(&cfg)).await {
        Ok(lines) => lines.iter().for_each(|l| println!("{l}")),
        Err(err) => std::process::exit(report_failure("type_counts", &err)),
    }
}
