use clap::Parser;
use std::process;

use trialwatch::cli::Cli;
use trialwatch::config::Config;
use trialwatch::logging::{log, log_run_summary, log_startup, obj, v_str, Domain, Level, ProfileScope};
use trialwatch::report::{self, expand};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Configuration problems exit before anything is written.
    let config = match Config::from_lookup(cli.env_lookup()) {
        Ok(config) => cli.apply(config),
        Err(err) => {
            log(
                Level::Fatal,
                Domain::System,
                "config_error",
                obj(&[("msg", v_str(&err.to_string()))]),
            );
            eprintln!("trialwatch: {}", err);
            process::exit(2);
        }
    };

    let kinds = expand(&cli.reports);
    let names: Vec<&str> = kinds.iter().map(|k| k.name()).collect();
    log_startup(&names, &config.source.describe(), &config.out_dir.display().to_string());

    let run = ProfileScope::new("run");
    match report::run(&config, &kinds).await {
        Ok(summary) => {
            log_run_summary(
                run.elapsed_ms(),
                summary.reports.len(),
                summary.manifest.artifacts.len(),
                summary.manifest.skipped.len(),
            );
        }
        Err(err) => {
            log(
                Level::Fatal,
                Domain::System,
                "run_failed",
                obj(&[("msg", v_str(&format!("{:#}", err)))]),
            );
            eprintln!("trialwatch: {:#}", err);
            process::exit(1);
        }
    }
}
