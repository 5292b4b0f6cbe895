use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;
use crate::report::ReportKind;

/// Command line for the `trialwatch` binary.
#[derive(Debug, Parser)]
#[command(name = "trialwatch", version, about = "Static clinical-trial reports from the AACT database")]
pub struct Cli {
    /// Reports to build (default: all)
    #[arg(value_enum)]
    pub reports: Vec<ReportKind>,

    /// Output directory (overrides OUTPUT_DIR)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Read from a SQLite snapshot instead of PostgreSQL (overrides TRIALWATCH_SNAPSHOT)
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides to an environment configuration.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(out) = &self.out {
            config = config.with_out_dir(out.clone());
        }
        if let Some(snapshot) = &self.snapshot {
            config = config.with_snapshot(snapshot.clone());
        }
        config
    }

    /// Lookup that treats `--snapshot` as if TRIALWATCH_SNAPSHOT were set,
    /// so a snapshot run never requires database credentials.
    pub fn env_lookup(&self) -> impl Fn(&str) -> Option<String> + '_ {
        move |key: &str| {
            if key == "TRIALWATCH_SNAPSHOT" {
                if let Some(path) = &self.snapshot {
                    return Some(path.to_string_lossy().into_owned());
                }
            }
            std::env::var(key).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_reports_and_flags() {
        let cli = Cli::try_parse_from([
            "trialwatch",
            "--out",
            "site",
            "--snapshot",
            "aact.sqlite",
            "dashboard",
            "upcoming-graph",
        ])
        .unwrap();
        assert_eq!(cli.reports, vec![ReportKind::Dashboard, ReportKind::UpcomingGraph]);
        assert_eq!(cli.out, Some(PathBuf::from("site")));

        let config = Config::from_lookup(cli.env_lookup()).unwrap();
        let config = cli.apply(config);
        assert_eq!(config.out_dir, PathBuf::from("site"));
        assert_eq!(config.source, SourceConfig::Snapshot(PathBuf::from("aact.sqlite")));
    }

    #[test]
    fn unknown_report_is_rejected() {
        assert!(Cli::try_parse_from(["trialwatch", "histogram"]).is_err());
    }
}
