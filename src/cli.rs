// File: cli.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use wafcompare::headers::Transport;
use wafcompare::report::ReportFormat;
use wafcompare::targets::TargetRegistry;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(
        long = "data-dir",
        default_value = "Data",
        global = true,
        help = "Directory holding Legitimate/ and Malicious/ payload files"
    )]
    pub data_dir: PathBuf,

    #[arg(long = "db", global = true, help = "Result database path")]
    pub db: Option<PathBuf>,

    #[arg(
        long = "targets",
        global = true,
        help = "JSON file with target names and base URLs"
    )]
    pub targets_file: Option<PathBuf>,

    #[arg(
        long = "target",
        value_name = "NAME=URL",
        global = true,
        help = "Add a target (repeatable)"
    )]
    pub target: Vec<String>,

    #[arg(
        long = "http1",
        value_name = "NAME",
        global = true,
        help = "Force HTTP/1.1 for the named target (repeatable)"
    )]
    pub http1: Vec<String>,

    #[arg(long = "log-level", default_value = "info", global = true)]
    pub log_level: String,

    #[arg(
        short = 'v',
        long = "verbose",
        help = "Enable verbose output",
        global = true
    )]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long = "quiet",
        help = "Reduce output verbosity",
        global = true
    )]
    pub quiet: bool,

    #[arg(long = "no-color", help = "Disable colored output", global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe every target with every payload and record the outcomes
    Run(RunArgs),
    /// Run the target health checks only
    Check,
    /// Print the snapshot and detection metrics of an existing result store
    Summary(SummaryArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[arg(long = "skip-checks", help = "Do not health-check targets before dispatch")]
    pub skip_checks: bool,
}

#[derive(Args, Debug)]
pub struct SummaryArgs {
    #[arg(short = 'f', long = "format", default_value = "text")]
    pub format: String,

    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

impl SummaryArgs {
    pub fn parse_format(&self) -> Option<ReportFormat> {
        ReportFormat::parse(&self.format)
    }
}

impl Cli {
    pub fn level_filter(&self) -> LevelFilter {
        if self.verbose {
            return LevelFilter::Debug;
        }
        if self.quiet {
            return LevelFilter::Warn;
        }
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }

    pub fn db_path(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(default_db_path)
    }

    /// Targets from `--targets`, then `--target`, with `--http1` applied last.
    pub fn target_registry(&self) -> wafcompare::Result<TargetRegistry> {
        let mut registry = match &self.targets_file {
            Some(path) => TargetRegistry::from_file(path)?,
            None => TargetRegistry::new(),
        };
        for pair in &self.target {
            registry.add_pair(pair)?;
        }
        for name in &self.http1 {
            registry.set_transport(name, Transport::Http1Only)?;
        }
        Ok(registry)
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("waf_compare")
        .join("waf_comparison.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_is_the_default_command() {
        let cli = Cli::try_parse_from(["wafcompare"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.data_dir, PathBuf::from("Data"));
        assert!(cli.db_path().ends_with("waf_compare/waf_comparison.db"));
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "wafcompare",
            "run",
            "--skip-checks",
            "--target",
            "edge=http://127.0.0.1:8080",
            "--target",
            "bunker=http://127.0.0.1:8081",
            "--http1",
            "bunker",
            "-v",
        ])
        .unwrap();

        match &cli.command {
            Some(Commands::Run(args)) => assert!(args.skip_checks),
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.level_filter(), LevelFilter::Debug);

        let registry = cli.target_registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.by_name("bunker").unwrap().transport,
            Transport::Http1Only
        );
        assert_eq!(
            registry.by_name("edge").unwrap().transport,
            Transport::Multiplexed
        );
    }

    #[test]
    fn http1_for_unknown_target_is_rejected() {
        let cli = Cli::try_parse_from(["wafcompare", "--http1", "nobody"]).unwrap();
        assert!(cli.target_registry().is_err());
    }

    #[test]
    fn log_level_parsing() {
        let cli = Cli::try_parse_from(["wafcompare", "--log-level", "trace"]).unwrap();
        assert_eq!(cli.level_filter(), LevelFilter::Trace);

        let cli = Cli::try_parse_from(["wafcompare", "--log-level", "nonsense"]).unwrap();
        assert_eq!(cli.level_filter(), LevelFilter::Info);

        let cli = Cli::try_parse_from(["wafcompare", "-q"]).unwrap();
        assert_eq!(cli.level_filter(), LevelFilter::Warn);
    }

    #[test]
    fn summary_format() {
        let cli = Cli::try_parse_from(["wafcompare", "summary", "--format", "json"]).unwrap();
        match cli.command {
            Some(Commands::Summary(args)) => {
                assert_eq!(args.parse_format(), Some(ReportFormat::Json))
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
