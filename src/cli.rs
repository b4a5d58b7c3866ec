use clap::Parser;
use std::path::{Path, PathBuf};

use crate::bootstrap::BootstrapPolicy;
use crate::output::OutputFormat;
use crate::settings::Settings;

pub const DEFAULT_CONFIG_FILE: &str = "phpunit.xml";
pub const DEFAULT_BOOTSTRAP_FILE: &str = "tests/bootstrap.php";

/// Everything a run needs, resolved once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Absolute path of the phpunit.xml to read
    pub config_file: PathBuf,
    /// Absolute path of the bootstrap script
    pub bootstrap_file: PathBuf,
    /// Suite names to keep; empty keeps every suite
    pub test_suites: Vec<String>,
    pub settings: Settings,
}

impl Config {
    /// Resolve CLI paths against `working_dir`, falling back to the defaults
    pub fn from_cli(cli: &Cli, working_dir: &Path, settings: Settings) -> Self {
        let config_file = cli
            .config_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let bootstrap_file = cli
            .bootstrap_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BOOTSTRAP_FILE));

        Self {
            config_file: working_dir.join(config_file),
            bootstrap_file: working_dir.join(bootstrap_file),
            test_suites: cli.test_suites.clone(),
            settings,
        }
    }
}

/// Find the PHPUnit test files backing the suites of a phpunit.xml
#[derive(Parser, Debug, Clone)]
#[command(name = "phpunit-finder")]
#[command(about = "Print the absolute paths of the test files declared by PHPUnit test suites")]
#[command(version)]
pub struct Cli {
    /// Test suites to scan (all suites when omitted)
    #[arg(value_name = "TEST_SUITE")]
    pub test_suites: Vec<String>,

    /// The phpunit.xml config file to use
    #[arg(
        short = 'c',
        long = "config-file",
        value_name = "PATH",
        help = "The phpunit.xml config file to use [default: ./phpunit.xml]"
    )]
    pub config_file: Option<PathBuf>,

    /// The tests bootstrap file
    #[arg(
        short = 'b',
        long = "bootstrap-file",
        value_name = "PATH",
        help = "The tests bootstrap file [default: ./tests/bootstrap.php]"
    )]
    pub bootstrap_file: Option<PathBuf>,

    /// What to do with the bootstrap file
    #[arg(long = "bootstrap-policy", value_enum)]
    pub bootstrap_policy: Option<BootstrapPolicy>,

    /// Fail when a test case's source file cannot be resolved
    #[arg(long = "strict")]
    pub strict: bool,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<OutputFormat>,

    /// Tool settings file (TOML or JSON)
    #[arg(long = "settings", value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Errors only
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
