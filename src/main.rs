use anyhow::{Context, Result};

use phpunit_finder::cli::{Cli, Config};
use phpunit_finder::finder::TestFileFinder;
use phpunit_finder::logging::{self, Verbosity};
use phpunit_finder::output::Output;
use phpunit_finder::settings::SettingsManager;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let working_dir =
        std::env::current_dir().context("Failed to determine the current working directory")?;

    let settings = SettingsManager::load(&cli, &working_dir)
        .await
        .context("Failed to load settings")?;

    logging::init(Verbosity::from_flags(
        settings.output.verbose,
        settings.output.quiet,
    ));

    let config = Config::from_cli(&cli, &working_dir, settings);
    let output = Output::new(config.settings.output.format);
    tracing::debug!(?config, "resolved configuration");

    let finder = TestFileFinder::new(config);
    let files = finder.find().await.with_context(|| {
        format!(
            "Failed to locate test files for {}",
            finder.config().config_file.display()
        )
    })?;

    // Nothing reaches stdout unless the whole lookup succeeded
    let stdout = std::io::stdout();
    output
        .write_files(&files, &mut stdout.lock())
        .context("Failed to write results")?;

    Ok(())
}
