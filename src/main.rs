use clap::Parser;
use color_eyre::eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use contest_media::infrastructure::{AppConfig, CliArgs, ConfigManager};
use contest_media::presentation::App;

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<(AppConfig, Option<String>)> {
    let path = args.config.as_deref();
    let (mut config, problem) = match ConfigManager::discover(path) {
        Ok(manager) => (manager.load_config(path)?, None),
        Err(e) => (AppConfig::default(), Some(e.to_string())),
    };
    config.merge_with_args(args);
    Ok((config, problem))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let (config, problem) = load_config(&args)?;

    init_logging(&config)?;
    if let Some(problem) = problem {
        warn!(error = %problem, "Using default configuration");
    }

    info!(version = contest_media::VERSION, "Starting {}", contest_media::NAME);

    let app = App::from_config(&config).await?;
    let mut stdout = std::io::stdout().lock();
    app.run(args.command, &mut stdout).await
}
