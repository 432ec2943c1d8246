mod cli;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use volume_backup::core::config::debug_enabled;
use volume_backup::core::{BackupMode, BackupPipeline, S3Store, StorageConfig, SystemCommandRunner, Uploader};
use volume_backup::utils::format_bytes;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Usage errors exit 1, help and version output exit 0
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    // .env may carry DEBUG, so load it before the subscriber is set up
    dotenv::dotenv().ok();
    init_logging(debug_enabled());

    if let Err(err) = handle_backup(cli).await {
        eprintln!("{} {:#}", "✗".red(), err);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let default_directive = if debug {
        "volume_backup=debug,info"
    } else {
        "volume_backup=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn handle_backup(cli: Cli) -> Result<()> {
    let config = StorageConfig::from_env().context("Object storage is not configured")?;
    tracing::debug!("storage configuration: {:?}", config);

    let uploader = Uploader::new(S3Store::new(&config))
        .with_prefix(config.prefix.clone())
        .with_progress(!cli.no_progress);
    let pipeline = BackupPipeline::new(SystemCommandRunner::new(), uploader, &cli.output_dir);

    let mode = cli.mode();
    match &mode {
        BackupMode::Host { container_id, .. } => {
            println!("Backing up volumes of container {}", container_id);
        }
        BackupMode::Container { .. } => {
            println!("Backing up volumes mounted in this container");
        }
    }

    let report = pipeline
        .run(&mode, &cli.backup_name)
        .await
        .with_context(|| format!("Backup {} failed", cli.backup_name))?;

    println!(
        "{} Archive created: {} ({})",
        "✓".green(),
        report.artifact.path.display(),
        format_bytes(report.artifact.byte_size)
    );
    println!(
        "{} Uploaded to s3://{}/{}",
        "✓".green(),
        config.bucket,
        report.object_key
    );

    Ok(())
}
