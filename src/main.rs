use clap::Parser;
use oisst_mirror_lib::logging::init_logging;
use oisst_mirror_lib::storage::HttpSource;
use oisst_mirror_lib::{MirrorConfig, MirrorEngine};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(version, about = "Download the OISST monthly partitions that changed since the last run")]
struct Args {
    /// JSON configuration file
    #[arg(long, short = 'c', default_value = "oisst.json")]
    config: PathBuf,
}

async fn run(config: &MirrorConfig) -> anyhow::Result<()> {
    let base_url = config.base_url()?;
    let source = Arc::new(HttpSource::new(&base_url)?);
    let engine = MirrorEngine::new(source);

    let now = chrono::Local::now().naive_local();
    engine.run(&base_url, &config.output_dir, now).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // 日志尚未初始化，错误直接写到 stderr
    let config = match MirrorConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_logging(&config.log_dir, &config.log_level, config.log_backups) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            eprintln!("Unable to setup logging");
            return ExitCode::FAILURE;
        }
    };

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
