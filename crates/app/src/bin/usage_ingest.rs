use std::env;
use std::path::PathBuf;

use tracing::{error, info};
use usage_app::{AppPaths, AppState, ensure_app_data_dir, init_logging, load_app_config};

const CONFIG_FILE_NAME: &str = "config.toml";

struct Args {
    config_path: PathBuf,
    once: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut config_path = None;
    let mut once = false;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args.next().ok_or("--config needs a path")?;
                config_path = Some(PathBuf::from(value));
            }
            "--once" => once = true,
            other => return Err(format!("unknown argument {}", other)),
        }
    }
    let config_path = config_path
        .unwrap_or_else(|| AppPaths::default_location().app_data_dir.join(CONFIG_FILE_NAME));
    Ok(Args { config_path, once })
}

#[tokio::main]
async fn main() {
    init_logging();
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("usage: usage-ingest [--config <path>] [--once]");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(args).await {
        error!(error = %err, "usage-ingest failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> usage_app::Result<()> {
    let mut config = load_app_config(&args.config_path)?;
    if args.once {
        config.scan_on_startup = true;
        config.watch_enabled = false;
        config.scan_interval_ms = 0;
    }
    ensure_app_data_dir(&AppPaths::default_location())?;
    info!(
        config = %args.config_path.display(),
        db = %config.db_path.display(),
        "starting usage-ingest"
    );

    let state = AppState::new(config);
    let report = state.initialize().await?;
    if args.once {
        if let Some(report) = report {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        state.dispose().await;
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    state.dispose().await;
    Ok(())
}
