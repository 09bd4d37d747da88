use std::env;
use std::fs;
use std::io;
use std::process::ExitCode;

use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use dental_cfg::csv::{read_edits, write_grid};
use dental_cfg::{Bundle, Engine, EngineConfig};

const USAGE: &str = "usage: dental-cfg <bundle.json> <edits.csv> [saved-bundle.json]";

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let mut args = env::args().skip(1);
    let (Some(bundle_path), Some(edits_path)) = (args.next(), args.next()) else {
        return Err(USAGE.to_string());
    };
    let output_path = args.next();

    if !edits_path.ends_with(".csv") {
        warn!(path = %edits_path, "edit script seems to not be a csv file");
    }

    let config = EngineConfig::from_env().map_err(|e| e.to_string())?;
    let bundle: Bundle = fs::read_to_string(&bundle_path)
        .map_err(|e| format!("{bundle_path}: {e}"))
        .and_then(|text| serde_json::from_str(&text).map_err(|e| format!("{bundle_path}: {e}")))?;
    if let Err(e) = bundle.validate() {
        warn!(path = %bundle_path, reason = %e, "loaded bundle does not validate");
    }

    let edits = read_edits(edits_path.clone()).map_err(|e| format!("{edits_path}: {e}"))?;
    let mut engine = Engine::load(&bundle, config);
    let (edit_sender, edit_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in edits {
            match result {
                Ok(edit) => {
                    if edit_sender.send(edit).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(edit_receiver)).await;

    write_grid(io::stdout().lock(), engine.grid())
        .map_err(|e| format!("failed to write grid: {e}"))?;

    if let Some(path) = output_path {
        let exported = engine.export(&bundle);
        exported
            .validate()
            .map_err(|e| format!("exported bundle is invalid: {e}"))?;
        let json = serde_json::to_string_pretty(&exported).map_err(|e| e.to_string())?;
        fs::write(&path, json).map_err(|e| format!("{path}: {e}"))?;
    }

    Ok(())
}
