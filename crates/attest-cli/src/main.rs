use anyhow::{Context, Result};
use attest_core::{FaceDetector, ScrfdPresence, TextRecognizer};
use attest_hw::{V4lCamera, V4lProvider};
use attest_pipeline::{
    spawn_controller, spawn_pipeline, Config, OutcomeSink, PipelineView, SqliteIdentityStore,
    VerificationStep,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::watch;

mod ocr;

#[derive(Parser)]
#[command(name = "attest", about = "Identity verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the verification flow: capture ID, capture face, verify
    Verify,
    /// Show the stored identity record
    Status {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Clear the stored identity record
    Reset,
    /// List available capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Verify => run_verify(config).await,
        Commands::Status { json } => show_status(&config, json),
        Commands::Reset => reset_record(&config),
        Commands::Devices => {
            for dev in V4lCamera::list_devices() {
                println!("{}  {} ({})", dev.path, dev.name, dev.driver);
            }
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<SqliteIdentityStore> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    SqliteIdentityStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))
}

fn show_status(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let record = store.load()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else if record.verified {
        println!("verified: {}", record.display_name);
    } else {
        println!("not verified");
    }
    Ok(())
}

fn reset_record(config: &Config) -> Result<()> {
    let mut store = open_store(config)?;
    store.clear()?;
    println!("identity record cleared");
    Ok(())
}

async fn run_verify(config: Config) -> Result<()> {
    let detector: Arc<dyn FaceDetector> = Arc::new(
        ScrfdPresence::load(&config.scrfd_model_path()).context("loading face detector")?,
    );
    let recognizer: Arc<dyn TextRecognizer> = Arc::new(ocr::TesseractRecognizer);
    let sink: Box<dyn OutcomeSink> = Box::new(open_store(&config)?);

    let provider = V4lProvider::new(config.position_map());
    let controller = spawn_controller(Box::new(provider), config.warmup_frames);
    let handle = spawn_pipeline(controller, recognizer, detector, sink);
    let mut view = handle.watch_view();

    handle.surface_visible().await;

    // ID step: retry until the document reads.
    loop {
        prompt("Position your ID in front of the back camera, then press Enter.").await?;
        handle.request_id_capture().await;
        let v = wait_view(&mut view, |v| {
            v.readable || v.status.contains("Not readable") || v.status.contains("failed")
        })
        .await?;
        println!("{}", v.status);
        if v.readable {
            if let Some(name) = &v.extracted_name {
                println!("Extracted name: {name}");
            }
            break;
        }
    }

    // Switch to the front camera.
    loop {
        handle.advance_to_face_capture().await;
        let v = wait_view(&mut view, |v| {
            (v.step == VerificationStep::CaptureFace && !v.status.contains("Switching"))
                || v.status.contains("unavailable")
        })
        .await?;
        if v.step == VerificationStep::CaptureFace {
            break;
        }
        println!("{}", v.status);
        prompt("Press Enter to retry the camera switch.").await?;
    }

    // Face step: retry until verified.
    let final_view = loop {
        prompt("Look at the front camera, then press Enter.").await?;
        handle.request_face_capture().await;
        let v = wait_view(&mut view, |v| {
            v.step == VerificationStep::Completed
                || v.status.contains("No face")
                || v.status.contains("Error detecting")
                || v.status.contains("failed")
        })
        .await?;
        println!("{}", v.status);
        if v.step == VerificationStep::Completed {
            break v;
        }
    };

    handle.surface_hidden().await;

    match final_view.extracted_name {
        Some(name) => println!("Welcome, {name}! Your ID has been verified."),
        None => println!("Your ID has been verified."),
    }
    Ok(())
}

async fn wait_view(
    view: &mut watch::Receiver<PipelineView>,
    pred: impl FnMut(&PipelineView) -> bool,
) -> Result<PipelineView> {
    let v = view.wait_for(pred).await.context("pipeline stopped")?;
    Ok(v.clone())
}

async fn prompt(message: &str) -> Result<()> {
    println!("{message}");
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| ())
    })
    .await
    .context("input task failed")?
    .context("reading stdin")?;
    Ok(())
}
