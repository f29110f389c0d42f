//! bomv - drawing verification command line client
//!
//! Drives a verification gateway through the session orchestrator: upload a
//! drawing, run detection, verify detections and generate the BOM.

use anyhow::{bail, Context, Result};
use bomv_common::catalog::PriceCatalog;
use bomv_common::config::load_config;
use bomv_common::logging::init_tracing;
use bomv_common::models::{BomData, BoundingBox, VerificationStatus};
use bomv_session::config::resolve_gateway_settings;
use bomv_session::gateway::{DetectionConfig, ExportFormat, HttpGateway, UploadFile};
use bomv_session::orchestrator::{DetectionOutcome, OrchestratorOptions, SessionOrchestrator};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "bomv")]
#[command(about = "Drawing symbol verification and BOM client", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (overrides BOMV_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gateway base URL (overrides BOMV_GATEWAY_URL and the config file)
    #[arg(long, global = true)]
    gateway_url: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a drawing and create a session
    Upload { file: PathBuf },

    /// List recent sessions
    Sessions {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show a session and its detections
    Show { session_id: String },

    /// Run symbol detection
    Detect {
        session_id: String,

        #[arg(long)]
        confidence: Option<f64>,

        #[arg(long)]
        iou: Option<f64>,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        device: Option<String>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Verify a single detection (approved/rejected/modified)
    Verify {
        session_id: String,
        detection_id: String,
        status: VerificationStatus,

        /// Corrected class name, required for `modified`
        #[arg(long)]
        class_name: Option<String>,
    },

    /// Approve every machine detection
    ApproveAll { session_id: String },

    /// Reject every machine detection
    RejectAll { session_id: String },

    /// Add an operator-drawn detection
    AddManual {
        session_id: String,
        class_name: String,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },

    DeleteDetection {
        session_id: String,
        detection_id: String,
    },

    /// Generate the BOM
    Bom {
        session_id: String,

        /// Aggregate locally with this pricing catalog instead of the gateway
        #[arg(long)]
        local_catalog: Option<PathBuf>,
    },

    /// Print the BOM export download URL
    ExportUrl {
        session_id: String,
        format: ExportFormat,
    },

    DeleteSession { session_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_tracing(&config.logging).context("Failed to initialise logging")?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting bomv");

    let settings = resolve_gateway_settings(&config, cli.gateway_url.as_deref())
        .context("Failed to resolve gateway settings")?;
    info!(base_url = %settings.base_url, "Gateway configured");

    let gateway = HttpGateway::new(&settings.base_url, settings.api_token, settings.request_timeout)
        .context("Failed to build gateway client")?;
    let orchestrator =
        SessionOrchestrator::new(Arc::new(gateway), OrchestratorOptions::from(&config.orchestrator));

    match cli.command {
        Commands::Upload { file } => {
            let upload = UploadFile::from_path(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let session_id = orchestrator.upload_image(upload).await?;
            println!("Uploaded {} as session {}", file.display(), session_id);
        }

        Commands::Sessions { limit } => {
            if let Some(sessions) = orchestrator.list_sessions(limit).await {
                for session in sessions {
                    println!(
                        "{}  {:<15} {:>4} detections  {}",
                        session.session_id, session.status, session.detection_count, session.filename
                    );
                }
            }
        }

        Commands::Show { session_id } => {
            load(&orchestrator, &session_id).await?;
            let state = orchestrator.state().await;
            if let Some(detail) = &state.session {
                println!(
                    "{} ({}) status={} image={}x{}",
                    detail.session_id(),
                    detail.session.filename,
                    detail.status(),
                    detail.image_width,
                    detail.image_height
                );
            }
            for detection in &state.detections {
                println!(
                    "  {}  {:<20} {:.2}  {}",
                    detection.id,
                    detection.effective_class_name(),
                    detection.confidence,
                    detection.verification_status
                );
            }
            let counts = state.counts();
            println!(
                "pending={} approved={} rejected={} modified={} manual={}",
                counts.pending, counts.approved, counts.rejected, counts.modified, counts.manual
            );
            if let Some(bom) = &state.bom_data {
                print_bom(bom);
            }
        }

        Commands::Detect {
            session_id,
            confidence,
            iou,
            model,
            device,
            timeout_secs,
        } => {
            load(&orchestrator, &session_id).await?;
            let mut detection = DetectionConfig::from(&config.detection);
            if let Some(confidence) = confidence {
                detection.confidence = confidence;
            }
            if let Some(iou) = iou {
                detection.iou_threshold = iou;
            }
            if let Some(model) = model {
                detection.model_id = model;
            }
            if device.is_some() {
                detection.device = device;
            }

            let outcome = match timeout_secs.or(config.detection.timeout_secs) {
                Some(secs) => {
                    orchestrator
                        .run_detection_with_timeout(detection, Duration::from_secs(secs))
                        .await
                }
                None => orchestrator.run_detection(detection).await,
            };
            match outcome {
                DetectionOutcome::Committed { count } => println!("Detected {} symbols", count),
                DetectionOutcome::TimedOut => bail!("Detection timed out"),
                other => println!("Detection ended: {:?}", other),
            }
        }

        Commands::Verify {
            session_id,
            detection_id,
            status,
            class_name,
        } => {
            load(&orchestrator, &session_id).await?;
            if orchestrator
                .verify_detection(&detection_id, status, class_name)
                .await
            {
                println!("{} -> {}", detection_id, status);
            }
        }

        Commands::ApproveAll { session_id } => {
            load(&orchestrator, &session_id).await?;
            let count = orchestrator.approve_all().await;
            println!("Approved {} detections", count);
        }

        Commands::RejectAll { session_id } => {
            load(&orchestrator, &session_id).await?;
            let count = orchestrator.reject_all().await;
            println!("Rejected {} detections", count);
        }

        Commands::AddManual {
            session_id,
            class_name,
            x1,
            y1,
            x2,
            y2,
        } => {
            load(&orchestrator, &session_id).await?;
            if let Some(detection) = orchestrator
                .add_manual_detection(&class_name, BoundingBox::new(x1, y1, x2, y2))
                .await
            {
                println!("Added {} ({})", detection.id, detection.class_name);
            }
        }

        Commands::DeleteDetection {
            session_id,
            detection_id,
        } => {
            load(&orchestrator, &session_id).await?;
            if orchestrator.delete_detection(&detection_id).await {
                println!("Deleted {}", detection_id);
            }
        }

        Commands::Bom {
            session_id,
            local_catalog,
        } => {
            load(&orchestrator, &session_id).await?;
            let bom = match local_catalog {
                Some(path) => {
                    let catalog = PriceCatalog::load(&path)
                        .with_context(|| format!("Failed to load catalog {}", path.display()))?;
                    orchestrator.preview_bom(&catalog).await
                }
                None => orchestrator.generate_bom().await,
            };
            if let Some(bom) = bom {
                print_bom(&bom);
            }
        }

        Commands::ExportUrl { session_id, format } => {
            load(&orchestrator, &session_id).await?;
            if let Some(url) = orchestrator.export_url(format).await {
                println!("{}", url);
            }
        }

        Commands::DeleteSession { session_id } => {
            if orchestrator.delete_session(&session_id).await {
                println!("Deleted session {}", session_id);
            }
        }
    }

    if let Some(message) = orchestrator.state().await.error {
        bail!(message);
    }
    Ok(())
}

async fn load(orchestrator: &SessionOrchestrator<HttpGateway>, session_id: &str) -> Result<()> {
    if !orchestrator.load_session(session_id).await {
        let message = orchestrator
            .state()
            .await
            .error
            .unwrap_or_else(|| format!("Failed to load session {}", session_id));
        bail!(message);
    }
    Ok(())
}

fn print_bom(bom: &BomData) {
    println!("BOM for {} ({} items)", bom.session_id, bom.summary.total_items);
    for item in &bom.items {
        println!(
            "  {:>3}. {:<20} x{:<4} @ {:>10.0} = {:>12.0}",
            item.item_no, item.class_name, item.quantity, item.unit_price, item.total_price
        );
    }
    println!(
        "  subtotal {:.0}  vat {:.0}  total {:.0}",
        bom.summary.subtotal, bom.summary.vat, bom.summary.total
    );
}
