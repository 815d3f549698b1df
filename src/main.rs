use anyhow::{Context, bail};
use clap::Parser;
use dotenvy::dotenv;
use gif_dropzone::infrastructure::service::setup_service;
use gif_dropzone::services::picker::{FilePicker, PathPicker};
use gif_dropzone::{ArtifactStore, DragEvent, DragPhase, Surface, UploadWidget, WidgetConfig};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Convert a video clip to an animated GIF through the drop-zone widget.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Video file(s) to hand to the widget; exactly one is converted
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Where to write the GIF
    #[arg(short, long, default_value = "output.gif")]
    output: PathBuf,

    /// ffmpeg binary (overrides FFMPEG_PATH)
    #[arg(long)]
    ffmpeg: Option<String>,

    /// Conversion service: "ffmpeg" or "noop" (overrides CONVERSION_SERVICE)
    #[arg(long)]
    service: Option<String>,

    /// Deliver the files as a drag-and-drop gesture instead of a browse selection
    #[arg(long)]
    drop: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gif_dropzone=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = WidgetConfig::from_env();
    if let Some(ffmpeg) = args.ffmpeg {
        config.ffmpeg_path = ffmpeg;
    }
    if let Some(service) = args.service {
        config.conversion_service = service;
    }
    info!("🚀 Accepting {}", config.accept_string());

    let service = setup_service(&config);
    let artifacts = ArtifactStore::new();
    let widget = UploadWidget::new(config, service, artifacts.clone());

    let surface = Surface::new("dropzone");
    widget.bind(&surface);
    info!("💬 {}", widget.message());

    let picker = PathPicker::new(args.files);
    if args.drop {
        let files = picker.pick(&widget.config().accept_string(), true).await?;
        surface.dispatch(&mut DragEvent::new(DragPhase::DragEnter, files.clone()));
        info!("💬 {}", widget.message());
        surface.dispatch(&mut DragEvent::new(DragPhase::Drop, files));
    } else if let Err(e) = widget.browse(&picker).await {
        warn!("{}", e);
    }
    info!("💬 {}", widget.message());

    if !widget.can_convert() {
        bail!("nothing to convert: {}", widget.message());
    }

    let mut progress = widget.subscribe_progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            if let Some(percent) = *progress.borrow() {
                info!("⏳ convert ({}%)", percent);
            }
        }
    });

    let result = widget.convert().await;
    reporter.abort();
    let artifact = result?;

    let object = artifacts
        .resolve(&artifact.url)
        .context("converted artifact is no longer available")?;
    tokio::fs::write(&args.output, &object.data)
        .await
        .with_context(|| format!("failed to write {:?}", args.output))?;

    info!(
        "💾 Wrote {} ({} bytes, {})",
        args.output.display(),
        artifact.size,
        artifact.mime_type
    );
    Ok(())
}
