//! Headless annotation run: infer every frame of a video and export the
//! result.
//!
//! Usage: `posemark-pipeline <video> <output.json> [--import <seed.json>]`

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use posemark_annotator::{AnnotatorConfig, Workspace};
use posemark_media::{check_ffmpeg, check_ffprobe};

struct Args {
    video: String,
    output: String,
    seed: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut positional = Vec::new();
    let mut seed = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--import" => seed = Some(args.next().context("--import needs a file")?),
            _ => positional.push(arg),
        }
    }

    match <[String; 2]>::try_from(positional) {
        Ok([video, output]) => Ok(Args { video, output, seed }),
        Err(_) => anyhow::bail!("usage: posemark-pipeline <video> <output.json> [--import <seed.json>]"),
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "posemark=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = parse_args()?;
    check_ffmpeg()?;
    check_ffprobe()?;

    let config = AnnotatorConfig::from_env();
    info!(base_url = %config.inference.base_url, "Starting posemark-pipeline");

    let mut workspace = Workspace::from_config(config)?;
    let info = workspace
        .open_video(&args.video)
        .await
        .with_context(|| format!("failed to open {}", args.video))?;
    info!(
        width = info.width,
        height = info.height,
        frame_rate = info.frame_rate,
        "Video ready"
    );

    if let Some(seed) = &args.seed {
        workspace.import_from_file(seed).await?;
    }

    let frames = match workspace.run_inference(&args.video).await {
        Ok(frames) => frames,
        Err(e) => {
            error!(error = %e, "Inference run failed; exporting partial annotations");
            workspace.export_to_file(&args.output).await?;
            return Err(e.into());
        }
    };

    workspace.export_to_file(&args.output).await?;

    let stats = workspace.store().stats();
    info!(
        frames,
        annotated_frames = stats.annotated_frames,
        keypoints = stats.total_keypoints,
        output = %args.output,
        "Pipeline finished"
    );
    Ok(())
}
