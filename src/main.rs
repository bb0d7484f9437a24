use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};

use mermaid_embed::EngineConfig;
use mermaid_embed::geometry::{Margins, PageSetup, TargetGeometry, compute_target_size};
use mermaid_embed::raster::{Background, RenderFailure, parse_svg_dimensions, rasterize};
use mermaid_embed::store::codec::{DecodeError, decode_block};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("could not read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("--width and --height must be given together")]
    PartialSize,
    #[error("{0}")]
    Render(#[from] RenderFailure),
    #[error("invalid PNG payload: {0}")]
    Payload(#[from] base64::DecodeError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "mermaid-embed", about = "Rasterize diagrams and inspect embedded diagram metadata")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an SVG file to PNG.
    Rasterize(RasterizeArgs),
    /// Print the display size a diagram gets on a page.
    Plan(PlanArgs),
    /// Decode metadata blocks to JSON.
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct RasterizeArgs {
    svg: PathBuf,

    #[arg(long, help = "Display width in points; enables fixed-DPI mode")]
    width: Option<f64>,

    #[arg(long, help = "Display height in points; enables fixed-DPI mode")]
    height: Option<f64>,

    #[arg(long, default_value_t = false, help = "Paint an opaque white background in natural mode")]
    opaque: bool,

    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct PlanArgs {
    #[arg(long)]
    svg: PathBuf,

    #[arg(long, default_value_t = 612.0)]
    page_width: f64,

    #[arg(long, default_value_t = 792.0)]
    page_height: f64,

    #[arg(long, default_value_t = 72.0)]
    margin: f64,
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Rasterize(args) => run_rasterize(args).await,
        Command::Plan(args) => run_plan(&args),
        Command::Inspect(args) => run_inspect(&args),
    }
}

fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read { path: path.to_path_buf(), source })
}

async fn run_rasterize(args: RasterizeArgs) -> Result<(), CliError> {
    let markup = read(&args.svg)?;
    let target = match (args.width, args.height) {
        (Some(width), Some(height)) => Some(TargetGeometry { width, height }),
        (None, None) => None,
        _ => return Err(CliError::PartialSize),
    };
    let background = if args.opaque { Background::OpaqueWhite } else { Background::Transparent };

    let options = EngineConfig::from_env().raster;
    let asset = rasterize(&markup, target, background, &options).await?;
    fs::write(&args.out, asset.png_bytes()?)
        .map_err(|source| CliError::Write { path: args.out.clone(), source })?;

    print_json(&json!({
        "out": args.out.display().to_string(),
        "pixel_width": asset.pixel_width,
        "pixel_height": asset.pixel_height,
        "mode": if target.is_some() { "fixed_dpi" } else { "natural" },
    }))
}

fn run_plan(args: &PlanArgs) -> Result<(), CliError> {
    let markup = read(&args.svg)?;
    let (svg_width, svg_height) = parse_svg_dimensions(&markup).or_default();
    let page = PageSetup { width: args.page_width, height: args.page_height, margins: Margins::uniform(args.margin) };
    let target = compute_target_size(svg_width, svg_height, &page);

    print_json(&json!({
        "svg": { "width": svg_width, "height": svg_height },
        "target": target,
    }))
}

fn run_inspect(args: &InspectArgs) -> Result<(), CliError> {
    let mut blocks = Vec::new();
    let mut skipped = Vec::new();
    for path in &args.files {
        let file = path.display().to_string();
        match decode_block(&read(path)?) {
            Ok(block) => blocks.push(json!({ "file": file, "block": block })),
            Err(err @ DecodeError::Foreign) => {
                tracing::debug!(file = %file, "foreign metadata block");
                skipped.push(json!({ "file": file, "reason": err.to_string() }));
            }
            Err(err @ DecodeError::Malformed(_)) => {
                tracing::warn!(file = %file, error = %err, "corrupt metadata block");
                skipped.push(json!({ "file": file, "reason": err.to_string() }));
            }
        }
    }
    print_json(&json!({ "blocks": blocks, "skipped": skipped }))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
