use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use log::{info, warn};

use cloudmosaic::core::{BrightnessClassifier, CompositePipeline};
use cloudmosaic::io::{discover_captures, save_png, CapturePaths, GdalBandLoader};
use cloudmosaic::CompositeConfig;

#[derive(Parser, Debug)]
#[command(name = "cloudmosaic", version, about = "Progressive cloud-free mosaic of a capture time series")]
struct Args {
    /// TOML run configuration; command-line flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// One capture as `red,green,blue,nir` band paths, in processing order (repeatable)
    #[arg(long = "capture", value_name = "R,G,B,NIR")]
    captures: Vec<String>,

    /// Root of a `<date>/<tile>/<band>/<file>` download tree
    #[arg(long, conflicts_with = "captures", requires_all = ["tile", "start", "end"])]
    base_dir: Option<PathBuf>,

    /// Sentinel-2 tile code, e.g. 31UDQ
    #[arg(long)]
    tile: Option<String>,

    /// First acquisition date (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last acquisition date (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Grid cell size in pixels
    #[arg(long)]
    tile_size: Option<usize>,

    /// Cloud probability above which a pixel counts as cloudy
    #[arg(long)]
    white_threshold: Option<f32>,

    /// Fraction of cloudy pixels above which a tile is rejected
    #[arg(long)]
    min_white_ratio: Option<f32>,

    /// Brightness ramp of the built-in classifier, as `low,high`
    #[arg(long, value_name = "LOW,HIGH", default_value = "0.3,0.6")]
    brightness: String,

    /// Output PNG for the mosaic
    #[arg(long, default_value = "final_image.png")]
    output: PathBuf,

    /// Optional PNG for the cloud probability mask
    #[arg(long)]
    mask_output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let args = Args::parse();
    log::debug!("Parsed command-line args: {:?}", args);

    let config = build_config(&args)?;
    let captures = collect_captures(&args)?;
    if captures.is_empty() {
        bail!("No captures to composite");
    }
    info!("Compositing {} captures", captures.len());

    let classifier = parse_brightness(&args.brightness)?;
    let loader = GdalBandLoader::new(config.normalization)?;
    let pipeline = CompositePipeline::new(&config)?;

    let product = pipeline
        .run(&captures, &loader, &classifier)
        .context("Compositing failed")?;

    info!(
        "Processed {} of {} captures ({:?}); {} tiles resolved, {} unresolved",
        product.captures_processed,
        captures.len(),
        product.termination,
        product.resolved.len(),
        product.unresolved.len()
    );
    if !product.unresolved.is_empty() {
        warn!("Unresolved tiles stay transparent: {:?}", product.unresolved);
    }
    for &capture in &product.contributing_captures {
        info!("Used capture: {}", captures[capture].label());
    }

    save_png(&product.mosaic, &args.output)
        .with_context(|| format!("Failed to save mosaic to {}", args.output.display()))?;
    if let Some(mask_path) = &args.mask_output {
        save_png(&product.cloud_mask, mask_path)
            .with_context(|| format!("Failed to save cloud mask to {}", mask_path.display()))?;
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<CompositeConfig> {
    let mut config = match &args.config {
        Some(path) => CompositeConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CompositeConfig::default(),
    };

    if let Some(tile_size) = args.tile_size {
        config.tile_size = tile_size;
    }
    if let Some(threshold) = args.white_threshold {
        config.filter.white_threshold = threshold;
    }
    if let Some(ratio) = args.min_white_ratio {
        config.filter.min_white_ratio = ratio;
    }
    config.validate()?;
    Ok(config)
}

fn collect_captures(args: &Args) -> Result<Vec<CapturePaths>> {
    if let Some(base_dir) = &args.base_dir {
        let (tile, start, end) = match (&args.tile, args.start, args.end) {
            (Some(tile), Some(start), Some(end)) => (tile, start, end),
            _ => bail!("--base-dir needs --tile, --start and --end"),
        };
        return Ok(discover_captures(base_dir, tile, start, end)?);
    }

    args.captures
        .iter()
        .map(|list| {
            CapturePaths::from_list(list).with_context(|| format!("Invalid --capture '{}'", list))
        })
        .collect()
}

fn parse_brightness(value: &str) -> Result<BrightnessClassifier> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [low, high] = parts.as_slice() else {
        bail!("--brightness expects LOW,HIGH, got '{}'", value);
    };
    let low: f32 = low.parse().with_context(|| format!("Invalid brightness low '{}'", low))?;
    let high: f32 = high.parse().with_context(|| format!("Invalid brightness high '{}'", high))?;
    Ok(BrightnessClassifier::new(low, high)?)
}
