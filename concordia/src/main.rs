use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};

use concordia::{CacheOutcome, Pipeline, Registrator};

const CACHE_DIR: &str = "aligned_images";
const OUTPUT_DIR: &str = "output";
const LONG_EXPOSURE_FILE: &str = "naive_blurred.png";

struct Args {
    image_dir: PathBuf,
    scale: f64,
    from_cache: bool,
}

fn parse_args() -> Result<Args> {
    let mut image_dir = None;
    let mut scale = None;
    let mut from_cache = false;

    for arg in std::env::args().skip(1) {
        if arg == "--from-cache" {
            from_cache = true;
        } else if image_dir.is_none() {
            image_dir = Some(PathBuf::from(arg));
        } else if scale.is_none() {
            let value: f64 = arg
                .parse()
                .with_context(|| format!("Invalid scale '{}'", arg))?;
            if !(value.is_finite() && value > 0.0) {
                bail!("Scale must be positive, got {}", value);
            }
            scale = Some(value);
        } else {
            bail!("Unexpected argument '{}'", arg);
        }
    }

    let Some(image_dir) = image_dir else {
        bail!("Usage: concordia <image_dir> [scale] [--from-cache]");
    };
    Ok(Args {
        image_dir,
        scale: scale.unwrap_or(1.0),
        from_cache,
    })
}

fn main() -> Result<()> {
    common::log_setup::setup_logging("info", Some(Path::new("logs")));
    let args = parse_args()?;
    let start = Instant::now();

    let images = concordia::read_all(&args.image_dir, args.scale);
    let input_frames = images.len();

    let cache_dir = args.image_dir.join(CACHE_DIR);
    let pipeline = Pipeline::<Registrator>::default();
    let resolution = pipeline
        .resolve(images, args.from_cache, Some(&cache_dir))
        .with_context(|| format!("Failed to align images from '{}'", args.image_dir.display()))?;

    let Some(blurred) = concordia::mean_stack(&resolution.images) else {
        tracing::warn!(image_dir = %args.image_dir.display(), "No images to stack");
        return Ok(());
    };

    let output_dir = args.image_dir.join(OUTPUT_DIR);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create '{}'", output_dir.display()))?;
    let output_path = output_dir.join(LONG_EXPOSURE_FILE);
    concordia::write_image(&output_path, &blurred)?;

    let aligned = resolution
        .reports
        .iter()
        .filter(|r| matches!(r.status, concordia::FrameStatus::Aligned))
        .count();
    tracing::info!(
        input_frames,
        output_frames = resolution.images.len(),
        aligned,
        from_cache = (resolution.outcome == CacheOutcome::Hit),
        output = %output_path.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Done"
    );
    Ok(())
}
