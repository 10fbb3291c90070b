use clap::Parser;
use image::ImageReader;
use std::path::PathBuf;

use nasdet::{LabelTable, Pipeline, PipelineConfig};

#[cfg(feature = "rten")]
const WARM_UP_ROUNDS: usize = 3;

#[derive(Parser)]
#[command(name = "nasdet")]
#[command(about = "Run YOLO-NAS style detection pre/post-processing on an image")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Pipeline configuration (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model file; without it only preprocessing runs
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,

    /// Target size as `W` or `W H`
    #[arg(long, num_args = 1..=2, value_name = "SIZE")]
    imgsz: Option<Vec<u32>>,

    #[arg(long, value_name = "SCORE")]
    score_thresh: Option<f32>,

    #[arg(long, value_name = "IOU")]
    iou_thresh: Option<f32>,

    /// Keep at most this many detections
    #[arg(long, value_name = "K")]
    top_k: Option<usize>,

    /// Class names, one per line (defaults to COCO)
    #[arg(long, value_name = "FILE")]
    labels: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_path(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(size) = &self.imgsz {
            let (width, height) = match size.as_slice() {
                [size] => (*size, *size),
                [width, height] => (*width, *height),
                _ => anyhow::bail!("--imgsz takes one or two values"),
            };
            config.target_width = width;
            config.target_height = height;
        }
        if let Some(score) = self.score_thresh {
            config.score_thresh = score;
        }
        if let Some(iou) = self.iou_thresh {
            config.iou_thresh = iou;
        }
        if self.top_k.is_some() {
            config.top_k = self.top_k;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = args.pipeline_config()?;
    let labels = match &args.labels {
        Some(path) => LabelTable::from_file(path)?,
        None => LabelTable::coco(),
    };

    log::info!("Loading image: {:?}", args.image_path);
    let img = ImageReader::open(&args.image_path)?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
    log::info!("Image loaded: {}x{}", img.width(), img.height());

    let Some(model_path) = &args.model else {
        let pipeline = Pipeline::new(config)?;
        let prepared = pipeline.preprocess(&img)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&prepared.metadata)?);
        } else {
            println!("=== Preprocessing ===");
            println!("Input tensor: {:?}", prepared.tensor.shape());
            for (step, meta) in pipeline.config().steps.iter().zip(prepared.metadata.iter()) {
                println!("  {:<18} {}", step.name(), meta);
            }
        }
        return Ok(());
    };

    let detections = run_model(config, model_path, &img)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&detections)?);
        return Ok(());
    }

    println!("=== Detection Results ===");
    println!("Total detections: {}", detections.detections.len());
    for det in &detections.detections {
        let label = labels.name(det.class_id).unwrap_or("unknown");
        println!(
            "  {} ({}) at ({}, {}) {}x{} - score: {:.2}",
            label, det.class_id, det.rect.x, det.rect.y, det.rect.width, det.rect.height, det.score
        );
    }

    Ok(())
}

#[cfg(feature = "rten")]
fn run_model(
    config: PipelineConfig,
    model_path: &std::path::Path,
    img: &image::DynamicImage,
) -> anyhow::Result<nasdet::FrameDetections> {
    let engine = nasdet::RtenEngine::load(model_path)?;
    let mut detector = nasdet::Detector::new(config, engine)?;
    detector.warm_up(WARM_UP_ROUNDS)?;
    Ok(detector.detect(img)?)
}

#[cfg(not(feature = "rten"))]
fn run_model(
    _config: PipelineConfig,
    model_path: &std::path::Path,
    _img: &image::DynamicImage,
) -> anyhow::Result<nasdet::FrameDetections> {
    anyhow::bail!(
        "cannot run {}: nasdet was built without the `rten` feature",
        model_path.display()
    )
}
