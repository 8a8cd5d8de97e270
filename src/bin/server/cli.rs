//! CLI mode: run one stage on a local file and print its JSON result.

use crate::config::ModelArgs;
use clap::ValueEnum;
use oar_docserve::pdf::{PageRenderer, PdfRenderer};
use oar_docserve::pipeline::{self, load_det, load_layout, load_order, load_rec};
use oar_docserve::utils::{is_pdf_bytes, load_image_from_bytes};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// The stage to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stage {
    TextDetection,
    Ocr,
    LayoutDetection,
    OrderDetection,
    PageCount,
}

/// Options of the `run` subcommand besides the model paths.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub file: PathBuf,
    pub page: usize,
    pub dpi: u32,
    pub langs: Vec<String>,
    pub visualize: Option<PathBuf>,
}

pub fn run(stage: Stage, models: &ModelArgs, options: &RunOptions) -> CliResult<()> {
    let bytes = std::fs::read(&options.file)?;
    info!("Loaded {} ({} bytes)", options.file.display(), bytes.len());

    match stage {
        Stage::PageCount => print_page_count(&options.file, &bytes),
        _ => run_image_stage(stage, models, options, &bytes),
    }
}

fn print_page_count(path: &Path, bytes: &[u8]) -> CliResult<()> {
    if !is_pdf_bytes(bytes) {
        return Err(format!("{} is not a PDF", path.display()).into());
    }
    let page_count = PdfRenderer::new().page_count(bytes)?;
    println!("{}", serde_json::to_string_pretty(&json!({ "page_count": page_count }))?);
    Ok(())
}

fn run_image_stage(stage: Stage, models: &ModelArgs, options: &RunOptions, bytes: &[u8]) -> CliResult<()> {
    let start = Instant::now();
    let image = if is_pdf_bytes(bytes) {
        info!("Rendering page {} at {} dpi", options.page, options.dpi);
        PdfRenderer::new().get_page_image(bytes, options.page, options.dpi)?
    } else {
        load_image_from_bytes(bytes)?
    };

    let config = models.to_model_config()?;
    let det = load_det(&config)?;
    info!("Processing image ({}x{})...", image.width(), image.height());

    let (rendered, payload) = match stage {
        Stage::TextDetection => {
            let (rendered, result) = pipeline::text_detection(&image, &det)?;
            (rendered, json!({ "detected_text": result }))
        }
        Stage::Ocr => {
            if options.langs.is_empty() {
                return Err("--langs is required for the ocr stage".into());
            }
            let rec = load_rec(&config)?;
            let (rendered, result) = pipeline::ocr(&image, &options.langs, &det, &rec)?;
            (rendered, json!({ "ocr_result": result }))
        }
        Stage::LayoutDetection => {
            let layout = load_layout(&config)?;
            let (rendered, result) = pipeline::layout_detection(&image, &det, &layout)?;
            (rendered, json!({ "layout_result": result }))
        }
        Stage::OrderDetection => {
            let layout = load_layout(&config)?;
            let order = load_order(&config)?;
            let (rendered, result) = pipeline::order_detection(&image, &det, &layout, &order)?;
            (rendered, json!({ "order_result": result }))
        }
        Stage::PageCount => return Err("page-count does not process an image".into()),
    };
    info!("Completed in {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);

    if let Some(path) = &options.visualize {
        save_rendering(&rendered, path)?;
    }
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn save_rendering(image: &image::RgbImage, path: &Path) -> CliResult<()> {
    image.save(path)?;
    info!("Saved visualization to {}", path.display());
    Ok(())
}
