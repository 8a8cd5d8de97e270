//! oar-docserve server and CLI
//!
//! # Usage
//!
//! ## Server Mode
//! ```bash
//! oar-docserve serve --det-model models/det.onnx --rec-model models/rec.onnx \
//!     --dict-path models/dict.txt --layout-model models/layout.onnx \
//!     --order-model models/order.onnx --port 8000
//! ```
//!
//! ## CLI Mode
//! ```bash
//! oar-docserve run ocr --file page.png --langs en,de <model flags>
//! oar-docserve run order-detection --file paper.pdf --page 2 --visualize order.png <model flags>
//! ```

mod cli;
mod config;

use clap::{Parser, Subcommand};
use cli::{RunOptions, Stage};
use config::ModelArgs;
use oar_docserve::pdf::{DEFAULT_DPI, DEFAULT_MAX_DIMENSION, PdfRenderer};
use oar_docserve::pipeline::load_models;
use oar_docserve::server::{AppState, ServerConfig, run_server};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "oar-docserve")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Text detection, OCR, layout and reading order via CLI or HTTP server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[command(flatten)]
        models: ModelArgs,

        /// Port to listen on
        #[arg(long, short, default_value = "8000", env = "OAR_PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0", env = "OAR_HOST")]
        host: String,

        /// Largest accepted upload, in megabytes
        #[arg(long = "max-upload-mb", default_value_t = 50, env = "OAR_MAX_UPLOAD_MB")]
        max_upload_mb: usize,

        /// Longest side of a rendered PDF page, in pixels
        #[arg(long = "max-page-px", default_value_t = DEFAULT_MAX_DIMENSION, env = "OAR_MAX_PAGE_PX")]
        max_page_px: u32,
    },
    /// Run one stage on a local image or PDF and print the JSON result
    Run {
        /// Stage to run
        #[arg(value_enum)]
        stage: Stage,

        /// Local image or PDF
        #[arg(long)]
        file: PathBuf,

        /// 1-based PDF page
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// PDF rendering resolution
        #[arg(long, default_value_t = DEFAULT_DPI)]
        dpi: u32,

        /// Languages for the ocr stage (codes or names, comma-separated)
        #[arg(long, value_delimiter = ',')]
        langs: Vec<String>,

        /// Save the annotated image here
        #[arg(long)]
        visualize: Option<PathBuf>,

        #[command(flatten)]
        models: ModelArgs,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    oar_docserve::utils::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            models,
            port,
            host,
            max_upload_mb,
            max_page_px,
        } => {
            let model_config = models.to_model_config()?;
            info!("Loading models...");
            let registry = tokio::task::spawn_blocking(move || load_models(&model_config)).await??;

            let renderer = PdfRenderer::new().with_max_dimension(max_page_px);
            let state = Arc::new(AppState::new(registry, Arc::new(renderer)));
            let config = ServerConfig {
                host,
                port,
                max_upload_mb,
            };
            info!("Starting server on {}:{}", config.host, config.port);
            run_server(state, &config).await?;
        }
        Commands::Run {
            stage,
            file,
            page,
            dpi,
            langs,
            visualize,
            models,
        } => {
            let options = RunOptions {
                file,
                page,
                dpi,
                langs,
                visualize,
            };
            tokio::task::spawn_blocking(move || cli::run(stage, &models, &options)).await??;
        }
    }

    Ok(())
}
