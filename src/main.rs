//! revendis-export CLI
//!
//! Usage:
//!   revendis-export pdf <PNG>...      Export 1x renderings to PDF
//!   revendis-export plan              Print the page plan for a raster size
//!   revendis-export compose           Print the document a print job would write
//!   revendis-export capture           Screenshot an element to PDF (cdp feature)

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use revendis_export::{
    compose_print_document, pdf_exporter, plan_pages, Config, DirectorySink, ExportRequest, PageFormat,
    PngFileCapture, PrintRequest,
};

#[derive(Parser)]
#[command(
    name = "revendis-export",
    about = "Rasterized PDF export and print-document tooling",
    version
)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export PNG renderings of a region to PDF, one document per input
    Pdf {
        /// 1x PNG renderings
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Page format: a4, thermal-80 or thermal-58
        #[arg(short, long, default_value = "a4")]
        format: PageFormat,

        /// Download directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Output file name (single input only)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show how a raster of the given size is laid out on pages
    Plan {
        /// Raster width in pixels
        #[arg(long)]
        width: u32,

        /// Raster height in pixels
        #[arg(long)]
        height: u32,

        #[arg(short, long, default_value = "a4")]
        format: PageFormat,
    },

    /// Print the complete document a print job would write into its frame
    Compose {
        /// File holding the body markup
        html: PathBuf,

        /// File holding general styles
        #[arg(long)]
        styles: Option<PathBuf>,

        /// File holding print-only styles
        #[arg(long)]
        page_style: Option<PathBuf>,
    },

    /// Load a page in headless Chrome and export one element to PDF
    #[cfg(feature = "cdp")]
    Capture {
        /// Page URL
        url: String,

        /// CSS selector of the element to capture
        #[arg(short, long)]
        selector: String,

        #[arg(short, long, default_value = "a4")]
        format: PageFormat,

        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        #[arg(short, long, default_value = "export.pdf")]
        name: String,
    },
}

fn read_optional(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(p) => std::fs::read_to_string(p).with_context(|| format!("failed to read {}", p.display())),
        None => Ok(String::new()),
    }
}

/// `venda-42.png` + thermal-80 -> `venda-42-thermal-80.pdf`
fn default_filename(input: &Path, format: PageFormat) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    format!("{}-{}.pdf", stem, format)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_json_file(path).with_context(|| format!("invalid config {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Pdf {
            inputs,
            format,
            out,
            name,
        } => {
            if name.is_some() && inputs.len() > 1 {
                anyhow::bail!("--name can only be used with a single input");
            }
            let exporter = pdf_exporter(PngFileCapture::new(), DirectorySink::new(&out)).with_config(config.export);
            let requests: Vec<_> = inputs
                .iter()
                .map(|input| {
                    let filename = name.clone().unwrap_or_else(|| default_filename(input, format));
                    ExportRequest::new(input.clone(), filename, format)
                })
                .collect();

            let receipts = futures::future::try_join_all(requests.iter().map(|r| exporter.export(r))).await?;
            info!("exported {} document(s)", receipts.len());
            for receipt in receipts {
                println!(
                    "{} ({}, {} page(s), {} bytes)",
                    out.join(&receipt.filename).display(),
                    receipt.format,
                    receipt.pages,
                    receipt.bytes
                );
            }
        }
        Commands::Plan { width, height, format } => {
            let plan = plan_pages(width, height, format, &config.export.plan_options())?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Compose {
            html,
            styles,
            page_style,
        } => {
            let request = PrintRequest::new(read_optional(Some(&html))?)
                .with_styles(read_optional(styles.as_deref())?)
                .with_page_style(read_optional(page_style.as_deref())?);
            println!("{}", compose_print_document(&request));
        }
        #[cfg(feature = "cdp")]
        Commands::Capture {
            url,
            selector,
            format,
            out,
            name,
        } => {
            use revendis_export::cdp::{CdpCapture, CdpSession};
            use std::sync::Arc;

            let session = tokio::task::spawn_blocking(move || -> revendis_export::Result<CdpSession> {
                let session = CdpSession::launch(1280, 1024)?;
                session.load_url(&url)?;
                Ok(session)
            })
            .await??;
            let exporter =
                pdf_exporter(CdpCapture::new(Arc::new(session)), DirectorySink::new(&out)).with_config(config.export);
            let receipt = exporter.export(&ExportRequest::new(selector, name, format)).await?;
            info!("{} page(s) written to {}", receipt.pages, out.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
