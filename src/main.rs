use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use pdf_region_translator::{Config, PdfDocument, prepare, server};

#[derive(Parser, Debug)]
#[command(
    name = "pdf-region-translator",
    version,
    about = "Translate fixed regions of templated PDFs and draw the result in place"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<String>,

    /// Region template (TOML or JSON)
    #[arg(long = "regions", global = true)]
    regions: Option<String>,

    /// TrueType/OpenType font used for replacement text
    #[arg(long = "font", global = true)]
    font: Option<String>,

    /// API key (overrides settings and OPENAI_API_KEY)
    #[arg(short = 'k', long = "key", global = true)]
    key: Option<String>,

    /// Model name for the translation endpoint
    #[arg(short = 'm', long = "model", global = true)]
    model: Option<String>,

    /// Source language of the document
    #[arg(short = 'L', long = "source-lang", global = true)]
    source_lang: Option<String>,

    /// Target language
    #[arg(short = 'l', long = "lang", global = true)]
    target_lang: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show page count and encryption state
    Info { input: PathBuf },
    /// Print the text found in every region of every page
    Extract { input: PathBuf },
    /// Extract and translate every region without touching the document
    Translate { input: PathBuf },
    /// Write a copy of the document with every region translated
    Render {
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Run the HTTP service
    Serve {
        /// Listen address (default from settings [server] addr)
        #[arg(long = "addr")]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    pdf_region_translator::logging::init(cli.verbose)?;
    let config = Config {
        settings_path: cli.read_settings.clone(),
        regions_path: cli.regions.clone(),
        font_path: cli.font.clone(),
        key: cli.key.clone(),
        model: cli.model.clone(),
        source_lang: cli.source_lang.clone(),
        target_lang: cli.target_lang.clone(),
    };

    match cli.command {
        Command::Info { input } => print_json(&PdfDocument::open(&input)?.info()),
        Command::Extract { input } => {
            let runtime = prepare(&config)?;
            print_json(&runtime.pipeline.extract(&input)?)
        }
        Command::Translate { input } => {
            let runtime = prepare(&config)?;
            print_json(&runtime.pipeline.translate(&input).await?)
        }
        Command::Render { input, output } => {
            let runtime = prepare(&config)?;
            let report = runtime.pipeline.render(&input, &output).await?;
            print_json(&report)
        }
        Command::Serve { addr } => {
            let runtime = prepare(&config)?;
            let addr = addr.unwrap_or_else(|| runtime.settings.server_addr.clone());
            let work_dir = server::resolve_work_dir(&runtime.settings);
            server::run_server(runtime.pipeline, work_dir, addr).await
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).with_context(|| "failed to encode output")?;
    println!("{}", output);
    Ok(())
}
