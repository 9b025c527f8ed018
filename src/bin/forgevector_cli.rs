//! ForgeVector CLI - Bridge interface for callers
//!
//! Commands: recipes, validate, enforce, generate
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on pipeline failure, 1 on usage or I/O errors

use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use forgevector_core::{
    extract_document, inject_bidi, markup::ensure_namespace, EngineConfig, ErrorResponse, GeminiBackend,
    GenerateRequest, GenerationError, GenerationOrchestrator, GeometryEnforcer, RecipeCatalog, Validator,
};

#[derive(Parser)]
#[command(name = "forgevector-cli")]
#[command(about = "ForgeVector CLI - Vector Document Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to recipes directory
    #[arg(short, long, default_value = "recipes")]
    recipes_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List available recipes
    Recipes,

    /// Run the quality rules over a document
    Validate {
        /// File holding the document or a full reply, `-` for stdin
        #[arg(short, long, default_value = "-")]
        file: PathBuf,
    },

    /// Run the geometry and BiDi passes over a document
    Enforce {
        /// File holding the document, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        file: PathBuf,

        #[arg(long, default_value_t = 1080)]
        width: u32,

        #[arg(long, default_value_t = 1080)]
        height: u32,
    },

    /// Generate a document through the collaborator
    Generate {
        /// What to draw
        #[arg(short, long)]
        instruction: String,

        /// Recipe category
        #[arg(short, long, default_value = "general")]
        category: String,

        #[arg(long, default_value_t = 1080)]
        width: u32,

        #[arg(long, default_value_t = 1080)]
        height: u32,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Recipes => {
            let catalog = match RecipeCatalog::load_from_dir(&cli.recipes_dir) {
                Ok(c) => c,
                Err(e) => return usage_error(format!("Failed to load recipes: {e}")),
            };
            let recipes: Vec<_> = catalog
                .list()
                .iter()
                .map(|r| serde_json::json!({
                    "id": r.id,
                    "category": r.category,
                    "name": r.name,
                    "engine_min_version": r.engine_min_version,
                }))
                .collect();
            print_json(&recipes);
            ExitCode::SUCCESS
        }

        Commands::Validate { file } => {
            let raw = match read_input(&file) {
                Ok(raw) => raw,
                Err(e) => return usage_error(format!("Failed to read input: {e}")),
            };
            let document = match extract_document(&raw) {
                Ok(d) => d,
                Err(e) => return pipeline_error(&GenerationError::DocumentMissing(e.to_string())),
            };

            let result = Validator::new().check_document(&document, &EngineConfig::default().protocol);
            print_json(&result);
            if result.is_ok() { ExitCode::SUCCESS } else { ExitCode::from(2) }
        }

        Commands::Enforce { file, width, height } => {
            let raw = match read_input(&file) {
                Ok(raw) => raw,
                Err(e) => return usage_error(format!("Failed to read input: {e}")),
            };
            if width == 0 || height == 0 {
                return usage_error("Canvas dimensions must be positive".to_string());
            }
            let document = match extract_document(&raw) {
                Ok(d) => d,
                Err(e) => return pipeline_error(&GenerationError::DocumentMissing(e.to_string())),
            };

            let config = EngineConfig::default();
            let enforcer = GeometryEnforcer::new(&config.protocol, width as f64, height as f64);
            let document = ensure_namespace(&inject_bidi(&enforcer.enforce(&document)));
            print_json(&serde_json::json!({ "document": document }));
            ExitCode::SUCCESS
        }

        Commands::Generate { instruction, category, width, height } => {
            let request = GenerateRequest {
                instruction,
                category,
                canvas_width: width,
                canvas_height: height,
            };
            let config = match EngineConfig::from_env() {
                Ok(c) => Arc::new(c),
                Err(e) => return usage_error(format!("Invalid configuration: {e}")),
            };
            let catalog = match RecipeCatalog::load_from_dir(&cli.recipes_dir) {
                Ok(c) => Arc::new(c),
                Err(e) => return usage_error(format!("Failed to load recipes: {e}")),
            };
            let backend = match GeminiBackend::from_config(&config) {
                Ok(b) => b,
                Err(e) => return pipeline_error(&GenerationError::BackendUnavailable(e.to_string())),
            };

            let orchestrator = GenerationOrchestrator::new(config, catalog, backend);
            match orchestrator.generate(&request) {
                Ok(document) => {
                    print_json(&document);
                    ExitCode::SUCCESS
                }
                Err(e) => pipeline_error(&e),
            }
        }
    }
}

fn read_input(path: &Path) -> std::io::Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}

fn usage_error(message: String) -> ExitCode {
    print_json(&serde_json::json!({ "error": message }));
    ExitCode::FAILURE
}

fn pipeline_error(error: &GenerationError) -> ExitCode {
    print_json(&ErrorResponse::from(error));
    ExitCode::from(2)
}
