//! Personalizer CLI - Bridge interface for storefront and editor tooling
//!
//! Commands: validate, resolve, bindings, render-key
//! Outputs JSON to stdout
//! Returns 2 when templates or bindings are rejected, 1 on any other failure

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use personalizer_core::{
    discover_bindings, load_json_file, BindingSources, PipelineError, RenderPipeline,
};

#[derive(Parser)]
#[command(name = "personalizer-cli")]
#[command(version, about = "Personalizer CLI - template validation and render keys")]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a design/effects template pair
    Validate {
        #[command(flatten)]
        templates: TemplateArgs,
    },

    /// Resolve bindings and print the render model
    Resolve {
        #[command(flatten)]
        templates: TemplateArgs,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// List the binding placeholders a template declares
    Bindings {
        /// Design template (JSON)
        #[arg(short, long)]
        design: PathBuf,

        /// Effects template (JSON)
        #[arg(short, long)]
        effects: Option<PathBuf>,
    },

    /// Resolve bindings and print the render key of every scene
    RenderKey {
        #[command(flatten)]
        templates: TemplateArgs,

        #[command(flatten)]
        sources: SourceArgs,

        /// Asset content hashes: JSON object of asset id to hash
        #[arg(long)]
        asset_hashes: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct TemplateArgs {
    /// Design template (JSON)
    #[arg(short, long)]
    design: PathBuf,

    /// Effects template (JSON)
    #[arg(short, long)]
    effects: PathBuf,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// Customer inputs (JSON object)
    #[arg(short, long)]
    inputs: Option<PathBuf>,

    /// Uploaded asset references (JSON object)
    #[arg(short, long)]
    uploads: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("{0} must contain a JSON object")]
    NotAnObject(String),

    #[error("{0} must map asset ids to hash strings")]
    BadAssetHashes(String),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: logging already initialized");
    }

    match run(cli.command) {
        Ok(code) => code,
        Err(CliError::Pipeline(e)) if e.diagnostics().is_some() => {
            let output = serde_json::json!({
                "success": false,
                "error": e.to_string(),
                "diagnostics": e.diagnostics(),
            });
            match print_json(&output) {
                Ok(()) => ExitCode::from(2),
                Err(_) => ExitCode::FAILURE,
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            let output = serde_json::json!({"success": false, "error": e.to_string()});
            // Best effort; the exit code already tells the caller.
            let _ = print_json(&output);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, CliError> {
    let pipeline = RenderPipeline::new();

    match command {
        Commands::Validate { templates } => {
            let (design, effects) = templates.load()?;
            let report = pipeline.report(&design, &effects);
            print_json(&report)?;
            Ok(if report.valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2) // Validation failure
            })
        }

        Commands::Resolve { templates, sources } => {
            let (design, effects) = templates.load()?;
            let model = pipeline.resolve(&design, &effects, &sources.load()?)?;
            print_json(&serde_json::json!({"success": true, "model": model}))?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Bindings { design, effects } => {
            let mut fields = discover_bindings(&load_json_file(&design)?, "design");
            if let Some(path) = effects {
                fields.extend(discover_bindings(&load_json_file(&path)?, "effects"));
            }
            print_json(&fields)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::RenderKey {
            templates,
            sources,
            asset_hashes,
        } => {
            let (design, effects) = templates.load()?;
            let hashes = match asset_hashes {
                Some(path) => load_asset_hashes(&path)?,
                None => BTreeMap::new(),
            };
            let (_, plan) = pipeline.render_plan(&design, &effects, &sources.load()?, &hashes)?;
            print_json(&plan)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

impl TemplateArgs {
    fn load(&self) -> Result<(Value, Value), CliError> {
        Ok((load_json_file(&self.design)?, load_json_file(&self.effects)?))
    }
}

impl SourceArgs {
    fn load(&self) -> Result<BindingSources, CliError> {
        Ok(BindingSources::new(
            load_object(self.inputs.as_deref())?,
            load_object(self.uploads.as_deref())?,
        ))
    }
}

fn load_object(path: Option<&Path>) -> Result<Map<String, Value>, CliError> {
    let Some(path) = path else {
        return Ok(Map::new());
    };
    match load_json_file(path)? {
        Value::Object(map) => Ok(map),
        _ => Err(CliError::NotAnObject(path.display().to_string())),
    }
}

fn load_asset_hashes(path: &Path) -> Result<BTreeMap<String, String>, CliError> {
    let raw = load_json_file(path)?;
    serde_json::from_value(raw).map_err(|_| CliError::BadAssetHashes(path.display().to_string()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
