use anyhow::Context;
use clap::{Parser, Subcommand};
use ferrotex_bundle::paths::escapes_root;
use ferrotex_bundle::{
    BundleConfig, BundleError, BundleService, Document, ErrorKind, FsBlobStore,
    MemoryDocumentStore,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

const EXIT_VALIDATION: u8 = 2;
const EXIT_NOT_FOUND: u8 = 3;

#[derive(Parser)]
#[command(name = "ferrotex")]
#[command(about = "FerroTeX bundle tools", long_about = None)]
struct Cli {
    /// Directory acting as the blob store; each bucket is a sub-directory
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    root: PathBuf,

    /// JSON bundle configuration
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the flattened LaTeX source of a document
    Flatten {
        /// Path to the document JSON
        #[arg(value_name = "DOC")]
        document: PathBuf,
    },
    /// Print the synthesized references section as JSON IR
    References {
        #[arg(value_name = "DOC")]
        document: PathBuf,
    },
    /// Write the compile package of a document into a directory
    Package {
        #[arg(value_name = "DOC")]
        document: PathBuf,
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
    },
    /// Resolve a requested path against the document's manifest
    Resolve {
        #[arg(value_name = "DOC")]
        document: PathBuf,
        #[arg(value_name = "PATH")]
        path: String,
        /// Also download the resolved file to this location
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

impl Commands {
    fn document(&self) -> &Path {
        match self {
            Self::Flatten { document }
            | Self::References { document }
            | Self::Package { document, .. }
            | Self::Resolve { document, .. } => document,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<BundleError>() {
            Some(bundle_err) => report(bundle_err),
            None => {
                eprintln!("Error: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn report(err: &BundleError) -> ExitCode {
    match err.kind() {
        ErrorKind::Validation => {
            let mut payload = serde_json::json!({ "error": err.to_string() });
            if let Some(missing) = err.missing_assets() {
                payload["missing"] = serde_json::json!(missing);
            }
            println!("{payload:#}");
            ExitCode::from(EXIT_VALIDATION)
        }
        ErrorKind::NotFound => {
            eprintln!("Error: {err}");
            ExitCode::from(EXIT_NOT_FOUND)
        }
        ErrorKind::Internal => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => BundleConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => BundleConfig::default(),
    };

    let document = load_document(cli.command.document())?;
    let doc_id = document.id.clone();
    let documents: MemoryDocumentStore = [document].into_iter().collect();
    let service = BundleService::with_config(
        Arc::new(FsBlobStore::new(&cli.root)),
        Arc::new(documents),
        config,
    );

    match &cli.command {
        Commands::Flatten { .. } => {
            print!("{}", service.merged_source(&doc_id)?);
        }
        Commands::References { .. } => {
            let ir = service.reference_section(&doc_id)?.map(|s| s.to_ir());
            println!("{}", serde_json::to_string_pretty(&ir)?);
        }
        Commands::Package { out, .. } => {
            let package = service.build_package(&doc_id)?;
            fs::create_dir_all(out)?;
            fs::write(out.join("main.tex"), &package.main_source)?;
            for file in &package.files {
                let rel_path = file.rel_path.trim_start_matches('/');
                if escapes_root(rel_path) {
                    anyhow::bail!("refusing to write outside {}: {}", out.display(), file.rel_path);
                }
                let target = out.join(rel_path);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&target, &file.bytes)?;
            }
            log::info!("Wrote {} file(s) to {}", package.files.len() + 1, out.display());
        }
        Commands::Resolve { path, output, .. } => {
            let resolved = match output {
                Some(target) => {
                    let (resolved, bytes) = service.read_file(&doc_id, path)?;
                    fs::write(target, bytes)?;
                    resolved
                }
                None => service.resolve_file(&doc_id, path)?,
            };
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
    }
    Ok(())
}

fn load_document(path: &Path) -> anyhow::Result<Document> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read document {}", path.display()))?;
    let document: Document = serde_json::from_str(&content)
        .with_context(|| format!("invalid document JSON in {}", path.display()))?;
    Ok(document)
}
