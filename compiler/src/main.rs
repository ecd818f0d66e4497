use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use patchc::error::{PatchError, PatchResult};
use patchc::pipeline::{compile, CompileOptions, CompileResult};
use patchc::registry::Registry;

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    /// Diagnostics as JSON
    Diagnostics,
    /// The patch after default-source materialization, as JSON
    Materialized,
    /// Block evaluation order, one id per line
    Order,
    /// Graphviz DOT of the materialized patch
    Dot,
    /// Provenance hashes as JSON
    BuildInfo,
}

#[derive(Parser, Debug)]
#[command(
    name = "patchc",
    version,
    about = "Patch compiler — validates, materializes and orders node-based animation patches"
)]
struct Cli {
    /// Input patch document (.json)
    patch: PathBuf,

    /// Block registry document (repeatable)
    #[arg(short = 'r', long = "registry")]
    registry: Vec<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Diagnostics)]
    emit: EmitStage,

    /// Write the output here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip default-source materialization
    #[arg(long)]
    no_materialize: bool,

    /// Treat warnings as errors
    #[arg(long)]
    deny_warnings: bool,

    /// Log compiler passes and timing
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "patchc=debug" } else { "patchc=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn render(stage: &EmitStage, result: &CompileResult) -> PatchResult<String> {
    Ok(match stage {
        EmitStage::Diagnostics => {
            let mut json = serde_json::to_string_pretty(&result.diagnostics)
                .map_err(|e| PatchError::json("diagnostics", e))?;
            json.push('\n');
            json
        }
        EmitStage::Materialized => {
            let mut json = serde_json::to_string_pretty(&result.patch)
                .map_err(|e| PatchError::json("materialized patch", e))?;
            json.push('\n');
            json
        }
        EmitStage::Order => result
            .order
            .iter()
            .map(|id| format!("{id}\n"))
            .collect(),
        EmitStage::Dot => patchc::dot::emit_dot(&result.patch),
        EmitStage::BuildInfo => result
            .provenance
            .as_ref()
            .ok_or(PatchError::ProvenanceUnavailable)?
            .to_json()?,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tracing::debug!(patch = %cli.patch.display(), emit = ?cli.emit, "starting");

    // ── Load block registry ──
    let mut registry = Registry::with_default_providers();
    for path in &cli.registry {
        match registry.load_json(path) {
            Ok(n) => tracing::debug!(count = n, path = %path.display(), "loaded block definitions"),
            Err(e) => {
                eprintln!("patchc: error: {}", e);
                return ExitCode::from(2);
            }
        }
    }
    tracing::debug!(definitions = registry.len(), "registry ready");

    // ── Load patch ──
    let patch = match patchc::patch::Patch::load(&cli.patch) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("patchc: error: {}", e);
            return ExitCode::from(2);
        }
    };

    // ── Compile ──
    let options = CompileOptions {
        materialize: !cli.no_materialize,
        deny_warnings: cli.deny_warnings,
    };
    let result = compile(&patch, &registry, &options);
    for diag in &result.diagnostics {
        eprintln!("patchc: {}", diag);
    }

    let text = match render(&cli.emit, &result) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("patchc: error: {}", e);
            return ExitCode::from(2);
        }
    };
    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("patchc: error: {}: {}", path.display(), e);
                return ExitCode::from(2);
            }
        }
        None => print!("{text}"),
    }

    if result.has_error() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
