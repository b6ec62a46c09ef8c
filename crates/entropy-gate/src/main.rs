use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use entropy_gate::{explain, initialize, AppError, GateConfig, GateState};

/// entropy-gate: import-time entropy budget enforcement
///
/// Packages get exactly the entropy calls their initialization needs,
/// and the functionality seeded from forged entropy is fenced off.
#[derive(Parser, Debug)]
#[command(name = "entropy-gate", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and write it out
    Init,

    /// List the modules with an import context
    Policies {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which import context a module would get
    Explain {
        /// Dotted module name
        module: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the budget counter's address to stderr
    BudgetAddress,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("entropy_gate=debug,entropy_policy=debug,entropy_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("entropy_gate=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<GateConfig, AppError> {
    match path {
        Some(p) => GateConfig::load(p),
        None => {
            let default_path = GateConfig::default_config_path();
            GateConfig::load(&default_path)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let config = load_config(cli.config.as_ref())?;
    let state = initialize(config)?;

    if state.config.diagnostics.export_budget_address {
        state.hook.export_budget_address(&mut std::io::stderr().lock())?;
    }

    match cli.command {
        Commands::Init => cmd_init(cli.config.as_ref(), &state),
        Commands::Policies { json } => cmd_policies(&state, json),
        Commands::Explain { module, json } => cmd_explain(&state, &module, json),
        Commands::BudgetAddress => {
            state.hook.export_budget_address(&mut std::io::stderr().lock())
        }
    }
}

fn cmd_init(config_path: Option<&PathBuf>, state: &GateState) -> Result<(), AppError> {
    let save_path = config_path
        .cloned()
        .unwrap_or_else(GateConfig::default_config_path);
    state.config.save(&save_path)?;
    info!(path = %save_path.display(), "configuration saved");

    println!("entropy-gate configured.");
    println!("  Modules:  {}", state.hook.table().len());
    println!("  Config:   {}", save_path.display());
    Ok(())
}

fn cmd_policies(state: &GateState, json: bool) -> Result<(), AppError> {
    let entries: Vec<_> = state.hook.table().entries().collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in entries {
        let policy = match (entry.custom, entry.rust_family) {
            (Some(kind), _) => kind.as_str(),
            (None, true) => "rust_package",
            (None, false) => "(none)",
        };
        println!("{:<32} {}", entry.module.as_str(), policy);
    }
    Ok(())
}

fn cmd_explain(state: &GateState, module: &str, json: bool) -> Result<(), AppError> {
    let explanation = explain(state.hook.table(), module)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&explanation)?);
        return Ok(());
    }

    match (explanation.policy, explanation.summary) {
        (Some(policy), Some(summary)) => {
            println!("{}: {}", module, policy);
            println!("  {}", summary);
        }
        _ => println!("{}: not listed, imported without an entropy grant", module),
    }
    Ok(())
}
