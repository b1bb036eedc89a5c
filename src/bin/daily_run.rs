//! Daily risk and portfolio run.
//!
//! Reads one JSON snapshot of signals, regime, positions and return history,
//! runs aggregation, risk, optimization and the rebalance gate, and writes
//! the immutable output as JSON.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use macro_risk_core::infra::{init_logging, LogFormat};
use macro_risk_core::risk::stress::ScenarioCatalog;
use macro_risk_core::{DailyInputs, DailyRun, DailyRunOutput, EngineConfig};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser)]
#[command(name = "daily_run")]
#[command(version, about = "Macro book signal, risk and portfolio run", long_about = None)]
struct Cli {
    /// Path to config file (defaults apply when missing)
    #[arg(short, long, default_value = "risk_core.toml", env = "RISK_CORE_CONFIG")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output format (pretty, json, compact)
    #[arg(long)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one as-of date from a JSON snapshot
    Run {
        /// Input snapshot
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate a sample config file
    GenerateConfig {
        /// Output file path
        #[arg(short, long, default_value = "risk_core.toml")]
        output: PathBuf,
    },
    /// Validate config without running
    ValidateConfig,
    /// Print the historical stress scenario catalog
    Scenarios,
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::GenerateConfig { output } => generate_sample_config(output),
        Commands::ValidateConfig => {
            let config = load_config(&cli.config)?;
            println!("Configuration is valid:\n{}", config.to_toml_string()?);
            Ok(())
        }
        Commands::Scenarios => print_scenarios(),
        Commands::Run { input, output } => {
            let mut config = load_config(&cli.config)?;
            if let Some(format) = cli.log_format {
                config.logging.stdout_format = format;
            }
            let _guards = init_logging(&config.logging, cli.log_level.as_deref())?;
            run(config, input, output.as_deref())
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn run(config: EngineConfig, input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(input)
        .map_err(|e| format!("failed to read {}: {}", input.display(), e))?;
    let inputs: DailyInputs = serde_json::from_str(&content)?;
    info!(
        input = %input.display(),
        signals = inputs.signals.len(),
        positions = inputs.positions.positions.len(),
        "Loaded daily snapshot"
    );

    let engine = DailyRun::new(config)?;
    let out = engine.run(&inputs)?;
    print_summary(&out);

    let json = serde_json::to_string_pretty(&out)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            eprintln!("Output written to: {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(EngineConfig::load(path)?)
    } else {
        eprintln!("Config file {} not found, using defaults", path.display());
        Ok(EngineConfig::default())
    }
}

fn generate_sample_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let content = EngineConfig::default().to_toml_string()?;
    let with_comments = format!(
        r#"# Macro risk core configuration
# See: daily_run --help
#
# Every section is optional; omitted keys keep their defaults.

{}"#,
        content
    );
    std::fs::write(path, with_comments)?;
    println!("Sample config written to: {}", path.display());
    Ok(())
}

fn print_scenarios() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = ScenarioCatalog::historical();
    for scenario in &catalog.scenarios {
        println!("{} | {} | {}", scenario.id, scenario.name, scenario.episode);
        for (instrument, shock) in &scenario.instrument_shocks {
            println!("    {:<10} {:>+8.2}%", instrument, shock * 100.0);
        }
        for (class, shock) in &scenario.asset_class_shocks {
            println!("    [{}] {:>+8.2}%", class, shock * 100.0);
        }
    }
    Ok(())
}

/// Short human-readable digest on stderr; the JSON stays machine-only.
fn print_summary(out: &DailyRunOutput) {
    eprintln!();
    eprintln!("As of {}  status {}", out.as_of.date_naive(), out.risk.status);
    if let Some(regime) = &out.regime {
        let (dominant, p) = regime.dominant();
        eprintln!("Regime   {} ({:.0}%), clarity {:.2}", dominant, p * 100.0, regime.clarity());
    }
    for v in &out.risk.var {
        eprintln!(
            "VaR      {:<12} {:>14.0}  CVaR {:>14.0}",
            v.method.to_string(),
            v.var,
            v.cvar
        );
    }
    eprintln!("{}", out.summary);
    match out.optimization.result() {
        Some(result) => eprintln!(
            "Targets  {} instruments, gross {:.2}x, vol {:.2}%",
            result.targets.len(),
            result.gross_leverage,
            result.expected_volatility * 100.0
        ),
        None => eprintln!("Targets  none (optimizer did not converge)"),
    }
    if let Some(decision) = &out.rebalance {
        eprintln!(
            "Rebalance {} ({} trades, turnover {:.0})",
            decision.reason,
            decision.trades.len(),
            decision.turnover()
        );
    }
    for warning in &out.warnings {
        eprintln!("warning: {}", warning);
    }
    eprintln!();
}
