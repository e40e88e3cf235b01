use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use psyche_agents::AgentCatalog;
use psyche_core::config::AppConfig;
use psyche_core::types::Payload;
use psyche_workflow::{ChainBuilder, ChainFormat, MemorySessionStore, SessionTurnRunner, WorkflowEngine};

#[derive(Parser)]
#[command(name = "psyche", version, about = "Multi-agent personality assessment pipelines")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "psyche.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a chain and print the execution record as JSON
    Run {
        /// Chain definition (.toml or .json)
        chain: PathBuf,
        /// Text to assess; becomes the `text` input field
        #[arg(long, conflicts_with = "input")]
        text: Option<String>,
        /// Full input payload as a JSON object
        #[arg(long)]
        input: Option<String>,
        /// User the execution is attributed to
        #[arg(long)]
        user: Option<String>,
        /// Whole-execution deadline in seconds (default: engine config)
        #[arg(long)]
        timeout: Option<f64>,
        /// Run as a turn of this session
        #[arg(long)]
        session: Option<String>,
    },
    /// Validate a chain definition
    Validate {
        chain: PathBuf,
    },
    /// Print a readable summary of a chain
    Show {
        chain: PathBuf,
    },
    /// Re-export a chain in another format
    Convert {
        chain: PathBuf,
        /// Target format: json or toml
        #[arg(long)]
        to: ChainFormat,
    },
    /// List built-in agent classes and their capabilities
    Agents,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "psyche", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let catalog = AgentCatalog::with_config(&config.agents);

    match cli.command {
        Commands::Run {
            chain,
            text,
            input,
            user,
            timeout,
            session,
        } => {
            let (builder, chain_id) = load_chain(&config, &catalog, &chain)?;
            let input = build_input(text, input)?;
            let timeout = timeout.map(parse_timeout).transpose()?;
            let engine = Arc::new(WorkflowEngine::new(
                Arc::new(RwLock::new(builder)),
                config.engine.clone(),
            ));

            let output = match session {
                Some(session_id) => {
                    let runner =
                        SessionTurnRunner::new(engine, Arc::new(MemorySessionStore::new()));
                    let outcome = runner
                        .run_turn(&session_id, &chain_id, input, user.as_deref(), timeout)
                        .await?;
                    serde_json::json!({
                        "execution": outcome.execution,
                        "session": outcome.state,
                    })
                }
                None => {
                    let execution = engine
                        .execute_chain(&chain_id, input, user.as_deref(), timeout)
                        .await?;
                    serde_json::to_value(&execution)?
                }
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Validate { chain } => {
            let (builder, chain_id) = load_chain(&config, &catalog, &chain)?;
            let (valid, errors) = builder.validate_chain(&chain_id);
            if !valid {
                for e in &errors {
                    println!("  - {}", e);
                }
                bail!("chain '{}' is invalid ({} errors)", chain_id, errors.len());
            }
            println!("Chain '{}' is valid.", chain_id);
        }
        Commands::Show { chain } => {
            let (builder, chain_id) = load_chain(&config, &catalog, &chain)?;
            print!("{}", builder.visualize_chain(&chain_id)?);
        }
        Commands::Convert { chain, to } => {
            let (builder, chain_id) = load_chain(&config, &catalog, &chain)?;
            println!("{}", builder.export_chain(&chain_id, to)?);
        }
        Commands::Agents => {
            for class in catalog.classes() {
                println!("{}: {}", class, catalog.description(class).unwrap_or_default());
                for cap in catalog.capabilities(class)? {
                    println!("  - {}: {}", cap.name, cap.description);
                }
            }
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

/// Load the config file, or defaults when the default path does not exist.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if path != Path::new("psyche.toml") {
        bail!("config file not found: {}", path.display());
    }
    Ok(AppConfig::default())
}

/// Import a chain file into a builder that knows every catalog class.
fn load_chain(
    config: &AppConfig,
    catalog: &AgentCatalog,
    path: &Path,
) -> anyhow::Result<(ChainBuilder, String)> {
    let path = config.resolve_chain_path(path);
    let format = ChainFormat::from_path(&path)
        .with_context(|| format!("cannot tell chain format of {}", path.display()))?;
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut builder = ChainBuilder::new();
    catalog.register_into(&mut builder);
    let chain_id = builder.import_chain(&data, format)?;
    info!(chain_id = %chain_id, path = %path.display(), "Chain loaded");
    Ok((builder, chain_id))
}

/// Seconds from `--timeout`; negative, NaN and overflowing values are rejected.
fn parse_timeout(secs: f64) -> anyhow::Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(timeout) => Ok(timeout),
        Err(e) => bail!("invalid --timeout {}: {}", secs, e),
    }
}

fn build_input(text: Option<String>, input: Option<String>) -> anyhow::Result<Payload> {
    match (text, input) {
        (Some(text), _) => Ok(Payload::from([("text".to_string(), serde_json::json!(text))])),
        (None, Some(raw)) => {
            serde_json::from_str(&raw).context("--input must be a JSON object")
        }
        (None, None) => {
            warn!("No --text or --input given; running with an empty payload");
            Ok(Payload::new())
        }
    }
}
