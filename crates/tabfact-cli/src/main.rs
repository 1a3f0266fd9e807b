//! tabfact CLI - check claims against tables with a streaming reasoning model.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `check` | Run a live fact check against the configured backend |
//! | `replay` | Run a captured NDJSON stream through the session driver |
//! | `extract` | Extract a verdict from a finished answer |
//! | `split` | Split a complete response into reasoning and answer |
//! | `table` | Render a delimited table |
//! | `markers` | List the thinking markers per model |
//! | `backends` | List the registered inference backends |

mod render;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::*;
use futures::StreamExt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tabfact_core::{
    check_response, extract_verdict_with_source, split_reasoning, MarkerPair, Table,
};
use tabfact_runtime::{
    run_session, BackendRegistry, ByteStream, CancellationToken, FactChecker, NullObserver,
    ProviderError, RunOutcome, RuntimeConfig, SessionObserver,
};
use tracing_subscriber::EnvFilter;

use render::{render_report, render_table, TerminalObserver};

/// Exit code for a run aborted with Ctrl-C.
const EXIT_ABORTED: u8 = 130;

/// Replayed files are fed to the session in reads of this size.
const REPLAY_CHUNK: usize = 4096;

/// tabfact - live table fact checking
#[derive(Parser)]
#[command(name = "tabfact", version)]
#[command(about = "Check claims against tables with a streaming reasoning model", long_about = None)]
struct Cli {
    /// Runtime config file (YAML)
    #[arg(long, global = true, env = "TABFACT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a live fact check. Ctrl-C aborts the run.
    Check {
        /// Table file, `#` or `,` delimited, header row first
        #[arg(long, value_name = "FILE")]
        table: PathBuf,

        /// Claim to check
        #[arg(long)]
        claim: String,

        /// Model identifier (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Table title shown to the model
        #[arg(long)]
        title: Option<String>,

        /// Enable the deep-thinking system prompt (cogito)
        #[arg(long)]
        thinking: bool,

        /// Hide reasoning while streaming
        #[arg(long)]
        quiet: bool,

        /// Print the run report as JSON instead of streaming
        #[arg(long)]
        json: bool,

        /// Ask the backend to load the model first
        #[arg(long)]
        preload: bool,
    },
    /// Run a captured NDJSON stream through the session driver
    Replay {
        /// NDJSON file, one `{"response": ...}` object per line
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Model identifier used to pick markers
        #[arg(short, long, default_value = "cogito")]
        model: String,

        /// Table to highlight cited cells in
        #[arg(long, value_name = "FILE")]
        table: Option<PathBuf>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract a verdict from answer text (stdin when no file is given)
    Extract {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Split a complete response into reasoning and answer
    Split {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Model identifier used to pick markers
        #[arg(short, long, default_value = "cogito")]
        model: String,

        /// Only cut out the first reasoning block, matching markers in any
        /// case, and skip verdict extraction
        #[arg(long)]
        first_block: bool,
    },
    /// Render a delimited table
    Table {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print `{"columns", "data"}` JSON
        #[arg(long)]
        json: bool,
    },
    /// List the thinking markers per model
    Markers,
    /// List the registered inference backends
    Backends,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_command(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_command(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Check {
            table,
            claim,
            model,
            title,
            thinking,
            quiet,
            json,
            preload,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let table_text = read_file(&table)?;
            let parsed = Table::parse(&table_text).context("invalid table")?;

            let mut request = config.request(table_text, claim).with_thinking(thinking);
            if let Some(model) = model {
                request.model = model;
            }
            if let Some(title) = title {
                request = request.with_title(title);
            }

            let checker = Arc::new(
                FactChecker::from_config(&config).context("failed to create backend")?,
            );
            if preload {
                checker
                    .preload(&request.model)
                    .await
                    .with_context(|| format!("failed to load model '{}'", request.model))?;
            }

            let abort_on_ctrl_c = {
                let checker = checker.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        checker.abort();
                    }
                })
            };

            let mut terminal = TerminalObserver::new(!quiet);
            let mut silent = NullObserver;
            let observer: &mut dyn SessionObserver = if json {
                &mut silent
            } else {
                &mut terminal
            };
            let outcome = checker.check(&request, observer).await;
            abort_on_ctrl_c.abort();

            finish(outcome?, Some(&parsed), json)
        }

        Commands::Replay {
            file,
            model,
            table,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let table = table
                .map(|path| read_file(&path).and_then(|t| Table::parse(&t).context("invalid table")))
                .transpose()?;

            let chunks: Vec<Result<Vec<u8>, ProviderError>> =
                bytes.chunks(REPLAY_CHUNK).map(|c| Ok(c.to_vec())).collect();
            let stream: ByteStream = futures::stream::iter(chunks).boxed();

            let cancel = CancellationToken::new();
            let abort_on_ctrl_c = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                })
            };

            let mut terminal = TerminalObserver::new(true);
            let mut silent = NullObserver;
            let observer: &mut dyn SessionObserver = if json {
                &mut silent
            } else {
                &mut terminal
            };
            let outcome = run_session(
                stream,
                MarkerPair::for_model(&model),
                cancel,
                observer,
                config.idle_timeout,
            )
            .await;
            abort_on_ctrl_c.abort();

            finish(outcome?, table.as_ref(), json)
        }

        Commands::Extract { file } => {
            let text = read_input(file.as_deref())?;
            let (verdict, source) = extract_verdict_with_source(&text);
            let output = serde_json::json!({ "verdict": verdict, "source": source });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Split {
            file,
            model,
            first_block,
        } => {
            let text = read_input(file.as_deref())?;
            let output = if first_block {
                let (reasoning, answer) = split_reasoning(&text, &MarkerPair::for_model(&model));
                serde_json::json!({ "reasoning": reasoning, "answer": answer })
            } else {
                serde_json::to_value(check_response(&model, &text))?
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Table { file, json } => {
            let table = Table::parse(&read_file(&file)?).context("invalid table")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&table.to_json())?);
            } else {
                print!("{}", render_table(&table, None));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Markers => {
            for model in MarkerPair::known_models() {
                let markers = MarkerPair::for_model(model);
                println!("{:<20} {} {}", model, markers.start, markers.end);
            }
            let fallback = MarkerPair::default();
            println!("{:<20} {} {}", "(other)", fallback.start, fallback.end);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Backends => {
            let registry = BackendRegistry::with_defaults();
            if registry.available_types().is_empty() {
                println!("{}", "no backends (built without the http feature)".yellow());
            }
            for backend in registry.available_types() {
                let description = registry.description(backend).unwrap_or_default();
                let default_url = registry
                    .default_config(backend)
                    .and_then(|config| config["base_url"].as_str().map(str::to_string))
                    .unwrap_or_default();
                println!(
                    "{} {} {}",
                    format!("{:<20}", backend).bold(),
                    description,
                    default_url.dimmed()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn finish(outcome: RunOutcome, table: Option<&Table>, json: bool) -> Result<ExitCode> {
    match outcome {
        RunOutcome::Cancelled => {
            eprintln!("aborted");
            Ok(ExitCode::from(EXIT_ABORTED))
        }
        RunOutcome::Completed(report) if json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Completed(report) => {
            print!("{}", render_report(&report, table));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let config = match path {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => read_file(path),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            if text.trim().is_empty() {
                bail!("no input on stdin");
            }
            Ok(text)
        }
    }
}
