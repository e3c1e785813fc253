//! CLI binary for neuralmath.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `SolverConfig` / `ServerConfig` and either serves the web form or solves
//! one file in the terminal.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use neuralmath::config::{API_KEY_ENV, DEFAULT_MODEL};
use neuralmath::{
    ingest_path, render_cli, serve, solve_image, GeminiClient, OverwritePolicy, ProviderSolver,
    ServerConfig, SolveError, Solver, SolverConfig,
};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the upload form on http://127.0.0.1:3000
  neuralmath serve

  # Serve on all interfaces, keeping the original last-response-wins behaviour
  neuralmath serve --bind 0.0.0.0:8080 --policy completion-order

  # Solve one photo in the terminal
  neuralmath solve equation.png

  # Force the media type sent with the image
  neuralmath solve scan.bin --mime image/jpeg

  # JSON output with token usage
  neuralmath solve --json equation.png

  # Use another vision provider through edgequake-llm
  neuralmath --provider openai --model gpt-4.1-mini solve equation.png

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY            Gemini API key (required for the default provider)
  NEURALMATH_API_KEY        Alias for GEMINI_API_KEY
  NEURALMATH_MODEL          Model ID (gemini default: gemini-1.5-pro;
                            other providers use their own default)
  NEURALMATH_API_BASE       Generative Language API root
  NEURALMATH_BIND           serve: listen address
  NEURALMATH_POLICY         serve: latest-selection | completion-order
  RUST_LOG                  Override log filter (e.g. neuralmath=debug)
"#;

/// Solve photographed handwritten math with a multimodal model.
#[derive(Parser, Debug)]
#[command(
    name = "neuralmath",
    version,
    about = "Solve photographed handwritten math with a multimodal model",
    long_about = "Upload an image of handwritten mathematics and get a concise worked solution. \
Serves a single-page web form, or solves one file directly in the terminal.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    solver: SolverArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "NEURALMATH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "NEURALMATH_QUIET")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct SolverArgs {
    /// Inference API key.
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID (e.g. gemini-1.5-pro, gemini-1.5-flash).
    #[arg(long, global = true, env = "NEURALMATH_MODEL")]
    model: Option<String>,

    /// Provider: gemini (native), or any edgequake-llm provider name.
    #[arg(long, global = true, env = "NEURALMATH_PROVIDER", default_value = "gemini")]
    provider: String,

    /// Generative Language API root (gemini provider only).
    #[arg(long, global = true, env = "NEURALMATH_API_BASE")]
    api_base: Option<String>,

    /// Path to a text file replacing the built-in instruction.
    #[arg(long, global = true, env = "NEURALMATH_INSTRUCTION")]
    instruction_file: Option<PathBuf>,

    /// Per-request timeout in seconds (default: none).
    #[arg(long, global = true, env = "NEURALMATH_API_TIMEOUT")]
    api_timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the upload form.
    Serve {
        /// Listen address.
        #[arg(long, env = "NEURALMATH_BIND", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,

        /// Largest accepted upload in bytes.
        #[arg(long, env = "NEURALMATH_MAX_UPLOAD_BYTES", default_value_t = 20 * 1024 * 1024)]
        max_upload_bytes: usize,

        /// Which response is shown when uploads overlap.
        #[arg(long, env = "NEURALMATH_POLICY", value_enum, default_value = "latest-selection")]
        policy: PolicyArg,

        /// Seconds between page refreshes while a request is pending.
        #[arg(long, env = "NEURALMATH_REFRESH_SECS", default_value_t = 2)]
        refresh_secs: u32,
    },

    /// Solve a single image and print the answer.
    Solve {
        /// Image file to solve.
        file: PathBuf,

        /// Media type to declare instead of sniffing it from the file.
        #[arg(long)]
        mime: Option<String>,

        /// Output structured JSON instead of the bare answer.
        #[arg(long)]
        json: bool,

        /// Disable the spinner.
        #[arg(long, env = "NEURALMATH_NO_PROGRESS")]
        no_progress: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    LatestSelection,
    CompletionOrder,
}

impl From<PolicyArg> for OverwritePolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::LatestSelection => OverwritePolicy::LatestSelection,
            PolicyArg::CompletionOrder => OverwritePolicy::CompletionOrder,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // `solve` keeps library logs quiet unless asked; the spinner and the
    // answer are the output that matters there.
    let is_solve = matches!(cli.command, Command::Solve { .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || is_solve {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let (solver, instruction) = build_solver(&cli.solver).await?;

    match cli.command {
        Command::Serve {
            bind,
            max_upload_bytes,
            policy,
            refresh_secs,
        } => {
            let config = ServerConfig {
                bind,
                max_upload_bytes,
                policy: policy.into(),
                refresh_secs,
            };
            info!("Using {}", solver.name());
            serve(config, solver, instruction)
                .await
                .context("Server failed")?;
        }
        Command::Solve {
            file,
            mime,
            json,
            no_progress,
        } => {
            let show_progress = !cli.quiet && !no_progress && !json;
            run_solve(solver.as_ref(), &instruction, file, mime, json, show_progress).await?;
        }
    }

    Ok(())
}

async fn run_solve(
    solver: &dyn Solver,
    instruction: &str,
    file: PathBuf,
    mime: Option<String>,
    json: bool,
    show_progress: bool,
) -> Result<()> {
    if file.as_os_str().is_empty() {
        return Err(SolveError::EmptySelection.into());
    }

    let image = ingest_path(&file, mime.as_deref())
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let spinner = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Solving");
        bar.set_message(format!("{} ({}) via {}", image.name, image.mime_type, solver.name()));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let outcome = solve_image(solver, &image, instruction).await;

    if let Some(bar) = spinner {
        bar.finish_and_clear();
        match &outcome {
            Ok(s) => eprintln!(
                "{} {}  {}",
                green("✔"),
                bold(&image.name),
                dim(&format!("{:.1}s", s.duration_ms as f64 / 1000.0))
            ),
            Err(e) => eprintln!("{} {}  {}", red("✘"), bold(&image.name), red(&e.to_string())),
        }
    }

    let solution = outcome.context("Solving failed")?;

    if json {
        let value = serde_json::json!({
            "file": image.name,
            "mime_type": image.mime_type,
            "solution": solution,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).context("Failed to serialise output")?
        );
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(render_cli(&solution).as_bytes())
            .context("Failed to write to stdout")?;
    }

    Ok(())
}

/// Map CLI args to a solver and the instruction it is driven with.
async fn build_solver(args: &SolverArgs) -> Result<(Arc<dyn Solver>, String)> {
    let instruction = if let Some(ref path) = args.instruction_file {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?
    } else {
        neuralmath::prompts::SOLVE_INSTRUCTION.to_string()
    };

    if !args.provider.eq_ignore_ascii_case("gemini") {
        let solver = ProviderSolver::from_name(&args.provider, args.model.as_deref())
            .context("Failed to configure provider")?
            .with_timeout(args.api_timeout);
        return Ok((Arc::new(solver), instruction));
    }

    let model = args.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let api_key = args
        .api_key
        .clone()
        .or_else(|| std::env::var("NEURALMATH_API_KEY").ok())
        .unwrap_or_default();

    let mut builder = SolverConfig::builder()
        .api_key(api_key)
        .model(model)
        .instruction(instruction);
    if let Some(ref base) = args.api_base {
        builder = builder.api_base(base.clone());
    }
    if let Some(secs) = args.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    let config = builder
        .build()
        .with_context(|| format!("Invalid configuration (is {API_KEY_ENV} set?)"))?;

    let client = GeminiClient::new(&config).context("Failed to build Gemini client")?;
    Ok((Arc::new(client), config.instruction))
}
