use crate::config::Config;
use crate::executor::{self, ExecuteOptions};
use crate::files;
use crate::types::{ExecutionResult, Line, LogEntry, Outcome, SaveRequest};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scratchpad")]
#[command(about = "Scratchpad - run JavaScript snippets with line-attributed console output", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Wall-clock bound for one run, in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Fail instead of estimating lines when the source cannot be annotated
    #[arg(long, global = true)]
    pub strict: bool,

    /// Print the result envelope as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script file
    Run {
        /// Script to run
        file: PathBuf,

        /// Values exposed as process.argv[2..]
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Run code given on the command line
    Eval {
        /// Source to run
        code: String,
    },

    /// Run the selected code, or the cursor's line when nothing is selected
    Selection {
        /// Script file holding the code
        file: PathBuf,

        /// 1-based cursor line
        #[arg(long, default_value = "1")]
        line: usize,

        /// Selected text
        #[arg(long)]
        selection: Option<String>,
    },

    /// Save stdin to a file
    Save {
        /// Destination path
        path: Option<String>,
    },

    /// Print the resolved configuration as TOML
    Config,
}

/// Run the CLI by parsing process arguments
///
/// Returns whether the command succeeded; a failed script run is not an
/// `Err`, it is reported on stdout and turned into a non-zero exit status.
pub async fn run_cli() -> Result<bool> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<bool> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<bool> {
    // Load and validate configuration before running anything
    let config = Config::builder()
        .config_path(cli.config.clone())
        .timeout_ms(cli.timeout_ms)
        .strict_annotation(cli.strict.then_some(true))
        .build()?;

    let options = ExecuteOptions::from_config(&config);

    match cli.command {
        Commands::Run { file, args } => {
            let source = files::open_file(&file)?;
            let mut sandbox = options.sandbox.clone().with_argv(args);
            if let Some(name) = file.file_name() {
                sandbox.filename = name.to_string_lossy().into_owned();
            }
            let result = executor::execute(&source, &options.with_sandbox(sandbox)).await;
            report(&result, cli.json)
        }

        Commands::Eval { code } => {
            let result = executor::execute(&code, &options).await;
            report(&result, cli.json)
        }

        Commands::Selection {
            file,
            line,
            selection,
        } => {
            let source = files::open_file(&file)?;
            let result =
                executor::execute_selection(&source, selection.as_deref(), line, &options).await;
            report(&result, cli.json)
        }

        Commands::Save { path } => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read stdin")?;

            let response = files::save_file(SaveRequest { path, content });
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if let Some(path) = &response.path {
                println!("✓ Saved {}", path);
            } else if let Some(error) = &response.error {
                eprintln!("Error: {}", error);
            }
            Ok(response.success)
        }

        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(true)
        }
    }
}

fn report(result: &ExecutionResult, json: bool) -> Result<bool> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        for line in render(result) {
            println!("{}", line);
        }
    }
    Ok(result.is_success())
}

/// One log line as shown in the output pane
pub fn format_entry(entry: &LogEntry) -> String {
    match entry.line {
        Line::Known(line) => format!("[{}] Line {}: {}", entry.kind.as_str(), line, entry.message),
        Line::Unknown => format!("[{}] {}", entry.kind.as_str(), entry.message),
    }
}

/// Log lines followed by the result or error
pub fn render(result: &ExecutionResult) -> Vec<String> {
    let mut lines: Vec<String> = result.log.iter().map(format_entry).collect();
    match &result.outcome {
        Outcome::Success { value } if !value.is_undefined() => {
            lines.push(format!("=> {}", value.display()));
        }
        Outcome::Success { .. } => {}
        Outcome::Failure { message, .. } => lines.push(format!("Error: {}", message)),
    }
    lines
}
