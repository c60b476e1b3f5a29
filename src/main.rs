use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use secure_code_reasoner::cli::{self, commands};
use secure_code_reasoner::config::OutputFormat;
use secure_code_reasoner::trace::TraceOptions;

/// Parse output format from string
fn parse_output_format(s: &str) -> Result<OutputFormat, String> {
    s.parse()
}

/// Parse a positive timeout in seconds
fn parse_timeout(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(secs),
        _ => Err(format!(
            "Invalid timeout '{}'. Must be a positive number of seconds",
            s
        )),
    }
}

#[derive(Parser)]
#[command(name = "scr")]
#[command(
    version,
    about = "Secure Code Reasoner: repository fingerprinting, review agents and sandboxed tracing"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, global = true, help = "Explicit config file")]
    config: Option<PathBuf>,

    #[arg(long, short, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(long, short, global = true, help = "Suppress non-error output")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint a repository and review it with the agents
    Analyze {
        #[arg(help = "Repository root")]
        path: PathBuf,
        #[arg(long, short, help = "Output file path")]
        output: Option<PathBuf>,
        #[arg(short = 'f', long, value_parser = parse_output_format, help = "Output format: text, json")]
        format: Option<OutputFormat>,
    },

    /// Trace execution of a script in the sandbox
    Trace {
        #[arg(help = "Script to execute")]
        path: PathBuf,
        #[arg(
            help = "Arguments passed to the script",
            trailing_var_arg = true
        )]
        args: Vec<String>,
        #[arg(long, short, help = "Output file path")]
        output: Option<PathBuf>,
        #[arg(short = 'f', long, value_parser = parse_output_format, help = "Output format: text, json")]
        format: Option<OutputFormat>,
        #[arg(short = 't', long, value_parser = parse_timeout, help = "Execution timeout in seconds")]
        timeout: Option<f64>,
        #[arg(long, help = "Allow network access")]
        allow_network: bool,
        #[arg(long, help = "Allow file write operations")]
        allow_file_write: bool,
        #[arg(long, help = "Interpreter used to run the script")]
        interpreter: Option<String>,
    },

    /// Write a combined fingerprint and agent report
    Report {
        #[arg(help = "Repository root")]
        path: PathBuf,
        #[arg(long, short, help = "Output file path")]
        output: PathBuf,
        #[arg(short = 'f', long, value_parser = parse_output_format, help = "Output format: text, json")]
        format: Option<OutputFormat>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show effective configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mscr encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            path,
            output,
            format,
        } => {
            let format = cli::resolve_format(format, &config);
            commands::analyze::run(&path, output.as_deref(), format, &config)?;
        }
        Commands::Trace {
            path,
            args,
            output,
            format,
            timeout,
            allow_network,
            allow_file_write,
            interpreter,
        } => {
            let format = cli::resolve_format(format, &config);
            let mut options = TraceOptions::from_config(&config.tracer)
                .with_network(allow_network || config.tracer.allow_network)
                .with_file_write(allow_file_write || config.tracer.allow_file_write);
            if let Some(secs) = timeout {
                options = options.with_timeout(secs);
            }
            if let Some(interpreter) = interpreter {
                options = options.with_interpreter(interpreter);
            }

            let rt = Runtime::new()?;
            rt.block_on(commands::trace::run(
                &path,
                &args,
                output.as_deref(),
                format,
                options,
            ))?;
        }
        Commands::Report {
            path,
            output,
            format,
        } => {
            let format = cli::resolve_format(format, &config);
            commands::report::run(&path, &output, format, &config)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                commands::config::show(&config, &format)?;
            }
            ConfigAction::Path => {
                commands::config::path()?;
            }
        },
    }

    Ok(())
}
