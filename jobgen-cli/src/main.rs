mod cli;
mod commands;
mod config;
mod error;
mod output;
mod session;

use crate::{
    cli::{Args, Commands, OutputFormat},
    commands::CommandExecutor,
    config::AppConfig,
    error::{CliError, Result},
};
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use std::process;
use tracing::{Level, debug, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let output_format = args.output;
    let result = run(args).await;

    if let Err(e) = result {
        report_error(&e, output_format);
        process::exit(1);
    }
}

fn report_error(e: &CliError, output_format: OutputFormat) {
    if output_format.is_json() {
        let error_json = serde_json::json!({
            "status": "error",
            "tag": e.tag().map(|t| t.as_str()),
            "message": e.user_message(),
        });
        println!("{error_json}");
        return;
    }

    error!("Application error: {}", e);
    #[cfg(feature = "colored-output")]
    {
        eprintln!("{} {}", "Error:".red().bold(), e.user_message());
    }
    #[cfg(not(feature = "colored-output"))]
    {
        eprintln!("Error: {}", e.user_message());
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet);

    let config =
        AppConfig::load(args.config.as_deref())?.with_overrides(args.base_url, args.no_color);
    debug!("Loaded configuration: {:?}", config);

    match args.command {
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Args::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(())
        }

        Commands::Config { show, reset } => {
            if reset {
                let path = AppConfig::reset(args.config.as_deref())?;
                println!("✓ Configuration reset to defaults at {}", path.display());
            } else if show {
                print!("{}", config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration or --reset to reset to defaults"
                );
            }
            Ok(())
        }

        command => {
            let executor = CommandExecutor::new(config, args.output, args.quiet)?;
            let result = execute(&executor, command).await;
            executor.persist_session();
            result
        }
    }
}

async fn execute(executor: &CommandExecutor, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email, password } => executor.login(email, password).await,
        Commands::Logout => executor.logout().await,
        Commands::Session => executor.show_session(),
        Commands::Analyze {
            file,
            no_matches,
            no_wait,
        } => executor.analyze(&file, no_matches, no_wait).await,
        Commands::Status { job_id, wait } => executor.status(&job_id, wait).await,
        Commands::Matches { page, limit } => executor.matches(page, limit).await,
        Commands::Config { .. } | Commands::Completions { .. } => Ok(()),
    }
}

/// Logs go to stderr so JSON on stdout stays machine-readable.
fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(verbose),
        )
        .init();
}
