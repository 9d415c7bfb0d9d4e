use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "jobgen",
    version,
    about = "Analyse CVs and find matching jobs with the jobgen service",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL (overrides the configuration file)
    #[arg(long, env = "JOBGEN_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty, global = true)]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        /// Account email (prompted when omitted)
        #[arg(short, long, env = "JOBGEN_EMAIL")]
        email: Option<String>,

        /// Account password (prompted when omitted)
        #[arg(long, env = "JOBGEN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the stored session
    Session,

    /// Upload a CV and wait for its analysis
    Analyze {
        /// Document to analyse (PDF or Word)
        file: PathBuf,

        /// Skip fetching matched jobs after a successful analysis
        #[arg(long)]
        no_matches: bool,

        /// Print the job id and return without polling
        #[arg(long, conflicts_with = "no_matches")]
        no_wait: bool,
    },

    /// Show the status of an analysis job
    Status {
        /// Job identifier returned by `analyze`
        job_id: String,

        /// Poll until the job settles
        #[arg(short, long)]
        wait: bool,
    },

    /// List jobs matched against your profile
    Matches {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 10)]
        limit: u32,
    },

    /// Show or reset configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Reset configuration to defaults
        #[arg(long, conflicts_with = "show")]
        reset: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Pretty,
    /// Pretty-printed JSON
    Json,
    /// Single-line JSON
    JsonCompact,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json | Self::JsonCompact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let args = Args::try_parse_from([
            "jobgen", "analyze", "cv.pdf", "--no-matches", "-o", "json-compact",
        ])
        .unwrap();

        assert_eq!(args.output, OutputFormat::JsonCompact);
        assert!(matches!(
            args.command,
            Commands::Analyze { no_matches: true, no_wait: false, .. }
        ));
    }

    #[test]
    fn no_wait_conflicts_with_no_matches() {
        assert!(
            Args::try_parse_from(["jobgen", "analyze", "cv.pdf", "--no-wait", "--no-matches"])
                .is_err()
        );
    }
}
