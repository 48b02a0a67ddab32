//! Stratus CLI - Infrastructure resource graph compiler

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stratus_core::{DEFAULT_ENVIRONMENT, StackId, StackKind};
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::{OutputFormat, StackArgs, StateArgs};

#[derive(Parser)]
#[command(name = "stratus")]
#[command(author = "Stratus Contributors")]
#[command(version)]
#[command(about = "Compile network, cluster, database, services and app stacks into resource graphs", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a stack into the document handed to the provisioning engine
    Render {
        #[command(flatten)]
        stack: StackArgs,

        #[command(flatten)]
        state: StateArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,

        /// Print secret values instead of masking them
        #[arg(long)]
        show_secrets: bool,

        /// Do not record the rendered revision
        #[arg(long)]
        no_record: bool,
    },

    /// Validate a stack config
    Validate {
        #[command(flatten)]
        stack: StackArgs,

        /// Output validation results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the apply waves of a stack
    Plan {
        #[command(flatten)]
        stack: StackArgs,

        #[command(flatten)]
        state: StateArgs,

        /// Output the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare a stack with its last recorded revision
    Diff {
        #[command(flatten)]
        stack: StackArgs,

        #[command(flatten)]
        state: StateArgs,

        /// Context lines around each change
        #[arg(long, default_value_t = 3)]
        context: usize,

        /// Output the diff as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stacks in apply order
    Order {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage recorded stack outputs
    Outputs {
        #[command(subcommand)]
        command: OutputsCommands,
    },
}

#[derive(Subcommand)]
enum OutputsCommands {
    /// Import outputs exported by the provisioning engine (JSON or YAML)
    Import {
        /// Stack the outputs belong to
        stack: StackKind,

        /// Outputs file
        file: PathBuf,

        /// Environment name
        #[arg(
            short = 'e',
            long = "env",
            env = "STRATUS_ENV",
            default_value = DEFAULT_ENVIRONMENT,
            value_parser = commands::parse_environment
        )]
        environment: String,

        #[command(flatten)]
        state: StateArgs,
    },

    /// Show recorded outputs
    Show {
        /// Stack to show
        stack: StackKind,

        /// Environment name
        #[arg(
            short = 'e',
            long = "env",
            env = "STRATUS_ENV",
            default_value = DEFAULT_ENVIRONMENT,
            value_parser = commands::parse_environment
        )]
        environment: String,

        #[command(flatten)]
        state: StateArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,

        /// Print secret values instead of masking them
        #[arg(long)]
        show_secrets: bool,
    },

    /// List recorded stacks
    List {
        /// Only stacks of this environment
        #[arg(short = 'e', long = "env", env = "STRATUS_ENV", value_parser = commands::parse_environment)]
        environment: Option<String>,

        #[command(flatten)]
        state: StateArgs,
    },
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Render {
            stack,
            state,
            format,
            show_secrets,
            no_record,
        } => commands::render::run(&stack, &state, format, show_secrets, no_record).await,

        Commands::Validate { stack, json } => commands::validate::run(&stack, json),

        Commands::Plan { stack, state, json } => commands::plan::run(&stack, &state, json).await,

        Commands::Diff {
            stack,
            state,
            context,
            json,
        } => commands::diff::run(&stack, &state, context, json).await,

        Commands::Order { json } => commands::order::run(json),

        Commands::Outputs { command } => match command {
            OutputsCommands::Import {
                stack,
                file,
                environment,
                state,
            } => commands::outputs::import(&StackId::new(stack, environment), &file, &state).await,

            OutputsCommands::Show {
                stack,
                environment,
                state,
                format,
                show_secrets,
            } => {
                commands::outputs::show(&StackId::new(stack, environment), &state, format, show_secrets)
                    .await
            }

            OutputsCommands::List { environment, state } => {
                commands::outputs::list(environment.as_deref(), &state).await
            }
        },
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_stack_aliases() {
        let cli = Cli::try_parse_from(["stratus", "validate", "database", "-f", "db.yaml"]).unwrap();
        match cli.command {
            Commands::Validate { stack, .. } => {
                assert_eq!(stack.stack, StackKind::Database);
                assert_eq!(stack.environment, DEFAULT_ENVIRONMENT);
            }
            _ => panic!("expected validate"),
        }
    }

    #[test]
    fn test_invalid_environment_rejected() {
        assert!(Cli::try_parse_from(["stratus", "render", "vpc", "-e", "../x"]).is_err());
        assert!(Cli::try_parse_from(["stratus", "render", "vpc", "-e", ""]).is_err());
        assert!(
            Cli::try_parse_from(["stratus", "outputs", "show", "db", "--env", "../../escaped"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["stratus", "outputs", "list", "-e", "Prod"]).is_err());
    }

    #[test]
    fn test_unknown_stack_rejected() {
        assert!(Cli::try_parse_from(["stratus", "render", "frontend"]).is_err());
    }
}
