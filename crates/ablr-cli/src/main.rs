//! ablr CLI
//!
//! Command-line front end for the ABL refactoring core

mod commands;
mod output;

use ablr_core::init_tracing_with_default;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ablr")]
#[command(about = "ablr: scanner, expansion tree and rollback tooling for ABL sources")]
#[command(version = ablr_core::VERSION)]
#[command(
    long_about = "ablr exposes the ABL refactoring core on the command line: literal\n\
token listings, include/macro expansion trees, line indenting through a\n\
rollback transaction, and review or rollback of the last transaction.\n\
\n\
Examples:\n  \
ablr scan src/order.p              # List literal tokens\n  \
ablr expand src/order.p            # Dump the expansion tree\n  \
ablr indent src/order.p --from 3 --to 9\n  \
ablr changes --diff                # Review the last transaction\n  \
ablr rollback                      # Undo it"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        help = "Path to configuration file (.ablrc.json/.ablrc.toml/ablr.yaml)"
    )]
    config: Option<PathBuf>,

    /// Verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the literal scanner tokens of a file
    Scan {
        #[arg(help = "Source file to tokenize")]
        file: PathBuf,
    },

    /// Build and print the include/macro expansion tree of a compile unit
    Expand {
        #[arg(help = "Main file of the compile unit")]
        file: PathBuf,

        /// Print the primary expanded text instead of the tree dump
        #[arg(long, help = "Print the expanded text of the active configuration")]
        text: bool,

        /// Print where each include file was referenced
        #[arg(long, help = "List include references", conflicts_with = "text")]
        includes: bool,
    },

    /// Indent a range of lines in place, through a rollback transaction
    Indent {
        #[arg(help = "File to indent")]
        file: PathBuf,

        #[arg(long, help = "First line to indent (1-based)")]
        from: u32,

        #[arg(long, help = "Last line to indent (inclusive)")]
        to: u32,

        #[arg(long, help = "Indent string (default: from configuration)")]
        indent: Option<String>,
    },

    /// Show the change list of the last transaction
    Changes {
        #[arg(long, help = "Include the unified diff of each modified file")]
        diff: bool,
    },

    /// Restore every file changed by the last transaction
    Rollback,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the JSON schema of the configuration file
    Schema,
    /// Print the effective configuration
    Show,
}

fn main() {
    let cli = Cli::parse();

    if !cli.no_color && std::env::var("NO_COLOR").is_err() {
        colored::control::set_override(true);
    } else {
        colored::control::set_override(false);
    }

    let log_level = match cli.verbose {
        0 => "ablr=error",
        1 => "ablr=warn",
        2 => "ablr=info",
        3 => "ablr=debug",
        _ => "ablr=trace",
    };
    init_tracing_with_default(log_level);

    if let Err(e) = run_command(cli) {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn run_command(cli: Cli) -> anyhow::Result<()> {
    let custom = cli.config.as_deref();
    match cli.command {
        Some(Commands::Scan { file }) => commands::scan_command(&file),
        Some(Commands::Expand {
            file,
            text,
            includes,
        }) => {
            let config = commands::load_config(custom, file.parent())?;
            commands::expand_command(&config, &file, text, includes)
        }
        Some(Commands::Indent {
            file,
            from,
            to,
            indent,
        }) => {
            let config = commands::load_config(custom, file.parent())?;
            commands::indent_command(&config, &file, from, to, indent.as_deref())
        }
        Some(Commands::Changes { diff }) => {
            let config = commands::load_config(custom, None)?;
            commands::changes_command(&config, diff)
        }
        Some(Commands::Rollback) => {
            let config = commands::load_config(custom, None)?;
            commands::rollback_command(&config)
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Schema => commands::config_schema_command(),
            ConfigAction::Show => {
                let config = commands::load_config(custom, None)?;
                commands::config_show_command(&config)
            }
        },
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            Ok(())
        }
    }
}
