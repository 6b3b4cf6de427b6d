use crate::constants::{exit_codes, verbosity, DEFAULT_SETTINGS_FILE};
use clap::{error::ErrorKind, CommandFactory, Parser};
use log::LevelFilter;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = r#"{about-section}
{usage-heading} {usage}

{all-args}
{after-help}
"#;

/// CLI arguments for templar.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Render provisioning templates", long_about = None)]
pub struct Args {
    /// Template file, or `-` to read it from stdin.
    #[arg(value_name = "TEMPLATE")]
    pub template: String,

    /// Render context as a JSON or YAML file, or `-` for stdin.
    #[arg(short, long, value_name = "FILE")]
    pub context: Option<String>,

    /// Write the rendered text here instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Template engine: default, legacy or modern.
    #[arg(short = 't', long = "type", default_value = "default")]
    pub template_type: String,

    /// Settings file (YAML or JSON). Defaults apply when it does not exist.
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILE)]
    pub settings: PathBuf,

    /// Increase logging verbosity (`-v`, `-vv`, `-vvv`).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse command line arguments with custom handling for missing required inputs.
pub fn get_args() -> Args {
    Args::try_parse().unwrap_or_else(|e| {
        if e.kind() == ErrorKind::MissingRequiredArgument {
            let mut command = Args::command().help_template(HELP_TEMPLATE);
            if let Err(print_err) = command.print_help() {
                eprintln!("Failed to display help information: {print_err}");
            } else {
                println!();
            }
            std::process::exit(exit_codes::FAILURE);
        } else {
            e.exit();
        }
    })
}

/// Map `-v` counts to the appropriate log level.
pub fn get_log_level_from_verbose(verbose_count: u8) -> LevelFilter {
    match verbose_count {
        verbosity::OFF => LevelFilter::Error,
        verbosity::INFO => LevelFilter::Info,
        verbosity::DEBUG => LevelFilter::Debug,
        verbosity::TRACE.. => LevelFilter::Trace,
    }
}
