//! CLI logic for the Armillary model store.
//!
//! The CLI replays a TOML session script against a fresh repository and
//! reports the resulting element tree.

pub mod error_adapter;

mod args;
mod config;
mod error;
mod script;
mod tree;

pub use args::Args;
pub use config::{AppConfig, ConfigError, load_config};
pub use error::CliError;
pub use script::{Script, Session, Step};
pub use tree::TreeView;

use std::fs;

use log::info;

use armillary::config::StoreConfig;

/// Parses `source` as a session script and replays it.
///
/// # Errors
///
/// Returns [`CliError::Script`] if the script is malformed, or the first step
/// failure that is not skipped.
pub fn replay_script(source: &str, config: StoreConfig, strict: bool) -> Result<Session, CliError> {
    let script: Script = toml::from_str(source).map_err(|error| CliError::Script {
        error,
        src: source.to_string(),
    })?;

    let mut session = Session::new(&script.project, config);
    session.replay(&script.steps, strict)?;
    Ok(session)
}

/// Run the Armillary CLI application
///
/// This function replays the input script and writes the report of the
/// final element tree to the output file, or to stdout.
///
/// # Arguments
///
/// * `args` - Command-line arguments
///
/// # Errors
///
/// Returns `CliError` for:
/// - File I/O errors
/// - Configuration loading errors
/// - Script parsing errors
/// - Step failures
pub fn run(args: &Args) -> Result<(), CliError> {
    info!(
        input_path = args.input,
        output_path:? = args.output;
        "Replaying session"
    );

    let app_config = config::load_config(args.config.as_ref())?;
    let source = fs::read_to_string(&args.input)?;

    let session = replay_script(&source, app_config.store().clone(), args.strict)?;
    let report = TreeView(session.repository()).to_string();

    match &args.output {
        Some(output) => {
            fs::write(output, report)?;
            info!(output_file = output; "Report written");
        }
        None => print!("{report}"),
    }

    Ok(())
}
