// SPDX-License-Identifier: MIT OR Apache-2.0
//! Patchbay - headless host for node patches.
//!
//! Loads a patch document, runs editor commands against it and writes the
//! result back out:
//!
//! ```text
//! patchbay [PATCH] [--settings FILE] [--write-settings FILE] [--output FILE] [--print] [-c COMMAND]...
//! ```
//!
//! Commands use the same ids as the editor menus, e.g. `-c "edit.select 2"`
//! followed by `-c edit.duplicate`.

mod settings;
mod workspace;

use clap::Parser;
use settings::{AppSettings, SETTINGS_FILE_NAME};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use workspace::{AppError, Workspace};

/// Headless host for node patches
#[derive(Debug, Parser)]
#[command(name = "patchbay", version, about, long_about = None)]
struct Args {
    /// Patch document to open
    patch: Option<PathBuf>,

    /// Settings file, `patchbay.ron` in the working directory by default
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the settings in use to this file
    #[arg(long)]
    write_settings: Option<PathBuf>,

    /// Save the patch here after running commands
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the resulting patch document to stdout
    #[arg(long)]
    print: bool,

    /// Editor command to run, repeatable
    #[arg(short = 'c', long = "command")]
    commands: Vec<String>,
}

fn init_tracing(settings: &AppSettings) {
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in settings.log_directive.split(',').filter(|d| !d.is_empty()) {
        match directive.parse() {
            Ok(directive) => env_filter = env_filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive [{directive}]: {e}"),
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn run(args: Args, settings: AppSettings) -> Result<(), AppError> {
    if let Some(path) = &args.write_settings {
        settings.save(path)?;
        tracing::info!("Wrote settings to {}", path.display());
    }

    let mut workspace = Workspace::new(settings);
    tracing::debug!(
        "{} node types registered, {} ticks per load",
        workspace.registry().len(),
        workspace.settings().ticks_per_load
    );

    if let Some(path) = &args.patch {
        let report = workspace.open(path)?;
        for failure in &report.failures {
            tracing::warn!("Node [{}] was not loaded: {}", failure.key, failure.error);
        }
    }

    for command in &args.commands {
        workspace.execute(command)?;
        workspace.tick();
    }

    if let Some(output) = &args.output {
        workspace.save_as(output)?;
    } else if workspace.has_unsaved_changes() && workspace.path().is_some() {
        tracing::info!("Unsaved changes discarded, pass --output to keep them");
    }

    if args.print {
        println!("{}", workspace.patch().to_json_string()?);
    }

    let patch = workspace.patch();
    tracing::info!(
        "Patch {}: {} node hosts, {} links",
        patch.id(),
        patch.node_hosts().len(),
        patch.link_hosts().len()
    );
    Ok(())
}

fn main() {
    let args = Args::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(|| Path::new(SETTINGS_FILE_NAME).to_path_buf());
    let (settings, settings_error) = match AppSettings::load_or_default(&settings_path) {
        Ok(settings) => (settings, None),
        Err(e) => (AppSettings::default(), Some(e)),
    };

    init_tracing(&settings);
    tracing::info!("Starting Patchbay v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = settings_error {
        tracing::warn!("Using default settings, {} failed to load: {e}", settings_path.display());
    }

    if let Err(e) = run(args, settings) {
        tracing::error!("Patchbay failed: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("patchbay").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_args() {
        let args = parse(&["rig.json", "-c", "edit.select 0", "--command", "edit.copy", "-o", "out.json"]).unwrap();
        assert_eq!(args.patch, Some(PathBuf::from("rig.json")));
        assert_eq!(args.output, Some(PathBuf::from("out.json")));
        assert_eq!(args.commands, vec!["edit.select 0", "edit.copy"]);
        assert!(!args.print);
        assert!(args.settings.is_none());
    }

    #[test]
    fn test_parse_long_flags() {
        let args = parse(&["--settings", "rig.ron", "--write-settings", "out.ron", "--print"]).unwrap();
        assert_eq!(args.settings, Some(PathBuf::from("rig.ron")));
        assert_eq!(args.write_settings, Some(PathBuf::from("out.ron")));
        assert!(args.print);
        assert!(args.patch.is_none());
    }

    #[test]
    fn test_command_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse(&["--settings"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(parse(&["a.json", "b.json"]).is_err());
    }
}
