mod answers;
mod artifacts;
mod cli;
mod component;
mod constants;
mod container_source;
mod error;
mod graph;
mod lock;
mod logging;
mod manifest;
mod orchestrator;
mod providers;
mod status;

use std::collections::BTreeMap;

use clap::Parser;
use tracing::{error, info, warn};

use crate::answers::AnswerValue;
use crate::cli::{Cli, Command, ModeOverride};
use crate::container_source::ContainerSource;
use crate::error::AppError;
use crate::orchestrator::Orchestrator;
use crate::status::StatusSnapshot;

fn main() {
    let exit_code = run();
    std::process::exit(exit_code);
}

fn run() -> i32 {
    let cli = Cli::parse_from(cli::effective_args());
    logging::init(cli.verbose, cli.quiet, cli.logtype);
    check_mode_override(&cli);

    let status_handle = cli.status_addr.map(status::spawn);
    if let Some(handle) = &status_handle {
        handle.update(StatusSnapshot {
            command: command_name(&cli.command).to_owned(),
            groups: Vec::new(),
        });
    }

    let container_source = ContainerSource::new("podman", cli.dry_run);
    let orchestrator = Orchestrator::new(container_source, cli.dry_run);

    match dispatch(&cli, &orchestrator, status_handle.as_ref()) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err, cli.verbose);
            err.exit_code()
        }
    }
}

fn check_mode_override(cli: &Cli) {
    let Some(mode) = cli.mode else { return };
    let matches = matches!(
        (mode, &cli.command),
        (ModeOverride::Fetch, Command::Fetch { .. })
            | (ModeOverride::Run, Command::Run { .. })
            | (ModeOverride::Stop, Command::Stop { .. })
            | (ModeOverride::Genanswers, Command::Genanswers { .. })
    );
    if !matches {
        warn!(?mode, command = command_name(&cli.command), "--mode does not match the chosen subcommand, ignoring");
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Fetch { .. } => "fetch",
        Command::Run { .. } => "run",
        Command::Stop { .. } => "stop",
        Command::Genanswers { .. } => "genanswers",
        Command::Init { .. } => "init",
        Command::Index { .. } => "index",
    }
}

fn dispatch(cli: &Cli, orchestrator: &Orchestrator, status_handle: Option<&status::StatusHandle>) -> Result<(), AppError> {
    match &cli.command {
        Command::Fetch {
            no_deps,
            update,
            destination,
            app_spec,
        } => {
            let outcome = orchestrator.fetch(app_spec.as_deref(), destination.clone(), *no_deps, *update)?;
            info!(target: "atomicapp::ui", root = ?outcome.root, components = outcome.component_count, "fetched application");
            Ok(())
        }

        Command::Run {
            answers,
            write_answers,
            provider,
            ask,
            destination,
            app_spec,
        } => {
            let _lock = lock::Lock::acquire(std::path::Path::new(constants::LOCK_PATH))?;
            let outcome = orchestrator.run(
                app_spec.as_deref(),
                destination.clone(),
                answers.as_deref(),
                write_answers.as_deref(),
                provider.as_deref(),
                cli_overrides(cli),
                *ask,
                cli.answers_format.map(Into::into),
                status_handle,
            )?;
            info!(
                target: "atomicapp::ui",
                root = ?outcome.root,
                answers = ?outcome.runtime_answers_path,
                "application deployed"
            );
            Ok(())
        }

        Command::Stop { provider, app_spec } => {
            let _lock = lock::Lock::acquire(std::path::Path::new(constants::LOCK_PATH))?;
            orchestrator.stop(app_spec, provider.as_deref())?;
            info!(target: "atomicapp::ui", %app_spec, "application stopped");
            Ok(())
        }

        Command::Genanswers { app_spec } => {
            let path = orchestrator.genanswers(app_spec.as_deref(), cli.answers_format.map(Into::into))?;
            info!(target: "atomicapp::ui", path = ?path, "sample answer file written");
            Ok(())
        }

        Command::Init { app_name, destination } => {
            scaffold_init(app_name, destination.as_deref())
        }

        Command::Index { action } => scaffold_index(action),
    }
}

fn cli_overrides(cli: &Cli) -> BTreeMap<String, AnswerValue> {
    let mut overrides = BTreeMap::new();
    if let Some(namespace) = &cli.namespace {
        overrides.insert("namespace".to_owned(), AnswerValue::String(namespace.clone()));
    }
    if let Some(api) = &cli.provider_api {
        overrides.insert("provider-api".to_owned(), AnswerValue::String(api.clone()));
    }
    if let Some(auth) = &cli.provider_auth {
        overrides.insert("provider-auth".to_owned(), AnswerValue::String(auth.clone()));
    }
    if let Some(cafile) = &cli.provider_cafile {
        overrides.insert("provider-cafile".to_owned(), AnswerValue::String(cafile.clone()));
    }
    if let Some(config) = &cli.provider_config {
        overrides.insert("provider-config".to_owned(), AnswerValue::String(config.clone()));
    }
    if let Some(tlsverify) = cli.provider_tlsverify {
        overrides.insert("provider-tlsverify".to_owned(), AnswerValue::Bool(tlsverify));
    }
    overrides
}

/// `init` is a scaffolding convenience, not part of the core engine: it
/// writes a minimal Manifest skeleton so a new application has somewhere to
/// grow from.
fn scaffold_init(app_name: &str, destination: Option<&std::path::Path>) -> Result<(), AppError> {
    let root = destination.map(std::path::Path::to_owned).unwrap_or_else(|| std::path::PathBuf::from(app_name));
    std::fs::create_dir_all(root.join(constants::ARTIFACTS_DIR).join("kubernetes"))
        .map_err(|err| AppError::Other(anyhow::anyhow!(err)))?;

    let manifest = format!(
        "id: {app_name}\nspecversion: \"1.0\"\nparams:\n  - name: namespace\n    default: {app_name}\nartifacts:\n  kubernetes:\n    - artifacts/kubernetes\n"
    );
    std::fs::write(root.join(constants::MANIFEST_NAME), manifest)
        .map_err(|err| AppError::Other(anyhow::anyhow!(err)))?;

    info!(target: "atomicapp::ui", %app_name, root = ?root, "scaffolded new application");
    Ok(())
}

fn scaffold_index(action: &cli::IndexAction) -> Result<(), AppError> {
    match action {
        cli::IndexAction::List => {
            info!(target: "atomicapp::ui", "no index catalog configured");
            Ok(())
        }
        cli::IndexAction::Update => {
            info!(target: "atomicapp::ui", "no index catalog configured, nothing to update");
            Ok(())
        }
        cli::IndexAction::Generate { location } => Err(AppError::Other(anyhow::anyhow!(
            "index generation against '{location}' requires a catalog backend, which is out of scope for the core engine"
        ))),
    }
}

fn report_error(err: &AppError, verbose: bool) {
    if verbose {
        error!("{err:#?}");
    } else {
        error!("{err}");
    }
}
