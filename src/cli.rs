//! CLI surface, implemented with `clap`'s derive API.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogType {
    Cockpit,
    Color,
    Nocolor,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum AnswersFormatArg {
    Ini,
    Json,
    Xml,
    Yaml,
}

impl From<AnswersFormatArg> for crate::answers::AnswerFormat {
    fn from(value: AnswersFormatArg) -> Self {
        match value {
            AnswersFormatArg::Ini => crate::answers::AnswerFormat::Ini,
            AnswersFormatArg::Json => crate::answers::AnswerFormat::Json,
            AnswersFormatArg::Xml => crate::answers::AnswerFormat::Xml,
            AnswersFormatArg::Yaml => crate::answers::AnswerFormat::Yaml,
        }
    }
}

/// Destination directory for `fetch`/`run`, or the `none` sentinel meaning
/// "materialize in a temporary directory and delete on completion".
pub(crate) use crate::orchestrator::Destination;

pub(crate) fn parse_destination(s: &str) -> Result<Destination, std::convert::Infallible> {
    if s == "none" {
        Ok(Destination::Ephemeral)
    } else {
        Ok(Destination::Path(PathBuf::from(s)))
    }
}

#[derive(Parser, Debug)]
#[command(name = "atomicapp", about = "Deployment orchestrator for Nulecule-style applications")]
pub(crate) struct Cli {
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,

    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    #[arg(long, global = true, value_enum, default_value_t = LogType::Color)]
    pub(crate) logtype: LogType,

    /// Overrides the action verb selected by the subcommand.
    #[arg(long, global = true, value_enum)]
    pub(crate) mode: Option<ModeOverride>,

    #[arg(long, global = true)]
    pub(crate) dry_run: bool,

    #[arg(long, global = true, value_enum)]
    pub(crate) answers_format: Option<AnswersFormatArg>,

    #[arg(long, global = true)]
    pub(crate) namespace: Option<String>,

    #[arg(long, global = true)]
    pub(crate) provider_tlsverify: Option<bool>,

    #[arg(long, global = true)]
    pub(crate) provider_config: Option<String>,

    #[arg(long, global = true)]
    pub(crate) provider_cafile: Option<String>,

    #[arg(long, global = true)]
    pub(crate) provider_api: Option<String>,

    #[arg(long, global = true)]
    pub(crate) provider_auth: Option<String>,

    /// Optional read-only status endpoint address.
    #[arg(long, global = true)]
    pub(crate) status_addr: Option<std::net::SocketAddr>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum ModeOverride {
    Fetch,
    Run,
    Stop,
    Genanswers,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Resolve and materialize the full dependency graph without deploying.
    Fetch {
        #[arg(long)]
        no_deps: bool,
        #[arg(short, long)]
        update: bool,
        #[arg(long, value_parser = parse_destination)]
        destination: Option<Destination>,
        app_spec: Option<String>,
    },
    /// Resolve config, render artifacts and deploy via the selected provider.
    Run {
        #[arg(short = 'a', long)]
        answers: Option<PathBuf>,
        #[arg(long)]
        write_answers: Option<PathBuf>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        ask: bool,
        #[arg(long, value_parser = parse_destination)]
        destination: Option<Destination>,
        app_spec: Option<String>,
    },
    /// Undeploy using the persisted runtime answer file.
    Stop {
        #[arg(long)]
        provider: Option<String>,
        app_spec: String,
    },
    /// Write a sample answer file to the current working directory.
    Genanswers { app_spec: Option<String> },
    /// Scaffolding helper, not part of the core engine.
    Init {
        app_name: String,
        #[arg(long)]
        destination: Option<PathBuf>,
    },
    /// Catalog utility, not part of the core engine.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum IndexAction {
    List,
    Update,
    Generate { location: String },
}

/// Applies `ATOMICAPP_ARGS`/`ATOMICAPP_APPEND_ARGS` before handing the
/// final argument vector to `clap`.
pub(crate) fn effective_args() -> Vec<String> {
    let argv0 = std::env::args().next().unwrap_or_else(|| "atomicapp".to_owned());

    if let Ok(replacement) = std::env::var(crate::constants::ENV_ARGS) {
        let mut args = vec![argv0];
        args.extend(replacement.split_whitespace().map(str::to_owned));
        return args;
    }

    let mut args: Vec<String> = std::env::args().collect();

    if let Ok(appended) = std::env::var(crate::constants::ENV_APPEND_ARGS) {
        args.extend(appended.split_whitespace().map(str::to_owned));
    }

    args
}
