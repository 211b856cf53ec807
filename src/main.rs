use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use shikake::{Config, Environment, Profile, theme};

/// Builds theme assets and keeps the browser in sync while developing.
#[derive(Parser, Debug)]
#[command(name = "shikake", version, about)]
struct Args {
    /// Tasks to run. Without any, the whole theme is built in production and
    /// developed with a server and live reload otherwise.
    tasks: Vec<String>,

    /// Build for production.
    #[arg(short, long)]
    production: bool,

    /// Only `production` selects the production profile.
    #[arg(long, env = "NODE_ENV", hide = true)]
    node_env: Option<String>,

    /// Configuration file, defaults to `shikake.toml` when present.
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Port of the development HTTP server.
    #[arg(long)]
    port: Option<u16>,

    /// Preferred port of the live-reload socket.
    #[arg(long)]
    reload_port: Option<u16>,

    /// List all tasks and exit.
    #[arg(long)]
    list: bool,

    /// Print the task graph as a Mermaid flowchart and exit.
    #[arg(long)]
    graph: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let indicatif = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif.get_stderr_writer()))
        .with(indicatif)
        .init();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let profile = match args.production {
        true => Profile::Production,
        false => Profile::from_node_env(args.node_env.as_deref()),
    };

    let graph = theme::tasks(profile)?;

    if args.list {
        for task in graph.tasks() {
            println!("{task}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    if args.graph {
        print!("{graph}");
        return Ok(ExitCode::SUCCESS);
    }

    let base = Utf8PathBuf::try_from(std::env::current_dir()?)?;
    let mut config = Config::load(&base, args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(port) = args.reload_port {
        config.server.reload_port = port;
    }

    let env = Environment::new(profile, base, config)?;
    tracing::info!(profile = profile.as_str(), "starting");

    if args.tasks.is_empty() {
        match profile {
            Profile::Production => {
                let report = theme::build(&graph, &env)?;
                tracing::info!("build complete\n{report}");
            }
            Profile::Development => theme::develop(&graph, &env)?,
        }
        return Ok(ExitCode::SUCCESS);
    }

    let tasks: Vec<&str> = args.tasks.iter().map(String::as_str).collect();
    let report = graph.run_all(&env, &tasks)?;
    tracing::info!("\n{report}");

    Ok(match report.is_success() {
        true => ExitCode::SUCCESS,
        false => ExitCode::FAILURE,
    })
}
