use std::{path::Path, process::ExitCode};

use clap::Parser;
use cli::{Args, Commands};
use extmirror_config::config::{generate_default_config, Config};
use extmirror_core::{
    context::{MirrorContext, SyncOptions},
    error::MirrorError,
};
use extmirror_dl::{
    http_client::{ClientConfig, HttpClient},
    pool::Interrupt,
};
use logging::setup_logging;
use miette::Result;
use query::{get, meta, query, show_info};
use stats::write_stats;
use sync::sync_mirror;
use tracing::{debug, warn};
use utils::{disable_color, EXIT_ABORTED, EXIT_NO_RESULTS};
use verify::verify_files;

mod cli;
mod logging;
mod query;
mod stats;
mod sync;
mod utils;
mod verify;

/// Whether a command found something to act on.
enum Outcome {
    Done,
    NoResults,
}

impl From<bool> for Outcome {
    fn from(found: bool) -> Self {
        if found {
            Outcome::Done
        } else {
            Outcome::NoResults
        }
    }
}

fn http_client(args: &Args, config: &Config) -> Result<HttpClient> {
    let mut client = ClientConfig {
        user_agent: Some(
            args.user_agent
                .clone()
                .unwrap_or_else(|| config.user_agent()),
        ),
        timeout: Some(config.request_timeout()?),
        ..ClientConfig::default()
    };
    if let Some(proxy) = args.proxy.as_deref() {
        client = client.with_proxy(proxy)?;
    }
    for header in args.header.iter().flatten() {
        client = client.with_header(header)?;
    }
    Ok(client.build())
}

/// Raises the interrupt flag on Ctrl-C so that running downloads wind down.
fn watch_interrupt(interrupt: Interrupt) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for running downloads to finish");
            interrupt.trigger();
        }
    });
}

async fn handle_cli(args: Args) -> Result<Outcome> {
    let config_path = args.config.as_deref().map(Path::new);

    if let Some(Commands::DefConfig) = args.command {
        generate_default_config(config_path)?;
        return Ok(Outcome::Done);
    }

    let mut config = Config::load(config_path)?;
    if let Some(workdir) = &args.workdir {
        config.workdir = Some(workdir.clone());
    }
    debug!("using working directory {}", config.workdir()?.display());

    let interrupt = Interrupt::new();
    watch_interrupt(interrupt.clone());
    let client = http_client(&args, &config)?;
    let mut ctx = MirrorContext::open(config, client, interrupt)?;

    let outcome = match args.command.unwrap_or(Commands::Info) {
        Commands::Sync {
            no_meta,
            max_pages,
            max_records,
            min_users,
            max_users,
        } => {
            let options = SyncOptions {
                no_meta,
                max_pages,
                max_records,
                min_users,
                max_users,
            };
            sync_mirror(&mut ctx, options).await?;
            Outcome::Done
        }
        Commands::Query { selectors } => query(&ctx, &selectors).into(),
        Commands::Get { selectors } => get(&ctx, &selectors).into(),
        Commands::Info => {
            show_info(&ctx);
            Outcome::Done
        }
        Commands::Meta { selectors } => meta(&ctx, &selectors)?.into(),
        Commands::Stats { output } => {
            write_stats(&ctx, output.as_deref())?;
            Outcome::Done
        }
        Commands::Verify { selectors } => verify_files(&ctx, &selectors)?.into(),
        Commands::DefConfig => Outcome::Done,
    };

    Ok(outcome)
}

fn is_interrupted(err: &miette::Report) -> bool {
    matches!(err.downcast_ref::<MirrorError>(), Some(MirrorError::Interrupted))
}

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let args = Args::parse();
    if args.no_color {
        disable_color();
    }
    if let Err(err) = setup_logging(&args) {
        eprintln!("{err:?}");
        return ExitCode::FAILURE;
    }

    match handle_cli(args).await {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::NoResults) => {
            warn!("No results");
            ExitCode::from(EXIT_NO_RESULTS)
        }
        Err(err) if is_interrupted(&err) => {
            eprintln!("{err:?}");
            ExitCode::from(EXIT_ABORTED)
        }
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        }
    }
}
