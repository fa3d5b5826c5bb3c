use std::{fs::File, io::BufReader, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::info;

mod builder;
use builder::{BuildSettings, Builder};

mod config;
use config::DispatchConfig;

mod dispatch;
use dispatch::{BuildRequest, ChannelInvoker, DispatchOutcome, Dispatcher};

mod webhooks;
use webhooks::{
    github::{handle_event, GitHubApi, GitHubSecret},
    Gatekeeper, InboundEvent,
};

#[derive(Parser)]
#[clap(version)]
struct Opts {
    /// Configuration file for docs-dispatch
    #[clap(short, long, parse(from_os_str))]
    config: PathBuf,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for GitHub webhooks (the default)
    Serve,
    /// Run a recorded event through the webhook handler, and wait for the build it triggers
    Replay {
        /// JSON event record, with `headers`, `body` and `isBase64Encoded`
        #[clap(parse(from_os_str))]
        event: PathBuf,
    },
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();
    let mut config = DispatchConfig::load(&opts.config)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());

    let (sender, receiver) = unbounded_channel();

    let gatekeeper = Gatekeeper::new(
        GitHubSecret(config.secret()?.to_owned()),
        Box::new(GitHubApi::new(&config)?),
        config.docs_marker.clone(),
    );
    let dispatcher = Dispatcher::new(Box::new(ChannelInvoker(sender)));
    let builder = Builder::new(BuildSettings::from(&config));

    match opts.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tokio::spawn(async move { builder.run(receiver).await });

            webhooks::rocket(gatekeeper, dispatcher)
                .launch()
                .await
                .map(|_| ())
                .map_err(|err| anyhow::anyhow!(err))
        }
        Command::Replay { event } => {
            replay(event, gatekeeper, dispatcher, builder, receiver).await
        }
    }
}

async fn replay(
    event_file: PathBuf,
    gatekeeper: Gatekeeper,
    dispatcher: Dispatcher,
    builder: Builder,
    receiver: UnboundedReceiver<BuildRequest>,
) -> anyhow::Result<()> {
    let file = File::open(&event_file)
        .with_context(|| format!("couldn't open {}:", event_file.display()))?;
    let event: InboundEvent =
        serde_json::from_reader(BufReader::new(file)).context("couldn't parse event record")?;

    let outcome = handle_event(&event, &gatekeeper, &dispatcher)
        .await
        .unwrap_or_else(DispatchOutcome::from);
    println!("{} {}", outcome.status_code, outcome.body);

    // closes the channel, so the builder stops once the replayed build (if any) is done
    drop(dispatcher);
    builder.run(receiver).await;
    info!("replay finished");

    Ok(())
}
