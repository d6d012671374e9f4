use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use rocket::routes;
use tokio::sync::mpsc::unbounded_channel;
use tracing_subscriber::EnvFilter;

mod bus;
use bus::NatsSink;

mod config;
use config::RelayConfig;

mod gitee;
use gitee::GiteeClient;

mod relay;
use relay::Relay;

mod webhooks;
use webhooks::{gitee_webhook, EnvelopeSender, GiteeSecret};

#[derive(Parser)]
#[command(version, about = "Publishes `ci checked` messages for software package pull requests")]
struct Opts {
    /// Configuration file for the relay
    #[arg(short, long)]
    config: PathBuf,
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opts = Opts::parse();
    let config = RelayConfig::load(&opts.config).context("load config failed")?;

    let nats = bus::connect(&config.nats).await.context("init NATS failed")?;
    let comments = GiteeClient::new(
        config.gitee.api_url.clone(),
        config.token.clone(),
        Duration::from_secs(config.gitee.timeout_secs),
    )
    .context("couldn't build Gitee client")?;
    let relay = Relay::new(&config, comments, NatsSink(nats.clone()));

    let subscriber = bus::subscribe_hooks(
        &nats,
        config.topics.software_pkg_hook_event.clone(),
        config.group_name.clone(),
    )
    .await
    .context("init hook subscription failed")?;

    let (sender, receiver) = unbounded_channel();
    tokio::spawn(async move { relay.run(receiver).await });

    let forwarding = bus::forward_hooks(subscriber, EnvelopeSender(sender.clone()));

    let serving = async move {
        match config.webhook {
            Some(webhook) => {
                let rocket = rocket::build()
                    .mount("/", routes![gitee_webhook])
                    .manage(EnvelopeSender(sender))
                    .manage(GiteeSecret(webhook.secret));
                rocket.launch().await.map_err(|err| anyhow!(err))?;
            }
            None => {
                tracing::info!("no webhook secret configured, HTTP intake disabled");
                drop(sender);
                tokio::signal::ctrl_c()
                    .await
                    .context("couldn't listen for shutdown signal")?;
            }
        }

        anyhow::Ok(())
    };

    tokio::select! {
        served = serving => served,
        () = forwarding => bail!("hook subscription ended"),
    }
}
