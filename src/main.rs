use std::sync::Arc;

use anyhow::{Context, anyhow};

use mail_forwarder::config::ForwarderConfig;
use mail_forwarder::handler::{ArrivalEvent, Forwarder};
use mail_forwarder::store::FsStore;
use mail_forwarder::transport::{SmtpConfig, SmtpRelay};

const USAGE: &str = "usage: mail-forwarder <message-id> [envelope-recipient ...]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let message_id = args.next().context(USAGE)?;
    let recipients: Vec<String> = args.collect();

    // Configuration errors surface before any message is touched.
    let config = ForwarderConfig::from_env().context("Invalid forwarder configuration")?;
    let smtp = SmtpConfig::from_env().context("Invalid SMTP configuration")?;

    let store_root =
        std::env::var("MAIL_FORWARDER_STORE_ROOT").unwrap_or_else(|_| "./data".to_string());

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        region = %config.region,
        bucket = %config.s3_bucket,
        rules = config.email_list.entries().len(),
        catch_all = config.email_list.catch_all().is_some(),
        "mail-forwarder starting"
    );

    let store = Arc::new(FsStore::new(&store_root, &config.s3_bucket, &config.s3_prefix));
    let transport = Arc::new(SmtpRelay::new(&smtp)?);
    let forwarder = Forwarder::new(Arc::new(config), store, transport);

    let event = ArrivalEvent::new(message_id).with_recipients(recipients);
    let receipt = forwarder.handle(&event).await?;
    println!("Email sent! {receipt}");
    Ok(())
}
