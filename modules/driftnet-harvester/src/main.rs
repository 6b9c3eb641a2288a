use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use browserless_client::BrowserlessClient;
use driftnet_common::Config;
use driftnet_harvester::browse::{BrowserlessTimeline, ProxyCredentials};
use driftnet_harvester::harvester::{Harvester, RunMode};
use driftnet_harvester::settings;
use driftnet_harvester::store::{self, PgCheckpointStore, PgPostStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Start a new session.
    Fresh,
    /// Continue the most recently started session.
    ResumeLatest,
    /// Continue the session named by --id.
    ResumeById,
}

#[derive(Parser, Debug)]
#[command(name = "harvester", about = "Incremental timeline harvester")]
struct Args {
    /// Path to the harvest definition file.
    #[arg(long, default_value = "harvest.toml")]
    config: PathBuf,

    /// How to obtain the session's harvest log.
    #[arg(long, value_enum, default_value_t = Mode::Fresh)]
    mode: Mode,

    /// Harvest log id, required with --mode resume-by-id.
    #[arg(long)]
    id: Option<Uuid>,

    /// Stop once the window reaches this date (overrides the file's lower_bound).
    #[arg(long)]
    until: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("driftnet=info".parse()?))
        .init();

    let args = Args::parse();
    let mode = match (args.mode, args.id) {
        (Mode::Fresh, _) => RunMode::Fresh,
        (Mode::ResumeLatest, _) => RunMode::ResumeLatest,
        (Mode::ResumeById, Some(id)) => RunMode::ResumeById(id),
        (Mode::ResumeById, None) => bail!("--mode resume-by-id requires --id"),
    };

    info!("Driftnet harvester starting...");

    let config = Config::harvester_from_env();
    let file = settings::load(&args.config)?;

    let spec = file.search.into_spec()?;
    let scroll_delay = file.harvest.scroll_delay();
    let mut opts = file.harvest.into_options();
    if let Some(until) = args.until {
        opts.lower_bound = Some(until.and_time(NaiveTime::MIN).and_utc());
    }

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    store::migrate(&pool).await?;

    let proxy = match (config.proxy_username, config.proxy_password) {
        (Some(username), Some(password)) => Some(ProxyCredentials { username, password }),
        _ => {
            info!("Proxy authentication disabled");
            None
        }
    };

    let client = BrowserlessClient::new(
        &config.browserless_url,
        config.browserless_token.as_deref(),
    );
    let browser = BrowserlessTimeline::new(client, &config.cookie_path, proxy, scroll_delay)?;

    let harvester = Harvester::new(
        Arc::new(browser),
        Arc::new(PgCheckpointStore::new(pool.clone())),
        Arc::new(PgPostStore::new(pool)),
        spec,
        opts,
    );

    let stats = harvester.run(mode).await?;
    info!("Harvest session finished. {stats}");
    Ok(())
}
