mod cli;

use std::io;

use clap::Parser;
use cli::{DevCmd, FetchOpts, Opts, OptsCmd, RunOpts};
use comicfeed::candidates::{CandidateError, CandidateSource};
use comicfeed::day::DayKey;
use comicfeed::publisher::{PublicationBuilder, PublishError};
use comicfeed::resolver::{ComicResolver, FetchError, HttpFetcher, Resolution, ResolverError};
use comicfeed::store::{StoreError, UsedComicsStore};
use comicfeed::strategy::{StrategyError, default_chain};
use comicfeed::{RunError, RunOutcome, RunSettings, run_once};
use snafu::{ResultExt, Snafu};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub const LOG_TARGET: &str = "comicfeed::cli";

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Logging initialization failed"))]
    Logging,
    #[snafu(display("Candidates error: {source}"))]
    Candidates { source: CandidateError },
    #[snafu(display("Invalid site profile: {source}"))]
    Strategy { source: StrategyError },
    #[snafu(display("Resolver error: {source}"))]
    Resolver { source: ResolverError },
    #[snafu(display("Fetch error: {source}"))]
    Fetch { source: FetchError },
    #[snafu(display("Store error: {source}"))]
    Store { source: StoreError },
    #[snafu(display("Publishing error: {source}"))]
    Publish { source: PublishError },
    #[snafu(transparent)]
    Run { source: RunError },
    #[snafu(display("Failed to encode output"))]
    Output { source: serde_json::Error },
    #[snafu(display("Could not resolve any candidate ({attempted} tried), operator attention needed"))]
    Exhausted { attempted: usize },
}

pub type CliResult<T> = std::result::Result<T, CliError>;

#[snafu::report]
#[tokio::main(flavor = "current_thread")]
async fn main() -> CliResult<()> {
    init_logging()?;

    let opts = Opts::parse();
    let out = handle_cmd(opts).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&out).context(OutputSnafu)?
    );
    Ok(())
}

async fn handle_cmd(opts: Opts) -> CliResult<serde_json::Value> {
    Ok(match opts.cmd {
        OptsCmd::Run(run_opts) => {
            let outcome = handle_run(&run_opts).await?;
            let out = serde_json::to_value(&outcome).context(OutputSnafu)?;
            if let RunOutcome::Exhausted { attempted, .. } = outcome {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&out).context(OutputSnafu)?
                );
                return Err(CliError::Exhausted { attempted });
            }
            out
        }
        OptsCmd::Rebuild { state, site } => {
            let store =
                UsedComicsStore::load(&state.state_file, state.key_mode).context(StoreSnafu)?;
            let publisher = PublicationBuilder::new(site.to_site_config());
            let artifacts = publisher.rebuild(&store).context(PublishSnafu)?;
            serde_json::to_value(artifacts).context(OutputSnafu)?
        }
        OptsCmd::Dev(DevCmd::Resolve { url, fetch }) => {
            let resolver = make_resolver(&fetch)?;
            match resolver
                .resolve(&url, DayKey::today_utc())
                .await
                .context(FetchSnafu)?
            {
                Resolution::Found(comic) => serde_json::to_value(comic).context(OutputSnafu)?,
                Resolution::NotFound { final_url, body } => serde_json::json!({
                    "final_url": final_url.as_str(),
                    "found": false,
                    "body_bytes": body.len(),
                }),
            }
        }
    })
}

async fn handle_run(opts: &RunOpts) -> CliResult<RunOutcome> {
    let day = opts.day();
    info!(
        target: LOG_TARGET,
        %day,
        candidates = %opts.candidates.display(),
        state_file = %opts.state.state_file.display(),
        key_mode = %opts.state.key_mode,
        base_url = %opts.site.base_url,
        "Starting run"
    );

    let mut store =
        UsedComicsStore::load(&opts.state.state_file, opts.state.key_mode).context(StoreSnafu)?;
    let candidates = CandidateSource::read(&opts.candidates)
        .context(CandidatesSnafu)?
        .ordered_for(day, opts.candidate_order);
    let resolver = make_resolver(&opts.fetch)?;
    let publisher = PublicationBuilder::new(opts.site.to_site_config());

    let settings = RunSettings {
        day,
        max_attempts: opts.max_attempts,
        debug_file: opts.debug_file.clone(),
    };

    Ok(run_once(&settings, &candidates, &mut store, &resolver, &publisher).await?)
}

fn make_resolver(opts: &FetchOpts) -> CliResult<ComicResolver> {
    let strategies = default_chain(&opts.site_profile()).context(StrategySnafu)?;
    let fetcher =
        HttpFetcher::new(opts.timeout(), &opts.user_agent).context(ResolverSnafu)?;
    Ok(ComicResolver::new(Box::new(fetcher), strategies))
}

pub fn init_logging() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|_| CliError::Logging)?;

    Ok(())
}
