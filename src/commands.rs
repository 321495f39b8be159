use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, utils};
use common::config::Configuration;
use opentsdb::{DateCache, Host, QueryContext, Request, ResponseSet};

/// tsdbq: parse, normalize and run OpenTSDB queries
#[derive(Parser)]
#[command(name = "tsdbq", version, about)]
pub struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a request and print its canonical forms
    Parse {
        /// `start=1h-ago&m=avg:cpu{host=a}` or a JSON request body
        request: String,

        /// Print only the wire JSON
        #[arg(long)]
        json: bool,
    },
    /// Send a request to an OpenTSDB server and print the result series
    Query {
        /// `start=1h-ago&m=avg:cpu{host=a}` or a JSON request body
        request: String,

        /// Server address, overrides `tsdb.host`
        #[arg(long, env = "TSDBQ_HOST")]
        host: Option<String>,

        /// Downsample to about this many points, overrides `query.target_points`
        #[arg(long)]
        points: Option<i64>,

        /// Pin the request window to end at the current time as epoch seconds
        #[arg(long)]
        date_cache: bool,
    },
    /// Show the effective configuration
    Config {
        #[arg(long)]
        json: bool,
    },
}

/// Accept either the compact query string or a JSON request body
pub fn read_request(text: &str) -> Result<Request> {
    let text = text.trim();
    if text.starts_with('{') {
        Request::from_json(text.as_bytes()).context("Invalid JSON request")
    } else {
        Request::parse(text).context("Invalid request")
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        utils::init_logging(&self.common);
        let config = utils::init_config(self.common.config.as_ref())?;
        utils::validate_config(config)?;

        match self.command {
            Commands::Parse { request, json } => parse(&request, json),
            Commands::Query {
                request,
                host,
                points,
                date_cache,
            } => {
                let request = prepare(&request, points, config)?;
                let host = host.as_deref().unwrap_or(&config.tsdb.host);
                let rs = query(host, &request, date_cache, config).await?;
                println!("{}", serde_json::to_string_pretty(&rs)?);
                Ok(())
            }
            Commands::Config { json } => utils::display_config(config, json),
        }
    }
}

fn parse(text: &str, json: bool) -> Result<()> {
    let request = read_request(text)?;
    if json {
        println!("{}", request.to_json()?);
        return Ok(());
    }

    println!("request:  {request}");
    println!("json:     {}", request.to_json()?);
    match request.duration() {
        Ok(d) => println!("duration: {d}"),
        Err(e) => log::warn!("cannot resolve request window: {e}"),
    }
    for q in &request.queries {
        println!("query:    {q}");
    }
    Ok(())
}

/// Parse `text` and apply the auto-downsample target, the flag winning over
/// the configuration
fn prepare(text: &str, points: Option<i64>, config: &Configuration) -> Result<Request> {
    let mut request = read_request(text)?;
    let target = points.unwrap_or(config.query.target_points);
    if target > 0 {
        request
            .auto_downsample(target)
            .with_context(|| format!("Failed to downsample to {target} points"))?;
    } else if points.is_some() {
        anyhow::bail!("--points must be greater than zero");
    }
    Ok(request)
}

async fn query(
    host: &str,
    request: &Request,
    date_cache: bool,
    config: &Configuration,
) -> Result<ResponseSet> {
    let mut host = Host::with_timeout(host, config.tsdb.timeout)
        .with_context(|| format!("Invalid OpenTSDB host {host}"))?;
    log::info!("querying {}", host.url());

    let rs = if date_cache {
        let mut dc = DateCache::new(host, Utc::now());
        dc.query(request).await
    } else {
        host.query(request).await
    };
    rs.context("Query failed")
}
