//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use firstparty_core::submodules::{self, PageInfo};
use firstparty_core::{AUCTION_START, BootstrapOptions, MODULE_NAME, bootstrap};
use firstparty_shared::{
    AppConfig, AuctionRequest, SharedConfig, init_config, load_config, load_config_from,
};
use tracing::info;
use url::Url;

use crate::host::LocalHost;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// FirstParty — enrich auction requests with first-party data.
#[derive(Parser)]
#[command(
    name = "firstparty",
    version,
    about = "Run the first-party-data pipeline over auction-start requests.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.firstparty/firstparty.toml).
    #[arg(long, global = true, env = "FIRSTPARTY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run an auction-start request through the FPD interceptor and print it.
    Run {
        /// Request JSON file, or `-` for stdin.
        #[arg(short, long, default_value = "-")]
        request: String,

        /// Page URL used by the `enrichments` submodule.
        #[arg(long)]
        page_url: Option<String>,

        /// Referrer URL used by the `enrichments` submodule.
        #[arg(long)]
        referrer: Option<String>,

        /// Page keywords (comma-separated).
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,

        /// Viewport as WIDTHxHEIGHT.
        #[arg(long)]
        viewport: Option<String>,

        /// Per-submodule timeout in milliseconds (overrides config).
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "firstparty=info",
        1 => "firstparty=debug",
        _ => "firstparty=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so stdout stays pipeable JSON.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run {
            request,
            page_url,
            referrer,
            keywords,
            viewport,
            timeout_ms,
        } => {
            let page = page_info(
                page_url.as_deref(),
                referrer.as_deref(),
                keywords,
                viewport.as_deref(),
            )?;
            cmd_run(config_path.as_deref(), &request, page, timeout_ms).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn page_info(
    page_url: Option<&str>,
    referrer: Option<&str>,
    keywords: Vec<String>,
    viewport: Option<&str>,
) -> Result<PageInfo> {
    let parse = |raw: &str| Url::parse(raw).map_err(|e| eyre!("invalid URL '{raw}': {e}"));

    let viewport = match viewport {
        Some(raw) => {
            let (w, h) = raw
                .split_once('x')
                .ok_or_else(|| eyre!("invalid viewport '{raw}': expected WIDTHxHEIGHT"))?;
            Some((
                w.trim().parse().wrap_err("invalid viewport width")?,
                h.trim().parse().wrap_err("invalid viewport height")?,
            ))
        }
        None => None,
    };

    Ok(PageInfo {
        page: page_url.map(parse).transpose()?,
        referrer: referrer.map(parse).transpose()?,
        keywords: keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        viewport,
    })
}

fn read_request(source: &str) -> Result<AuctionRequest> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .wrap_err("failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).wrap_err_with(|| format!("failed to read '{source}'"))?
    };

    Ok(AuctionRequest::from_json(&raw)?)
}

async fn cmd_run(
    config_path: Option<&Path>,
    request: &str,
    page: PageInfo,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if timeout_ms.is_some() {
        config.pipeline.submodule_timeout_ms = timeout_ms;
    }

    let req = read_request(request)?;

    let host = LocalHost::default();
    let options = BootstrapOptions::from(&config);
    let module = bootstrap(&host, Arc::new(SharedConfig::new(config)), options);

    // Built-ins go through the host's registration path like any other module would.
    let register = host.registrar(MODULE_NAME)?;
    for submodule in submodules::builtin(page) {
        register(submodule);
    }

    info!(
        submodules = ?module.registry().names(),
        auction_id = req.auction_id.as_deref().unwrap_or("-"),
        "starting auction"
    );

    let enriched = host.run(AUCTION_START, req).await?;
    println!("{}", serde_json::to_string_pretty(&enriched)?);

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
