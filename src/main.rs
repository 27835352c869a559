use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use lead_relay::browser::{cdp::CdpBrowser, Browser, LaunchOptions, WaitUntil};
use lead_relay::{
    FormSubmitter, Orchestrator, OrchestratorConfig, Prospect, ProxyEndpoint,
    ProxySettings, ZipDatabase, ZipNeighbors, ZipRoutingScheme,
};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Lead form submitter with zip-targeted proxy rotation
#[derive(Parser)]
#[command(name = "lead-relay")]
#[command(about = "Lead form submitter with zip-targeted proxy rotation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Zip code gazetteer database path
    #[arg(long, default_value = "zipcodes.db")]
    zip_db: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a lead to the target form
    Submit {
        /// Prospect full name
        #[arg(long)]
        name: String,
        /// Prospect phone number
        #[arg(long)]
        phone: String,
        /// Prospect zip code
        #[arg(long)]
        zip: String,
        /// Maximum submission attempts
        #[arg(long, default_value = "5")]
        budget: u32,
        /// Initial nearby-zip search radius in miles
        #[arg(long, default_value = "5")]
        radius: u32,
        /// Run the browser with a visible window
        #[arg(long)]
        headed: bool,
        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },
    /// List zip codes near a given zip
    Nearby {
        /// Center zip code
        zip: String,
        /// Search radius in miles
        #[arg(long, default_value = "5")]
        radius: u32,
        /// Maximum results
        #[arg(long, default_value = "10")]
        max: usize,
    },
    /// Launch the browser through a zip-targeted proxy and print the egress IP
    CheckProxy {
        /// Zip code to route through
        zip: String,
        /// URL that echoes the caller's IP
        #[arg(long, default_value = lead_relay::submit::form::DEFAULT_VERIFY_URL)]
        verify_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            name,
            phone,
            zip,
            budget,
            radius,
            headed,
            json,
        } => {
            let prospect = Prospect::new(&name, &phone, &zip);
            prospect.validate()?;

            let proxy = ProxySettings::from_env();
            let geo = match ZipDatabase::open(&cli.zip_db).await {
                Ok(db) => Some(db),
                Err(e) => {
                    warn!(path = %cli.zip_db, error = %e, "zip database unavailable, retry search disabled");
                    None
                }
            };

            let submitter = FormSubmitter::new(CdpBrowser::new())
                .with_options(LaunchOptions::new().with_headless(!headed));
            let orchestrator = Orchestrator::new(submitter, geo, proxy).with_config(
                OrchestratorConfig::new()
                    .with_attempt_budget(budget)
                    .with_initial_radius_miles(radius),
            );

            let verdict = orchestrator.run(&prospect).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                println!("{}", verdict.message);
            }
            if !verdict.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Nearby { zip, radius, max } => {
            let db = ZipDatabase::open(&cli.zip_db).await?;
            let neighbors = db.nearby(&zip, f64::from(radius), max).await;
            if neighbors.is_empty() {
                println!("No zip codes found within {} miles of {}.", radius, zip);
            } else {
                for neighbor in neighbors {
                    println!("{}", neighbor);
                }
            }
        }
        Commands::CheckProxy { zip, verify_url } => {
            let settings = ProxySettings::from_env()
                .ok_or_else(|| anyhow!("proxy environment variables are not configured"))?;
            let endpoint = ProxyEndpoint::for_zip(&settings, &ZipRoutingScheme::default(), &zip);
            println!("Checking proxy {}", endpoint);

            let browser = CdpBrowser::new();
            let mut page = browser
                .launch(&LaunchOptions::default(), Some(&endpoint))
                .await?;
            let result = async {
                page.goto(&verify_url, WaitUntil::Load, Duration::from_secs(30))
                    .await?;
                page.text_content("pre", Duration::from_secs(5)).await
            }
            .await;
            page.close().await;

            match result {
                Ok(ip) => println!("Egress IP for zip {}: {}", zip, ip.trim()),
                Err(e) => return Err(anyhow!("proxy check failed: {}", e)),
            }
        }
    }

    Ok(())
}
