use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use tunnelforge_gateway::config::{self, validate};
use tunnelforge_gateway::http::HealthReport;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the TunnelForge gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:4020")]
    url: String,

    /// Send the local bypass header (only honored from loopback).
    #[arg(long)]
    local: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query gateway health
    Health,
    /// Fetch a CSRF token
    CsrfToken,
    /// Print the configuration the gateway would load from this environment
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    if cli.local {
        headers.insert("x-tunnelforge-local", HeaderValue::from_static("1"));
    }
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{base}/health")).send().await?;
            if !res.status().is_success() {
                return report_failure(res).await;
            }
            let health: HealthReport = res.json().await?;
            println!("{} {} ({})", health.server, health.version, health.status);
            println!("uptime:          {}s", health.uptime_secs);
            println!("requests served: {}", health.requests_served);
            for (provider, tunnel) in &health.tunnels {
                println!(
                    "tunnel {provider:<10} enabled={} configured={}",
                    tunnel.enabled, tunnel.configured
                );
            }
        }
        Commands::CsrfToken => {
            let res = client.get(format!("{base}/csrf-token")).send().await?;
            print_response(res).await?;
        }
        Commands::Config => {
            let (config, issues) = config::load_from_env();
            for issue in &issues {
                eprintln!("warning: {issue}");
            }
            for warning in validate(&config) {
                eprintln!("warning: {warning}");
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    if !res.status().is_success() {
        return report_failure(res).await;
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn report_failure(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    eprintln!("Error: gateway returned status {}", status);
    if let Ok(text) = res.text().await {
        eprintln!("Response: {}", text);
    }
    Err(format!("request failed with status {status}").into())
}
