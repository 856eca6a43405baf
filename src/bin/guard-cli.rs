use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Management CLI for the admission guard", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "GUARD_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check guard status
    Status,
    /// Inspector and per-policy statistics with recent events
    Overview,
    /// Recent audit events
    Logs {
        /// info, warning or error
        #[arg(long)]
        level: Option<String>,
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        identity: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Threat summary for the last 24 hours
    Threats,
    /// Clear a rate-limit block, e.g. `ip:9.9.9.9` or `user:42`
    Unblock {
        identifier: String,
        /// chat, api, auth, admin or all
        #[arg(long, default_value = "all")]
        scope: String,
    },
    /// Add an address to the inspector blocklist
    BlockIp {
        ip: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Remove an address from the inspector blocklist
    UnblockIp { ip: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Overview => client.get(format!("{base}/admin/security/overview")),
        Commands::Logs {
            level,
            ip,
            identity,
            offset,
            limit,
        } => {
            let mut query = vec![
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ];
            query.extend(level.map(|v| ("level", v)));
            query.extend(ip.map(|v| ("ip", v)));
            query.extend(identity.map(|v| ("identity", v)));
            client
                .get(format!("{base}/admin/security/logs"))
                .query(&query)
        }
        Commands::Threats => client.get(format!("{base}/admin/security/threats")),
        Commands::Unblock { identifier, scope } => client
            .post(format!("{base}/admin/security/unblock-rate-limit"))
            .json(&json!({ "identifier": identifier, "type": scope })),
        Commands::BlockIp { ip, reason } => client
            .post(format!("{base}/admin/security/block-ip"))
            .json(&json!({ "ip": ip, "reason": reason })),
        Commands::UnblockIp { ip } => client
            .post(format!("{base}/admin/security/unblock-ip"))
            .json(&json!({ "ip": ip })),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
