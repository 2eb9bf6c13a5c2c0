use reqwest::Client;
use serde_json::Value;

use super::{base_url, handle_request_error};
use crate::daemon::StartOptions;

/// cvi start
pub async fn cmd_start(options: StartOptions) -> anyhow::Result<()> {
    crate::daemon::start_daemon(options).await
}

/// cvi status
pub async fn cmd_status(host: &str, port: u16) -> anyhow::Result<()> {
    let client = Client::new();
    let url = format!("{}/health", base_url(host, port));

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))?;

    if !status.is_success() {
        let message = body["message"]
            .as_str()
            .unwrap_or("Importer returned an error");
        anyhow::bail!("{}", message);
    }

    let stats: Value = client
        .get(format!("{}/api/stats", base_url(host, port)))
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))?;

    println!("Importer Status: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("  Work Dir:    {}", body["work_dir"].as_str().unwrap_or("unknown"));
    println!("  Web UI:      http://{}:{}", host, port);
    println!("  Workers:     {}", body["workers"].as_u64().unwrap_or(0));
    println!("  Jobs:        {}", format_counts(&stats));
    println!(
        "  Waiting:     {} handoffs pending",
        body["pending_handoffs"].as_u64().unwrap_or(0)
    );
    println!(
        "  Uptime:      {}",
        format_uptime(body["uptime_seconds"].as_u64().unwrap_or(0))
    );
    println!("  Version:     {}", body["version"].as_str().unwrap_or("unknown"));

    Ok(())
}

/// "2 waiting, 1 started" style summary of a stats object.
fn format_counts(stats: &Value) -> String {
    let parts: Vec<String> = ["waiting", "started", "finished", "failed"]
        .iter()
        .filter_map(|name| {
            stats[*name]
                .as_u64()
                .filter(|n| *n > 0)
                .map(|n| format!("{} {}", n, name))
        })
        .collect();
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(", ")
    }
}

fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, mins, secs)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
