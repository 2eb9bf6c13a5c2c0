use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::{base_url, handle_request_error};

/// Format a relative time string like "2 minutes ago".
fn format_relative_time(dt: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(*dt).num_seconds().max(0);
    if secs < 60 {
        format!("{} seconds ago", secs)
    } else if secs < 3600 {
        format!("{} minutes ago", secs / 60)
    } else if secs < 86400 {
        format!("{} hours ago", secs / 3600)
    } else {
        format!("{} days ago", secs / 86400)
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

async fn error_message(response: reqwest::Response) -> String {
    match response.json::<Value>().await {
        Ok(body) => body["message"].as_str().unwrap_or("Unknown error").to_string(),
        Err(_) => "Unknown error".to_string(),
    }
}

/// cvi push
pub async fn cmd_push(host: &str, port: u16, url: &str, tags: &[String]) -> anyhow::Result<()> {
    let client = Client::new();
    let response = client
        .post(format!("{}/api/jobs", base_url(host, port)))
        .json(&json!({ "url": url, "tags": tags }))
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;

    if !response.status().is_success() {
        anyhow::bail!("{}", error_message(response).await);
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))?;
    println!("Queued job {}", body["id"].as_str().unwrap_or("?"));
    Ok(())
}

/// cvi list
pub async fn cmd_list(host: &str, port: u16, json: bool) -> anyhow::Result<()> {
    let client = Client::new();
    let response = client
        .get(format!("{}/api/jobs", base_url(host, port)))
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;

    if !response.status().is_success() {
        anyhow::bail!("{}", error_message(response).await);
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let empty_vec = vec![];
    let jobs = body.as_array().unwrap_or(&empty_vec);
    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    println!("{}", render_table(jobs, Utc::now()));
    Ok(())
}

fn render_table(jobs: &[Value], now: DateTime<Utc>) -> String {
    let mut lines = vec![format!(
        "{:<8}{:<10}{:<18}{:<42}{}",
        "ID", "STATUS", "CREATED", "URL", "PROGRESS"
    )];

    for job in jobs {
        let created = job["created_at"]
            .as_str()
            .and_then(|ts| ts.parse::<DateTime<Utc>>().ok())
            .map(|dt| format_relative_time(&dt, now))
            .unwrap_or_else(|| "-".to_string());

        let detail = match job["status"].as_str() {
            Some("failed") => job["failures"]
                .as_array()
                .and_then(|f| f.last())
                .and_then(|f| f["error"].as_str())
                .unwrap_or("")
                .to_string(),
            Some("finished") => job["result"]["url"]
                .as_str()
                .or_else(|| job["result"]["title"].as_str())
                .unwrap_or("")
                .to_string(),
            _ => job["progress"].as_str().unwrap_or("").to_string(),
        };

        lines.push(format!(
            "{:<8}{:<10}{:<18}{:<42}{}",
            job["id"].as_str().unwrap_or("?"),
            job["status"].as_str().unwrap_or("?"),
            created,
            truncate(job["data"]["url"].as_str().unwrap_or("?"), 40),
            detail
        ));
    }
    lines.join("\n")
}

/// cvi remove
pub async fn cmd_remove(host: &str, port: u16, id: &str) -> anyhow::Result<()> {
    let client = Client::new();
    let response = client
        .delete(format!("{}/api/jobs/{}", base_url(host, port), id))
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;

    match response.status() {
        StatusCode::NO_CONTENT => {
            println!("Removed job {}", id);
            Ok(())
        }
        _ => anyhow::bail!("{}", error_message(response).await),
    }
}
