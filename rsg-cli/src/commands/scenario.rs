use std::time::Duration;

use crate::client::{ClientError, GatewayCode, HttpClient};
use crate::output::{format_offset, format_value, print_output};
use crate::types::OutputFormat;
use serde_json::{Value, json};
use tracing::debug;

pub async fn handle_scenarios_command(
    client: &HttpClient,
    id: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match id {
        Some(id) => {
            let scenario: Value = client.get(&format!("/api/scenarios/{}", id)).await?;
            print_output(&scenario, format, render_scenario)
        }
        None => {
            let scenarios: Value = client.get("/api/scenarios").await?;
            print_output(&scenarios, format, render_scenario_list)
        }
    }
}

pub async fn handle_run_command(
    client: &HttpClient,
    id: &str,
    follow: bool,
    poll: Duration,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let ticket: Value = match client
        .post_empty(&format!("/api/scenarios/{}/start", id))
        .await
    {
        Ok(ticket) => ticket,
        Err(err) => {
            let hint = match err.code() {
                Some(GatewayCode::AlreadyRunning) => format!(
                    "cannot start {}: another run is active (see `rsg status`, stop it with `rsg cancel`)",
                    id
                ),
                Some(GatewayCode::UnknownScenario) => {
                    format!("no scenario {} (see `rsg scenarios`)", id)
                }
                _ => return Err(err.into()),
            };
            return Err(anyhow::Error::new(err).context(hint));
        }
    };
    let run_id = ticket["run_id"]
        .as_u64()
        .ok_or_else(|| anyhow::anyhow!("gateway returned no run id: {}", ticket))?;
    if !follow {
        return print_output(&ticket, format, |_| {
            format!("Started {} as run #{}", id, run_id)
        });
    }
    follow_run(client, run_id, poll, format).await
}

/// Polls the current run and prints log entries as they appear, until the
/// run leaves the RUNNING state.
pub async fn follow_run(
    client: &HttpClient,
    run_id: u64,
    poll: Duration,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut next_seq = 0;
    loop {
        let status: Value = client.get("/api/runs/current").await?;
        let running = status["state"] == "RUNNING";
        let run = if running { &status["run"] } else { &status["last"] };
        if run["run_id"].as_u64() != Some(run_id) {
            anyhow::bail!("run #{} is no longer tracked by the gateway", run_id);
        }
        for entry in unseen_entries(run, next_seq) {
            match format {
                OutputFormat::Text => println!("{}", render_log_entry(entry)),
                _ => println!("{}", serde_json::to_string(entry)?),
            }
            next_seq = entry["seq"].as_u64().map_or(next_seq, |s| s + 1);
        }
        if !running {
            return match run["state"].as_str() {
                Some("SUCCEEDED") => Ok(()),
                _ => Err(anyhow::anyhow!(
                    "run #{} failed: {}",
                    run_id,
                    format_value(&run["failure"])
                )),
            };
        }
        debug!("run #{} at stage {}", run_id, format_value(&run["stage_index"]));
        tokio::time::sleep(poll).await;
    }
}

pub async fn handle_status_command(
    client: &HttpClient,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let status: Value = client.get("/api/runs/current").await?;
    print_output(&status, format, render_status)
}

pub async fn handle_cancel_command(
    client: &HttpClient,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match client.post_empty::<Value>("/api/runs/current/cancel").await {
        Ok(resp) => print_output(&resp, format, |v| {
            format!("Cancelling run #{}", format_value(&v["run_id"]))
        }),
        Err(err) => match cancel_noop(&err) {
            Some(note) => print_output(
                &json!({"cancelled": false, "reason": note}),
                format,
                |_| note.to_string(),
            ),
            None => Err(err.into()),
        },
    }
}

/// Rejections that leave nothing to cancel are not failures of the command.
fn cancel_noop(err: &ClientError) -> Option<&'static str> {
    match err.code()? {
        GatewayCode::NotRunning => Some("Nothing to cancel: no scenario is running"),
        GatewayCode::AlreadyCompleted => Some("Nothing to cancel: the run already completed"),
        _ => None,
    }
}

fn unseen_entries(run: &Value, next_seq: u64) -> impl Iterator<Item = &Value> {
    run["log"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(move |e| e["seq"].as_u64().is_some_and(|s| s >= next_seq))
}

pub fn render_log_entry(entry: &Value) -> String {
    let marker = match entry["tone"].as_str() {
        Some("success") => "ok",
        Some("warning") => "!!",
        Some("error") => "XX",
        _ => "--",
    };
    format!(
        "[{:>7}] {} {}",
        format_offset(entry["offset_ms"].as_u64().unwrap_or(0)),
        marker,
        format_value(&entry["message"])
    )
}

pub fn render_scenario_list(scenarios: &Value) -> String {
    let Some(items) = scenarios.as_array() else {
        return format!("Unexpected response format: {}", scenarios);
    };
    if items.is_empty() {
        return "No scenarios found".to_string();
    }
    items
        .iter()
        .map(|s| {
            format!(
                "{:<20} {:<9} ~{:>3}s  {}",
                format_value(&s["id"]),
                format_value(&s["risk"]),
                format_value(&s["duration_secs"]),
                format_value(&s["name"]),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_scenario(s: &Value) -> String {
    let mut out = format!(
        "{} ({})\n  risk {}, ~{}s\n",
        format_value(&s["name"]),
        format_value(&s["id"]),
        format_value(&s["risk"]),
        format_value(&s["duration_secs"]),
    );
    if let Some(desc) = s["description"].as_str().filter(|d| !d.is_empty()) {
        out.push_str(&format!("  {}\n", desc));
    }
    if let Some(targets) = s["targets"].as_array() {
        let names: Vec<_> = targets.iter().map(format_value).collect();
        out.push_str(&format!("  targets: {}\n", names.join(", ")));
    }
    for (i, stage) in s["stages"].as_array().into_iter().flatten().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, describe_stage(stage)));
    }
    out
}

fn describe_stage(stage: &Value) -> String {
    match stage["kind"].as_str() {
        Some("stop-node") => format!("stop {}", format_value(&stage["target"])),
        Some("isolate-nodes") => {
            let names: Vec<_> = stage["targets"]
                .as_array()
                .into_iter()
                .flatten()
                .map(format_value)
                .collect();
            format!("isolate {}", names.join(", "))
        }
        Some("wait") => match stage["label"].as_str() {
            Some(label) => format!("wait {}s ({})", format_value(&stage["secs"]), label),
            None => format!("wait {}s", format_value(&stage["secs"])),
        },
        Some("narrate") => {
            let n = stage["lines"].as_array().map_or(0, Vec::len);
            format!("narrate {} line(s)", n)
        }
        _ => stage.to_string(),
    }
}

pub fn render_status(status: &Value) -> String {
    match status["state"].as_str() {
        Some("RUNNING") => {
            let run = &status["run"];
            let stage = run["stage_index"]
                .as_u64()
                .map_or("-".to_string(), |i| (i + 1).to_string());
            let mut out = format!(
                "Run #{} {} RUNNING, stage {}/{}\n",
                format_value(&run["run_id"]),
                format_value(&run["scenario_id"]),
                stage,
                format_value(&run["stage_count"]),
            );
            if let Some(last) = run["log"].as_array().and_then(|l| l.last()) {
                out.push_str(&render_log_entry(last));
            }
            out
        }
        _ => match status["last"].as_object() {
            Some(_) => {
                let last = &status["last"];
                let mut out = format!(
                    "Idle. Last run #{} {} {}",
                    format_value(&last["run_id"]),
                    format_value(&last["scenario_id"]),
                    format_value(&last["state"]),
                );
                if let Some(reason) = last["failure"].as_str() {
                    out.push_str(&format!(": {}", reason));
                }
                out
            }
            None => "Idle. No runs yet".to_string(),
        },
    }
}
