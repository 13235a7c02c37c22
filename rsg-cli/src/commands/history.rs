use crate::client::HttpClient;
use crate::output::{format_value, print_output};
use crate::types::{HistoryKind, OutputFormat};
use serde_json::Value;

pub async fn handle_history_command(
    client: &HttpClient,
    kind: HistoryKind,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let path = format!("/api/history/{}", kind.as_str());
    let entries: Value = client.get(&path).await?;
    print_output(&entries, format, |v| render_history(kind, v))
}

pub fn render_history(kind: HistoryKind, entries: &Value) -> String {
    let Some(items) = entries.as_array() else {
        return format!("Unexpected response format: {}", entries);
    };
    if items.is_empty() {
        return "No history yet".to_string();
    }
    items
        .iter()
        .map(|e| match kind {
            HistoryKind::Scenarios => {
                let outcome = match e["outcome"]["status"].as_str() {
                    Some("FAILED") => {
                        format!("FAILED ({})", format_value(&e["outcome"]["reason"]))
                    }
                    _ => match e["recovery_estimate_secs"].as_u64() {
                        Some(secs) => format!("SUCCEEDED, recovery ~{secs}s"),
                        None => "SUCCEEDED".to_string(),
                    },
                };
                format!(
                    "#{:<4} {:<20} {:<9} {}  {}",
                    format_value(&e["run_id"]),
                    format_value(&e["scenario_id"]),
                    format_value(&e["risk"]),
                    format_value(&e["started_at"]),
                    outcome
                )
            }
            HistoryKind::Validations => format!(
                "{}  {:<16} w={:<9} safe={} execute={} warnings={}",
                format_value(&e["at"]),
                format_value(&e["collection"]),
                format_value(&e["durability"]),
                format_value(&e["is_safe"]),
                format_value(&e["can_execute"]),
                format_value(&e["warnings"]),
            ),
            HistoryKind::Checks => format!(
                "{}  cycle {:<5} {} -> {} ({}/{} healthy){}{}",
                format_value(&e["at"]),
                format_value(&e["cycle"]),
                format_value(&e["previous"]),
                format_value(&e["quorum"]),
                format_value(&e["healthy_nodes"]),
                format_value(&e["total_nodes"]),
                if e["split_brain"].as_bool().unwrap_or(false) {
                    " split-brain"
                } else {
                    ""
                },
                match e["nodes_needing_recovery"].as_u64() {
                    Some(n) if e["recovery_required"] == true => format!(" recovery({n})"),
                    _ => String::new(),
                },
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_scenario_outcomes() {
        let entries = json!([
            {"run_id": 2, "scenario_id": "primary-fail", "risk": "MEDIUM",
             "started_at": "2026-01-01T00:00:00Z",
             "outcome": {"status": "FAILED", "stage": 0, "reason": "cancelled"},
             "recovery_estimate_secs": null},
            {"run_id": 1, "scenario_id": "secondary1-fail", "risk": "LOW",
             "started_at": "2026-01-01T00:00:00Z",
             "outcome": {"status": "SUCCEEDED"},
             "recovery_estimate_secs": 10}
        ]);
        let text = render_history(HistoryKind::Scenarios, &entries);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("FAILED (cancelled)"));
        assert!(lines[1].ends_with("SUCCEEDED, recovery ~10s"));
    }

    #[test]
    fn renders_first_check_without_previous() {
        let entries = json!([{
            "at": "t", "cycle": 1, "previous": null, "quorum": "HEALTHY",
            "healthy_nodes": 3, "total_nodes": 3, "split_brain": false
        }]);
        assert_eq!(
            render_history(HistoryKind::Checks, &entries),
            "t  cycle 1     - -> HEALTHY (3/3 healthy)"
        );
        assert_eq!(render_history(HistoryKind::Validations, &json!([])), "No history yet");
    }

    #[test]
    fn flags_checks_needing_recovery() {
        let entries = json!([{
            "at": "t", "cycle": 4, "previous": "HEALTHY", "quorum": "HEALTHY",
            "healthy_nodes": 3, "total_nodes": 3, "split_brain": false,
            "recovery_required": true, "nodes_needing_recovery": 1
        }]);
        assert!(render_history(HistoryKind::Checks, &entries).ends_with("(3/3 healthy) recovery(1)"));
    }
}
