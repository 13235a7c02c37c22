use crate::client::HttpClient;
use crate::output::{format_value, print_output};
use crate::types::OutputFormat;
use serde_json::Value;

pub async fn handle_health_command(
    client: &HttpClient,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let snapshot: Value = client.get("/api/health").await?;
    print_output(&snapshot, format, render_health)
}

pub fn render_health(snapshot: &Value) -> String {
    let mut out = format!(
        "Quorum: {} ({}/{} healthy, {:.1}%)  cycle {}\n",
        format_value(&snapshot["quorum"]),
        format_value(&snapshot["healthy_nodes"]),
        format_value(&snapshot["total_nodes"]),
        snapshot["health_percentage"].as_f64().unwrap_or(0.0),
        format_value(&snapshot["cycle"]),
    );
    if snapshot["split_brain"].as_bool().unwrap_or(false) {
        out.push_str(&format!(
            "SPLIT BRAIN: {} nodes claim PRIMARY\n",
            format_value(&snapshot["primary_count"])
        ));
    }
    if let Some(nodes) = snapshot["nodes"].as_array() {
        for node in nodes {
            out.push_str(&format!(
                "  {:<20} {:<10} {}\n",
                format_value(&node["name"]),
                format_value(&node["role"]),
                format_value(&node["liveness"]),
            ));
        }
    }
    if let Some(lag) = snapshot["replication"]["max_lag_secs"].as_f64() {
        out.push_str(&format!(
            "Replication: {} (max lag {:.1}s)\n",
            format_value(&snapshot["replication"]["overall_status"]),
            lag
        ));
    }
    if let Some(sources) = snapshot["sources"].as_array() {
        for source in sources.iter().filter(|s| s["fresh"] == false) {
            out.push_str(&format!(
                "  stale source {}: {}\n",
                format_value(&source["name"]),
                format_value(&source["last_error"]),
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_split_brain_and_stale_sources() {
        let snapshot = json!({
            "cycle": 7,
            "quorum": "DEGRADED",
            "healthy_nodes": 2,
            "total_nodes": 3,
            "health_percentage": 66.666,
            "primary_count": 2,
            "split_brain": true,
            "nodes": [
                {"name": "mongo-primary", "role": "PRIMARY", "liveness": "UP"},
                {"name": "mongo-secondary1", "role": "PRIMARY", "liveness": "UP"},
                {"name": "mongo-secondary2", "role": "SECONDARY", "liveness": "DOWN"}
            ],
            "replication": null,
            "sources": [
                {"name": "cluster", "fresh": true, "last_error": null},
                {"name": "recovery", "fresh": false, "last_error": "HTTP status 503"}
            ]
        });
        let text = render_health(&snapshot);
        assert!(text.starts_with("Quorum: DEGRADED (2/3 healthy, 66.7%)  cycle 7"));
        assert!(text.contains("SPLIT BRAIN: 2 nodes claim PRIMARY"));
        assert!(text.contains("mongo-secondary2"));
        assert!(text.contains("stale source recovery: HTTP status 503"));
        assert!(!text.contains("stale source cluster"));
        assert!(!text.contains("Replication"));
    }
}
