use crate::client::HttpClient;
use crate::output::{format_value, print_output};
use crate::types::{OutputFormat, ValidateArgs};
use anyhow::Context;
use serde_json::{Value, json};

pub async fn handle_validate_command(
    client: &HttpClient,
    args: &ValidateArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let document = match (&args.document, &args.file) {
        (Some(doc), _) => doc.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        (None, None) => anyhow::bail!("either --document or --file is required"),
    };
    let body = json!({
        "collection": args.collection,
        "document": document,
        "durability": args.durability,
    });
    let result: Value = client.post("/api/validate", &body).await?;
    print_output(&result, format, render_validation)
}

pub fn render_validation(result: &Value) -> String {
    let verdict = match (
        result["is_safe"].as_bool().unwrap_or(false),
        result["can_execute"].as_bool().unwrap_or(false),
    ) {
        (true, true) => "SAFE",
        (false, true) => "RISKY",
        (_, false) => "BLOCKED",
    };
    let mut out = format!(
        "{} (durability {})\n",
        verdict,
        format_value(&result["durability"])
    );
    let health = &result["cluster_health"];
    if health.is_object() {
        out.push_str(&format!(
            "  cluster {} with {}/{} healthy\n",
            format_value(&health["quorum"]),
            format_value(&health["healthy_nodes"]),
            format_value(&health["total_nodes"]),
        ));
    } else {
        out.push_str("  no cluster health data\n");
    }
    for warning in result["warnings"].as_array().into_iter().flatten() {
        out.push_str(&format!("  ! {}\n", format_value(warning)));
    }
    out.push_str(&format!("  {}\n", format_value(&result["recommendation"])));
    out
}
