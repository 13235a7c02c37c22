use serde_json::Value;

pub use crate::types::OutputFormat;

/// Prints a response in the requested format. `text` is the command's own
/// rendering of the same value.
pub fn print_output(
    data: &Value,
    format: OutputFormat,
    text: impl FnOnce(&Value) -> String,
) -> anyhow::Result<()> {
    let out = match format {
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::Yaml => serde_yaml::to_string(data)?,
        OutputFormat::Text => text(data),
    };
    println!("{}", out.trim_end());
    Ok(())
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Seconds with one decimal, from a millisecond offset.
pub fn format_offset(ms: u64) -> String {
    format!("+{:.1}s", ms as f64 / 1000.0)
}
