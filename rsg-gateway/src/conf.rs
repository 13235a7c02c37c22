use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "HTTP_PORT", default = "8080")]
    pub http_port: u16,
    // Either "json"/"structured" or "plain"/"text"/"pretty"; plain when unset
    #[envconfig(from = "LOG_FORMAT")]
    pub log_format: Option<String>,
}

impl Config {
    pub fn json_logs(&self) -> bool {
        match self.log_format.as_deref().map(|s| s.to_ascii_lowercase()) {
            Some(ref v) if v == "json" || v == "structured" => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn log_format_selects_json() {
        let mut env = HashMap::new();
        let conf = Config::init_from_hashmap(&env).unwrap();
        assert_eq!(conf.http_port, 8080);
        assert!(!conf.json_logs());

        env.insert("LOG_FORMAT".to_string(), "Structured".to_string());
        env.insert("HTTP_PORT".to_string(), "9000".to_string());
        let conf = Config::init_from_hashmap(&env).unwrap();
        assert_eq!(conf.http_port, 9000);
        assert!(conf.json_logs());
    }
}
