#[cfg(test)]
mod tests {
    use crate::config::{Config, ReadEnv};
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct InMemoryEnv(HashMap<&'static str, &'static str>);

    impl InMemoryEnv {
        fn new(pairs: &[(&'static str, &'static str)]) -> Self {
            Self(pairs.iter().cloned().collect())
        }
    }

    impl ReadEnv for InMemoryEnv {
        fn var(&self, key: &str) -> Option<String> {
            self.0.get(key).map(|v| v.to_string())
        }
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    // ── from_file ─────────────────────────────────────────────────────────────

    #[test]
    fn test_from_file_minimal() {
        let toml = r#"
[discord]
bot_token = "BOT-TOKEN-123"

[queue]
servers = ["nats://localhost:4222"]
prefix = "test"
"#;
        let f = write_toml(toml);
        let cfg = Config::from_file(f.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.discord.bot_token, "BOT-TOKEN-123");
        assert_eq!(cfg.queue.prefix, "test");
        assert_eq!(cfg.queue.servers, vec!["nats://localhost:4222"]);
        assert_eq!(cfg.backend.base_url, "http://web:8081");
        assert_eq!(cfg.queue.consumer.max_messages, 10);
    }

    #[test]
    fn test_from_file_with_consumer_and_backend() {
        let toml = r#"
[discord]
bot_token = "SECRET"

[queue]
servers = ["nats://n1:4222"]
prefix = "prod"

[queue.consumer]
max_messages = 5
wait_time_secs = 10
retry_delay_secs = 2

[backend]
base_url = "http://backend:9000"
"#;
        let f = write_toml(toml);
        let cfg = Config::from_file(f.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.queue.consumer.max_messages, 5);
        assert_eq!(cfg.queue.consumer.wait_time_secs, 10);
        assert_eq!(cfg.queue.consumer.retry_delay_secs, 2);
        assert_eq!(cfg.backend.base_url, "http://backend:9000");
    }

    #[test]
    fn test_from_file_missing_file_fails() {
        assert!(Config::from_file("/does/not/exist.toml").is_err());
    }

    #[test]
    fn test_from_file_invalid_toml_fails() {
        let f = write_toml("not [valid toml");
        assert!(Config::from_file(f.path().to_str().unwrap()).is_err());
    }

    // ── from_env ──────────────────────────────────────────────────────────────

    #[test]
    fn test_from_env_full() {
        let env = InMemoryEnv::new(&[
            ("DISCORD_BOT_TOKEN", "tok-1"),
            ("NATS_URL", "nats://a:4222,nats://b:4222"),
            ("MARKET_PREFIX", "staging"),
            ("BACKEND_URL", "http://backend:8000"),
            ("MARKET_MAX_MESSAGES", "3"),
            ("MARKET_WAIT_TIME", "15"),
            ("MARKET_RETRY_DELAY", "7"),
        ]);
        let cfg = Config::from_env_source(&env);
        assert_eq!(cfg.discord.bot_token, "tok-1");
        assert_eq!(cfg.queue.servers, vec!["nats://a:4222", "nats://b:4222"]);
        assert_eq!(cfg.queue.prefix, "staging");
        assert_eq!(cfg.backend.base_url, "http://backend:8000");
        assert_eq!(cfg.queue.consumer.max_messages, 3);
        assert_eq!(cfg.queue.consumer.wait_time_secs, 15);
        assert_eq!(cfg.queue.consumer.retry_delay_secs, 7);
    }

    #[test]
    fn test_from_env_defaults() {
        let env = InMemoryEnv::new(&[("DISCORD_BOT_TOKEN", "tok")]);
        let cfg = Config::from_env_source(&env);
        assert_eq!(cfg.queue.servers, vec!["localhost:4222"]);
        assert_eq!(cfg.queue.prefix, "prod");
        assert_eq!(cfg.backend.base_url, "http://web:8081");
    }

    #[test]
    fn test_from_env_ignores_unparseable_numbers() {
        let env = InMemoryEnv::new(&[
            ("DISCORD_BOT_TOKEN", "tok"),
            ("MARKET_MAX_MESSAGES", "lots"),
        ]);
        let cfg = Config::from_env_source(&env);
        assert_eq!(cfg.queue.consumer.max_messages, 10);
    }

    // ── validate ──────────────────────────────────────────────────────────────

    #[test]
    fn test_validate_ok() {
        let env = InMemoryEnv::new(&[("DISCORD_BOT_TOKEN", "tok")]);
        let cfg = Config::from_env_source(&env);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn test_validate_reports_every_issue_at_once() {
        let env = InMemoryEnv::new(&[
            ("NATS_URL", ""),
            ("MARKET_PREFIX", ""),
            ("BACKEND_URL", ""),
        ]);
        let cfg = Config::from_env_source(&env);
        let issues = cfg.validate();
        let fields: Vec<&str> = issues.iter().map(|(field, _)| field.as_str()).collect();
        assert!(fields.contains(&"DISCORD_BOT_TOKEN"));
        assert!(fields.contains(&"NATS_URL"));
        assert!(fields.contains(&"MARKET_PREFIX"));
        assert!(fields.contains(&"BACKEND_URL"));
    }

    #[test]
    fn test_validate_missing_token_only() {
        let env = InMemoryEnv::new(&[]);
        let cfg = Config::from_env_source(&env);
        let issues = cfg.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].0, "DISCORD_BOT_TOKEN");
        assert_eq!(issues[0].1, "Discord bot token is required");
    }
}
