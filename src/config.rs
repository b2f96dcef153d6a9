use anyhow::{bail, Context, Result};

pub const DEFAULT_AMQP_ADDR: &str = "amqp://127.0.0.1:5672/%2f";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    All,
    Web,
    Worker,
}

impl Role {
    pub fn runs_web(self) -> bool {
        matches!(self, Role::All | Role::Web)
    }

    pub fn runs_worker(self) -> bool {
        matches!(self, Role::All | Role::Worker)
    }
}

#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub addr: String,
    pub queue: String,
    pub concurrency: u16,
}

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: String,
    pub github_api_url: String,
    pub role: Role,
    pub amqp: AmqpConfig,
    /// Only present when the role runs a worker.
    pub gemini: Option<GeminiConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = lookup("DATABASE_URL").context("DATABASE_URL is not set")?;

        let concurrency = get("WORKER_CONCURRENCY", "4")
            .parse::<u16>()
            .context("WORKER_CONCURRENCY must be a positive integer")?;
        if concurrency == 0 {
            bail!("WORKER_CONCURRENCY must be a positive integer");
        }

        let role = match get("REVIEWBOT_ROLE", "all").as_str() {
            "all" => Role::All,
            "web" => Role::Web,
            "worker" => Role::Worker,
            other => bail!("REVIEWBOT_ROLE must be one of all, web, worker (got {})", other),
        };

        let gemini = if role.runs_worker() {
            Some(GeminiConfig {
                api_url: get("GEMINI_API_URL", DEFAULT_GEMINI_API_URL),
                api_key: lookup("GEMINI_API_KEY").context("GEMINI_API_KEY is not set")?,
                model: get("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            })
        } else {
            None
        };

        Ok(Config {
            database_url,
            listen_addr: get("LISTEN_ADDR", "0.0.0.0:3000"),
            github_api_url: get("GITHUB_API_URL", DEFAULT_GITHUB_API_URL),
            role,
            amqp: AmqpConfig {
                addr: get("AMQP_ADDR", DEFAULT_AMQP_ADDR),
                queue: get("REVIEW_QUEUE", "pr-review"),
                concurrency,
            },
            gemini,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/reviews"),
            ("GEMINI_API_KEY", "key"),
        ]))
        .unwrap();

        assert_eq!(config.amqp.addr, DEFAULT_AMQP_ADDR);
        assert_eq!(config.amqp.queue, "pr-review");
        assert_eq!(config.amqp.concurrency, 4);
        assert_eq!(config.github_api_url, DEFAULT_GITHUB_API_URL);
        assert_eq!(config.gemini.unwrap().model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.role, Role::All);
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("GEMINI_API_KEY", "key"),
            ("WORKER_CONCURRENCY", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("WORKER_CONCURRENCY"));
    }

    #[test]
    fn role_selects_halves() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("GEMINI_API_KEY", "key"),
            ("REVIEWBOT_ROLE", "worker"),
        ]))
        .unwrap();
        assert!(config.role.runs_worker());
        assert!(!config.role.runs_web());
    }

    #[test]
    fn web_role_needs_no_api_key() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("REVIEWBOT_ROLE", "web"),
        ]))
        .unwrap();
        assert!(config.gemini.is_none());

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("REVIEWBOT_ROLE", "worker"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
