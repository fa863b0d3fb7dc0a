//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;
use crate::worker::consumer::RetryPolicy;

/// Default queue the producer side publishes to.
pub const DEFAULT_QUEUE_NAME: &str = "ticket_processing_queue";

/// Full worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue: QueueConfig,
    pub pipeline: PipelineConfig,
    pub providers: ProviderConfig,
    pub store: StoreConfig,
    pub health: HealthConfig,
}

impl WorkerConfig {
    /// Build the whole configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            queue: QueueConfig::from_env()?,
            pipeline: PipelineConfig::from_env()?,
            providers: ProviderConfig::from_env()?,
            store: StoreConfig::from_env(),
            health: HealthConfig::from_env(),
        })
    }
}

// ── Queue ───────────────────────────────────────────────────────────

/// Which queue transport the consumer subscribes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    RabbitMq,
    /// In-process queue, for local runs without a broker.
    Memory,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rabbitmq" | "amqp" => Ok(Self::RabbitMq),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidValue {
                key: "QUEUE_TRANSPORT".into(),
                message: format!("unknown transport '{other}' (expected rabbitmq or memory)"),
            }),
        }
    }
}

/// Queue subscription settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub transport: TransportKind,
    pub queue_name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Explicit AMQP URI; overrides host/port/credentials when set.
    pub url: Option<SecretString>,
    /// High heartbeat because a single inference job may take a while.
    pub heartbeat_secs: u16,
    /// Declare `<queue>_dlx` / `<queue>_dlq` and route rejections there.
    pub dead_letter: bool,
    /// Delay before reconnecting after the subscription drops.
    pub reconnect_delay: Duration,
}

impl QueueConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let transport = match std::env::var("QUEUE_TRANSPORT") {
            Ok(s) => s.parse()?,
            Err(_) => TransportKind::RabbitMq,
        };

        Ok(Self {
            transport,
            queue_name: std::env::var("QUEUE_NAME")
                .unwrap_or_else(|_| DEFAULT_QUEUE_NAME.to_string()),
            host: std::env::var("RABBITMQ_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env_parse("RABBITMQ_PORT", 5672),
            username: std::env::var("RABBITMQ_USER").unwrap_or_else(|_| "guest".to_string()),
            password: SecretString::from(
                std::env::var("RABBITMQ_PASS").unwrap_or_else(|_| "guest".to_string()),
            ),
            url: std::env::var("RABBITMQ_URL").ok().map(SecretString::from),
            heartbeat_secs: env_parse("RABBITMQ_HEARTBEAT_SECS", 600),
            dead_letter: env_flag("QUEUE_DEAD_LETTER"),
            reconnect_delay: Duration::from_secs(env_parse("QUEUE_RECONNECT_DELAY_SECS", 5)),
        })
    }

    /// AMQP URI for the broker, including credentials.
    pub fn amqp_uri(&self) -> String {
        if let Some(ref url) = self.url {
            return url.expose_secret().to_string();
        }
        format!(
            "amqp://{}:{}@{}:{}/%2f?heartbeat={}",
            self.username,
            self.password.expose_secret(),
            self.host,
            self.port,
            self.heartbeat_secs
        )
    }

    /// Broker address without credentials, for logs.
    pub fn redacted_address(&self) -> String {
        match self.url {
            Some(_) => "amqp://...".to_string(),
            None => format!("amqp://{}:{}", self.host, self.port),
        }
    }
}

// ── Pipeline ────────────────────────────────────────────────────────

/// Pipeline-level constants, fixed per invocation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum similarity for a past ticket to count as a recommendation.
    pub similarity_threshold: f32,
    /// Maximum number of recommendations kept.
    pub max_recommendations: usize,
    /// How many description characters go into the summary.
    pub summary_prefix_chars: usize,
    /// Upper bound on every external call made for one job.
    pub call_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.75,
            max_recommendations: 3,
            summary_prefix_chars: 60,
            call_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::Discard,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let similarity_threshold: f32 =
            env_parse("SIMILARITY_THRESHOLD", defaults.similarity_threshold);
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "SIMILARITY_THRESHOLD".into(),
                message: format!("{similarity_threshold} is outside 0.0..=1.0"),
            });
        }

        let retry_policy = match std::env::var("WORKER_RETRY_POLICY") {
            Ok(s) => s.parse()?,
            Err(_) => defaults.retry_policy,
        };

        Ok(Self {
            similarity_threshold,
            max_recommendations: env_parse("SIMILARITY_MAX_RESULTS", defaults.max_recommendations),
            summary_prefix_chars: env_parse("SUMMARY_PREFIX_CHARS", defaults.summary_prefix_chars),
            call_timeout: Duration::from_secs(env_parse(
                "PROVIDER_CALL_TIMEOUT_SECS",
                defaults.call_timeout.as_secs(),
            )),
            retry_policy,
        })
    }
}

// ── Providers ───────────────────────────────────────────────────────

/// Where similarity search is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityBackend {
    /// Remote `match_tickets` RPC.
    Rpc,
    /// Cosine scan over the local ticket store.
    Store,
}

impl FromStr for SimilarityBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rpc" => Ok(Self::Rpc),
            "store" => Ok(Self::Store),
            other => Err(ConfigError::InvalidValue {
                key: "SIMILARITY_BACKEND".into(),
                message: format!("unknown backend '{other}' (expected rpc or store)"),
            }),
        }
    }
}

/// Endpoints of the capability providers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub classifier_url: String,
    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_api_key: Option<SecretString>,
    pub similarity_backend: SimilarityBackend,
    pub similarity_url: Option<String>,
    pub similarity_api_key: Option<SecretString>,
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let similarity_backend = match std::env::var("SIMILARITY_BACKEND") {
            Ok(s) => s.parse()?,
            Err(_) => SimilarityBackend::Store,
        };
        let similarity_url = std::env::var("SIMILARITY_URL").ok();
        if similarity_backend == SimilarityBackend::Rpc && similarity_url.is_none() {
            return Err(ConfigError::MissingEnvVar("SIMILARITY_URL".into()));
        }

        Ok(Self {
            classifier_url: std::env::var("CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://localhost:8081/classify".to_string()),
            embedding_url: std::env::var("EMBEDDING_URL")
                .unwrap_or_else(|_| "http://localhost:8082/v1".to_string()),
            embedding_model: std::env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "all-MiniLM-L6-v2".to_string()),
            embedding_api_key: std::env::var("EMBEDDING_API_KEY").ok().map(SecretString::from),
            similarity_backend,
            similarity_url,
            similarity_api_key: std::env::var("SIMILARITY_API_KEY")
                .ok()
                .map(SecretString::from),
        })
    }
}

// ── Store / health ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("ENRICHER_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/tickets.db")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub port: u16,
}

impl HealthConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("HEALTH_PORT", 8000),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Parse an env var, falling back to `default` when unset or unparsable.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
