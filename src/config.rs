use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the DocQA server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Bucket holding raw uploaded documents.
    pub doc_bucket: String,
    /// Bucket holding per-session index artifacts and status records.
    pub index_bucket: String,
    /// Region used when signing blob store requests.
    pub storage_region: String,
    /// Optional custom blob store endpoint (MinIO, LocalStack).
    pub storage_endpoint: Option<String>,
    /// Embedding backend used to vectorize segments and questions.
    pub embedding_backend: EmbeddingBackend,
    /// Base URL of the embeddings API (required for the `http` backend).
    pub embedding_url: Option<String>,
    /// Optional bearer token for the embeddings API.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the chat completions API.
    pub completion_url: String,
    /// Optional bearer token for the chat completions API.
    pub completion_api_key: Option<String>,
    /// Chat model identifier passed to the provider.
    pub completion_model: String,
    /// Upper bound on generated answer tokens.
    pub max_output_tokens: usize,
    /// Character budget per text segment.
    pub chunk_size: usize,
    /// Characters shared between consecutive segments.
    pub chunk_overlap: usize,
    /// Cumulative word ceiling per session before it is purged.
    pub max_session_tokens: usize,
    /// Number of nearest segments retrieved per question.
    pub search_top_k: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the indexing pipeline.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Remote embeddings API reached over HTTP.
    Http,
    /// Deterministic local encoder (no network dependency).
    Hashed,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            doc_bucket: load_env("DOC_BUCKET")?,
            index_bucket: load_env("INDEX_BUCKET")?,
            storage_region: load_env_optional("STORAGE_REGION")
                .unwrap_or_else(|| "us-east-1".to_string()),
            storage_endpoint: load_env_optional("STORAGE_ENDPOINT"),
            embedding_backend: load_env_optional("EMBEDDING_BACKEND")
                .unwrap_or_else(|| "hashed".to_string())
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_BACKEND".to_string()))?,
            embedding_url: load_env_optional("EMBEDDING_URL"),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            completion_url: load_env("COMPLETION_URL")?,
            completion_api_key: load_env_optional("COMPLETION_API_KEY"),
            completion_model: load_env("COMPLETION_MODEL")?,
            max_output_tokens: parse_or_default("MAX_OUTPUT_TOKENS", 512)?,
            chunk_size: parse_or_default("CHUNK_SIZE", 1000)?,
            chunk_overlap: parse_or_default("CHUNK_OVERLAP", 150)?,
            max_session_tokens: parse_or_default("MAX_SESSION_TOKENS", 10_000)?,
            search_top_k: parse_or_default("SEARCH_TOP_K", 6)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };

        if matches!(config.embedding_backend, EmbeddingBackend::Http)
            && config.embedding_url.is_none()
        {
            return Err(ConfigError::MissingVariable("EMBEDDING_URL".to_string()));
        }
        if config.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".to_string()));
        }

        Ok(config)
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "hashed" => Ok(Self::Hashed),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        doc_bucket = %config.doc_bucket,
        index_bucket = %config.index_bucket,
        region = %config.storage_region,
        embedding_backend = ?config.embedding_backend,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_backend_parses_known_values() {
        assert!(matches!(
            "http".parse::<EmbeddingBackend>(),
            Ok(EmbeddingBackend::Http)
        ));
        assert!(matches!(
            "Hashed".parse::<EmbeddingBackend>(),
            Ok(EmbeddingBackend::Hashed)
        ));
        assert!("faiss".parse::<EmbeddingBackend>().is_err());
    }
}
