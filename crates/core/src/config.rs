use serde::Deserialize;
use std::path::Path;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `CINERANK__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub recommender: RecommenderConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

/// Artifact locations and the model shape fixed at training time.
///
/// `embedding_dim` and `hidden_dims` must match the checkpoint exactly;
/// `num_users` / `num_items` are the embedding table extents.
#[derive(Debug, Clone, Deserialize)]
pub struct RecommenderConfig {
    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default = "default_user_map_path")]
    pub user_map_path: String,
    #[serde(default = "default_item_map_path")]
    pub item_map_path: String,
    #[serde(default = "default_num_users")]
    pub num_users: usize,
    #[serde(default = "default_num_items")]
    pub num_items: usize,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_hidden_dims")]
    pub hidden_dims: Vec<usize>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_max_top_n")]
    pub max_top_n: usize,
    /// Rows per chunk inside one batched forward pass.
    #[serde(default = "default_inference_chunk_rows")]
    pub inference_chunk_rows: usize,
    /// Hex SHA-256 the checkpoint bytes must hash to, when set.
    #[serde(default)]
    pub checkpoint_sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_model_path() -> String {
    "model.json".to_string()
}
fn default_user_map_path() -> String {
    "user_map.json".to_string()
}
fn default_item_map_path() -> String {
    "item_map.json".to_string()
}
fn default_num_users() -> usize {
    6041
}
fn default_num_items() -> usize {
    193_610
}
fn default_embedding_dim() -> usize {
    32
}
fn default_hidden_dims() -> Vec<usize> {
    vec![64, 32, 16]
}
fn default_top_n() -> usize {
    20
}
fn default_max_top_n() -> usize {
    500
}
fn default_inference_chunk_rows() -> usize {
    8192
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            user_map_path: default_user_map_path(),
            item_map_path: default_item_map_path(),
            num_users: default_num_users(),
            num_items: default_num_items(),
            embedding_dim: default_embedding_dim(),
            hidden_dims: default_hidden_dims(),
            top_n: default_top_n(),
            max_top_n: default_max_top_n(),
            inference_chunk_rows: default_inference_chunk_rows(),
            checkpoint_sha256: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then environment
    /// variables (`CINERANK__RECOMMENDER__TOP_N=10`), later sources winning.
    pub fn load_from(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            tracing::debug!(path = %path.display(), "Reading config file");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("CINERANK")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("recommender.hidden_dims"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
