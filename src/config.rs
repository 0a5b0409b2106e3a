use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::llm_providers::GenerationProviderKind;

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub transcription: TranscriptionConfig,
    pub search: SearchConfig,
    pub limits: LimitsConfig,
    pub cleanup: CleanupConfig,
    pub logging: LoggingConfig,
}

/// Deployment mode. Development includes internal error details in responses
/// and emits debug-level logging by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvMode {
    Development,
    Production,
}

impl EnvMode {
    pub fn is_development(&self) -> bool {
        matches!(self, EnvMode::Development)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub mode: EnvMode,
    pub cors_origins: Vec<String>,
}

/// Completion/generation provider configuration.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub provider: GenerationProviderKind,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

/// Transcription backend chain configuration. A missing key simply removes
/// that backend from the chain.
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub openai_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub per_backend_limit: usize,
    pub per_backend_window_secs: u64,
}

/// Search provider configuration for link enrichment.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub serper_api_key: Option<String>,
    pub enrichment_enabled: bool,
}

/// Request and payload limits.
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_content_length: usize,
    pub max_file_size: usize,
    pub max_flashcards: usize,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: usize,
}

/// Temporary upload directory housekeeping.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub upload_temp_dir: PathBuf,
    pub sweep_interval_secs: u64,
    pub max_age_secs: u64,
}

/// Logging system configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            server: ServerConfig::from_env()?,
            generation: GenerationConfig::from_env()?,
            transcription: TranscriptionConfig::from_env()?,
            search: SearchConfig::from_env(),
            limits: LimitsConfig::from_env()?,
            cleanup: CleanupConfig::from_env()?,
            logging: LoggingConfig::from_env(),
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data).
    fn log_configuration_summary(&self) {
        info!(
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            mode = ?self.server.mode,
            generation_provider = ?self.generation.provider,
            generation_model = ?self.generation.model,
            generation_key_masked = %mask_sensitive_data(&self.generation.api_key),
            whisper_configured = self.transcription.openai_api_key.is_some(),
            groq_configured = self.transcription.groq_api_key.is_some(),
            serper_configured = self.search.serper_api_key.is_some(),
            max_content_length = self.limits.max_content_length,
            max_file_size = self.limits.max_file_size,
            max_flashcards = self.limits.max_flashcards,
            "Configuration summary"
        );
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.limits.max_content_length == 0 {
            return Err(anyhow!("MAX_CONTENT_LENGTH must be greater than 0"));
        }

        if self.limits.max_flashcards == 0 {
            return Err(anyhow!("MAX_FLASHCARDS must be greater than 0"));
        }

        if self.generation.api_key.is_empty() || self.generation.api_key == "your-api-key" {
            warn!("Generation API key appears to be placeholder or empty - flashcard generation will fail");
        }

        if self.transcription.openai_api_key.is_none() && self.transcription.groq_api_key.is_none() {
            warn!("No transcription API keys configured - voice uploads will use the placeholder transcript");
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port_str
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str))?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let mode = match env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => EnvMode::Production,
            _ => EnvMode::Development,
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(ServerConfig { host, port, mode, cors_origins })
    }
}

impl GenerationConfig {
    fn from_env() -> Result<Self> {
        let provider_str = env::var("GENERATION_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "gemini" | "google" => GenerationProviderKind::Gemini,
            "openai" | "chatgpt" | "gpt" => GenerationProviderKind::OpenAi,
            _ => {
                info!("Unknown generation provider '{}', defaulting to OpenAI", provider_str);
                GenerationProviderKind::OpenAi
            }
        };

        let api_key = env::var("GENERATION_API_KEY").unwrap_or_else(|_| "your-api-key".to_string());
        let base_url = env::var("GENERATION_BASE_URL").ok();
        let model = env::var("GENERATION_MODEL").ok();

        let timeout_secs = parse_env_number("GENERATION_TIMEOUT_SECS", 30)?;

        Ok(GenerationConfig { provider, api_key, base_url, model, timeout_secs })
    }
}

impl TranscriptionConfig {
    fn from_env() -> Result<Self> {
        Ok(TranscriptionConfig {
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            groq_api_key: env::var("GROQ_API_KEY").ok().filter(|k| !k.is_empty()),
            per_backend_limit: parse_env_number("TRANSCRIPTION_RATE_LIMIT", 50)? as usize,
            per_backend_window_secs: 60,
        })
    }
}

impl SearchConfig {
    fn from_env() -> Self {
        SearchConfig {
            serper_api_key: env::var("SERPER_API_KEY").ok().filter(|k| !k.is_empty()),
            enrichment_enabled: env::var("ENRICHMENT_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse::<bool>()
                .unwrap_or(true),
        }
    }
}

impl LimitsConfig {
    fn from_env() -> Result<Self> {
        Ok(LimitsConfig {
            max_content_length: parse_env_number("MAX_CONTENT_LENGTH", 50_000)? as usize,
            max_file_size: parse_env_number("MAX_FILE_SIZE", 25 * 1024 * 1024)? as usize,
            max_flashcards: parse_env_number("MAX_FLASHCARDS", 25)? as usize,
            rate_limit_window_secs: parse_env_number("RATE_LIMIT_WINDOW_SECS", 900)?,
            rate_limit_max_requests: parse_env_number("RATE_LIMIT_MAX_REQUESTS", 50)? as usize,
        })
    }
}

impl CleanupConfig {
    fn from_env() -> Result<Self> {
        let upload_temp_dir = env::var("UPLOAD_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("flashdeck-uploads"));

        Ok(CleanupConfig {
            upload_temp_dir,
            sweep_interval_secs: parse_env_number("SWEEP_INTERVAL_SECS", 1800)?,
            max_age_secs: parse_env_number("TEMP_MAX_AGE_SECS", 3600)?,
        })
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,flashdeck=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        LoggingConfig { level, file_enabled, log_directory }
    }
}

fn parse_env_number(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'. Must be a non-negative number", name, value)),
        Err(_) => Ok(default),
    }
}

/// Mask sensitive data in configuration for safe logging.
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sk-1234567890abcdef"), "sk-1***cdef");
    }

    #[test]
    fn test_limit_defaults() {
        env::remove_var("MAX_CONTENT_LENGTH");
        env::remove_var("MAX_FILE_SIZE");
        env::remove_var("MAX_FLASHCARDS");

        let limits = LimitsConfig::from_env().unwrap();
        assert_eq!(limits.max_content_length, 50_000);
        assert_eq!(limits.max_file_size, 25 * 1024 * 1024);
        assert_eq!(limits.max_flashcards, 25);
        assert_eq!(limits.rate_limit_window_secs, 900);
        assert_eq!(limits.rate_limit_max_requests, 50);
    }

    #[test]
    fn test_generation_provider_parsing() {
        let test_cases = vec![
            ("openai", GenerationProviderKind::OpenAi),
            ("OpenAI", GenerationProviderKind::OpenAi),
            ("chatgpt", GenerationProviderKind::OpenAi),
            ("gemini", GenerationProviderKind::Gemini),
            ("google", GenerationProviderKind::Gemini),
            ("unknown", GenerationProviderKind::OpenAi), // defaults to OpenAI
        ];

        for (input, expected) in test_cases {
            env::set_var("GENERATION_PROVIDER", input);
            let config = GenerationConfig::from_env().unwrap();
            assert_eq!(config.provider, expected, "Input '{}' should map to {:?}", input, expected);
        }

        env::remove_var("GENERATION_PROVIDER");
    }

    #[test]
    fn test_env_mode_parsing() {
        env::set_var("APP_ENV", "production");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.mode, EnvMode::Production);
        assert!(!config.mode.is_development());

        env::set_var("APP_ENV", "development");
        let config = ServerConfig::from_env().unwrap();
        assert!(config.mode.is_development());

        env::remove_var("APP_ENV");
    }

    #[test]
    fn test_cors_origin_list_parsing() {
        env::set_var("CORS_ORIGINS", "https://a.example , https://b.example,");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        env::remove_var("CORS_ORIGINS");
    }

    #[test]
    fn test_invalid_port_parsing() {
        env::set_var("PORT", "not-a-number");
        let result = ServerConfig::from_env();
        assert!(result.is_err());
        env::remove_var("PORT");
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        let mut config = test_config();
        assert!(config.validate().is_ok());

        config.limits.max_flashcards = 0;
        assert!(config.validate().is_err());
    }

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                mode: EnvMode::Development,
                cors_origins: vec![],
            },
            generation: GenerationConfig {
                provider: GenerationProviderKind::OpenAi,
                api_key: "sk-valid-key".to_string(),
                base_url: None,
                model: None,
                timeout_secs: 30,
            },
            transcription: TranscriptionConfig {
                openai_api_key: None,
                groq_api_key: None,
                per_backend_limit: 50,
                per_backend_window_secs: 60,
            },
            search: SearchConfig {
                serper_api_key: None,
                enrichment_enabled: true,
            },
            limits: LimitsConfig {
                max_content_length: 50_000,
                max_file_size: 25 * 1024 * 1024,
                max_flashcards: 25,
                rate_limit_window_secs: 900,
                rate_limit_max_requests: 50,
            },
            cleanup: CleanupConfig {
                upload_temp_dir: std::env::temp_dir().join("flashdeck-test"),
                sweep_interval_secs: 1800,
                max_age_secs: 3600,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: false,
                log_directory: "logs".to_string(),
            },
        }
    }
}
