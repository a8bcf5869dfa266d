//! Configuration file support
//!
//! Loads server configuration from TOML files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{ConversionConfig, LimitsConfig, ServerConfig};

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: Option<ServerSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
    /// Conversion settings
    pub conversion: Option<ConversionSettings>,
    /// Upload limits
    pub limits: Option<LimitsSettings>,
    /// External programs
    pub tools: Option<ToolSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: Option<String>,
    /// Port to listen on
    pub port: Option<u16>,
    /// Enable CORS
    pub cors_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionSettings {
    /// Directory for temp files
    pub temp_dir: Option<PathBuf>,
    /// Tool output lines kept for diagnostics
    pub tail_lines: Option<usize>,
    /// Per-request deadline; 0 or unset disables it
    pub request_timeout_secs: Option<u64>,
}

/// Upload limits in MB. A value of 0 means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSettings {
    pub audio_mb: Option<u64>,
    pub image_mb: Option<u64>,
    pub video_mb: Option<u64>,
    pub document_mb: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Transcoder program (ffmpeg)
    pub transcoder: Option<String>,
    /// Headless document converter program (soffice)
    pub document_converter: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        Self {
            server: Some(ServerSettings {
                host: Some("0.0.0.0".to_string()),
                port: Some(8080),
                cors_enabled: Some(true),
            }),
            logging: Some(LoggingSettings {
                level: "info".to_string(),
                format: Some("pretty".to_string()),
            }),
            conversion: Some(ConversionSettings {
                temp_dir: None,
                tail_lines: Some(20),
                request_timeout_secs: Some(0),
            }),
            limits: Some(LimitsSettings {
                audio_mb: Some(0),
                image_mb: Some(50),
                video_mb: Some(200),
                document_mb: Some(50),
            }),
            tools: Some(ToolSettings {
                transcoder: Some("ffmpeg".to_string()),
                document_converter: Some("soffice".to_string()),
            }),
        }
    }

    /// Convert to ServerConfig; anything not set keeps its default
    pub fn into_server_config(self) -> ServerConfig {
        let mut config = ServerConfig::default();

        if let Some(server) = self.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
            if let Some(cors) = server.cors_enabled {
                config.cors_enabled = cors;
            }
        }

        if let Some(logging) = self.logging {
            config.log_level = logging.level;
            if let Some(format) = logging.format {
                config.log_format = format;
            }
        }

        let defaults = ConversionConfig::default();
        if let Some(conversion) = self.conversion {
            config.conversion.temp_dir = conversion.temp_dir;
            config.conversion.tail_lines = conversion.tail_lines.unwrap_or(defaults.tail_lines);
            config.conversion.request_timeout_secs = conversion.request_timeout_secs;
        }

        if let Some(limits) = self.limits {
            let base = LimitsConfig::default();
            let pick = |value: Option<u64>, default: Option<u64>| match value {
                Some(0) => None,
                Some(mb) => Some(mb),
                None => default,
            };
            config.conversion.limits = LimitsConfig {
                audio_mb: pick(limits.audio_mb, base.audio_mb),
                image_mb: pick(limits.image_mb, base.image_mb),
                video_mb: pick(limits.video_mb, base.video_mb),
                document_mb: pick(limits.document_mb, base.document_mb),
            };
        }

        if let Some(tools) = self.tools {
            if let Some(transcoder) = tools.transcoder {
                config.conversion.tools.transcoder = transcoder;
            }
            if let Some(document_converter) = tools.document_converter {
                config.conversion.tools.document_converter = document_converter;
            }
        }

        config
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigFile::default_config();
    config.to_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default_config();
        assert_eq!(config.server.as_ref().unwrap().port, Some(8080));
        assert_eq!(config.limits.as_ref().unwrap().video_mb, Some(200));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let config = ConfigFile::default_config();

        let mut temp_file = NamedTempFile::new().unwrap();
        let content = toml::to_string_pretty(&config).unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let loaded = ConfigFile::from_file(temp_file.path()).unwrap();
        assert_eq!(
            loaded.tools.unwrap().document_converter.as_deref(),
            Some("soffice")
        );
    }

    #[test]
    fn test_into_server_config() {
        let server_config = ConfigFile::default_config().into_server_config();

        assert_eq!(server_config.port, 8080);
        assert_eq!(server_config.conversion.limits.audio_mb, None);
        assert_eq!(server_config.conversion.limits.image_mb, Some(50));
        assert!(server_config.request_timeout().is_none());
    }

    #[test]
    fn test_partial_file() {
        let content = r#"
            [server]
            port = 9090

            [tools]
            transcoder = "/opt/ffmpeg/bin/ffmpeg"

            [limits]
            video_mb = 500

            [conversion]
            request_timeout_secs = 120
        "#;
        let config: ConfigFile = toml::from_str(content).unwrap();
        let config = config.into_server_config();

        assert_eq!(config.port, 9090);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.conversion.tools.transcoder, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.conversion.tools.document_converter, "soffice");
        assert_eq!(config.conversion.limits.video_mb, Some(500));
        assert_eq!(config.conversion.limits.image_mb, Some(50));
        assert_eq!(config.conversion.tail_lines, 20);
        assert_eq!(config.request_timeout().map(|d| d.as_secs()), Some(120));
    }

    #[test]
    fn test_empty_file_is_defaults() {
        let config: ConfigFile = toml::from_str("").unwrap();
        let config = config.into_server_config();
        assert_eq!(config.port, 8080);
        assert!(config.cors_enabled);
    }

    #[test]
    fn test_generate_default_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        generate_default_config(&path).unwrap();

        assert!(path.exists());
        let loaded = ConfigFile::from_file(&path).unwrap();
        assert_eq!(loaded.server.unwrap().port, Some(8080));
    }
}
