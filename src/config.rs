//! Server configuration

use media_convert_lib::{ConverterConfig, MediaKind, ToolCommands, UploadLimits};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const MB: u64 = 1024 * 1024;

/// Per-kind upload limits in megabytes; `None` means unlimited
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub audio_mb: Option<u64>,
    pub image_mb: Option<u64>,
    pub video_mb: Option<u64>,
    pub document_mb: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            audio_mb: None,
            image_mb: Some(50),
            video_mb: Some(200),
            document_mb: Some(50),
        }
    }
}

impl LimitsConfig {
    /// Limits in bytes, as enforced by the converter
    pub fn to_upload_limits(&self) -> UploadLimits {
        UploadLimits {
            audio: self.audio_mb.map(|mb| mb * MB),
            image: self.image_mb.map(|mb| mb * MB),
            video: self.video_mb.map(|mb| mb * MB),
            document: self.document_mb.map(|mb| mb * MB),
        }
    }
}

/// Conversion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Where temp files are created; system temp dir when unset
    pub temp_dir: Option<PathBuf>,

    /// Upload limits
    pub limits: LimitsConfig,

    /// External programs
    pub tools: ToolCommands,

    /// Tool output lines kept for error reports
    pub tail_lines: usize,

    /// Cancel a conversion that runs longer than this
    pub request_timeout_secs: Option<u64>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            limits: LimitsConfig::default(),
            tools: ToolCommands::default(),
            tail_lines: 20,
            request_timeout_secs: None,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log output format (pretty, json)
    pub log_format: String,

    /// Conversion settings
    pub conversion: ConversionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_enabled: true,
            log_level: "debug".to_string(),
            log_format: "pretty".to_string(),
            conversion: ConversionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings handed to the converter
    pub fn converter_config(&self) -> ConverterConfig {
        ConverterConfig {
            temp_dir: self
                .conversion
                .temp_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            limits: self.conversion.limits.to_upload_limits(),
            tools: self.conversion.tools.clone(),
            tail_lines: self.conversion.tail_lines,
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.conversion
            .request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Request body limit for one kind's route: its upload limit plus room for
    /// multipart framing. `None` when the kind is unlimited.
    pub fn body_limit_for(&self, kind: MediaKind) -> Option<usize> {
        self.conversion
            .limits
            .to_upload_limits()
            .limit_for(kind)
            .map(|bytes| (bytes + MB) as usize)
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.conversion.tail_lines, 20);
        assert_eq!(config.conversion.tools.transcoder, "ffmpeg");
        assert!(config.request_timeout().is_none());
        assert!(!config.json_logs());
    }

    #[test]
    fn test_limits_in_bytes() {
        let limits = LimitsConfig::default().to_upload_limits();
        assert_eq!(limits.image, Some(50 * MB));
        assert_eq!(limits.video, Some(200 * MB));
        assert_eq!(limits.audio, None);
    }

    #[test]
    fn test_body_limit_per_kind() {
        let mut config = ServerConfig::default();
        assert_eq!(config.body_limit_for(MediaKind::Audio), None);
        assert_eq!(config.body_limit_for(MediaKind::Image), Some((51 * MB) as usize));
        assert_eq!(config.body_limit_for(MediaKind::Video), Some((201 * MB) as usize));

        config.conversion.limits.audio_mb = Some(10);
        assert_eq!(config.body_limit_for(MediaKind::Audio), Some((11 * MB) as usize));
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(config.socket_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_converter_config_temp_dir() {
        let mut config = ServerConfig::default();
        assert_eq!(config.converter_config().temp_dir, std::env::temp_dir());

        config.conversion.temp_dir = Some(PathBuf::from("/var/tmp/conv"));
        assert_eq!(
            config.converter_config().temp_dir,
            PathBuf::from("/var/tmp/conv")
        );
    }
}
