//! Service configuration

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Command line interface
#[derive(Parser, Debug, Clone)]
#[command(name = "healthsphere-server")]
#[command(about = "HealthSphere disease prediction service", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "PORT")]
    pub port: Option<u16>,

    /// Directory holding downloaded model artifacts
    #[arg(short, long)]
    pub model_dir: Option<PathBuf>,

    /// Model registry file (YAML); the built-in table is used when absent
    #[arg(short, long)]
    pub registry: Option<PathBuf>,

    /// Models to load before accepting traffic
    #[arg(long, value_delimiter = ',')]
    pub preload: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding downloaded model artifacts
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Model registry file
    #[serde(default)]
    pub registry_path: Option<PathBuf>,

    /// Base URL for descriptors without their own source
    #[serde(default)]
    pub artifact_base_url: Option<String>,

    /// Remote store settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Models to load at startup
    #[serde(default)]
    pub preload: Vec<String>,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Directory for staged uploads; the system temp dir when unset
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
}

impl ServiceConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = if Path::new(&cli.config).exists() {
            let content = std::fs::read_to_string(&cli.config)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        if let Some(listen) = &cli.listen {
            config.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(model_dir) = &cli.model_dir {
            config.model_dir = model_dir.clone();
        }
        if let Some(registry) = &cli.registry {
            config.registry_path = Some(registry.clone());
        }
        if !cli.preload.is_empty() {
            config.preload = cli.preload.clone();
        }

        Ok(config)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            model_dir: default_model_dir(),
            registry_path: None,
            artifact_base_url: None,
            remote: RemoteConfig::default(),
            preload: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
            upload_dir: None,
        }
    }
}

/// Remote artifact store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Reachability probe timeout
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Whole-download timeout
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5005
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_download_timeout() -> u64 {
    30 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("healthsphere-server").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults_without_file() {
        let config = ServiceConfig::load(&cli(&["--config", "/nonexistent/config.yaml"])).unwrap();
        assert_eq!(config.listen, "0.0.0.0");
        assert_eq!(config.model_dir, PathBuf::from("models"));
        assert_eq!(config.remote.probe_timeout_secs, 10);
        assert!(config.registry_path.is_none());
        assert!(config.upload_dir.is_none());
    }

    #[test]
    fn test_file_values_and_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "port: 9000\nmodel_dir: /var/lib/models\nartifact_base_url: https://models.example.com\npreload: [chest]\nupload_dir: /var/tmp/uploads\nremote:\n  probe_timeout_secs: 3\n",
        )
        .unwrap();
        let path = path.to_string_lossy().into_owned();

        let config = ServiceConfig::load(&cli(&["--config", &path])).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.model_dir, PathBuf::from("/var/lib/models"));
        assert_eq!(
            config.artifact_base_url.as_deref(),
            Some("https://models.example.com")
        );
        assert_eq!(config.preload, vec!["chest"]);
        assert_eq!(config.upload_dir, Some(PathBuf::from("/var/tmp/uploads")));
        assert_eq!(config.remote.probe_timeout_secs, 3);
        assert_eq!(config.remote.download_timeout_secs, 1800);

        let config = ServiceConfig::load(&cli(&[
            "--config",
            &path,
            "--port",
            "7000",
            "--model-dir",
            "/tmp/m",
            "--preload",
            "eye,brain",
        ]))
        .unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.model_dir, PathBuf::from("/tmp/m"));
        assert_eq!(config.preload, vec!["eye", "brain"]);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "port: [not a number]\n").unwrap();

        assert!(ServiceConfig::load(&cli(&["--config", &path.to_string_lossy()])).is_err());
    }
}
