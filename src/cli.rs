//! Command-line arguments.
//!
//! Flags override values from the optional config file, which in turn override
//! the built-in defaults.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigError, ServerConfig};

/// moose: serve a directory over HTTP and HTTPS
#[derive(Parser, Debug, Default)]
#[command(name = "moose", version, about)]
pub struct Args {
    /// Path to an optional TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (e.g., "moose=debug,tower_http=info")
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// HTTP host to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Disables HTTP
    #[arg(long)]
    pub nohttp: bool,

    /// HTTPS host to listen on
    #[arg(long)]
    pub sslhost: Option<String>,

    /// HTTPS port to listen on (0 to disable HTTPS)
    #[arg(long)]
    pub sslport: Option<u16>,

    /// Disables HTTPS (enabled by default)
    #[arg(long)]
    pub nossl: bool,

    /// File to use as TLS certificate (generated in memory if not found)
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// File to use as TLS private key (generated in memory if not found)
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// Directory to serve
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Save a generated certificate and key to the --cert and --key paths
    #[arg(long)]
    pub savekeys: bool,
}

impl Args {
    /// Build the effective configuration: file (if any), then flags on top.
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.http.host = host;
        }
        if let Some(port) = self.port {
            config.http.port = port;
        }
        if self.nohttp {
            config.http.enabled = false;
        }
        if let Some(host) = self.sslhost {
            config.tls.host = host;
        }
        if let Some(port) = self.sslport {
            config.tls.port = port;
        }
        if self.nossl {
            config.tls.enabled = false;
        }
        if let Some(cert) = self.cert {
            config.tls.cert_path = cert;
        }
        if let Some(key) = self.key {
            config.tls.key_path = key;
        }
        if let Some(dir) = self.dir {
            config.dir = dir;
        }
        if self.savekeys {
            config.tls.save_generated = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> ServerConfig {
        let mut argv = vec!["moose"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap().into_config().unwrap()
    }

    #[test]
    fn test_no_flags_gives_defaults() {
        assert_eq!(parse(&[]), ServerConfig::default());
    }

    #[test]
    fn test_custom_port() {
        let config = parse(&["--port", "8080"]);
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.tls.port, 443);
    }

    #[test]
    fn test_custom_dir() {
        let config = parse(&["--dir", "/tmp/www"]);
        assert_eq!(config.dir, PathBuf::from("/tmp/www"));
    }

    #[test]
    fn test_nossl_disables_https() {
        let config = parse(&["--nossl"]);
        assert!(!config.tls.enabled);
        assert!(!config.tls.is_active());
        assert_eq!(config.tls.port, 443);
    }

    #[test]
    fn test_sslport_zero_disables_https() {
        let config = parse(&["--sslport", "0"]);
        assert!(config.tls.enabled);
        assert!(!config.tls.is_active());
    }

    #[test]
    fn test_all_flags() {
        let config = parse(&[
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--sslhost",
            "::1",
            "--sslport",
            "8443",
            "--cert",
            "/etc/ssl/site.crt",
            "--key",
            "/etc/ssl/site.key",
            "--dir",
            "/srv",
            "--savekeys",
        ]);
        assert_eq!(config.http.host, "127.0.0.1");
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.tls.host, "::1");
        assert_eq!(config.tls.port, 8443);
        assert_eq!(config.tls.cert_path, PathBuf::from("/etc/ssl/site.crt"));
        assert_eq!(config.tls.key_path, PathBuf::from("/etc/ssl/site.key"));
        assert_eq!(config.dir, PathBuf::from("/srv"));
        assert!(config.tls.save_generated);
    }

    #[test]
    fn test_nohttp_and_nossl_rejected() {
        let args = Args::try_parse_from(["moose", "--nohttp", "--nossl"]).unwrap();
        assert!(matches!(
            args.into_config(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Args::try_parse_from(["moose", "--port", "70000"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "dir = \"/srv/from-file\"\n[http]\nport = 8000\n[tls]\nport = 8443\n"
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = parse(&["--config", &path, "--port", "9000"]);
        assert_eq!(config.dir, PathBuf::from("/srv/from-file"));
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.tls.port, 8443);
    }
}
