use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration: built-in defaults, then the TOML file (when present),
/// then `AUDIOMILL_`-prefixed environment overrides. Nested keys use `__`,
/// e.g. `AUDIOMILL_SERVER__PORT=9090`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Env::prefixed("AUDIOMILL_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from a TOML string (useful for testing).
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
host = "127.0.0.1"
port = 3000

[validation]
allowed_domains = ["youtube.com"]
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.validation.allowed_domains, vec!["youtube.com"]);
        // Defaults still fill the rest.
        assert_eq!(config.queue.capacity, 1000);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/audiomill.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_from_str_invalid() {
        let result = load_config_from_str("queue = \"not a table\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
