use std::path::PathBuf;

/// Folder and server settings shared by the CLI and the HTTP server.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Where source videos and images are dropped
    pub input_folder: PathBuf,
    /// Where every intermediate and final file is written
    pub output_folder: PathBuf,
    /// The edit descriptor written by `POST /trim`
    pub trim_data_path: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::from("inputFolder"),
            output_folder: PathBuf::from("outputFolder"),
            trim_data_path: PathBuf::from("trim-results.json"),
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    /// Defaults overridden by `VERTICUT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            input_folder: lookup("VERTICUT_INPUT")
                .map(PathBuf::from)
                .unwrap_or(defaults.input_folder),
            output_folder: lookup("VERTICUT_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_folder),
            trim_data_path: lookup("VERTICUT_TRIM_DATA")
                .map(PathBuf::from)
                .unwrap_or(defaults.trim_data_path),
            host: lookup("VERTICUT_HOST").unwrap_or(defaults.host),
            port: lookup("VERTICUT_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn environment_overrides_defaults() {
        let env: HashMap<&str, &str> = [
            ("VERTICUT_INPUT", "/media/in"),
            ("VERTICUT_PORT", "8080"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.input_folder, PathBuf::from("/media/in"));
        assert_eq!(config.output_folder, PathBuf::from("outputFolder"));
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn unparsable_port_falls_back() {
        let config = Config::from_lookup(|k| (k == "VERTICUT_PORT").then(|| "http".to_string()));
        assert_eq!(config.port, 3000);
    }
}
