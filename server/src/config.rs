use once_cell::sync::Lazy;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_archive_url")]
    pub archive_url: String,
    /// Defaults to `viento.json` next to the archive service.
    pub wind_url: Option<String>,
    #[serde(default = "default_wind_refresh_minutes")]
    pub wind_refresh_minutes: u64,
    #[serde(default = "default_playback_interval_ms")]
    pub playback_interval_ms: u64,
}

fn default_archive_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_wind_refresh_minutes() -> u64 {
    30
}

fn default_playback_interval_ms() -> u64 {
    500
}

impl Config {
    /// The configured wind URL, else the one served by `archive_url`.
    pub fn wind_url(&self, archive_url: &str) -> String {
        self.wind_url
            .clone()
            .unwrap_or_else(|| format!("{}/viento.json", archive_url.trim_end_matches('/')))
    }

    pub fn wind_refresh(&self) -> Duration {
        Duration::from_secs(self.wind_refresh_minutes * 60)
    }

    pub fn playback_interval(&self) -> Duration {
        Duration::from_millis(self.playback_interval_ms)
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    envy::prefixed("TRACKMAP_")
        .from_env::<Config>()
        .expect("Invalid trackmap config. Optional env vars: TRACKMAP_ARCHIVE_URL, TRACKMAP_WIND_URL, TRACKMAP_WIND_REFRESH_MINUTES, TRACKMAP_PLAYBACK_INTERVAL_MS")
});

pub fn config() -> &'static Config {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> Config {
        envy::prefixed("TRACKMAP_")
            .from_iter(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = from_vars(&[]);
        assert_eq!(config.archive_url, "http://127.0.0.1:5000");
        assert_eq!(
            config.wind_url(&config.archive_url),
            "http://127.0.0.1:5000/viento.json"
        );
        assert_eq!(config.wind_refresh(), Duration::from_secs(1800));
        assert_eq!(config.playback_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_overrides() {
        let config = from_vars(&[
            ("TRACKMAP_ARCHIVE_URL", "https://archive.example.org/"),
            ("TRACKMAP_PLAYBACK_INTERVAL_MS", "250"),
        ]);
        assert_eq!(
            config.wind_url(&config.archive_url),
            "https://archive.example.org/viento.json"
        );
        assert_eq!(config.playback_interval_ms, 250);
    }

    #[test]
    fn test_explicit_wind_url() {
        let config = from_vars(&[("TRACKMAP_WIND_URL", "https://wind.example.org/latest.json")]);
        assert_eq!(
            config.wind_url("http://other:5000"),
            "https://wind.example.org/latest.json"
        );
    }

    #[test]
    fn test_invalid_number() {
        let result = envy::prefixed("TRACKMAP_").from_iter::<_, Config>(vec![(
            "TRACKMAP_WIND_REFRESH_MINUTES".to_string(),
            "soon".to_string(),
        )]);
        assert!(result.is_err());
    }
}
