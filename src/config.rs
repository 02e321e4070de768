//! Crawl settings: defaults, optional YAML file, command-line overrides.
//!
//! Precedence is CLI flag > YAML file > built-in default. Every field of the
//! YAML file is optional:
//!
//! ```yaml
//! max_depth: 3
//! max_pages: 250
//! max_threads: 8
//! timeout_secs: 15
//! politeness_delay_ms: { min: 200, max: 600 }
//! max_links_per_page: 25
//! submit_policy: coalesce        # or: supersede
//! keyword_model: ./keywords.yaml
//! user_agents:
//!   - "Mozilla/5.0 (X11; Linux x86_64) ..."
//! ```

use crate::cli::Cli;
use crate::crawler::PolitenessDelay;
use crate::errors::ConfigError;
use crate::jobs::SubmitPolicy;
use crate::models::CrawlLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Inclusive range for the random pause before each fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlSettings {
    pub max_depth: usize,
    pub max_pages: usize,
    pub max_threads: usize,
    pub timeout_secs: u64,
    pub politeness_delay_ms: DelayRange,
    pub max_links_per_page: usize,
    pub user_agents: Vec<String>,
    pub submit_policy: SubmitPolicy,
    pub keyword_model: Option<PathBuf>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        let limits = CrawlLimits::default();
        Self {
            max_depth: limits.max_depth,
            max_pages: limits.max_pages,
            max_threads: limits.max_threads,
            timeout_secs: 10,
            politeness_delay_ms: DelayRange { min: 200, max: 600 },
            max_links_per_page: 25,
            user_agents: Vec::new(),
            submit_policy: SubmitPolicy::default(),
            keyword_model: None,
        }
    }
}

impl CrawlSettings {
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml(&raw)?;
        debug!(?settings, "Loaded settings file");
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Defaults, then the `--config` file if given, then CLI flags; validated.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut settings = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.apply_cli(cli);
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = cli.max_depth {
            self.max_depth = v;
        }
        if let Some(v) = cli.max_pages {
            self.max_pages = v;
        }
        if let Some(v) = cli.max_threads {
            self.max_threads = v;
        }
        if let Some(v) = cli.timeout_secs {
            self.timeout_secs = v;
        }
        if let Some(v) = cli.policy {
            self.submit_policy = v;
        }
        if let Some(path) = &cli.keyword_model {
            self.keyword_model = Some(path.clone());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let at_least_one = [
            ("max_pages", self.max_pages as u64),
            ("max_threads", self.max_threads as u64),
            ("timeout_secs", self.timeout_secs),
            ("max_links_per_page", self.max_links_per_page as u64),
        ];
        if let Some((name, _)) = at_least_one.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
        }
        let delay = self.politeness_delay_ms;
        if delay.min > delay.max {
            return Err(ConfigError::Invalid(format!(
                "politeness_delay_ms.min ({}) exceeds max ({})",
                delay.min, delay.max
            )));
        }
        if self.user_agents.iter().any(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::Invalid("user_agents contains an empty entry".into()));
        }
        Ok(())
    }

    pub fn limits(&self) -> CrawlLimits {
        CrawlLimits {
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            max_threads: self.max_threads,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn politeness(&self) -> PolitenessDelay {
        PolitenessDelay::from_millis(self.politeness_delay_ms.min, self.politeness_delay_ms.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let s = CrawlSettings::default();
        assert_eq!(s.limits(), CrawlLimits::default());
        assert_eq!(s.timeout(), Duration::from_secs(10));
        assert_eq!(s.max_links_per_page, 25);
        assert_eq!(s.submit_policy, SubmitPolicy::Coalesce);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let s = CrawlSettings::from_yaml("max_pages: 250\nsubmit_policy: supersede\n").unwrap();
        assert_eq!(s.max_pages, 250);
        assert_eq!(s.max_depth, 4);
        assert_eq!(s.submit_policy, SubmitPolicy::Supersede);
        assert_eq!(CrawlSettings::from_yaml("").unwrap(), CrawlSettings::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            CrawlSettings::from_yaml("max_pagez: 3\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_validation() {
        let mut s = CrawlSettings {
            max_threads: 0,
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(ConfigError::Invalid(_))));

        s.max_threads = 2;
        s.max_depth = 0;
        assert!(s.validate().is_ok());

        s.politeness_delay_ms = DelayRange { min: 900, max: 100 };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_depth: 1\nmax_pages: 50\ntimeout_secs: 30").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::parse_from([
            "newstrace",
            "--config",
            path.as_str(),
            "--max-depth",
            "3",
            "https://example.com",
        ]);
        let s = CrawlSettings::resolve(&cli).unwrap();
        assert_eq!(s.max_depth, 3);
        assert_eq!(s.max_pages, 50);
        assert_eq!(s.timeout_secs, 30);
    }

    #[test]
    fn test_missing_file_is_error() {
        let cli = Cli::parse_from([
            "newstrace",
            "--config",
            "/nonexistent/newstrace.yaml",
            "https://example.com",
        ]);
        assert!(matches!(CrawlSettings::resolve(&cli), Err(ConfigError::Io(_))));
    }
}
