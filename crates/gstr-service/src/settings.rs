//! Runtime settings, layered from an optional TOML file and `GSTR__*`
//! environment variables.

use std::path::{Path, PathBuf};

use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use gstr_portal::PortalConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path:      PathBuf,
  /// Persist every successful run to the report archive.
  pub archive_reports: bool,
  pub portal:          PortalConfig,
  pub cache:           CacheSettings,
  pub fetch:           FetchSettings,
  pub reconcile:       ReconcileSettings,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:      PathBuf::from("~/.local/share/gstr/gstr.db"),
      archive_reports: true,
      portal:          PortalConfig::default(),
      cache:           CacheSettings::default(),
      fetch:           FetchSettings::default(),
      reconcile:       ReconcileSettings::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
  pub ttl_days: u32,
}

impl Default for CacheSettings {
  fn default() -> Self { Self { ttl_days: 7 } }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
  pub concurrency: usize,
}

impl Default for FetchSettings {
  fn default() -> Self { Self { concurrency: 6 } }
}

impl FetchSettings {
  /// Upstream rate limits allow between one and ten requests in flight.
  pub fn concurrency(&self) -> usize { self.concurrency.clamp(1, 10) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
  pub tolerance:           f64,
  pub large_b2c_threshold: f64,
}

impl Default for ReconcileSettings {
  fn default() -> Self {
    Self {
      tolerance:           gstr_reco::Tolerance::DEFAULT.value(),
      large_b2c_threshold: gstr_reco::books::LARGE_B2C_THRESHOLD,
    }
  }
}

impl Settings {
  /// Read `path` (if it exists), then overlay `GSTR__SECTION__KEY` variables.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::build(
      Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(Environment::with_prefix("GSTR").separator("__")),
    )
  }

  pub fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
    builder.build()?.try_deserialize()
  }
}

#[cfg(test)]
mod tests {
  use config::FileFormat;

  use super::*;

  #[test]
  fn empty_sources_give_defaults() {
    let s = Settings::build(Config::builder()).unwrap();
    assert_eq!(s.cache.ttl_days, 7);
    assert_eq!(s.fetch.concurrency(), 6);
    assert_eq!(s.reconcile.tolerance, 1.0);
    assert_eq!(s.portal.timeout_secs, 20);
    assert!(s.archive_reports);
  }

  #[test]
  fn file_values_override_defaults() {
    let toml = r#"
      archive_reports = false
      [portal]
      api_key = "key_live_x"
      [fetch]
      concurrency = 40
      [reconcile]
      tolerance = 0.5
    "#;
    let s = Settings::build(
      Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
    )
    .unwrap();
    assert!(!s.archive_reports);
    assert_eq!(s.portal.api_key, "key_live_x");
    assert_eq!(s.portal.api_version, "1.0.0");
    assert_eq!(s.fetch.concurrency(), 10);
    assert_eq!(s.reconcile.tolerance, 0.5);
    assert_eq!(s.reconcile.large_b2c_threshold, 250_000.0);
  }
}
