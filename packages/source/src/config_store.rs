//! Persistent [`SiteConfig`] store.
//!
//! Sites live in one TOML document as a `[[sites]]` array. The whole
//! document is read into memory on open and rewritten on every mutation.

use std::path::{Path, PathBuf};

use chrono::Utc;
use data_fetch_source_models::{ExtractionStrategy, PolicyStatus, SiteConfig, SiteSummary};
use serde::{Deserialize, Serialize};

use crate::SourceError;

/// Default location of the site document.
pub const DEFAULT_CONFIG_PATH: &str = "config/websites.toml";

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    sites: Vec<toml::Value>,
}

#[derive(Serialize)]
struct Document<'a> {
    sites: &'a [SiteConfig],
}

/// Loads, caches and rewrites the site document.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    sites: Vec<SiteConfig>,
    rejected: Vec<String>,
}

impl ConfigStore {
    /// Opens the document at `path`, creating an empty one if missing.
    ///
    /// Individual site records that do not parse are skipped with a
    /// warning and reported by [`ConfigStore::rejected`].
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the file cannot be created or read,
    /// or [`SourceError::Toml`] if the document itself is not valid TOML.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let mut store = Self {
            path: path.as_ref().to_path_buf(),
            sites: Vec::new(),
            rejected: Vec::new(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Re-reads the document from disk.
    ///
    /// # Errors
    ///
    /// See [`ConfigStore::open`].
    pub fn reload(&mut self) -> Result<(), SourceError> {
        if !self.path.exists() {
            self.sites.clear();
            self.save()?;
        }

        let text = std::fs::read_to_string(&self.path)?;
        let raw: RawDocument = toml::from_str(&text)?;

        self.sites.clear();
        self.rejected.clear();
        for value in raw.sites {
            let id = value
                .get("id")
                .and_then(toml::Value::as_str)
                .unwrap_or("<missing id>")
                .to_owned();
            match value.try_into::<SiteConfig>() {
                Ok(site) => self.sites.push(site),
                Err(e) => {
                    log::warn!("Error parsing site config '{id}': {e}");
                    self.rejected.push(format!("{id}: {e}"));
                }
            }
        }

        log::info!("Loaded {} site configurations", self.sites.len());
        Ok(())
    }

    /// Rewrites the whole document.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] or [`SourceError::TomlSerialize`].
    pub fn save(&self) -> Result<(), SourceError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string(&Document { sites: &self.sites })?;
        std::fs::write(&self.path, text)?;
        log::debug!("Saved {} site configurations", self.sites.len());
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records skipped on load, as `id: reason`.
    #[must_use]
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    #[must_use]
    pub fn get(&self, site_id: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.id == site_id)
    }

    /// All sites in document order.
    #[must_use]
    pub fn sites(&self) -> &[SiteConfig] {
        &self.sites
    }

    #[must_use]
    pub fn list(&self) -> Vec<SiteSummary> {
        self.sites.iter().map(SiteConfig::summary).collect()
    }

    /// Adds or replaces a site and saves.
    ///
    /// New sites get `metadata.created` if unset; replaced sites get
    /// `metadata.last_modified`.
    ///
    /// # Errors
    ///
    /// See [`ConfigStore::save`].
    pub fn upsert(&mut self, mut site: SiteConfig) -> Result<(), SourceError> {
        let now = Utc::now();
        if let Some(existing) = self.sites.iter_mut().find(|s| s.id == site.id) {
            site.metadata.last_modified = Some(now);
            *existing = site;
        } else {
            site.metadata.created.get_or_insert(now);
            self.sites.push(site);
        }
        self.save()
    }

    /// Removes a site. Returns `false` if it was not present.
    ///
    /// # Errors
    ///
    /// See [`ConfigStore::save`].
    pub fn remove(&mut self, site_id: &str) -> Result<bool, SourceError> {
        let before = self.sites.len();
        self.sites.retain(|s| s.id != site_id);
        if self.sites.len() == before {
            return Ok(false);
        }
        self.save()?;
        log::info!("Removed site config: {site_id}");
        Ok(true)
    }

    /// Stamps `last_successful_extraction`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] for an unknown site.
    pub fn record_success(&mut self, site_id: &str) -> Result<(), SourceError> {
        let mut site = self.require(site_id)?;
        site.metadata.last_successful_extraction = Some(Utc::now());
        self.upsert(site)
    }

    /// Stores a new robots decision for a site.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] for an unknown site.
    pub fn update_robots_policy(
        &mut self,
        site_id: &str,
        status: PolicyStatus,
        override_approved: bool,
    ) -> Result<(), SourceError> {
        let mut site = self.require(site_id)?;
        site.robots_policy.status = status;
        site.robots_policy.last_checked = Some(Utc::now());
        site.robots_policy.override_approved = override_approved;
        self.upsert(site)
    }

    fn require(&self, site_id: &str) -> Result<SiteConfig, SourceError> {
        self.get(site_id)
            .cloned()
            .ok_or_else(|| SourceError::Config(format!("Site '{site_id}' not found in config")))
    }
}

/// Problems with one site record. Empty when the record is usable.
#[must_use]
pub fn validate(site: &SiteConfig) -> Vec<String> {
    let mut errors = Vec::new();
    let is_http = |u: &str| u.starts_with("http://") || u.starts_with("https://");

    if site.id.is_empty() {
        errors.push("Site ID is required".to_owned());
    }
    if site.base_url.is_empty() {
        errors.push("Base URL is required".to_owned());
    } else if !is_http(&site.base_url) {
        errors.push("Base URL must start with http:// or https://".to_owned());
    }
    if site.page_url.is_empty() {
        errors.push("Page URL is required".to_owned());
    } else if !is_http(&site.page_url) {
        errors.push("Page URL must start with http:// or https://".to_owned());
    }

    let needs_endpoint = matches!(
        site.extraction_strategy,
        ExtractionStrategy::ApiJson | ExtractionStrategy::Hybrid
    );
    if needs_endpoint && site.data_source.endpoint.as_deref().is_none_or(str::is_empty) {
        errors.push(format!(
            "Extraction strategy '{}' requires data_source.endpoint",
            site.extraction_strategy
        ));
    }
    errors
}

#[cfg(test)]
mod tests {
    use data_fetch_source_models::DataSource;

    use super::*;

    fn site(id: &str) -> SiteConfig {
        SiteConfig::new(
            id,
            "https://www.theblock.co",
            "https://www.theblock.co/data/crypto-markets/spot",
            ExtractionStrategy::ApiJson,
            DataSource::api("https://www.theblock.co/api/charts/chart/spot-volume")
                .with_data_path("chart.jsonFile.Series"),
        )
    }

    #[test]
    fn creates_missing_file_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("websites.toml");

        let mut store = ConfigStore::open(&path).unwrap();
        assert!(path.exists());
        assert!(store.sites().is_empty());

        store.upsert(site("theblock_btc_volume")).unwrap();
        store.upsert(site("coinglass_btc")).unwrap();

        let reopened = ConfigStore::open(&path).unwrap();
        assert_eq!(reopened.list().len(), 2);
        let loaded = reopened.get("theblock_btc_volume").unwrap();
        assert_eq!(loaded.data_source.data_path.as_deref(), Some("chart.jsonFile.Series"));
        assert!(loaded.metadata.created.is_some());
        assert!(loaded.metadata.last_modified.is_none());
        assert_eq!(reopened.sites()[1].id, "coinglass_btc");
    }

    #[test]
    fn updates_stamp_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::open(dir.path().join("w.toml")).unwrap();
        store.upsert(site("a")).unwrap();

        store.upsert(site("a").with_name("Renamed")).unwrap();
        assert_eq!(store.get("a").unwrap().name, "Renamed");
        assert!(store.get("a").unwrap().metadata.last_modified.is_some());

        store.record_success("a").unwrap();
        assert!(store.get("a").unwrap().metadata.last_successful_extraction.is_some());

        store.update_robots_policy("a", PolicyStatus::Allowed, false).unwrap();
        let policy = &store.get("a").unwrap().robots_policy;
        assert_eq!(policy.status, PolicyStatus::Allowed);
        assert!(policy.last_checked.is_some());

        assert!(store.record_success("missing").is_err());
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
    }

    #[test]
    fn skips_records_with_unknown_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.toml");
        std::fs::write(
            &path,
            r#"
[[sites]]
id = "good"
base_url = "https://a.com"
page_url = "https://a.com/p"
extraction_strategy = "dom_table"

[sites.data_source]
type = "table"
selector = "table.data"

[[sites]]
id = "bad"
base_url = "https://b.com"
page_url = "https://b.com/p"
extraction_strategy = "screenshot"
"#,
        )
        .unwrap();

        let store = ConfigStore::open(&path).unwrap();
        assert_eq!(store.sites().len(), 1);
        assert_eq!(store.rejected().len(), 1);
        assert!(store.rejected()[0].starts_with("bad:"));
    }

    #[test]
    fn validate_reports_problems() {
        assert!(validate(&site("ok")).is_empty());

        let mut bad = site("");
        bad.base_url = "ftp://x".to_owned();
        bad.page_url = String::new();
        bad.data_source.endpoint = None;
        let errors = validate(&bad);
        assert_eq!(
            errors,
            vec![
                "Site ID is required",
                "Base URL must start with http:// or https://",
                "Page URL is required",
                "Extraction strategy 'api_json' requires data_source.endpoint",
            ]
        );
    }
}
