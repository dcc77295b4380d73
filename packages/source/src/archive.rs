//! Output paths, run/site identifiers and the raw response archive.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use data_fetch_scraper::DataFormat;
use regex::Regex;

/// Overrides the output root.
pub const OUTPUT_DIR_ENV: &str = "DATA_FETCH_OUTPUT_DIR";

/// Output root when [`OUTPUT_DIR_ENV`] is unset.
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

const ARCHIVE_EXTENSIONS: &[&str] = &[".json", ".html", ".txt", ".bin"];

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("valid regex"));

/// Root of everything written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    root: PathBuf,
}

impl OutputPaths {
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Uses `DATA_FETCH_OUTPUT_DIR`, falling back to `outputs/`.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(OUTPUT_DIR_ENV)
            .map_or_else(|_| Self::new(DEFAULT_OUTPUT_DIR), Self::new)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/raw/<site>/<run>`
    #[must_use]
    pub fn raw_dir(&self, site_id: &str, run_id: &str) -> PathBuf {
        self.root.join("raw").join(site_id).join(run_id)
    }

    /// `<root>/excel`
    #[must_use]
    pub fn excel_dir(&self) -> PathBuf {
        self.root.join("excel")
    }
}

fn short_hash(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))[..6].to_owned()
}

/// `{prefix}_{YYYYmmdd_HHMMSS}_{6 hex}`, or without the prefix when empty.
#[must_use]
pub fn generate_run_id(prefix: &str) -> String {
    let now = Utc::now();
    let stamp = now.format("%Y%m%d_%H%M%S");
    let hash = short_hash(&format!(
        "{}{}",
        now.timestamp_nanos_opt().unwrap_or_default(),
        rand::random::<u64>()
    ));
    if prefix.is_empty() {
        format!("{stamp}_{hash}")
    } else {
        format!("{prefix}_{stamp}_{hash}")
    }
}

/// Stable id for a site URL: domain, path slug (or `slug`) and a short
/// hash of the URL, lowercased and joined with `_`.
#[must_use]
pub fn generate_site_id(url: &str, slug: Option<&str>) -> String {
    let (domain, path) = url::Url::parse(url).map_or_else(
        |_| (String::new(), String::new()),
        |u| {
            (
                u.host_str().unwrap_or_default().to_owned(),
                u.path().to_owned(),
            )
        },
    );
    let domain = domain.replace("www.", "").replace('.', "_");

    let slug = slug.map_or_else(
        || {
            NON_ALNUM
                .replace_all(path.trim_matches('/'), "_")
                .chars()
                .take(30)
                .collect::<String>()
        },
        str::to_owned,
    );

    let mut parts = vec![domain];
    if !slug.is_empty() {
        parts.push(slug);
    }
    parts.push(short_hash(url));

    parts
        .join("_")
        .to_ascii_lowercase()
        .trim_matches('_')
        .to_owned()
}

/// Writes `content` to `<root>/raw/<site>/<run>/<filename><ext>`.
///
/// The extension is picked from the content shape unless `filename`
/// already has one of `.json`, `.html`, `.txt` or `.bin`.
///
/// # Errors
///
/// Returns an I/O error if the directory or file cannot be written.
pub fn save_raw_response(
    paths: &OutputPaths,
    content: &[u8],
    filename: &str,
    site_id: &str,
    run_id: &str,
) -> std::io::Result<PathBuf> {
    let dir = paths.raw_dir(site_id, run_id);
    std::fs::create_dir_all(&dir)?;

    let filename = if ARCHIVE_EXTENSIONS.iter().any(|e| filename.ends_with(e)) {
        filename.to_owned()
    } else {
        format!("{filename}.{}", DataFormat::sniff(content).extension())
    };

    let path = dir.join(filename);
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Reads back a file written by [`save_raw_response`].
///
/// # Errors
///
/// Returns an I/O error if the file does not exist or is not UTF-8.
pub fn load_raw_response(
    paths: &OutputPaths,
    filename: &str,
    site_id: &str,
    run_id: &str,
) -> std::io::Result<String> {
    std::fs::read_to_string(paths.raw_dir(site_id, run_id).join(filename))
}
