//! On-disk cache for GET responses.
//!
//! # Design
//! Each entry is one file named by the v5 UUID of the request URL: a JSON
//! header line (URL, status, headers, timestamps) followed by the raw body.
//! Writes go to a uniquely named temp file that is renamed into place.
//! Only `200` responses that carry `Cache-Control: max-age=N` are stored, and
//! an entry is served until `N` seconds have passed. After every write the
//! oldest entries are removed until the directory fits in the quota.
//! Failures are logged and otherwise ignored: a broken cache only costs a
//! network round-trip.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Name of the directory created inside the configured cache directory.
pub const CACHE_SUBDIR: &str = "netlib-cache";

const ENTRY_EXT: &str = "entry";
const TMP_EXT: &str = "tmp";

/// Everything about a stored response except its body.
#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    stored_at: u64,
    expires_at: u64,
}

/// Split a stored file into its header and body.
fn decode_entry(raw: &[u8]) -> Result<(EntryHeader, &[u8]), serde_json::Error> {
    let split = raw.iter().position(|b| *b == b'\n').unwrap_or(raw.len());
    let header = serde_json::from_slice(&raw[..split])?;
    let body = raw.get(split + 1..).unwrap_or_default();
    Ok((header, body))
}

/// A size-bounded response cache rooted at `<cache_dir>/netlib-cache`.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    quota: u64,
}

impl ResponseCache {
    /// Open the cache below `cache_dir`, creating the entry directory.
    ///
    /// Returns `Ok(None)` when `cache_dir` itself does not exist.
    pub fn open(cache_dir: &Path, quota: u64) -> io::Result<Option<Self>> {
        if !cache_dir.is_dir() {
            debug!(dir = %cache_dir.display(), "cache directory missing, caching disabled");
            return Ok(None);
        }
        let dir = cache_dir.join(CACHE_SUBDIR);
        fs::create_dir_all(&dir)?;
        Ok(Some(Self { dir, quota }))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Return a fresh stored response for `request`, if any.
    pub fn lookup(&self, request: &HttpRequest) -> Option<HttpResponse> {
        if request.method != HttpMethod::Get || bypasses_cache(request) {
            return None;
        }
        let path = self.entry_path(&request.url);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "cache read failed");
                return None;
            }
        };
        let (header, body) = match decode_entry(&raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "discarding corrupt cache entry");
                let _ = fs::remove_file(&path);
                return None;
            }
        };
        if header.url != request.url || header.expires_at <= now_secs() {
            return None;
        }
        debug!(url = %request.url, "cache hit");
        Some(HttpResponse {
            status: header.status,
            headers: header.headers,
            body: body.to_vec(),
        })
    }

    /// Store `response` if it is cacheable, then enforce the quota.
    pub fn store(&self, request: &HttpRequest, response: &HttpResponse) {
        if request.method != HttpMethod::Get || response.status != 200 || bypasses_cache(request) {
            return;
        }
        let Some(ttl) = response.header("cache-control").and_then(max_age) else {
            return;
        };
        let now = now_secs();
        let header = EntryHeader {
            url: request.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            stored_at: now,
            expires_at: now.saturating_add(ttl),
        };
        if let Err(e) = self.write_entry(&header, &response.body) {
            warn!(error = %e, url = %request.url, "cache write failed");
            return;
        }
        if let Err(e) = self.enforce_quota(&self.entry_path(&header.url)) {
            warn!(error = %e, "cache eviction failed");
        }
    }

    fn write_entry(&self, header: &EntryHeader, body: &[u8]) -> io::Result<()> {
        let mut bytes = serde_json::to_vec(header).map_err(io::Error::other)?;
        bytes.push(b'\n');
        bytes.extend_from_slice(body);

        let path = self.entry_path(&header.url);
        let tmp = self.dir.join(format!("{}.{TMP_EXT}", Uuid::new_v4()));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }

    /// Remove the least recently written entries, other than `keep`, until
    /// the total fits.
    fn enforce_quota(&self, keep: &Path) -> io::Result<()> {
        let mut files = Vec::new();
        let mut total = 0u64;
        for item in fs::read_dir(&self.dir)? {
            let item = item?;
            let meta = item.metadata()?;
            // in-flight writes belong to other stores
            if !meta.is_file() || item.path().extension().is_some_and(|ext| ext == TMP_EXT) {
                continue;
            }
            total += meta.len();
            if item.path() == keep {
                continue;
            }
            files.push((meta.modified().unwrap_or(UNIX_EPOCH), meta.len(), item.path()));
        }
        if total <= self.quota {
            return Ok(());
        }
        files.sort_by_key(|(modified, _, _)| *modified);
        for (_, len, path) in files {
            if total <= self.quota {
                break;
            }
            fs::remove_file(&path)?;
            total -= len;
            debug!(path = %path.display(), "evicted cache entry");
        }
        Ok(())
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        let key = Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes());
        self.dir.join(format!("{key}.{ENTRY_EXT}"))
    }
}

/// Parse `max-age` out of a `Cache-Control` value. `no-store` and zero ages
/// make the response uncacheable.
fn max_age(cache_control: &str) -> Option<u64> {
    let mut age = None;
    for directive in cache_control.split(',').map(str::trim) {
        let lower = directive.to_ascii_lowercase();
        if lower == "no-store" {
            return None;
        }
        if let Some(value) = lower.strip_prefix("max-age=") {
            age = value.trim_matches('"').parse::<u64>().ok();
        }
    }
    age.filter(|a| *a > 0)
}

fn bypasses_cache(request: &HttpRequest) -> bool {
    request.header_values("cache-control").any(|v| {
        v.split(',')
            .map(|d| d.trim().to_ascii_lowercase())
            .any(|d| d == "no-cache" || d == "no-store")
    })
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
