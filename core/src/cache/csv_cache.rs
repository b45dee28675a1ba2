//! CSV Cache (C4, spec.md §4.4) — the only subsystem that must survive a
//! crash mid-write. Tool rows are append-only; the sidecar JSON header is
//! rewritten atomically via `tmp+fsync+rename` after every append.

use std::collections::HashMap;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use chrono::DateTime;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::FailureKind;
use crate::paths::NcpPaths;

const CACHE_VERSION: u32 = 1;
const CACHE_MAX_AGE_DAYS: i64 = 7;
/// Backoff applied after the 1st/2nd/3rd+ consecutive failure (spec.md §4.4,
/// §8's boundary behavior: `[1h, 6h, 24h, 24h]` for attempts 1..4).
const BACKOFF_HOURS: [i64; 3] = [1, 6, 24];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvToolRow {
    pub mcp_name: String,
    pub tool_id: String,
    pub tool_name: String,
    pub description: String,
    pub hash: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedMcp {
    pub last_attempt: DateTime<Utc>,
    pub error_type: FailureKind,
    pub error_message: String,
    pub attempt_count: u32,
    pub next_retry: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHeader {
    pub version: u32,
    pub profile_name: String,
    pub profile_hash: String,
    pub ncp_version: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub total_mcps: usize,
    pub total_tools: usize,
    pub indexed_mcps: HashMap<String, String>,
    pub failed_mcps: HashMap<String, FailedMcp>,
}

impl CacheHeader {
    fn new(profile_name: &str, profile_hash: &str) -> Self {
        let now = Utc::now();
        Self {
            version: CACHE_VERSION,
            profile_name: profile_name.to_string(),
            profile_hash: profile_hash.to_string(),
            ncp_version: ncp_version(),
            created_at: now,
            last_updated: now,
            total_mcps: 0,
            total_tools: 0,
            indexed_mcps: HashMap::new(),
            failed_mcps: HashMap::new(),
        }
    }
}

fn ncp_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub struct CsvCache {
    csv_path: PathBuf,
    meta_path: PathBuf,
    profile_name: String,
    header: CacheHeader,
}

impl CsvCache {
    /// Loads (or initializes) the cache for `profile_name`, clearing
    /// `failedMCPs` if the running binary's version differs from the one
    /// that last wrote the cache (spec.md §4.4: "code changes may have fixed
    /// bugs").
    pub fn initialize(paths: &NcpPaths, profile_name: &str, profile_hash: &str) -> Result<Self> {
        let csv_path = paths.tools_csv(profile_name);
        let meta_path = paths.cache_meta(profile_name);
        std::fs::create_dir_all(paths.cache_dir()).context("creating cache directory")?;

        let mut header = match read_header(&meta_path) {
            Ok(Some(header)) => header,
            Ok(None) | Err(_) => CacheHeader::new(profile_name, profile_hash),
        };

        if header.ncp_version != ncp_version() {
            header.failed_mcps.clear();
            header.ncp_version = ncp_version();
        }

        let mut cache = Self {
            csv_path,
            meta_path,
            profile_name: profile_name.to_string(),
            header,
        };
        cache.save_header()?;
        Ok(cache)
    }

    /// spec.md §4.4's cache-validity predicate: metadata parses, profile hash
    /// matches, the CSV file exists, and the cache is younger than 7 days.
    pub fn validate_cache(&self, current_profile_hash: &str) -> bool {
        if self.header.profile_hash != current_profile_hash {
            return false;
        }
        if !self.csv_path.exists() {
            return false;
        }
        Utc::now() - self.header.created_at < ChronoDuration::days(CACHE_MAX_AGE_DAYS)
    }

    /// Deletes both cache files and resets in-memory state. Called when
    /// `validate_cache` returns false.
    pub fn clear(&mut self, profile_hash: &str) -> Result<()> {
        let _ = std::fs::remove_file(&self.csv_path);
        let _ = std::fs::remove_file(&self.meta_path);
        self.header = CacheHeader::new(&self.profile_name, profile_hash);
        self.save_header()
    }

    /// Drops `mcp` from `indexedMCPs` so the next indexing pass treats it as
    /// unindexed and reprobes it (spec.md §4.7: the version-aware validator
    /// forces a reindex rather than trusting a stale cache entry). The CSV
    /// rows themselves are append-only and are superseded by the rows the
    /// reprobe appends.
    pub fn invalidate_mcp(&mut self, mcp: &str) -> Result<()> {
        self.header.indexed_mcps.remove(mcp);
        self.save_header()
    }

    pub fn is_mcp_indexed(&self, mcp: &str, current_config_hash: &str) -> bool {
        self.header
            .indexed_mcps
            .get(mcp)
            .is_some_and(|hash| hash == current_config_hash)
    }

    pub fn should_retry_failed(&self, mcp: &str, force: bool) -> bool {
        if force {
            return true;
        }
        match self.header.failed_mcps.get(mcp) {
            None => true,
            Some(failed) => Utc::now() >= failed.next_retry,
        }
    }

    /// Appends one MCP's tool rows, fsyncs the CSV, then rewrites the sidecar
    /// header atomically. A crash between these two steps leaves a CSV with
    /// rows for an MCP not (yet) reflected in `indexedMCPs` — the next
    /// `initialize()` will simply treat that MCP as not-yet-indexed and
    /// reprobe it.
    pub fn append_mcp(
        &mut self,
        mcp: &str,
        config_hash: &str,
        rows: &[CsvToolRow],
    ) -> Result<()> {
        self.append_rows(rows)?;
        self.header.indexed_mcps.insert(mcp.to_string(), config_hash.to_string());
        self.header.failed_mcps.remove(mcp);
        self.recompute_totals(rows.len());
        self.save_header()
    }

    fn append_rows(&self, rows: &[CsvToolRow]) -> Result<()> {
        let header_needed = !self.csv_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("opening {}", self.csv_path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if header_needed {
            writer.write_record([
                "mcp_name",
                "tool_id",
                "tool_name",
                "description",
                "hash",
                "timestamp",
            ])?;
        }
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        let file: File = writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("flushing CSV writer: {err}"))?;
        file.sync_all().context("fsyncing tools CSV")?;
        Ok(())
    }

    fn recompute_totals(&mut self, new_rows: usize) {
        self.header.total_mcps = self.header.indexed_mcps.len();
        self.header.total_tools += new_rows;
    }

    /// Records a probe failure, classifying the error and computing the next
    /// retry time per the backoff table (spec.md §4.4, §8).
    pub fn mark_failed(&mut self, mcp: &str, err: &anyhow::Error) -> Result<()> {
        let kind = FailureKind::classify(err);
        let attempt_count = self
            .header
            .failed_mcps
            .get(mcp)
            .map(|f| f.attempt_count + 1)
            .unwrap_or(1);
        let backoff_hours = BACKOFF_HOURS[(attempt_count as usize - 1).min(2)];
        let now = Utc::now();
        self.header.failed_mcps.insert(
            mcp.to_string(),
            FailedMcp {
                last_attempt: now,
                error_type: kind,
                error_message: err.to_string(),
                attempt_count,
                next_retry: now + ChronoDuration::hours(backoff_hours),
            },
        );
        self.save_header()
    }

    /// Flushes the sidecar header; the CSV itself is already fsynced after
    /// every `append_mcp`.
    pub fn finalize(&mut self) -> Result<()> {
        self.save_header()
    }

    /// Reads every complete row back from the CSV, tolerating a trailing
    /// partial line left by a crash mid-`fsync` (spec.md §9's append-only
    /// reader contract).
    pub fn read_all(&self) -> Result<Vec<CsvToolRow>> {
        if !self.csv_path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read(&self.csv_path).context("reading tools CSV")?;
        let text = String::from_utf8_lossy(&raw);
        let complete = match text.rfind('\n') {
            Some(last_newline) => &text[..=last_newline],
            None => return Ok(Vec::new()),
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(complete.as_bytes());
        let mut rows = Vec::new();
        for result in reader.deserialize() {
            match result {
                Ok(row) => rows.push(row),
                Err(_) => continue,
            }
        }
        Ok(rows)
    }

    pub fn header(&self) -> &CacheHeader {
        &self.header
    }

    fn save_header(&mut self) -> Result<()> {
        self.header.last_updated = Utc::now();
        atomic_write_json(&self.meta_path, &self.header)
    }
}

fn read_header(path: &Path) -> Result<Option<CacheHeader>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).context("reading cache meta")?;
    Ok(Some(serde_json::from_str(&raw).context("parsing cache meta")?))
}

/// `tmp+fsync+rename`, the one non-append write pattern the spec allows
/// (spec.md §9).
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("creating parent directory")?;
    }
    let mut tmp = tempfile::NamedTempFile::new_in(
        path.parent().unwrap_or_else(|| Path::new(".")),
    )
    .context("creating temp file")?;
    let json = serde_json::to_vec_pretty(value).context("serializing JSON")?;
    tmp.write_all(&json).context("writing temp file")?;
    tmp.as_file().sync_all().context("fsyncing temp file")?;
    tmp.persist(path)
        .map_err(|err| anyhow::anyhow!("renaming temp file into place: {err}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn row(mcp: &str, tool: &str) -> CsvToolRow {
        CsvToolRow {
            mcp_name: mcp.to_string(),
            tool_id: format!("{mcp}:{tool}"),
            tool_name: tool.to_string(),
            description: "desc".to_string(),
            hash: "h".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let mut cache = CsvCache::initialize(&paths, "default", "hash1").unwrap();
        cache
            .append_mcp("fs", "cfg-hash", &[row("fs", "read"), row("fs", "write")])
            .unwrap();
        let rows = cache.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(cache.is_mcp_indexed("fs", "cfg-hash"));
        assert!(!cache.is_mcp_indexed("fs", "other-hash"));
    }

    #[test]
    fn mark_failed_computes_backoff_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let mut cache = CsvCache::initialize(&paths, "default", "hash1").unwrap();
        let err = anyhow::anyhow!("connection timed out");
        for expected_hours in [1i64, 6, 24, 24] {
            cache.mark_failed("web", &err).unwrap();
            let failed = cache.header().failed_mcps.get("web").unwrap();
            let delta = failed.next_retry - failed.last_attempt;
            assert_eq!(delta.num_hours(), expected_hours);
        }
    }

    #[test]
    fn invalidate_mcp_clears_indexed_marker() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let mut cache = CsvCache::initialize(&paths, "default", "hash1").unwrap();
        cache.append_mcp("fs", "cfg-hash", &[row("fs", "read")]).unwrap();
        assert!(cache.is_mcp_indexed("fs", "cfg-hash"));
        cache.invalidate_mcp("fs").unwrap();
        assert!(!cache.is_mcp_indexed("fs", "cfg-hash"));
    }

    #[test]
    fn invalid_profile_hash_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let cache = CsvCache::initialize(&paths, "default", "hash1").unwrap();
        assert!(cache.validate_cache("hash1"));
        assert!(!cache.validate_cache("different-hash"));
    }

    #[test]
    fn should_retry_failed_respects_next_retry() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let mut cache = CsvCache::initialize(&paths, "default", "hash1").unwrap();
        assert!(cache.should_retry_failed("web", false));
        cache
            .mark_failed("web", &anyhow::anyhow!("connection timed out"))
            .unwrap();
        assert!(!cache.should_retry_failed("web", false));
        assert!(cache.should_retry_failed("web", true));
    }
}
