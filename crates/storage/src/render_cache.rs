//! Disk backed cache for rendered rasters.
//!
//! Each artifact is one scratch file named `i{pid}_{instance}-{key}` inside
//! the work directory. The instance number separates caches opened by the
//! same process. The key lists the identity tokens of a node and every node
//! below it, so any artifact that depends on a node can be found (and
//! purged) from that node's token alone.
//!
//! # File Format
//! ```text
//! magic   [u8; 4]   "ISC1"
//! width   u32 LE
//! height  u32 LE
//! bpp     u32 LE
//! length  u64 LE    compressed payload length
//! payload           zlib compressed pixels
//! ```

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use imagery_common::{SynthError, SynthResult, RASTER_BPP};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

const MAGIC: &[u8; 4] = b"ISC1";
const HEADER_LEN: usize = 4 + 4 + 4 + 4 + 8;
const TOKEN_SEPARATOR: char = '-';

/// Caches opened so far by this process.
static NEXT_INSTANCE: AtomicU32 = AtomicU32::new(0);

/// Cache key for a composition subtree.
///
/// Tokens are listed in preorder. Synthetic nodes are followed by an `x{n}`
/// child count so that differently shaped trees over the same nodes never
/// share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CacheKey {
    tokens: Vec<String>,
}

impl CacheKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node identity token. Tokens must not contain `-`.
    pub fn push_node(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    /// Append the child count of the synthetic node just pushed.
    pub fn push_child_count(&mut self, count: usize) {
        self.tokens.push(format!("x{}", count));
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn parse(s: &str) -> Self {
        Self {
            tokens: s.split(TOKEN_SEPARATOR).map(str::to_string).collect(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", TOKEN_SEPARATOR)?;
            }
            f.write_str(t)?;
        }
        Ok(())
    }
}

/// Statistics for the render cache
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub store_failures: u64,
    pub purged: u64,
    pub bytes_written: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Per-process disk cache of rendered rasters.
pub struct RenderCache {
    /// Scratch directory
    dir: PathBuf,
    /// File name prefix, `i{pid}_{instance}-`
    prefix: String,
    compression: Compression,
    enabled: bool,
    stats: CacheStats,
}

impl RenderCache {
    /// Open a cache in `dir` for the current process, creating the directory.
    pub fn open(dir: impl Into<PathBuf>, compression_level: u32, enabled: bool) -> SynthResult<Self> {
        Self::open_for_process(dir, std::process::id(), compression_level, enabled)
    }

    /// Open a cache whose files are tagged with `pid` and a fresh instance
    /// number.
    pub fn open_for_process(
        dir: impl Into<PathBuf>,
        pid: u32,
        compression_level: u32,
        enabled: bool,
    ) -> SynthResult<Self> {
        let dir = dir.into();
        if enabled {
            fs::create_dir_all(&dir).map_err(|e| {
                SynthError::CacheIo(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(dir = %dir.display(), pid, instance, enabled, "opened render cache");
        Ok(Self {
            dir,
            prefix: format!("i{}_{}{}", pid, instance, TOKEN_SEPARATOR),
            compression: Compression::new(compression_level.min(9)),
            enabled,
            stats: CacheStats::default(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Path of the artifact for `key`.
    pub fn artifact_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}{}", self.prefix, key))
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.enabled && self.artifact_path(key).is_file()
    }

    /// Load the raster stored under `key`.
    ///
    /// Returns `Ok(None)` on a miss, which includes an artifact whose
    /// dimensions differ from `width` x `height`. Unreadable or corrupt
    /// artifacts are deleted and reported as misses.
    pub fn try_load(&mut self, key: &CacheKey, width: u32, height: u32) -> SynthResult<Option<Vec<u8>>> {
        if !self.enabled || key.is_empty() {
            return Ok(None);
        }
        let path = self.artifact_path(key);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.stats.misses += 1;
                return Ok(None);
            }
            Err(e) => {
                self.stats.misses += 1;
                return Err(SynthError::CacheIo(format!("read {}: {}", path.display(), e)));
            }
        };

        match decode_artifact(&bytes, width, height) {
            Ok(Some(pixels)) => {
                self.stats.hits += 1;
                tracing::debug!(key = %key, width, height, "render cache hit");
                Ok(Some(pixels))
            }
            Ok(None) => {
                self.stats.misses += 1;
                tracing::debug!(key = %key, width, height, "render cache size mismatch");
                Ok(None)
            }
            Err(reason) => {
                self.stats.misses += 1;
                tracing::warn!(key = %key, reason, "discarding corrupt render cache artifact");
                let _ = fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    /// Store a raster under `key`, replacing any previous artifact.
    pub fn store(&mut self, key: &CacheKey, width: u32, height: u32, pixels: &[u8]) -> SynthResult<()> {
        if !self.enabled || key.is_empty() {
            return Ok(());
        }
        if pixels.len() != width as usize * height as usize * RASTER_BPP {
            self.stats.store_failures += 1;
            return Err(SynthError::invalid_parameter(
                "pixels",
                format!("{} bytes for a {}x{} raster", pixels.len(), width, height),
            ));
        }

        let path = self.artifact_path(key);
        match self.write_artifact(&path, width, height, pixels) {
            Ok(written) => {
                self.stats.stores += 1;
                self.stats.bytes_written += written as u64;
                tracing::debug!(key = %key, width, height, bytes = written, "stored render cache artifact");
                Ok(())
            }
            Err(e) => {
                self.stats.store_failures += 1;
                let _ = fs::remove_file(&path);
                Err(SynthError::CacheIo(format!("write {}: {}", path.display(), e)))
            }
        }
    }

    fn write_artifact(&self, path: &Path, width: u32, height: u32, pixels: &[u8]) -> std::io::Result<usize> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.compression);
        encoder.write_all(pixels)?;
        let payload = encoder.finish()?;

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(&(RASTER_BPP as u32).to_le_bytes());
        out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&payload);

        let mut file = fs::File::create(path)?;
        file.write_all(&out)?;
        Ok(out.len())
    }

    /// Delete the artifact for exactly `key`.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        if !self.enabled {
            return false;
        }
        let removed = fs::remove_file(self.artifact_path(key)).is_ok();
        if removed {
            self.stats.purged += 1;
        }
        removed
    }

    /// Delete every artifact whose key names `token`.
    pub fn purge_token(&mut self, token: &str) -> usize {
        self.purge_where(|key| key.contains_token(token))
    }

    /// Delete every artifact of this cache.
    pub fn purge_all(&mut self) -> usize {
        self.purge_where(|_| true)
    }

    fn purge_where(&mut self, pred: impl Fn(&CacheKey) -> bool) -> usize {
        if !self.enabled {
            return 0;
        }
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "cannot list render cache");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(key) = name.strip_prefix(&self.prefix) else {
                continue;
            };
            if pred(&CacheKey::parse(key)) && fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
        self.stats.purged += removed as u64;
        if removed > 0 {
            tracing::debug!(removed, "purged render cache artifacts");
        }
        removed
    }
}

/// Decode an artifact. `Ok(None)` is a dimension mismatch, `Err` is corruption.
fn decode_artifact(bytes: &[u8], width: u32, height: u32) -> Result<Option<Vec<u8>>, &'static str> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err("bad header");
    }
    let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
    let (w, h, bpp) = (u32_at(4), u32_at(8), u32_at(12));
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[16..24]);
    let len = u64::from_le_bytes(len) as usize;

    if w != width || h != height || bpp as usize != RASTER_BPP {
        return Ok(None);
    }
    let payload = bytes.get(HEADER_LEN..HEADER_LEN + len).ok_or("truncated payload")?;

    let expected = width as usize * height as usize * RASTER_BPP;
    let mut pixels = Vec::with_capacity(expected);
    ZlibDecoder::new(payload)
        .read_to_end(&mut pixels)
        .map_err(|_| "bad payload")?;
    if pixels.len() != expected {
        return Err("wrong pixel count");
    }
    Ok(Some(pixels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(tokens: &[&str]) -> CacheKey {
        let mut k = CacheKey::new();
        for t in tokens {
            k.push_node(*t);
        }
        k
    }

    #[test]
    fn test_key_display_and_parse() {
        let mut k = key(&["3.1"]);
        k.push_child_count(2);
        k.push_node("1.1");
        k.push_node("2.4");
        assert_eq!(k.to_string(), "3.1-x2-1.1-2.4");
        assert_eq!(CacheKey::parse("3.1-x2-1.1-2.4"), k);
    }

    #[test]
    fn test_token_match_is_exact() {
        let k = key(&["1.10", "2.1"]);
        assert!(k.contains_token("1.10"));
        assert!(!k.contains_token("1.1"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_artifact(b"nope", 1, 1).is_err());
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 75.0);
    }
}
