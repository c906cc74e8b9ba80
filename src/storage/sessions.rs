//! Directory-backed session store.
//!
//! Layout: `<root>/<map_name>/<hex(token)>.session`, one bincode `SessionEntry`
//! per file. Writes go to a temp file and are renamed into place, so readers in
//! any process see either the old entry or the new one, never a torn write.
//! Every server pointed at the same directory shares the same sessions.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::{SessionEntry, StoreError};
use crate::identity::{SecurityContext, SessionStore, Token};

const SUFFIX: &str = "session";
const TMP_MARKER: &str = ".tmp.";
// Temp files younger than this may belong to a write still in flight in another process
const TMP_GRACE: Duration = Duration::from_secs(60);
// Longer presented tokens cannot have been issued by us; treat as absent
const MAX_TOKEN_LEN: usize = 512;

pub struct FileSessionStore {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl FileSessionStore {
    pub fn open(root: impl AsRef<Path>, map_name: &str, ttl: Option<Duration>) -> Result<Self, StoreError> {
        let dir = root.as_ref().join(sanitize_map_name(map_name));
        std::fs::create_dir_all(&dir)?;
        let store = Self { dir, ttl };
        let purged = store.purge_stale_temp_files(TMP_GRACE)?;
        debug!(target: "sessiongate::storage", dir = %store.dir.display(), purged, "file session store opened");
        Ok(store)
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn entry_path(&self, token: &str) -> Option<PathBuf> {
        if token.is_empty() || token.len() > MAX_TOKEN_LEN { return None; }
        Some(self.dir.join(format!("{}.{}", hex_encode(token.as_bytes()), SUFFIX)))
    }

    fn read_entry(path: &Path) -> Result<Option<SessionEntry>, StoreError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_file(path: &Path) -> Result<bool, StoreError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete temp files left behind by writers that died between write and rename.
    fn purge_stale_temp_files(&self, grace: Duration) -> Result<usize, StoreError> {
        let mut removed = 0usize;
        for ent in std::fs::read_dir(&self.dir)?.flatten() {
            let name = ent.file_name();
            let Some(name) = name.to_str() else { continue; };
            if !name.contains(TMP_MARKER) { continue; }
            let stale = ent
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok())
                .map(|age| age >= grace)
                .unwrap_or(false);
            if stale && Self::remove_file(&ent.path())? {
                removed += 1;
            }
        }
        if removed > 0 {
            warn!(target: "sessiongate::storage", removed, "purged stale session temp files");
        }
        Ok(removed)
    }

    /// All (token, entry) pairs currently on disk. Unreadable files are skipped
    /// with a warning; another process may be mid-removal.
    fn scan(&self) -> Result<Vec<(String, PathBuf, SessionEntry)>, StoreError> {
        let mut out = Vec::new();
        for ent in std::fs::read_dir(&self.dir)?.flatten() {
            let path = ent.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SUFFIX) { continue; }
            let Some(token) = path.file_stem().and_then(|s| s.to_str()).and_then(hex_decode) else { continue; };
            match Self::read_entry(&path) {
                Ok(Some(entry)) => out.push((token, path, entry)),
                Ok(None) => {}
                Err(e) => warn!(target: "sessiongate::storage", path = %path.display(), "skipping unreadable session entry: {}", e),
            }
        }
        Ok(out)
    }
}

impl SessionStore for FileSessionStore {
    fn put(&self, token: &Token, context: SecurityContext) -> Result<(), StoreError> {
        let path = self
            .entry_path(token.as_str())
            .ok_or_else(|| StoreError::Unavailable("token cannot be stored".into()))?;
        let bytes = bincode::serialize(&SessionEntry::new(context, self.ttl))?;
        let tmp = path.with_extension(format!("{}{}{}", SUFFIX, TMP_MARKER, uuid::Uuid::new_v4().simple()));
        if let Err(e) = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, &path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn get(&self, token: &str) -> Result<Option<SecurityContext>, StoreError> {
        let Some(path) = self.entry_path(token) else { return Ok(None); };
        let Some(entry) = Self::read_entry(&path)? else { return Ok(None); };
        if entry.is_expired(SessionEntry::now_ms()) {
            Self::remove_file(&path)?;
            return Ok(None);
        }
        Ok(Some(entry.context))
    }

    fn remove(&self, token: &str) -> Result<bool, StoreError> {
        let Some(path) = self.entry_path(token) else { return Ok(false); };
        let live = match Self::read_entry(&path) {
            Ok(Some(e)) => !e.is_expired(SessionEntry::now_ms()),
            Ok(None) => return Ok(false),
            // Corrupt entries still get removed
            Err(_) => false,
        };
        Ok(Self::remove_file(&path)? && live)
    }

    fn tokens_for(&self, username: &str) -> Result<Vec<Token>, StoreError> {
        let now = SessionEntry::now_ms();
        Ok(self
            .scan()?
            .into_iter()
            .filter(|(_, _, e)| e.context.username() == username && !e.is_expired(now))
            .map(|(t, _, _)| Token::from(t))
            .collect())
    }

    /// Evicts expired entries (counted) and stale temp files (not counted).
    fn sweep(&self) -> Result<usize, StoreError> {
        self.purge_stale_temp_files(TMP_GRACE)?;
        if self.ttl.is_none() { return Ok(0); }
        let now = SessionEntry::now_ms();
        let mut removed = 0usize;
        for (_, path, entry) in self.scan()? {
            if entry.is_expired(now) && Self::remove_file(&path)? { removed += 1; }
        }
        Ok(removed)
    }

    fn len(&self) -> Result<usize, StoreError> {
        let now = SessionEntry::now_ms();
        Ok(self.scan()?.iter().filter(|(_, _, e)| !e.is_expired(now)).count())
    }
}

fn sanitize_map_name(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "sessions".to_string() } else { cleaned }
}

// Lowercase hex keeps file names safe on case-insensitive filesystems
fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes { let _ = write!(&mut s, "{:02x}", b); }
    s
}

fn hex_decode(s: &str) -> Option<String> {
    if s.len() % 2 != 0 { return None; }
    let bytes: Option<Vec<u8>> = (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect();
    String::from_utf8(bytes?).ok()
}
