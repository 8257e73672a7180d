//! File-backed credential store.
//!
//! All entries live in one JSON file (`{"tokens": {<hashed key>: <secret>}}`)
//! that must be owned by the effective user and group and must grant nothing
//! to group or other. Every operation re-checks ownership and permissions on
//! the open handle it then reads from or writes to, and holds a process-wide
//! lock across the whole read-validate-write sequence.

use crate::{hash_key, CredentialStore, SecurityViolation, StorageError, StorageResult};
use driver_config_and_utils::{Paths, CREDENTIAL_CACHE_FILE_NAME};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, DirBuilder, File, OpenOptions, Permissions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Owner read/write/execute.
const OWNER_ONLY_MODE: u32 = 0o700;

/// Any group or other permission bit.
const GROUP_OTHER_MASK: u32 = 0o077;

static CACHE_FILE_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Ownership and mode of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

/// File system and process identity operations used by the file store.
pub trait FileOps: Send + Sync {
    /// Create `path` with exactly owner-only permissions. An existing file is left alone.
    fn create_owner_only(&self, path: &Path) -> io::Result<()>;

    /// Ownership and mode of an already opened file.
    fn stat(&self, file: &File) -> io::Result<FileStat>;

    /// Effective user id of this process.
    fn effective_user(&self) -> u32;

    /// Effective group id of this process.
    fn effective_group(&self) -> u32;
}

/// `FileOps` backed by the real file system and `libc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFileOps;

impl FileOps for SystemFileOps {
    fn create_owner_only(&self, path: &Path) -> io::Result<()> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(OWNER_ONLY_MODE)
            .open(path)
        {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(()),
            Err(e) => return Err(e),
        }

        // The umask may have cleared bits of the requested mode.
        let result = fs::set_permissions(path, Permissions::from_mode(OWNER_ONLY_MODE))
            .and_then(|_| fs::metadata(path))
            .and_then(|metadata| {
                let mode = metadata.mode() & 0o777;
                if mode == OWNER_ONLY_MODE {
                    Ok(())
                } else {
                    Err(io::Error::other(format!(
                        "permissions are {:o}, expected {:o}",
                        mode, OWNER_ONLY_MODE
                    )))
                }
            });

        if result.is_err() {
            let _ = fs::remove_file(path);
        }
        result
    }

    fn stat(&self, file: &File) -> io::Result<FileStat> {
        let metadata = file.metadata()?;
        Ok(FileStat {
            uid: metadata.uid(),
            gid: metadata.gid(),
            mode: metadata.mode(),
        })
    }

    fn effective_user(&self) -> u32 {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() }
    }

    fn effective_group(&self) -> u32 {
        // SAFETY: getegid has no preconditions and cannot fail.
        unsafe { libc::getegid() }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheContents {
    #[serde(default)]
    tokens: BTreeMap<String, String>,
}

/// Credential store persisting a single permission-hardened JSON file.
pub struct FileCredentialStore {
    dir: PathBuf,
    ops: Arc<dyn FileOps>,
}

impl FileCredentialStore {
    /// Store whose cache file lives in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_ops(dir, Arc::new(SystemFileOps))
    }

    /// Store in the directory resolved by `Paths` (environment override or default).
    pub fn from_paths(paths: &Paths) -> Self {
        Self::new(paths.credential_cache_dir())
    }

    /// Store using custom file operations.
    pub fn with_ops(dir: impl Into<PathBuf>, ops: Arc<dyn FileOps>) -> Self {
        Self {
            dir: dir.into(),
            ops,
        }
    }

    /// Path of the cache file.
    pub fn cache_file(&self) -> PathBuf {
        self.dir.join(CREDENTIAL_CACHE_FILE_NAME)
    }

    fn ensure_dir(&self) -> StorageResult<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        DirBuilder::new()
            .recursive(true)
            .mode(OWNER_ONLY_MODE)
            .create(&self.dir)
            .map_err(|e| StorageError::CacheFileCreation {
                path: self.dir.clone(),
                reason: e.to_string(),
            })
    }

    fn ensure_file(&self) -> StorageResult<()> {
        let path = self.cache_file();
        if path.exists() {
            return Ok(());
        }
        debug!(path = %path.display(), "Creating credential cache file");
        self.ops
            .create_owner_only(&path)
            .map_err(|e| StorageError::CacheFileCreation {
                path,
                reason: e.to_string(),
            })
    }

    fn open_verified(&self, writable: bool) -> StorageResult<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(self.cache_file())?;
        self.verify(&file)?;
        Ok(file)
    }

    fn verify(&self, file: &File) -> StorageResult<()> {
        let stat = self.ops.stat(file)?;
        let path = self.cache_file();

        let expected_user = self.ops.effective_user();
        let expected_group = self.ops.effective_group();

        let violation = if stat.uid != expected_user {
            Some(SecurityViolation::NotOwnedByUser {
                path,
                owner: stat.uid,
                expected: expected_user,
            })
        } else if stat.gid != expected_group {
            Some(SecurityViolation::NotOwnedByGroup {
                path,
                group: stat.gid,
                expected: expected_group,
            })
        } else if stat.mode & GROUP_OTHER_MASK != 0 {
            Some(SecurityViolation::TooBroadPermissions {
                path,
                mode: stat.mode & 0o777,
            })
        } else {
            None
        };

        match violation {
            Some(violation) => {
                warn!(%violation, "Refusing to use credential cache file");
                Err(violation.into())
            }
            None => Ok(()),
        }
    }

    fn read_contents(file: &mut File) -> StorageResult<CacheContents> {
        let mut raw = String::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_string(&mut raw)?;
        if raw.trim().is_empty() {
            return Ok(CacheContents::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_contents(file: &mut File, contents: &CacheContents) -> StorageResult<()> {
        let serialized = serde_json::to_vec(contents)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&serialized)?;
        file.sync_all()?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&self, key: &str, secret: &str) -> StorageResult<()> {
        let hashed = hash_key(key);
        debug!(key = %hashed, dir = %self.dir.display(), "Saving credential to file");

        let _guard = CACHE_FILE_LOCK.lock();
        self.ensure_dir()?;
        self.ensure_file()?;

        let mut file = self.open_verified(true)?;
        let mut contents = Self::read_contents(&mut file)?;
        contents.tokens.insert(hashed, secret.to_string());
        Self::write_contents(&mut file, &contents)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let hashed = hash_key(key);
        debug!(key = %hashed, dir = %self.dir.display(), "Getting credential from file");

        let _guard = CACHE_FILE_LOCK.lock();
        if !self.dir.is_dir() {
            debug!(dir = %self.dir.display(), "Credential cache directory missing");
            return Ok(None);
        }
        self.ensure_file()?;

        let mut file = self.open_verified(false)?;
        let mut contents = Self::read_contents(&mut file)?;
        Ok(contents.tokens.remove(&hashed))
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let hashed = hash_key(key);
        debug!(key = %hashed, dir = %self.dir.display(), "Removing credential from file");

        let _guard = CACHE_FILE_LOCK.lock();
        if !self.dir.is_dir() {
            return Ok(false);
        }
        self.ensure_file()?;

        let mut file = self.open_verified(true)?;
        let mut contents = Self::read_contents(&mut file)?;
        if contents.tokens.remove(&hashed).is_none() {
            return Ok(false);
        }
        Self::write_contents(&mut file, &contents)?;
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    /// Real file system, but a configurable process identity and creation failure.
    struct FakeOps {
        fail_create: bool,
        user_offset: u32,
        group_offset: u32,
    }

    impl FakeOps {
        fn new() -> Self {
            Self {
                fail_create: false,
                user_offset: 0,
                group_offset: 0,
            }
        }
    }

    impl FileOps for FakeOps {
        fn create_owner_only(&self, path: &Path) -> io::Result<()> {
            if self.fail_create {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "cannot set owner-only permissions",
                ));
            }
            SystemFileOps.create_owner_only(path)
        }

        fn stat(&self, file: &File) -> io::Result<FileStat> {
            SystemFileOps.stat(file)
        }

        fn effective_user(&self) -> u32 {
            SystemFileOps.effective_user().wrapping_add(self.user_offset)
        }

        fn effective_group(&self) -> u32 {
            SystemFileOps.effective_group().wrapping_add(self.group_offset)
        }
    }

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().mode() & 0o777
    }

    #[test]
    fn test_save_creates_owner_only_file() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        store.save("host:user:ID_TOKEN", "token-1").unwrap();

        assert!(store.cache_file().exists());
        assert_eq!(mode_of(&store.cache_file()), 0o700);
        assert_eq!(
            store.get("host:user:ID_TOKEN").unwrap(),
            Some("token-1".to_string())
        );
    }

    #[test]
    fn test_save_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileCredentialStore::new(&nested);

        store.save("k", "v").unwrap();
        assert!(nested.is_dir());
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_get_without_directory_reads_nothing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        let store = FileCredentialStore::new(&missing);

        assert_eq!(store.get("k").unwrap(), None);
        assert!(!store.remove("k").unwrap());
        assert!(!missing.exists());
    }

    #[test]
    fn test_overwrite_and_remove() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        store.save("k", "v1").unwrap();
        store.save("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v2".to_string()));

        assert!(store.remove("k").unwrap());
        assert_eq!(store.get("k").unwrap(), None);
        assert!(!store.remove("k").unwrap());
    }

    #[test]
    fn test_persisted_file_uses_hashed_keys() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        store.save("logical-key", "secret").unwrap();

        let raw = fs::read_to_string(store.cache_file()).unwrap();
        assert!(!raw.contains("logical-key"));

        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["tokens"][hash_key("logical-key")], "secret");
    }

    #[test]
    fn test_entries_survive_new_instance() {
        let dir = tempdir().unwrap();
        FileCredentialStore::new(dir.path()).save("k", "v").unwrap();

        let reopened = FileCredentialStore::new(dir.path());
        assert_eq!(reopened.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_creation_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let ops = FakeOps {
            fail_create: true,
            ..FakeOps::new()
        };
        let store = FileCredentialStore::with_ops(dir.path(), Arc::new(ops));

        let err = store.save("k", "v").unwrap_err();
        assert!(matches!(err, StorageError::CacheFileCreation { .. }));
        assert!(!store.cache_file().exists());
    }

    #[test]
    fn test_world_readable_file_rejected_without_reading() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        fs::write(store.cache_file(), "this is not json").unwrap();
        fs::set_permissions(store.cache_file(), Permissions::from_mode(0o644)).unwrap();

        let err = store.get("k").unwrap_err();
        assert!(matches!(
            err.security_violation(),
            Some(SecurityViolation::TooBroadPermissions { mode: 0o644, .. })
        ));

        let err = store.save("k", "v").unwrap_err();
        assert!(matches!(
            err.security_violation(),
            Some(SecurityViolation::TooBroadPermissions { .. })
        ));
        assert_eq!(
            fs::read_to_string(store.cache_file()).unwrap(),
            "this is not json"
        );
    }

    #[test]
    fn test_group_writable_file_rejected() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        store.save("k", "v").unwrap();

        fs::set_permissions(store.cache_file(), Permissions::from_mode(0o720)).unwrap();

        let err = store.remove("k").unwrap_err();
        assert!(matches!(
            err.security_violation(),
            Some(SecurityViolation::TooBroadPermissions { mode: 0o720, .. })
        ));
    }

    #[test]
    fn test_foreign_owner_rejected() {
        let dir = tempdir().unwrap();
        FileCredentialStore::new(dir.path()).save("k", "v").unwrap();

        let ops = FakeOps {
            user_offset: 1,
            ..FakeOps::new()
        };
        let store = FileCredentialStore::with_ops(dir.path(), Arc::new(ops));

        let err = store.get("k").unwrap_err();
        assert!(matches!(
            err.security_violation(),
            Some(SecurityViolation::NotOwnedByUser { .. })
        ));
    }

    #[test]
    fn test_foreign_group_rejected() {
        let dir = tempdir().unwrap();
        FileCredentialStore::new(dir.path()).save("k", "v").unwrap();

        let ops = FakeOps {
            group_offset: 1,
            ..FakeOps::new()
        };
        let store = FileCredentialStore::with_ops(dir.path(), Arc::new(ops));

        let err = store.save("k", "other").unwrap_err();
        assert!(matches!(
            err.security_violation(),
            Some(SecurityViolation::NotOwnedByGroup { .. })
        ));
        assert_eq!(
            FileCredentialStore::new(dir.path()).get("k").unwrap(),
            Some("v".to_string())
        );
    }

    #[test]
    fn test_concurrent_saves_are_not_lost() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                thread::spawn(move || {
                    let store = FileCredentialStore::new(path);
                    for j in 0..10 {
                        store.save(&format!("key-{}-{}", i, j), "secret").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = FileCredentialStore::new(&path);
        for i in 0..8 {
            for j in 0..10 {
                assert!(store.has(&format!("key-{}-{}", i, j)).unwrap());
            }
        }
    }
}
