//! Output directory for `pget get`: unique names, `.part` writes, atomic rename.

use anyhow::{Context, Result};
use pget_core::checksum::HashingWriter;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use pget_core::naming;

/// Temporary file suffix used before atomic rename.
const TEMP_SUFFIX: &str = ".part";

/// A file saved by `OutputDir::save`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Saved {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

/// Destination directory shared by all callbacks of one batch.
pub struct OutputDir {
    dir: PathBuf,
    reserved: Mutex<HashSet<String>>,
}

impl OutputDir {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("create output dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            reserved: Mutex::new(HashSet::new()),
        })
    }

    /// Claim a path for `name` that neither exists on disk nor was handed out
    /// earlier in this batch (two URLs may derive the same name).
    pub fn reserve(&self, name: &str) -> PathBuf {
        let mut reserved = self
            .reserved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let chosen = naming::unique_name(name, |candidate| {
            reserved.contains(candidate) || self.dir.join(candidate).exists()
        });
        reserved.insert(chosen.clone());
        self.dir.join(chosen)
    }

    /// Stream `body` to `<path>.part`, then rename it to `path`.
    /// The partial file is removed if any step fails.
    pub fn save(&self, path: &Path, mut body: impl Read) -> Result<Saved> {
        let part = part_path(path);
        let file =
            File::create(&part).with_context(|| format!("create {}", part.display()))?;
        let cleanup = RemoveOnDrop::new(&part);
        let mut writer = HashingWriter::new(BufWriter::new(file));
        io::copy(&mut body, &mut writer)
            .and_then(|_| writer.flush())
            .with_context(|| format!("write {}", part.display()))?;
        let bytes = writer.written();
        let (buffered, sha256) = writer.finish();
        let file = buffered
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("flush {}", part.display()))?;
        file.sync_all()
            .with_context(|| format!("sync {}", part.display()))?;
        drop(file);
        fs::rename(&part, path).with_context(|| {
            format!("rename {} to {}", part.display(), path.display())
        })?;
        cleanup.disarm();
        Ok(Saved {
            path: path.to_path_buf(),
            bytes,
            sha256,
        })
    }
}

/// Removes a `.part` file on drop unless disarmed after the final rename.
struct RemoveOnDrop<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> RemoveOnDrop<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(self.path);
        }
    }
}

/// `file.iso` → `file.iso.part`.
fn part_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/tmp/archive.zip")),
            PathBuf::from("/tmp/archive.zip.part")
        );
    }

    #[test]
    fn reserve_avoids_existing_and_reserved_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), b"old").unwrap();
        let out = OutputDir::create(dir.path()).unwrap();
        assert_eq!(out.reserve("a.bin"), dir.path().join("a.bin.1"));
        assert_eq!(out.reserve("a.bin"), dir.path().join("a.bin.2"));
        assert_eq!(out.reserve("b.bin"), dir.path().join("b.bin"));
    }

    #[test]
    fn save_writes_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputDir::create(&dir.path().join("nested")).unwrap();
        let path = out.reserve("hello.txt");
        let saved = out.save(&path, &b"hello\n"[..]).unwrap();
        assert_eq!(saved.bytes, 6);
        assert_eq!(
            saved.sha256,
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
        assert_eq!(fs::read(&path).unwrap(), b"hello\n");
        assert!(!part_path(&path).exists());
    }

    #[test]
    fn failed_rename_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();
        // A directory in the way makes the final rename fail.
        let path = dir.path().join("taken");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("inside"), b"keep").unwrap();
        let err = out.save(&path, &b"body"[..]).unwrap_err();
        assert!(format!("{:#}", err).contains("rename"));
        assert!(!part_path(&path).exists());
        assert!(path.is_dir());
    }

    #[test]
    fn failed_read_removes_part_file() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();
        let path = out.reserve("x.bin");
        assert!(out.save(&path, Broken).is_err());
        assert!(!path.exists());
        assert!(!part_path(&path).exists());
    }
}
