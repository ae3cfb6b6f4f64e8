//! A size-rotating log file.
//!
//! Writes append to `path`. When the next write would push the file past
//! the size limit, the current file is renamed to
//! `{stem}-{timestamp}.{ext}` and a fresh one is started. After each
//! rotation old backups are pruned by count and age, and compressed with
//! gzip if asked.
//!
//! Nothing in here logs through `tracing`: this writer sits underneath the
//! subscriber and a log call would re-enter it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, TimeDelta, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;

const MEGABYTE: u64 = 1024 * 1024;
const DEFAULT_MAX_SIZE_MB: u64 = 100;
const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
const COMPRESS_SUFFIX: &str = ".gz";

#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    max_age_days: u64,
    max_backups: usize,
    local_time: bool,
    compress: bool,
    file: Option<File>,
    size: u64,
}

impl RotatingFile {
    /// A writer for `path` with a 100 MB limit that keeps every backup.
    /// The file is opened on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: DEFAULT_MAX_SIZE_MB * MEGABYTE,
            max_age_days: 0,
            max_backups: 0,
            local_time: false,
            compress: false,
            file: None,
            size: 0,
        }
    }

    /// Size limit in megabytes. Zero means the default of 100.
    pub fn max_size_mb(self, mb: u64) -> Self {
        let mb = if mb == 0 { DEFAULT_MAX_SIZE_MB } else { mb };
        self.max_bytes(mb.saturating_mul(MEGABYTE))
    }

    pub fn max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = bytes.max(1);
        self
    }

    /// Delete backups older than `days`. Zero keeps them regardless of age.
    pub fn max_age_days(mut self, days: u64) -> Self {
        self.max_age_days = days;
        self
    }

    /// Keep at most `count` backups. Zero keeps all of them.
    pub fn max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    /// Stamp backups with local time instead of UTC.
    pub fn local_time(mut self, yes: bool) -> Self {
        self.local_time = yes;
        self
    }

    pub fn compress(mut self, yes: bool) -> Self {
        self.compress = yes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (or create) the file now so configuration errors surface early.
    pub fn open(mut self) -> io::Result<Self> {
        self.open_existing()?;
        Ok(self)
    }

    fn open_existing(&mut self) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.size = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn now(&self) -> NaiveDateTime {
        if self.local_time {
            Local::now().naive_local()
        } else {
            Utc::now().naive_utc()
        }
    }

    fn name_parts(&self) -> (String, String) {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = self
            .path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        (stem, ext)
    }

    fn backup_path(&self, at: NaiveDateTime) -> PathBuf {
        let (stem, ext) = self.name_parts();
        let name = format!("{stem}-{}{ext}", at.format(BACKUP_TIME_FORMAT));
        self.path.with_file_name(name)
    }

    /// The backup name for `at`, moved forward a millisecond at a time past
    /// any backup (plain or compressed) that already has it.
    fn free_backup_path(&self, mut at: NaiveDateTime) -> PathBuf {
        loop {
            let path = self.backup_path(at);
            if !path.exists() && !compressed_path(&path).exists() {
                return path;
            }
            at += TimeDelta::milliseconds(1);
        }
    }

    /// Close the current file, move it aside, and start a new one.
    pub fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        if self.path.exists() {
            fs::rename(&self.path, self.free_backup_path(self.now()))?;
        }
        self.open_existing()?;
        self.prune()
    }

    /// Backups of this file, newest first.
    pub fn backups(&self) -> io::Result<Vec<(PathBuf, NaiveDateTime)>> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let (stem, ext) = self.name_parts();
        let prefix = format!("{stem}-");

        let mut found = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let rest = rest.strip_suffix(COMPRESS_SUFFIX).unwrap_or(rest);
            let Some(stamp) = rest.strip_suffix(ext.as_str()) else {
                continue;
            };
            if let Ok(at) = NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT) {
                found.push((entry.path(), at));
            }
        }
        found.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(found)
    }

    fn prune(&self) -> io::Result<()> {
        let mut backups = self.backups()?;

        if self.max_backups > 0 && backups.len() > self.max_backups {
            for (path, _) in backups.split_off(self.max_backups) {
                remove_if_present(&path)?;
            }
        }

        let cutoff = i64::try_from(self.max_age_days)
            .ok()
            .and_then(chrono::TimeDelta::try_days)
            .and_then(|age| self.now().checked_sub_signed(age));
        if self.max_age_days > 0
            && let Some(cutoff) = cutoff
        {
            let (keep, expired): (Vec<_>, Vec<_>) =
                backups.into_iter().partition(|(_, at)| *at >= cutoff);
            for (path, _) in expired {
                remove_if_present(&path)?;
            }
            backups = keep;
        }

        if self.compress {
            for (path, _) in backups {
                if !path.to_string_lossy().ends_with(COMPRESS_SUFFIX) {
                    compress_file(&path)?;
                }
            }
        }
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn compressed_path(path: &Path) -> PathBuf {
    let mut target = path.as_os_str().to_owned();
    target.push(COMPRESS_SUFFIX);
    PathBuf::from(target)
}

fn compress_file(path: &Path) -> io::Result<()> {
    let target = compressed_path(path);

    let mut source = File::open(path)?;
    let mut encoder = GzEncoder::new(File::create(&target)?, Compression::default());
    io::copy(&mut source, &mut encoder)?;
    encoder.finish()?;
    fs::remove_file(path)
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.file.is_none() {
            self.open_existing()?;
        }
        if self.size > 0 && self.size + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Err(io::Error::other("log file is not open")),
        };
        let n = file.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_line(file: &mut RotatingFile, line: &str) {
        file.write_all(line.as_bytes()).unwrap();
        file.flush().unwrap();
        // Backup names have millisecond resolution.
        sleep(Duration::from_millis(5));
    }

    #[test]
    fn appends_without_rotating_under_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::new(&path).max_bytes(1024);
        write_line(&mut file, "one\n");
        write_line(&mut file, "two\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
        assert!(file.backups().unwrap().is_empty());
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/logs/app.log");
        let file = RotatingFile::new(&path).open().unwrap();
        assert!(file.path().exists());
    }

    #[test]
    fn rotates_when_full() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::new(&path).max_bytes(10);
        write_line(&mut file, "12345678\n");
        write_line(&mut file, "abcdefgh\n");

        assert_eq!(fs::read_to_string(&path).unwrap(), "abcdefgh\n");
        let backups = file.backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0].0).unwrap(), "12345678\n");
        let name = backups[0].0.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("app-") && name.ends_with(".log"), "{name}");
    }

    #[test]
    fn back_to_back_rotations_keep_every_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::new(&path);
        for line in ["one\n", "two\n", "three\n"] {
            file.write_all(line.as_bytes()).unwrap();
            file.rotate().unwrap();
        }
        let mut contents: Vec<String> = file
            .backups()
            .unwrap()
            .iter()
            .map(|(p, _)| fs::read_to_string(p).unwrap())
            .collect();
        contents.sort();
        assert_eq!(contents, vec!["one\n", "three\n", "two\n"]);
    }

    #[test]
    fn taken_backup_name_moves_forward() {
        let dir = TempDir::new().unwrap();
        let file = RotatingFile::new(dir.path().join("app.log"));
        let at = NaiveDateTime::parse_from_str("2024-05-01T10-00-00.000", BACKUP_TIME_FORMAT).unwrap();
        let taken = file.backup_path(at);
        fs::write(&taken, "old\n").unwrap();
        fs::write(compressed_path(&file.backup_path(at + TimeDelta::milliseconds(1))), "gz").unwrap();

        assert_eq!(
            file.free_backup_path(at),
            file.backup_path(at + TimeDelta::milliseconds(2))
        );
    }

    #[test]
    fn keeps_at_most_max_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::new(&path).max_bytes(4).max_backups(2);
        for line in ["aaa\n", "bbb\n", "ccc\n", "ddd\n", "eee\n"] {
            write_line(&mut file, line);
        }
        let backups = file.backups().unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(fs::read_to_string(&backups[0].0).unwrap(), "ddd\n");
        assert_eq!(fs::read_to_string(&backups[1].0).unwrap(), "ccc\n");
    }

    #[test]
    fn removes_expired_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let old = dir.path().join("app-2000-01-01T00-00-00.000.log");
        fs::write(&old, "ancient\n").unwrap();

        let mut file = RotatingFile::new(&path).max_bytes(4).max_age_days(7);
        write_line(&mut file, "aaa\n");
        write_line(&mut file, "bbb\n");

        assert!(!old.exists());
        assert_eq!(file.backups().unwrap().len(), 1);
    }

    #[test]
    fn compresses_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::new(&path).max_bytes(4).compress(true);
        write_line(&mut file, "aaa\n");
        write_line(&mut file, "bbb\n");

        let backups = file.backups().unwrap();
        assert_eq!(backups.len(), 1);
        let gz = &backups[0].0;
        assert!(gz.to_string_lossy().ends_with(".log.gz"));

        let mut decoded = String::new();
        flate2::read::GzDecoder::new(File::open(gz).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "aaa\n");
    }

    #[test]
    fn ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(dir.path().join("app-notes.log"), "x").unwrap();
        fs::write(dir.path().join("other-2000-01-01T00-00-00.000.log"), "x").unwrap();
        let file = RotatingFile::new(&path);
        assert!(file.backups().unwrap().is_empty());
    }

    #[test]
    fn zero_size_means_default() {
        let file = RotatingFile::new("/tmp/x.log").max_size_mb(0);
        assert_eq!(file.max_bytes, 100 * MEGABYTE);
    }
}
