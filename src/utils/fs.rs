use crate::domain::FileEntry;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::{self, AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, SeekFrom},
};
use walkdir::WalkDir;

/// Local storage for one peer: a shared directory it serves byte ranges
/// from, and a downloads directory it writes fetched files into. Both are
/// created on startup if missing.
///
/// Nothing is cached; every range read opens, seeks and streams from disk.
#[derive(Debug)]
pub struct FileStore {
    shared_dir: PathBuf,
    downloads_dir: PathBuf,
}

impl FileStore {
    pub fn new(
        shared_dir: impl Into<PathBuf>,
        downloads_dir: impl Into<PathBuf>,
    ) -> io::Result<Self> {
        let shared_dir = shared_dir.into();
        let downloads_dir = downloads_dir.into();

        std::fs::create_dir_all(&shared_dir)?;
        std::fs::create_dir_all(&downloads_dir)?;

        Ok(Self {
            shared_dir,
            downloads_dir,
        })
    }

    /// Enumerates shareable files as (name, size) pairs. Only the top level
    /// of the shared directory is scanned: the catalog and the transfer
    /// protocol both key on bare file names, so nested paths could never be
    /// requested back.
    pub fn scan_files(&self) -> io::Result<Vec<FileEntry>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.shared_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let size = entry.metadata().map_err(io::Error::other)?.len();
            files.push(FileEntry { name, size });
        }

        Ok(files)
    }

    /// Size of a shared file, or `None` when the name does not resolve to a
    /// readable regular file.
    pub async fn file_size(&self, name: &str) -> io::Result<Option<u64>> {
        let Some(path) = self.shared_path(name) else {
            return Ok(None);
        };

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Streams the half-open range `[start, end)` of a shared file into
    /// `dest` in bounded chunks, returning the bytes actually copied (short
    /// when the file shrank mid-stream).
    pub async fn stream_range<W: AsyncWrite + Unpin>(
        &self,
        name: &str,
        start: u64,
        end: u64,
        dest: &mut W,
    ) -> io::Result<u64> {
        let path = self
            .shared_path(name)
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "unsharable file name"))?;

        let mut file = File::open(path).await?;
        file.seek(SeekFrom::Start(start)).await?;

        let mut limited = file.take(end - start);
        io::copy(&mut limited, dest).await
    }

    /// Destination path for a download. Full-file downloads keep the
    /// original name (re-downloading overwrites); ranged downloads get a
    /// `.part_<start>_<end|end>` suffix so they never clobber a concurrent
    /// full download, with a numeric suffix appended while the name is
    /// taken.
    pub fn download_path(&self, name: &str, start: u64, end: Option<u64>) -> PathBuf {
        if start == 0 && end.is_none() {
            return self.downloads_dir.join(name);
        }

        let end_tag = end.map_or_else(|| "end".to_string(), |e| e.to_string());
        let base = format!("{name}.part_{start}_{end_tag}");

        let mut path = self.downloads_dir.join(&base);
        let mut n = 1u32;
        while path.exists() {
            path = self.downloads_dir.join(format!("{base}.{n}"));
            n += 1;
        }
        path
    }

    /// Copies up to `len` bytes from `src` into `path`, creating or
    /// overwriting it. Returns the bytes written; the caller compares
    /// against `len` to detect a truncated stream.
    pub async fn write_download<R: AsyncRead + Unpin>(
        &self,
        path: &Path,
        len: u64,
        src: R,
    ) -> io::Result<u64> {
        let mut file = File::create(path).await?;
        let written = io::copy(&mut src.take(len), &mut file).await?;
        file.flush().await?;
        Ok(written)
    }

    // Catalog keys are bare file names; anything path-like is rejected so a
    // request can never escape the shared directory.
    fn shared_path(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return None;
        }
        Some(self.shared_dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &Path) -> FileStore {
        FileStore::new(dir.join("public"), dir.join("downloads")).unwrap()
    }

    #[test]
    fn scans_top_level_files_only() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        std::fs::write(dir.path().join("public/a.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("public/b.bin"), [0u8; 42]).unwrap();
        std::fs::create_dir_all(dir.path().join("public/nested")).unwrap();
        std::fs::write(dir.path().join("public/nested/c.txt"), b"hidden").unwrap();

        let mut files = store.scan_files().unwrap();
        files.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(
            files,
            vec![
                FileEntry {
                    name: "a.txt".into(),
                    size: 5
                },
                FileEntry {
                    name: "b.bin".into(),
                    size: 42
                },
            ]
        );
    }

    #[tokio::test]
    async fn streams_exact_ranges() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let contents: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(dir.path().join("public/data.bin"), &contents).unwrap();

        assert_eq!(store.file_size("data.bin").await.unwrap(), Some(5000));
        assert_eq!(store.file_size("missing.bin").await.unwrap(), None);

        let mut out = Vec::new();
        let copied = store.stream_range("data.bin", 1000, 2000, &mut out).await.unwrap();
        assert_eq!(copied, 1000);
        assert_eq!(out, contents[1000..2000]);

        let mut full = Vec::new();
        store.stream_range("data.bin", 0, 5000, &mut full).await.unwrap();
        assert_eq!(full, contents);
    }

    #[tokio::test]
    async fn rejects_path_escapes() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        assert_eq!(store.file_size("../secret").await.unwrap(), None);
        assert_eq!(store.file_size("a/b").await.unwrap(), None);
        assert_eq!(store.file_size("..").await.unwrap(), None);
        assert_eq!(store.file_size("").await.unwrap(), None);
    }

    #[test]
    fn download_paths_encode_the_range() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        assert_eq!(
            store.download_path("song.mp3", 0, None),
            dir.path().join("downloads/song.mp3")
        );
        assert_eq!(
            store.download_path("song.mp3", 1000, Some(2000)),
            dir.path().join("downloads/song.mp3.part_1000_2000")
        );
        assert_eq!(
            store.download_path("song.mp3", 1000, None),
            dir.path().join("downloads/song.mp3.part_1000_end")
        );
    }

    #[test]
    fn ranged_download_paths_avoid_collisions() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        std::fs::write(dir.path().join("downloads/song.mp3.part_0_10"), b"x").unwrap();

        assert_eq!(
            store.download_path("song.mp3", 0, Some(10)),
            dir.path().join("downloads/song.mp3.part_0_10.1")
        );
    }

    #[tokio::test]
    async fn download_writes_report_short_streams() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let path = store.download_path("got.bin", 0, None);
        let written = store.write_download(&path, 10, &b"abcdefghij"[..]).await.unwrap();
        assert_eq!(written, 10);
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdefghij");

        // Source ends before the announced length: short count, no error.
        let written = store.write_download(&path, 10, &b"abc"[..]).await.unwrap();
        assert_eq!(written, 3);
    }
}
