//! Archive extraction with zip-slip and zip-bomb protections.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Maximum uncompressed size for any single archive entry.
pub(crate) const MAX_UNCOMPRESSED_SIZE: u64 = 200 * 1024 * 1024;
/// Maximum compression ratio before an entry is treated as a zip bomb.
pub(crate) const MAX_COMPRESSION_RATIO: f64 = 100.0;
/// Maximum total extracted size across all entries.
pub(crate) const MAX_TOTAL_EXTRACTED_SIZE: u64 = 500 * 1024 * 1024;

/// Reader wrapper that refuses to produce more than `limit` bytes. Catches
/// archives that lie about their uncompressed size in headers.
pub(crate) struct LimitedReader<R> {
    inner: R,
    remaining: u64,
}

impl<R> LimitedReader<R> {
    pub(crate) fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::other(
                "archive entry exceeds maximum allowed size during extraction",
            ));
        }
        let max_read = std::cmp::min(buf.len() as u64, self.remaining) as usize;
        let bytes_read = self.inner.read(&mut buf[..max_read])?;
        self.remaining = self.remaining.saturating_sub(bytes_read as u64);
        Ok(bytes_read)
    }
}

fn validate_entry<R: Read + ?Sized>(file: &zip::read::ZipFile<'_, R>) -> Result<()> {
    let compressed = file.compressed_size();
    let uncompressed = file.size();

    if uncompressed > MAX_UNCOMPRESSED_SIZE {
        bail!(
            "archive entry '{}' too large: {} bytes (max: {} bytes)",
            file.name(),
            uncompressed,
            MAX_UNCOMPRESSED_SIZE
        );
    }

    if compressed > 0 {
        let ratio = uncompressed as f64 / compressed as f64;
        if ratio > MAX_COMPRESSION_RATIO {
            bail!(
                "suspicious compression ratio in '{}': {:.1}x (max: {:.1}x)",
                file.name(),
                ratio,
                MAX_COMPRESSION_RATIO
            );
        }
    }

    Ok(())
}

/// Resolve an entry name inside `dest_dir`, rejecting traversal attempts.
pub(crate) fn safe_extract_path(dest_dir: &Path, entry_name: &str) -> Result<PathBuf> {
    if entry_name.contains("..") {
        bail!("unsafe archive entry: path contains '..' - '{entry_name}'");
    }

    let entry_path = Path::new(entry_name);
    if entry_path.is_absolute() || entry_name.starts_with('/') || entry_name.starts_with('\\') {
        bail!("unsafe archive entry: absolute path - '{entry_name}'");
    }

    fs::create_dir_all(dest_dir).context("failed to create destination directory")?;
    let canonical_dest = dest_dir
        .canonicalize()
        .context("failed to canonicalize destination directory")?;

    let mut resolved = canonical_dest.clone();
    for component in entry_path.components() {
        use std::path::Component;
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("unsafe archive entry: '{entry_name}'");
            }
        }
    }

    if !resolved.starts_with(&canonical_dest) {
        bail!(
            "unsafe archive entry: '{}' escapes '{}'",
            resolved.display(),
            canonical_dest.display()
        );
    }

    Ok(resolved)
}

/// Extract a zip archive held in memory into `dest_dir`.
///
/// All entries are validated (size, compression ratio, path safety) before
/// anything is written to disk, so a malicious archive fails without leaving
/// partial output behind.
pub(crate) fn extract_archive(bytes: &[u8], dest_dir: &Path) -> Result<()> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).context("failed to read agent archive")?;

    let mut total_uncompressed: u64 = 0;
    for i in 0..archive.len() {
        let file = archive.by_index(i).context("failed to read archive entry")?;
        validate_entry(&file)?;

        total_uncompressed = total_uncompressed
            .checked_add(file.size())
            .context("total uncompressed size overflow")?;
        if total_uncompressed > MAX_TOTAL_EXTRACTED_SIZE {
            bail!(
                "total uncompressed size {total_uncompressed} exceeds maximum {MAX_TOTAL_EXTRACTED_SIZE} bytes"
            );
        }

        let entry_name = entry_name(&file);
        if !entry_name.is_empty() {
            safe_extract_path(dest_dir, &entry_name)?;
        }
    }

    fs::create_dir_all(dest_dir).context("failed to create install directory")?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = entry_name(&file);
        if name.is_empty() {
            continue;
        }

        let outpath = safe_extract_path(dest_dir, &name)?;

        if file.name().ends_with('/') {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = fs::File::create(&outpath)
                .with_context(|| format!("failed to create file: {}", outpath.display()))?;
            let mut limited = LimitedReader::new(&mut file, MAX_UNCOMPRESSED_SIZE);
            io::copy(&mut limited, &mut outfile)
                .with_context(|| format!("failed to extract entry: {name}"))?;
        }
    }

    Ok(())
}

fn entry_name<R: Read + ?Sized>(file: &zip::read::ZipFile<'_, R>) -> String {
    file.enclosed_name()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| file.mangled_name().to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        assert!(safe_extract_path(dir.path(), "../../etc/passwd").is_err());
        assert!(safe_extract_path(dir.path(), "sub/../../escape").is_err());
    }

    #[test]
    fn test_rejects_absolute_paths() {
        let dir = TempDir::new().unwrap();
        assert!(safe_extract_path(dir.path(), "/etc/passwd").is_err());
        assert!(safe_extract_path(dir.path(), "\\windows\\system32").is_err());
    }

    #[test]
    fn test_accepts_nested_relative_path() {
        let dir = TempDir::new().unwrap();
        let resolved = safe_extract_path(dir.path(), "sub/file.txt").unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn test_extracts_simple_archive() {
        let dir = TempDir::new().unwrap();
        let bytes = build_zip(&[("wakatime-cli-linux-amd64", b"#!bin"), ("README.md", b"docs")]);
        extract_archive(&bytes, dir.path()).unwrap();
        assert_eq!(
            fs::read(dir.path().join("wakatime-cli-linux-amd64")).unwrap(),
            b"#!bin"
        );
        assert_eq!(fs::read(dir.path().join("README.md")).unwrap(), b"docs");
    }

    #[test]
    fn test_malicious_archive_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let bytes = build_zip(&[("good.txt", b"ok"), ("../evil.txt", b"bad")]);
        assert!(extract_archive(&bytes, &out).is_err());
        // Validation happens before extraction, so the good entry must not
        // have been written either.
        assert!(!out.join("good.txt").exists());
    }

    #[test]
    fn test_limited_reader_stops_at_limit() {
        let data = vec![0u8; 64];
        let mut reader = LimitedReader::new(&data[..], 16);
        let mut out = Vec::new();
        let result = io::copy(&mut reader, &mut out);
        assert!(result.is_err());
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(extract_archive(b"not a zip archive", dir.path()).is_err());
    }
}
