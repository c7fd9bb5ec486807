//! Package extraction.
//!
//! Turns a verified package into the single replacement file. Zip packages
//! must hold exactly one file (or name the entry to take); raw packages are
//! the replacement file already. Entry paths are checked against zip-slip
//! before anything is written.

use crate::package::package_info::PackageFormat;
use camino::{Utf8Path, Utf8PathBuf};
use std::path::{Component, Path};

/// Trait for extracting packages, enabling test mocking.
///
/// # Examples
///
/// ```
/// use selfupdate::extraction::ArchiveExtractor;
///
/// let extractor = ArchiveExtractor::default();
/// // Use extractor.extract(package_path, format, dest_dir) in production
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait PackageExtractor {
    /// Produce the replacement file from `package`, writing into `dest_dir`
    /// when unpacking is needed.
    ///
    /// Returns the path of the replacement file.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathTraversal`] if an entry escapes the
    /// destination, [`ExtractionError::EmptyArchive`] or
    /// [`ExtractionError::AmbiguousArchive`] if the archive does not hold
    /// exactly one candidate file, and [`ExtractionError::Io`] on I/O
    /// failures.
    fn extract(
        &self,
        package: &Utf8Path,
        format: PackageFormat,
        dest_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, ExtractionError>;
}

/// Errors arising from package extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive could not be read.
    #[error("invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive contains no files.
    #[error("archive contains no files")]
    EmptyArchive,

    /// The archive contains several files and no entry was named.
    #[error("archive contains {} files, expected one: {}", .entries.len(), .entries.join(", "))]
    AmbiguousArchive {
        /// Names of the candidate entries.
        entries: Vec<String>,
    },

    /// The named entry is not in the archive.
    #[error("archive has no entry named {name}")]
    EntryNotFound {
        /// The requested entry name.
        name: String,
    },
}

/// Default extractor using the `zip` crate.
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    entry_name: Option<String>,
}

impl ArchiveExtractor {
    /// Take the entry called `name` (matched on its full path or its file
    /// name) instead of requiring a single-file archive.
    #[must_use]
    pub fn with_entry(name: &str) -> Self {
        Self {
            entry_name: Some(name.to_owned()),
        }
    }

    fn extract_zip(
        &self,
        package: &Utf8Path,
        dest_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, ExtractionError> {
        let file = std::fs::File::open(package)?;
        let mut archive = zip::ZipArchive::new(file)?;

        let mut candidates = Vec::new();
        for index in 0..archive.len() {
            let entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_owned();
            let path = entry
                .enclosed_name()
                .ok_or_else(|| ExtractionError::PathTraversal { path: name.clone() })?;
            validate_entry_path(&path)?;
            candidates.push((index, name, path));
        }

        let (index, name, path) = self.select(candidates)?;
        let file_name = path
            .file_name()
            .and_then(|file_name| file_name.to_str())
            .ok_or_else(|| ExtractionError::PathTraversal { path: name.clone() })?;

        std::fs::create_dir_all(dest_dir)?;
        let dest_path = dest_dir.join(file_name);
        let mut entry = archive.by_index(index)?;
        let mut output = std::fs::File::create(&dest_path)?;
        std::io::copy(&mut entry, &mut output)?;
        output.sync_all()?;
        log::debug!("extracted {name} from {package} to {dest_path}");
        Ok(dest_path)
    }

    fn select(
        &self,
        mut candidates: Vec<(usize, String, std::path::PathBuf)>,
    ) -> Result<(usize, String, std::path::PathBuf), ExtractionError> {
        if let Some(wanted) = &self.entry_name {
            let position = candidates
                .iter()
                .position(|(_, name, path)| {
                    name == wanted || path.file_name().is_some_and(|f| f == wanted.as_str())
                })
                .ok_or_else(|| ExtractionError::EntryNotFound {
                    name: wanted.clone(),
                })?;
            return Ok(candidates.swap_remove(position));
        }
        match candidates.len() {
            0 => Err(ExtractionError::EmptyArchive),
            1 => Ok(candidates.remove(0)),
            _ => Err(ExtractionError::AmbiguousArchive {
                entries: candidates.into_iter().map(|(_, name, _)| name).collect(),
            }),
        }
    }
}

impl PackageExtractor for ArchiveExtractor {
    fn extract(
        &self,
        package: &Utf8Path,
        format: PackageFormat,
        dest_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, ExtractionError> {
        match format {
            PackageFormat::Raw => Ok(package.to_owned()),
            PackageFormat::Zip => self.extract_zip(package, dest_dir),
        }
    }
}

/// Validate that an entry path does not escape the destination directory
/// via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|component| matches!(component, Component::ParentDir | Component::RootDir));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::zip_archive;
    use rstest::{fixture, rstest};
    use std::path::PathBuf;

    struct Workspace {
        _temp: tempfile::TempDir,
        root: Utf8PathBuf,
    }

    impl Workspace {
        fn write_package(&self, bytes: &[u8]) -> Utf8PathBuf {
            let path = self.root.join("example-2.0.zip");
            std::fs::write(&path, bytes).expect("write package");
            path
        }

        fn out(&self) -> Utf8PathBuf {
            self.root.join("out")
        }
    }

    #[fixture]
    fn workspace() -> Workspace {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        Workspace { _temp: temp, root }
    }

    #[rstest]
    fn extracts_single_file_archive(workspace: Workspace) {
        let package = workspace.write_package(&zip_archive(&[
            ("bin/", b""),
            ("bin/example", b"#!/bin/sh\necho 2.0\n"),
        ]));
        let extracted = ArchiveExtractor::default()
            .extract(&package, PackageFormat::Zip, &workspace.out())
            .expect("extract");
        assert_eq!(extracted, workspace.out().join("example"));
        assert_eq!(
            std::fs::read(&extracted).expect("read"),
            b"#!/bin/sh\necho 2.0\n"
        );
    }

    #[rstest]
    fn named_entry_selects_among_many(workspace: Workspace) {
        let package = workspace.write_package(&zip_archive(&[
            ("README", b"docs"),
            ("example", b"binary"),
        ]));
        let extracted = ArchiveExtractor::with_entry("example")
            .extract(&package, PackageFormat::Zip, &workspace.out())
            .expect("extract");
        assert_eq!(std::fs::read(&extracted).expect("read"), b"binary");
    }

    #[rstest]
    fn several_files_without_a_name_are_ambiguous(workspace: Workspace) {
        let package = workspace.write_package(&zip_archive(&[("a", b"1"), ("b", b"2")]));
        let result = ArchiveExtractor::default().extract(&package, PackageFormat::Zip, &workspace.out());
        match result {
            Err(ExtractionError::AmbiguousArchive { entries }) => {
                assert_eq!(entries, vec!["a".to_owned(), "b".to_owned()]);
            }
            other => panic!("expected AmbiguousArchive, got {other:?}"),
        }
    }

    #[rstest]
    fn archive_with_only_directories_is_empty(workspace: Workspace) {
        let package = workspace.write_package(&zip_archive(&[("bin/", b"")]));
        let result = ArchiveExtractor::default().extract(&package, PackageFormat::Zip, &workspace.out());
        assert!(matches!(result, Err(ExtractionError::EmptyArchive)));
    }

    #[rstest]
    fn missing_named_entry_is_reported(workspace: Workspace) {
        let package = workspace.write_package(&zip_archive(&[("a", b"1")]));
        let result =
            ArchiveExtractor::with_entry("example").extract(&package, PackageFormat::Zip, &workspace.out());
        assert!(matches!(result, Err(ExtractionError::EntryNotFound { .. })));
    }

    #[rstest]
    fn corrupt_archive_is_rejected(workspace: Workspace) {
        let package = workspace.write_package(b"definitely not a zip file");
        let result = ArchiveExtractor::default().extract(&package, PackageFormat::Zip, &workspace.out());
        assert!(matches!(result, Err(ExtractionError::Archive(_))));
    }

    #[rstest]
    fn raw_package_is_its_own_payload(workspace: Workspace) {
        let package = workspace.write_package(b"raw binary");
        let extracted = ArchiveExtractor::default()
            .extract(&package, PackageFormat::Raw, &workspace.out())
            .expect("extract");
        assert_eq!(extracted, package);
        assert!(!workspace.out().exists());
    }

    #[rstest]
    #[case::parent_dir("../escape.txt")]
    #[case::nested_parent("foo/../../escape.txt")]
    #[case::absolute("/etc/passwd")]
    fn rejects_path_traversal(#[case] bad_path: &str) {
        let result = validate_entry_path(&PathBuf::from(bad_path));
        assert!(
            matches!(result, Err(ExtractionError::PathTraversal { .. })),
            "expected PathTraversal for {bad_path}"
        );
    }

    #[test]
    fn accepts_normal_paths() {
        assert!(validate_entry_path(&PathBuf::from("bin/example")).is_ok());
    }
}
