//! Bulk enrollment from a dataset directory laid out as `<dir>/<roll number>/*.jpg`.

use crate::enroll::EnrollmentBuilder;
use crate::types::IdentityKey;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("dataset directory not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImportFailure {
    pub identity: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ImportReport {
    pub enrolled: Vec<IdentityKey>,
    pub failed: Vec<ImportFailure>,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.sort();
    Ok(paths)
}

/// Enroll every identity folder under `dir`.
///
/// Each folder is one enrollment call with all of its images, so it fully
/// replaces that identity's stored signature. Stray files at the top level
/// are ignored; a folder that fails to enroll is reported and the import
/// continues.
pub fn import_dataset(builder: &mut EnrollmentBuilder<'_>, dir: &Path) -> Result<ImportReport, ImportError> {
    if !dir.is_dir() {
        return Err(ImportError::NotFound(dir.to_path_buf()));
    }

    let mut report = ImportReport::default();

    for person_dir in sorted_entries(dir)? {
        if !person_dir.is_dir() {
            continue;
        }
        let name = person_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

        let images: Vec<Vec<u8>> = match sorted_entries(&person_dir) {
            Ok(paths) => paths
                .into_iter()
                .filter(|p| p.is_file() && is_image(p))
                .filter_map(|p| match fs::read(&p) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        tracing::warn!(path = %p.display(), error = %e, "cannot read image");
                        None
                    }
                })
                .collect(),
            Err(e) => {
                report.failed.push(ImportFailure { identity: name, reason: e.to_string() });
                continue;
            }
        };

        match builder.enroll(&name, &images) {
            Ok(enrolled) => report.enrolled.push(enrolled.identity),
            Err(e) => {
                tracing::warn!(identity = %name, error = %e, "dataset identity not enrolled");
                report.failed.push(ImportFailure { identity: name, reason: e.to_string() });
            }
        }
    }

    tracing::info!(
        enrolled = report.enrolled.len(),
        failed = report.failed.len(),
        dir = %dir.display(),
        "dataset import finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::Gallery;
    use crate::testing::{png, BrightFaceLocator, MeanColorExtractor, MemoryStore};
    use std::sync::Arc;

    fn write_person(root: &Path, name: &str, files: &[(&str, Vec<u8>)]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for (file, bytes) in files {
            fs::write(dir.join(file), bytes).unwrap();
        }
    }

    #[test]
    fn test_is_image() {
        assert!(is_image(Path::new("a/img_1.JPG")));
        assert!(is_image(Path::new("a/img_1.jpeg")));
        assert!(is_image(Path::new("a/img_1.png")));
        assert!(!is_image(Path::new("a/notes.txt")));
        assert!(!is_image(Path::new("a/noext")));
    }

    #[test]
    fn test_import_dataset() {
        let root = tempfile::tempdir().unwrap();
        write_person(
            root.path(),
            "21A1",
            &[
                ("img_1.jpg", png([200, 40, 40])),
                ("img_2.png", png([200, 40, 40])),
                ("img_3.PNG", png([200, 40, 40])),
                ("notes.txt", b"ignore me".to_vec()),
            ],
        );
        write_person(root.path(), "22b7", &[("img_1.png", png([40, 40, 200]))]);
        fs::write(root.path().join("stray.jpg"), png([1, 2, 3])).unwrap();

        let store = Arc::new(MemoryStore::default());
        let gallery = Gallery::load(store.clone());
        let mut locator = BrightFaceLocator::default();
        let mut extractor = MeanColorExtractor::default();
        let mut builder = EnrollmentBuilder::new(&mut locator, &mut extractor, store.as_ref(), &gallery);

        let report = import_dataset(&mut builder, root.path()).unwrap();

        assert_eq!(report.enrolled, vec!["21a1".parse::<IdentityKey>().unwrap()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].identity, "22b7");
        assert!(gallery.snapshot().contains(&"21a1".parse().unwrap()));
    }

    #[test]
    fn test_import_missing_dir() {
        let store = Arc::new(MemoryStore::default());
        let gallery = Gallery::load(store.clone());
        let mut locator = BrightFaceLocator::default();
        let mut extractor = MeanColorExtractor::default();
        let mut builder = EnrollmentBuilder::new(&mut locator, &mut extractor, store.as_ref(), &gallery);

        let err = import_dataset(&mut builder, Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ImportError::NotFound(_)));
    }
}
