//! Document loading: format detection by extension and text extraction.
//!
//! PDF extraction needs the `pdf` feature; without it, PDF files fail
//! with [`DocumentError::PdfUnavailable`].

use std::path::{Path, PathBuf};

/// File formats the tools understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Markdown,
    Json,
    Csv,
    Pdf,
}

impl DocumentKind {
    /// Detect the kind from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        match extension(path).as_str() {
            ".txt" => Some(Self::Text),
            ".md" => Some(Self::Markdown),
            ".json" => Some(Self::Json),
            ".csv" => Some(Self::Csv),
            ".pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("unsupported file type '{extension}'")]
    Unsupported { extension: String },

    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("PDF support is not compiled in (enable the `pdf` feature)")]
    PdfUnavailable,

    #[error("cannot extract text from {path}: {reason}")]
    Pdf { path: String, reason: String },

    #[error("'{path}' is outside the data directory; only files in {data_dir} can be read")]
    OutsideDataDir { path: String, data_dir: String },
}

/// Lowercased extension with its leading dot, or an empty string.
pub fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// The file name for messages shown to the model.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Resolve a path the model supplied, confined to the data directory.
///
/// Paths are tried as given, then relative to the data directory, then as
/// a bare file name inside the data directory. The first existing candidate
/// whose canonical form lies under the data directory wins. When only
/// candidates outside it exist, the path is refused. When nothing exists,
/// the bare file name inside the data directory is returned so the read
/// reports it missing.
pub fn resolve_path(data_dir: &Path, requested: &str) -> Result<PathBuf, DocumentError> {
    let direct = PathBuf::from(requested);
    let mut candidates = vec![direct.clone(), data_dir.join(requested)];
    if let Some(name) = direct.file_name() {
        candidates.push(data_dir.join(name));
    }

    let root = data_dir.canonicalize().ok();
    let mut outside = false;
    for candidate in &candidates {
        let Ok(canonical) = candidate.canonicalize() else {
            continue;
        };
        match &root {
            Some(root) if canonical.starts_with(root) => return Ok(canonical),
            _ => outside = true,
        }
    }

    if outside {
        return Err(DocumentError::OutsideDataDir {
            path: requested.to_string(),
            data_dir: data_dir.display().to_string(),
        });
    }
    Ok(direct
        .file_name()
        .map(|name| data_dir.join(name))
        .unwrap_or_else(|| data_dir.to_path_buf()))
}

/// Read a file as UTF-8 text.
pub async fn read_text(path: &Path) -> Result<String, DocumentError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DocumentError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Load the plain text of a text-like or PDF document.
pub async fn load_text(path: &Path) -> Result<String, DocumentError> {
    match DocumentKind::from_path(path) {
        Some(DocumentKind::Pdf) => load_pdf(path).await,
        Some(_) => read_text(path).await,
        None => Err(DocumentError::Unsupported {
            extension: extension(path),
        }),
    }
}

#[cfg(feature = "pdf")]
async fn load_pdf(path: &Path) -> Result<String, DocumentError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| DocumentError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let shown = path.display().to_string();

    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| DocumentError::Pdf {
            path: shown.clone(),
            reason: e.to_string(),
        })?
        .map_err(|e| DocumentError::Pdf {
            path: shown,
            reason: e.to_string(),
        })
}

#[cfg(not(feature = "pdf"))]
async fn load_pdf(_path: &Path) -> Result<String, DocumentError> {
    Err(DocumentError::PdfUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_kinds_case_insensitively() {
        assert_eq!(DocumentKind::from_path(Path::new("a/B.CSV")), Some(DocumentKind::Csv));
        assert_eq!(DocumentKind::from_path(Path::new("notes.md")), Some(DocumentKind::Markdown));
        assert_eq!(DocumentKind::from_path(Path::new("report.pdf")), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_path(Path::new("sheet.xlsx")), None);
        assert_eq!(DocumentKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn extension_keeps_dot() {
        assert_eq!(extension(Path::new("x/y.Json")), ".json");
        assert_eq!(extension(Path::new("noext")), "");
    }

    #[test]
    fn resolves_bare_names_inside_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sales.csv"), "a\n1").unwrap();
        let root = dir.path().canonicalize().unwrap();

        let resolved = resolve_path(dir.path(), "somewhere/else/sales.csv").unwrap();
        assert_eq!(resolved, root.join("sales.csv"));

        let absolute = dir.path().join("sales.csv");
        let resolved = resolve_path(dir.path(), absolute.to_str().unwrap()).unwrap();
        assert_eq!(resolved, root.join("sales.csv"));

        let missing = resolve_path(dir.path(), "nope.csv").unwrap();
        assert_eq!(missing, dir.path().join("nope.csv"));
    }

    #[test]
    fn parent_traversal_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let data_dir = root.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(root.path().join("outside.txt"), "secret").unwrap();

        let err = resolve_path(&data_dir, "../outside.txt").unwrap_err();
        assert!(matches!(err, DocumentError::OutsideDataDir { .. }), "{err}");
    }

    #[test]
    fn absolute_path_outside_data_dir_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let data_dir = root.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        let outside = root.path().join("payroll.csv");
        std::fs::write(&outside, "a\n1").unwrap();

        let err = resolve_path(&data_dir, outside.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("outside the data directory"), "{err}");
    }

    #[test]
    fn same_name_inside_data_dir_wins_over_outside_copy() {
        let root = tempfile::tempdir().unwrap();
        let data_dir = root.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(root.path().join("notes.txt"), "outside").unwrap();
        std::fs::write(data_dir.join("notes.txt"), "inside").unwrap();

        let outside = root.path().join("notes.txt");
        let resolved = resolve_path(&data_dir, outside.to_str().unwrap()).unwrap();
        assert_eq!(resolved, data_dir.canonicalize().unwrap().join("notes.txt"));
    }

    #[tokio::test]
    async fn loads_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "quarterly revenue grew").unwrap();
        assert_eq!(load_text(&path).await.unwrap(), "quarterly revenue grew");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = load_text(Path::new("/nonexistent/datalyst/file.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }

    #[tokio::test]
    async fn unsupported_extension() {
        let err = load_text(Path::new("image.png")).await.unwrap_err();
        assert!(err.to_string().contains(".png"));
    }

    #[cfg(not(feature = "pdf"))]
    #[tokio::test]
    async fn pdf_without_feature_is_reported() {
        let err = load_text(Path::new("report.pdf")).await.unwrap_err();
        assert!(matches!(err, DocumentError::PdfUnavailable));
    }
}
