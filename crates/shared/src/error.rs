// Error kinds shared by every JMXV codec
//
// Buffer-level failures carry the byte offset where they happened. The
// orchestrator attaches the file path at the per-file boundary with
// `with_path`, so a single error line is enough to find the broken record.

use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, FormatError>;

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Wrong or missing 12-byte magic. No partial result is produced.
    #[error("bad signature: expected {expected:?}, found {found:?}")]
    BadSignature { expected: &'static str, found: String },

    /// A read ran past the end of the buffer.
    #[error("truncated buffer: need {needed} byte(s) at offset {offset}, buffer is {len} byte(s)")]
    TruncatedBuffer {
        offset: usize,
        needed: usize,
        len: usize,
    },

    /// An index (vertex, group, cell, resource id) points outside its table.
    #[error("invalid {what} reference {index} (limit {limit})")]
    InvalidReference {
        what: &'static str,
        index: usize,
        limit: usize,
    },

    /// A file referenced by another file does not exist on disk.
    #[error("missing file: {}", path.display())]
    MissingFile { path: PathBuf },

    /// The in-memory record cannot be written as-is.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// A fixed-count traversal finished with bytes (or records) left over.
    #[error("record count mismatch at offset {offset}: {detail}")]
    RecordCountMismatch { offset: usize, detail: String },

    /// Malformed line in a text registry.
    #[error("invalid text at line {line}: {detail}")]
    InvalidText { line: usize, detail: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<FormatError>,
    },
}

impl FormatError {
    pub fn constraint(detail: impl Into<String>) -> Self {
        FormatError::ConstraintViolation(detail.into())
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        FormatError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Attach the file path to an error raised while decoding that file.
    /// Errors that already name a path are returned unchanged.
    pub fn with_path(self, path: &Path) -> Self {
        match self {
            FormatError::InFile { .. } | FormatError::Io { .. } | FormatError::MissingFile { .. } => {
                self
            }
            other => FormatError::InFile {
                path: path.to_path_buf(),
                source: Box::new(other),
            },
        }
    }

    /// The error kind with any path wrapper removed.
    pub fn kind(&self) -> &FormatError {
        match self {
            FormatError::InFile { source, .. } => source.kind(),
            other => other,
        }
    }

    pub fn is_missing_file(&self) -> bool {
        matches!(self.kind(), FormatError::MissingFile { .. })
    }
}

/// Read a whole file into memory. Every codec works on a complete buffer.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(FormatError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    std::fs::read(path).map_err(|e| FormatError::io(path, e))
}
