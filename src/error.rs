use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The recoverable error type for all operations in the `archgate` crate.
///
/// Every variant travels through the out-of-band reporting channel at the
/// script boundary; the gateway reports the error and returns a falsy value.
/// Permission denials are deliberately not representable here; see
/// [`PermissionViolation`].
#[derive(Debug, Error)]
pub enum OpError {
    /// A call argument was missing or malformed, or an explicit format string
    /// requested an operation the format cannot perform.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A source file, in-archive entry, or in-archive directory does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Format detection failed, or a format does not support the requested
    /// operation (e.g. extraction on a compressor-only format).
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A virtual path could not be mapped to a real location (unknown
    /// namespace prefix, escape from the namespace root). Distinct from a
    /// permission denial: resolution never consults ACLs.
    #[error("unresolvable virtual path: {0}")]
    Resolve(String),

    /// An I/O error, typically while reading or writing a file.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", .path.display())]
    Io { source: io::Error, path: PathBuf },

    /// An error from the underlying `zip` crate while reading or writing
    /// an archive.
    #[error("archive codec error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// An error during serialization of a listing result.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl OpError {
    /// Wraps an I/O error together with the offending path, classifying a
    /// missing file as [`OpError::NotFound`] rather than a plain I/O failure.
    pub fn io(source: io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            return OpError::NotFound(path.display().to_string());
        }
        OpError::Io { source, path }
    }
}

// Generic IO error conversion that doesn't carry a path
impl From<io::Error> for OpError {
    fn from(err: io::Error) -> Self {
        OpError::Io { source: err, path: PathBuf::new() }
    }
}

/// The access class an ACL check was performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// The fatal failure channel: an ACL check failed at the script boundary.
///
/// Unlike [`OpError`], a violation aborts the enclosing script execution.
/// It is raised before any path is resolved or any codec is invoked, so a
/// denied call performs zero filesystem mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionViolation {
    pub access: AccessKind,
    /// The absolute virtual path the check was performed against.
    pub vpath: String,
}

impl PermissionViolation {
    pub fn read(vpath: impl Into<String>) -> Self {
        Self { access: AccessKind::Read, vpath: vpath.into() }
    }

    pub fn write(vpath: impl Into<String>) -> Self {
        Self { access: AccessKind::Write, vpath: vpath.into() }
    }
}

impl fmt::Display for PermissionViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.access {
            AccessKind::Read => write!(f, "Read access denied: {}", self.vpath),
            AccessKind::Write => write!(f, "Write access denied: {}", self.vpath),
        }
    }
}

impl std::error::Error for PermissionViolation {}
