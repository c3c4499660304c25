//! Error types shared by every reader/builder in this crate.

use std::path::PathBuf;

/// The result type returned by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy for this crate.
///
/// Each variant corresponds to one of the triggers in the crate's
/// error-handling design: a magic/identifier mismatch surfaces as
/// `InvalidFormat`, a disallowed character in a string field surfaces as
/// `InvalidEncoding`, and so on. Locally recoverable conditions (a bad date
/// falling back to a sentinel, an unknown SUSP entry being ignored) never
/// reach this type — they are logged and absorbed at the call site.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error with optional path context.
    #[error("I/O error{}: {source}", path.as_ref().map(|p| format!(" at '{}'", p.display())).unwrap_or_default())]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    /// Magic number, signature, or identifier mismatch.
    #[error("invalid format: {message}")]
    InvalidFormat { message: String },

    /// A string field contains characters outside its allowed alphabet, or a
    /// date/UUID could not be parsed.
    #[error("invalid encoding: {message}")]
    InvalidEncoding { message: String },

    /// A value lies outside its representable range, in a context where no
    /// sentinel fallback applies (e.g. a seek before byte zero).
    #[error("out of range: {message}")]
    OutOfRange { message: String },

    /// An ISO-9660 file has a non-zero file-unit-size or interleave-gap.
    #[error("non-contiguous ISO extents are not supported: {message}")]
    NonContiguousUnsupported { message: String },

    /// An Ext inode's block map needs a triple-indirect lookup.
    #[error("triple-indirect block mapping is not supported: {message}")]
    TripleIndirectUnsupported { message: String },

    /// None of the caller's requested ISO variants (Joliet/Rock Ridge/plain)
    /// are present on the volume.
    #[error("no requested ISO-9660 variant is available: {message}")]
    VariantUnavailable { message: String },

    /// A VMDK extent type has no implemented read path (e.g. SeSparse).
    #[error("unsupported VMDK extent type: {message}")]
    ExtentUnsupported { message: String },

    /// A write call was made against a read-only reader or wrapper.
    #[error("write not supported: {message}")]
    WriteNotSupported { message: String },

    /// A write call extends past the fixed length of the target stream.
    #[error("write beyond end of stream: {message}")]
    WriteBeyondEnd { message: String },
}

impl Error {
    /// Create an I/O error with path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }

    /// Create an I/O error without path context.
    pub fn io_simple(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }

    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    pub fn invalid_encoding(message: impl Into<String>) -> Self {
        Self::InvalidEncoding {
            message: message.into(),
        }
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::OutOfRange {
            message: message.into(),
        }
    }

    pub fn non_contiguous(message: impl Into<String>) -> Self {
        Self::NonContiguousUnsupported {
            message: message.into(),
        }
    }

    pub fn triple_indirect(message: impl Into<String>) -> Self {
        Self::TripleIndirectUnsupported {
            message: message.into(),
        }
    }

    pub fn variant_unavailable(message: impl Into<String>) -> Self {
        Self::VariantUnavailable {
            message: message.into(),
        }
    }

    pub fn extent_unsupported(message: impl Into<String>) -> Self {
        Self::ExtentUnsupported {
            message: message.into(),
        }
    }

    pub fn write_not_supported(message: impl Into<String>) -> Self {
        Self::WriteNotSupported {
            message: message.into(),
        }
    }

    pub fn write_beyond_end(message: impl Into<String>) -> Self {
        Self::WriteBeyondEnd {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::io_simple(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_with_path_includes_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io(io_err, "/path/to/file.iso");
        assert!(err.to_string().contains("/path/to/file.iso"));
    }

    #[test]
    fn from_io_error_has_no_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io { path: None, .. }));
    }

    #[test]
    fn constructors_produce_matching_variants() {
        assert!(matches!(
            Error::invalid_format("bad magic"),
            Error::InvalidFormat { .. }
        ));
        assert!(matches!(
            Error::triple_indirect("block 12345"),
            Error::TripleIndirectUnsupported { .. }
        ));
    }
}
