use std::error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use backtrace::Backtrace;

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    backtrace: Option<Backtrace>,
}

#[derive(Debug)]
pub enum ErrorKind {
    Io(io::Error),
    // File system failure on a known path.
    IoPath {
        path: PathBuf,
        source: io::Error,
    },
    // Operation refused before touching the file system.
    RejectedOperation {
        reason: String,
    },
    // Record checksum or structure mismatch.
    // offset is the start of the offending record.
    DataCorrupted {
        path: Option<PathBuf>,
        offset: u64,
        description: String,
    },
    // Read attempted against a dump whose creation never finished.
    IncompleteDump {
        path: PathBuf,
    },
    MappingConflict {
        platform_id: u8,
        type_id: i32,
        existing: String,
        new: String,
    },
    UnknownType {
        platform_id: u8,
        type_id: i32,
    },
    Cancelled {
        name: String,
    },
    Config {
        description: String,
    },
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind() {
            ErrorKind::Io(err) => err.fmt(f),
            ErrorKind::IoPath { path, source } => {
                write!(f, "{} [path={}]", source, path.display())
            }
            ErrorKind::RejectedOperation { reason } => {
                write!(f, "Dump operation has been rejected. {}", reason)
            }
            ErrorKind::DataCorrupted {
                path,
                offset,
                description,
            } => match path {
                Some(path) => write!(
                    f,
                    "Data corrupted [path={}, offset={}]: {}",
                    path.display(),
                    offset,
                    description
                ),
                None => write!(f, "Data corrupted [offset={}]: {}", offset, description),
            },
            ErrorKind::IncompleteDump { path } => write!(
                f,
                "Dump creation has not finished, directory is locked: {}",
                path.display()
            ),
            ErrorKind::MappingConflict {
                platform_id,
                type_id,
                existing,
                new,
            } => write!(
                f,
                "Failed to merge new and existing type mappings. \
                 For [platformId={}, typeId={}] new typeName={}, existing typeName={}",
                platform_id, type_id, new, existing
            ),
            ErrorKind::UnknownType {
                platform_id,
                type_id,
            } => write!(
                f,
                "No type mapping registered [platformId={}, typeId={}]",
                platform_id, type_id
            ),
            ErrorKind::Cancelled { name } => write!(f, "Dump creation cancelled [name={}]", name),
            ErrorKind::Config { description } => write!(f, "invalid configuration. {}", description),
            ErrorKind::Internal(description) => write!(f, "internal error. {}", description),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::from(ErrorKind::Io(err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::from(ErrorKind::Config {
            description: err.to_string(),
        })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::from(ErrorKind::Internal(err.to_string()))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::from(ErrorKind::Internal(err.to_string()))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::with_backtrace(kind)
    }
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_ref()
    }

    pub fn is_data_corrupted(&self) -> bool {
        matches!(self.kind(), ErrorKind::DataCorrupted { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.kind(), ErrorKind::RejectedOperation { .. })
    }

    pub(crate) fn io_path(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::from(ErrorKind::IoPath {
            path: path.into(),
            source,
        })
    }

    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        Error::from(ErrorKind::RejectedOperation {
            reason: reason.into(),
        })
    }

    pub(crate) fn corrupted(offset: u64, description: impl Into<String>) -> Self {
        Error::from(ErrorKind::DataCorrupted {
            path: None,
            offset,
            description: description.into(),
        })
    }

    // Attach artifact location to a corruption raised by the codec,
    // which only knows offsets relative to the record start.
    pub(crate) fn located(mut self, artifact: &std::path::Path, record_offset: u64) -> Self {
        if let ErrorKind::DataCorrupted { path, offset, .. } = &mut self.kind {
            *path = Some(artifact.to_path_buf());
            *offset += record_offset;
        }
        self
    }

    fn with_backtrace(kind: ErrorKind) -> Self {
        Self {
            kind,
            backtrace: Some(Backtrace::new()),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.kind() {
            ErrorKind::Io(err) => Some(err),
            ErrorKind::IoPath { source, .. } => Some(source),
            _ => None,
        }
    }
}

// Attach a path to io results.
pub(crate) trait IoContext<T> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T, Error>;
}

impl<T> IoContext<T> for Result<T, io::Error> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T, Error> {
        self.map_err(|err| Error::io_path(path.as_ref(), err))
    }
}
