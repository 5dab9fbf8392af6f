use crate::config::ConfigError;
use crate::scanner::ScanError;
use std::fmt;
use std::path::{Path, PathBuf};

pub type Result<T, E = UpgradeError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error("failed to parse {}:{line}:{column}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("cyclic @import chain: {}", CyclePath(cycle))]
    GraphCycle { cycle: Vec<PathBuf> },

    #[error(
        "cannot split {} into {}: file already exists",
        original.display(),
        generated.display()
    )]
    NameConflict {
        original: PathBuf,
        generated: PathBuf,
    },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", .0.message)]
    Config(ConfigError),

    #[error("{}", .0.message)]
    Scan(ScanError),
}

impl UpgradeError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<ConfigError> for UpgradeError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<ScanError> for UpgradeError {
    fn from(err: ScanError) -> Self {
        Self::Scan(err)
    }
}

/// A construct that was recognized but left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

struct CyclePath<'a>(&'a [PathBuf]);

impl fmt::Display for CyclePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, path) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}
