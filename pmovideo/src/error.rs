//! Types d'erreurs pour pmovideo

use std::path::PathBuf;

/// Erreurs du moteur de synchronisation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Paramètre refusé avant toute mutation (nom de fichier, direction, index)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Entrée absente de l'ordre réconcilié
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Écriture concurrente détectée (mode compare-and-swap uniquement)
    #[error("Profile {profile} changed concurrently (expected revision {expected}, found {found})")]
    Conflict {
        profile: String,
        expected: u64,
        found: u64,
    },

    #[error("Catalog scan failed: {0}")]
    ScanFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Type Result spécialisé pour pmovideo
pub type Result<T> = std::result::Result<T, Error>;
