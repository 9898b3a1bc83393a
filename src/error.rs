//! Error taxonomy shared by the resolver, the analytics layer and the provider clients.

use crate::catalog_store::DuplicateEntity;
use crate::providers::ProviderError;
use thiserror::Error;

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Missing or malformed caller input. Nothing was written.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected a creation, usually because a concurrent
    /// resolution created the same entity first.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Provider failure: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage failure during {op}: {cause:#}")]
    Storage {
        op: &'static str,
        cause: anyhow::Error,
    },
}

impl CatalogError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CatalogError::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CatalogError::NotFound(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CatalogError::Conflict(_))
    }
}

/// Wraps a store error with the name of the operation that failed.
///
/// Uniqueness violations reported by the store become `Conflict`, everything
/// else becomes `Storage`.
pub fn storage(op: &'static str) -> impl FnOnce(anyhow::Error) -> CatalogError {
    move |cause| match cause.downcast_ref::<DuplicateEntity>() {
        Some(duplicate) => CatalogError::Conflict(format!("{} ({})", duplicate, op)),
        None => CatalogError::Storage { op, cause },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::EntityKind;

    #[test]
    fn test_storage_wraps_operation_name() {
        let err = storage("get_track")(anyhow::anyhow!("disk I/O error"));
        match &err {
            CatalogError::Storage { op, .. } => assert_eq!(*op, "get_track"),
            other => panic!("unexpected error {:?}", other),
        }
        let msg = err.to_string();
        assert!(msg.contains("get_track"));
        assert!(msg.contains("disk I/O error"));
    }

    #[test]
    fn test_storage_maps_duplicates_to_conflict() {
        let cause = anyhow::Error::new(DuplicateEntity {
            kind: EntityKind::Track,
            detail: "musicbrainz id already taken".to_string(),
        });
        let err = storage("create_track")(cause);
        assert!(err.is_conflict());
        assert!(err.to_string().contains("create_track"));
    }
}
