//! Alias operations, uniform over artists, albums and tracks.

use super::ensure_exists;
use crate::catalog_store::{Alias, CatalogStore, EntityKind};
use crate::error::{storage, CatalogError, CatalogResult};
use tracing::debug;

pub fn get_aliases(store: &dyn CatalogStore, kind: EntityKind, id: i64) -> CatalogResult<Vec<Alias>> {
    ensure_exists(store, kind, id)?;
    store.get_aliases(kind, id).map_err(storage("get_aliases"))
}

/// Add non-primary aliases. Texts already present are left as they are.
pub fn add_aliases(
    store: &dyn CatalogStore,
    kind: EntityKind,
    id: i64,
    texts: &[String],
    source: &str,
) -> CatalogResult<()> {
    if source.trim().is_empty() {
        return Err(CatalogError::invalid_input("alias source is required"));
    }
    let texts: Vec<String> = texts.iter().map(|t| t.trim().to_string()).collect();
    if texts.is_empty() || texts.iter().any(|t| t.is_empty()) {
        return Err(CatalogError::invalid_input("aliases must be non-empty"));
    }
    ensure_exists(store, kind, id)?;
    store
        .add_aliases(kind, id, &texts, source)
        .map_err(storage("add_aliases"))?;
    debug!("Added {} aliases to {} {}", texts.len(), kind, id);
    Ok(())
}

/// Make `text` the primary alias, demoting the previous one.
pub fn set_primary_alias(
    store: &dyn CatalogStore,
    kind: EntityKind,
    id: i64,
    text: &str,
) -> CatalogResult<()> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CatalogError::invalid_input("alias is required"));
    }
    ensure_exists(store, kind, id)?;
    let updated = store
        .set_primary_alias(kind, id, text)
        .map_err(storage("set_primary_alias"))?;
    if !updated {
        return Err(CatalogError::not_found(format!(
            "'{}' is not an alias of {} {}",
            text, kind, id
        )));
    }
    Ok(())
}

/// Remove an alias. Deleting the primary alias does nothing.
pub fn delete_alias(
    store: &dyn CatalogStore,
    kind: EntityKind,
    id: i64,
    text: &str,
) -> CatalogResult<()> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CatalogError::invalid_input("alias is required"));
    }
    ensure_exists(store, kind, id)?;
    store
        .delete_alias(kind, id, text)
        .map_err(storage("delete_alias"))
}
