//! Process-wide taxonomy handle
//!
//! The binary builds the index once at startup and installs it here;
//! library callers normally receive an `Arc<TaxonomyIndex>` directly and
//! never touch this module. `reset` exists so tests can swap definitions.

use super::{LoadOptions, TaxonomyError, TaxonomyIndex};
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

static SHARED: Lazy<RwLock<Option<Arc<TaxonomyIndex>>>> = Lazy::new(|| RwLock::new(None));

/// Replace the installed index
pub fn install(index: Arc<TaxonomyIndex>) {
    let mut slot = SHARED.write().unwrap_or_else(|e| e.into_inner());
    *slot = Some(index);
}

/// Currently installed index, if any
pub fn get() -> Option<Arc<TaxonomyIndex>> {
    SHARED.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Installed index, loading it from `path` on first use
pub fn get_or_load(path: &Path, options: &LoadOptions) -> Result<Arc<TaxonomyIndex>, TaxonomyError> {
    if let Some(index) = get() {
        return Ok(index);
    }

    let mut slot = SHARED.write().unwrap_or_else(|e| e.into_inner());
    if let Some(index) = slot.as_ref() {
        return Ok(Arc::clone(index));
    }

    let index = Arc::new(TaxonomyIndex::load(path, options)?);
    *slot = Some(Arc::clone(&index));
    Ok(index)
}

/// Drop the installed index; the next `get_or_load` rebuilds it
pub fn reset() {
    let mut slot = SHARED.write().unwrap_or_else(|e| e.into_inner());
    if slot.take().is_some() {
        info!("Shared taxonomy index reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_taxonomy(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("categories.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    #[serial]
    fn test_get_or_load_caches_until_reset() {
        reset();
        let dir = tempfile::tempdir().unwrap();
        let path = write_taxonomy(&dir, r#"{"en:tea": {"labels": {"en": "Tea"}}}"#);

        let first = get_or_load(&path, &LoadOptions::default()).unwrap();
        assert_eq!(first.len(), 1);

        // Rewrite the file; the cached index is still served
        write_taxonomy(
            &dir,
            r#"{"en:tea": {"labels": {"en": "Tea"}}, "en:milk": {"labels": {"en": "Milk"}}}"#,
        );
        let second = get_or_load(&path, &LoadOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        reset();
        assert!(get().is_none());
        let third = get_or_load(&path, &LoadOptions::default()).unwrap();
        assert_eq!(third.len(), 2);
        reset();
    }

    #[test]
    #[serial]
    fn test_install_replaces() {
        reset();
        let index = TaxonomyIndex::from_json_str(
            r#"{"en:x": {"labels": {"en": "X"}}}"#,
            &LoadOptions::default(),
        )
        .unwrap();
        install(Arc::new(index));
        assert!(get().unwrap().contains("en:x"));
        reset();
    }
}
