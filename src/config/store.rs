//! Named profiles on disk
//!
//! The store owns no state between calls: each operation reads the
//! document, applies one change in memory and atomically replaces the file.
//! A document that fails to decode is never overwritten.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::codec::{self, ProfileDocument};
use super::schema;
use super::values::ConfigurationValues;
use crate::constants::config::DOCUMENT_MODE;
use crate::constants::profile::DEFAULT_PROFILE;
use crate::error::{Error, ProfileError, Result};
use crate::persistence::AtomicWriter;

/// Values of one profile together with its canonical name
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProfile {
    pub name: String,
    pub values: ConfigurationValues,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub from: String,
    pub to: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    pub name: String,
    pub was_active: bool,
}

/// Outcome of a bulk import, names in canonical form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Imported {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub active: String,
}

/// Trim, collapse inner whitespace runs into one `-`.
///
/// Empty results and control characters are rejected.
pub fn normalize_name(raw: &str) -> Result<String, ProfileError> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join("-");
    if name.is_empty() || name.chars().any(char::is_control) {
        return Err(ProfileError::InvalidName(raw.to_string()));
    }
    Ok(name)
}

fn is_default(name: &str) -> bool {
    name.to_lowercase() == DEFAULT_PROFILE
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
    writer: AtomicWriter,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: AtomicWriter::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_writer(path: impl Into<PathBuf>, writer: AtomicWriter) -> Self {
        Self {
            path: path.into(),
            writer,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document; a missing file is the default document
    pub fn load(&self) -> Result<ProfileDocument> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "profile document not found, using defaults");
                return Ok(ProfileDocument::new());
            }
            Err(e) => return Err(Error::io("read", &self.path, e)),
        };
        Ok(codec::decode(&text)?)
    }

    /// Load, apply `change`, then write the result back.
    ///
    /// Nothing is written when loading or `change` fails.
    fn mutate<T>(&self, change: impl FnOnce(&mut ProfileDocument) -> Result<T>) -> Result<T> {
        let mut doc = self.load()?;
        let out = change(&mut doc)?;
        let text = codec::encode(&doc);
        self.writer
            .write(&self.path, text.as_bytes(), DOCUMENT_MODE)?;
        Ok(out)
    }

    /// Profile names, default first
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.load()?.names())
    }

    pub fn active(&self) -> Result<String> {
        Ok(self.load()?.active().to_string())
    }

    /// Create `name` as a copy of `source` (the active profile when `None`)
    pub fn create(&self, name: &str, source: Option<&str>) -> Result<String> {
        let name = normalize_name(name)?;
        self.mutate(|doc| {
            if let Some(existing) = doc.get(&name) {
                return Err(ProfileError::AlreadyExists(existing.name.clone()).into());
            }
            let source = source.unwrap_or(doc.active()).trim().to_string();
            let values = doc
                .get(&source)
                .map(|p| p.values.clone())
                .ok_or(ProfileError::NotFound(source))?;
            doc.insert(name.clone(), values);
            info!(profile = %name, "created profile");
            Ok(name)
        })
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<Renamed> {
        if is_default(old.trim()) {
            return Err(ProfileError::ProtectedProfile(DEFAULT_PROFILE.to_string()).into());
        }
        let new = normalize_name(new)?;
        self.mutate(|doc| {
            let from = doc
                .get(old.trim())
                .map(|p| p.name.clone())
                .ok_or_else(|| ProfileError::NotFound(old.to_string()))?;
            if let Some(existing) = doc.get(&new)
                && existing.name != from
            {
                return Err(ProfileError::AlreadyExists(existing.name.clone()).into());
            }
            let active = doc.active() == from;
            doc.rename(&from, new.clone());
            info!(from = %from, to = %new, "renamed profile");
            Ok(Renamed {
                from,
                to: new,
                active,
            })
        })
    }

    /// Remove a profile; the default becomes active if it was the active one
    pub fn delete(&self, name: &str) -> Result<Deleted> {
        if is_default(name.trim()) {
            return Err(ProfileError::ProtectedProfile(DEFAULT_PROFILE.to_string()).into());
        }
        self.mutate(|doc| {
            let profile = doc
                .remove(name.trim())
                .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
            let was_active = doc.active() == profile.name;
            if was_active {
                doc.set_active(DEFAULT_PROFILE.to_string());
            }
            info!(profile = %profile.name, was_active, "deleted profile");
            Ok(Deleted {
                name: profile.name,
                was_active,
            })
        })
    }

    /// Mark a profile active; returns its canonical name
    pub fn set_active(&self, name: &str) -> Result<String> {
        self.mutate(|doc| {
            let canonical = doc
                .get(name.trim())
                .map(|p| p.name.clone())
                .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
            doc.set_active(canonical.clone());
            info!(profile = %canonical, "activated profile");
            Ok(canonical)
        })
    }

    pub fn get_values(&self, name: &str) -> Result<StoredProfile> {
        let doc = self.load()?;
        let profile = doc
            .get(name.trim())
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        Ok(StoredProfile {
            name: profile.name.clone(),
            values: profile.values.clone(),
            active: doc.active() == profile.name,
        })
    }

    /// Replace all values of a profile after revalidating each field
    pub fn set_values(&self, name: &str, values: ConfigurationValues) -> Result<StoredProfile> {
        schema::validate(&values)?;
        self.mutate(|doc| {
            let active = doc.active().to_string();
            let profile = doc
                .get_mut(name.trim())
                .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
            profile.values = values;
            debug!(profile = %profile.name, "stored profile values");
            Ok(StoredProfile {
                name: profile.name.clone(),
                values: profile.values.clone(),
                active: profile.name == active,
            })
        })
    }

    /// Create or overwrite each given profile, then optionally activate one.
    ///
    /// Profiles not mentioned are kept as they are.
    pub fn import(
        &self,
        profiles: Vec<(String, ConfigurationValues)>,
        activate: Option<&str>,
    ) -> Result<Imported> {
        let mut named = Vec::with_capacity(profiles.len());
        for (name, values) in profiles {
            schema::validate(&values)?;
            named.push((normalize_name(&name)?, values));
        }
        self.mutate(|doc| {
            let mut imported = Imported::default();
            for (name, values) in named {
                match doc.get_mut(&name) {
                    Some(existing) => {
                        existing.values = values;
                        imported.updated.push(existing.name.clone());
                    }
                    None => {
                        doc.insert(name.clone(), values);
                        imported.created.push(name);
                    }
                }
            }
            if let Some(target) = activate {
                let canonical = doc
                    .get(target.trim())
                    .map(|p| p.name.clone())
                    .ok_or_else(|| ProfileError::NotFound(target.to_string()))?;
                doc.set_active(canonical);
            }
            imported.active = doc.active().to_string();
            Ok(imported)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::FieldId;
    use crate::config::values::FieldValue;
    use crate::error::CodecError;
    use crate::persistence::WriteStep;
    use tempfile::TempDir;

    fn store() -> (TempDir, ProfileStore) {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path().join("lsfg-vk/profiles.toml"));
        (dir, store)
    }

    fn boosted() -> ConfigurationValues {
        let mut values = schema::defaults();
        values.set(FieldId::Multiplier, FieldValue::Int(4)).unwrap();
        values
    }

    #[test]
    fn normalize_trims_and_dashes() {
        assert_eq!(normalize_name("  My   Profile ").unwrap(), "My-Profile");
        assert_eq!(normalize_name("tab\tname").unwrap(), "tab-name");
        assert!(matches!(normalize_name("   "), Err(ProfileError::InvalidName(_))));
        assert!(matches!(normalize_name("bell\u{7}"), Err(ProfileError::InvalidName(_))));
    }

    #[test]
    fn missing_file_reads_as_default() {
        let (_dir, store) = store();
        assert_eq!(store.list().unwrap(), vec![DEFAULT_PROFILE.to_string()]);
        assert_eq!(store.active().unwrap(), DEFAULT_PROFILE);
        assert!(!store.path().exists());
    }

    #[test]
    fn create_normalizes_and_rejects_repeat() {
        let (_dir, store) = store();
        assert_eq!(store.create("My Profile", None).unwrap(), "My-Profile");

        let err = store.create("My Profile", None).unwrap_err();
        assert_eq!(err.kind(), "AlreadyExists");
        let err = store.create("my   profile", None).unwrap_err();
        assert_eq!(err.kind(), "AlreadyExists");
        assert_eq!(store.create("  ", None).unwrap_err().kind(), "InvalidName");
        assert_eq!(
            store.list().unwrap(),
            vec![DEFAULT_PROFILE.to_string(), "My-Profile".to_string()]
        );
    }

    #[test]
    fn create_copies_source_values() {
        let (_dir, store) = store();
        store.set_values(DEFAULT_PROFILE, boosted()).unwrap();

        store.create("copy", Some(DEFAULT_PROFILE)).unwrap();
        assert_eq!(store.get_values("COPY").unwrap().values, boosted());

        let err = store.create("other", Some("ghost")).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn create_without_source_copies_active() {
        let (_dir, store) = store();
        store.create("fast", None).unwrap();
        store.set_values("fast", boosted()).unwrap();
        store.set_active("fast").unwrap();

        store.create("faster", None).unwrap();
        let created = store.get_values("faster").unwrap();
        assert_eq!(created.values, boosted());
        assert!(!created.active);
    }

    #[test]
    fn default_profile_is_protected() {
        let (_dir, store) = store();
        store.create("side", None).unwrap();
        let before = fs::read(store.path()).unwrap();

        assert_eq!(
            store.rename(DEFAULT_PROFILE, "x").unwrap_err().kind(),
            "ProtectedProfile"
        );
        assert_eq!(
            store.rename(" Decky-LSFG-VK ", "x").unwrap_err().kind(),
            "ProtectedProfile"
        );
        assert_eq!(
            store.delete(DEFAULT_PROFILE).unwrap_err().kind(),
            "ProtectedProfile"
        );
        assert_eq!(
            store.delete("Decky-LSFG-VK").unwrap_err().kind(),
            "ProtectedProfile"
        );
        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert_eq!(store.list().unwrap()[0], DEFAULT_PROFILE);
    }

    #[test]
    fn rename_moves_active_pointer() {
        let (_dir, store) = store();
        store.create("fast", None).unwrap();
        store.set_active("fast").unwrap();

        let renamed = store.rename("fast", "very fast").unwrap();
        assert_eq!(renamed.from, "fast");
        assert_eq!(renamed.to, "very-fast");
        assert!(renamed.active);
        assert_eq!(store.active().unwrap(), "very-fast");
        assert_eq!(store.get_values("fast").unwrap_err().kind(), "NotFound");
    }

    #[test]
    fn rename_collision_and_case_change() {
        let (_dir, store) = store();
        store.create("a", None).unwrap();
        store.create("b", None).unwrap();

        assert_eq!(store.rename("a", "B").unwrap_err().kind(), "AlreadyExists");
        assert_eq!(
            store.rename("a", DEFAULT_PROFILE).unwrap_err().kind(),
            "AlreadyExists"
        );
        assert_eq!(store.rename("a", "A").unwrap().to, "A");
        assert_eq!(store.rename("zzz", "c").unwrap_err().kind(), "NotFound");
    }

    #[test]
    fn deleting_active_resets_to_default() {
        let (_dir, store) = store();
        store.create("temp", None).unwrap();
        store.set_active("temp").unwrap();

        let deleted = store.delete("temp").unwrap();
        assert!(deleted.was_active);
        assert_eq!(store.active().unwrap(), DEFAULT_PROFILE);
        assert!(store.get_values(DEFAULT_PROFILE).unwrap().active);
        assert_eq!(store.delete("temp").unwrap_err().kind(), "NotFound");
    }

    #[test]
    fn deleting_inactive_keeps_active() {
        let (_dir, store) = store();
        store.create("keep", None).unwrap();
        store.create("drop", None).unwrap();
        store.set_active("keep").unwrap();

        let deleted = store.delete("DROP").unwrap();
        assert_eq!(deleted.name, "drop");
        assert!(!deleted.was_active);
        assert_eq!(store.active().unwrap(), "keep");
    }

    #[test]
    fn set_active_returns_canonical_name() {
        let (_dir, store) = store();
        store.create("Night", None).unwrap();
        assert_eq!(store.set_active("night").unwrap(), "Night");
        assert_eq!(store.set_active("nope").unwrap_err().kind(), "NotFound");
        assert_eq!(store.active().unwrap(), "Night");
    }

    #[test]
    fn crash_before_rename_leaves_document_unchanged() {
        let (_dir, store) = store();
        store.create("keep", None).unwrap();
        let before = fs::read(store.path()).unwrap();

        for step in [WriteStep::WriteTemp, WriteStep::SyncTemp] {
            let crashing =
                ProfileStore::with_writer(store.path(), AtomicWriter::new().crash_after(step));
            assert_eq!(crashing.create("lost", None).unwrap_err().kind(), "IoError");
            assert_eq!(
                crashing.set_values("keep", boosted()).unwrap_err().kind(),
                "IoError"
            );
            assert_eq!(fs::read(store.path()).unwrap(), before);
        }
        assert_eq!(store.list().unwrap().len(), 2);
        assert_eq!(store.get_values("keep").unwrap().values, schema::defaults());
    }

    #[test]
    fn malformed_document_blocks_writes() {
        let (_dir, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "profiles = [1, 2").unwrap();

        let err = store.create("new", None).unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::Malformed(_))));
        assert_eq!(store.set_active(DEFAULT_PROFILE).unwrap_err().kind(), "Malformed");
        assert_eq!(
            store.set_values(DEFAULT_PROFILE, schema::defaults()).unwrap_err().kind(),
            "Malformed"
        );
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "profiles = [1, 2");
    }

    #[test]
    fn set_values_keeps_other_profiles() {
        let (_dir, store) = store();
        store.create("other", None).unwrap();
        let mut values = schema::defaults();
        values.set(FieldId::HdrMode, FieldValue::Bool(true)).unwrap();

        let stored = store.set_values("OTHER", values.clone()).unwrap();
        assert_eq!(stored.name, "other");
        assert!(!stored.active);
        assert_eq!(store.get_values(DEFAULT_PROFILE).unwrap().values, schema::defaults());
        assert_eq!(store.get_values("other").unwrap().values, values);
        assert_eq!(
            store.set_values("ghost", values).unwrap_err().kind(),
            "NotFound"
        );
    }

    #[test]
    fn import_creates_updates_and_activates() {
        let (_dir, store) = store();
        store.create("existing", None).unwrap();

        let imported = store
            .import(
                vec![
                    ("EXISTING".to_string(), boosted()),
                    ("Road Trip".to_string(), boosted()),
                ],
                Some("road-trip"),
            )
            .unwrap();
        assert_eq!(imported.updated, vec!["existing".to_string()]);
        assert_eq!(imported.created, vec!["Road-Trip".to_string()]);
        assert_eq!(imported.active, "Road-Trip");
        assert_eq!(store.get_values("existing").unwrap().values, boosted());
        assert_eq!(store.list().unwrap().len(), 3);
    }

    #[test]
    fn import_with_unknown_active_writes_nothing() {
        let (_dir, store) = store();
        store.create("a", None).unwrap();
        let before = fs::read(store.path()).unwrap();

        let err = store
            .import(vec![("b".to_string(), boosted())], Some("missing"))
            .unwrap_err();
        assert_eq!(err.kind(), "NotFound");
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }
}
