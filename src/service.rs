//! Configuration service
//!
//! The one entry point used by the CLI and the IPC server. Every operation
//! validates first, persists the document, and only then touches the launch
//! script, so a script failure can never roll back or block a saved edit.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::codec::ProfileDocument;
use crate::config::paths::Paths;
use crate::config::schema::{self, FieldDescription};
use crate::config::store::{Deleted, Imported, ProfileStore, Renamed, StoredProfile};
use crate::config::values::ConfigurationValues;
use crate::error::Result;
use crate::ipc::{Request, Response, ScriptSync};
use crate::script::{LaunchScript, ScriptStatus};

/// A stored profile plus what happened to the script afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct Updated {
    pub profile: StoredProfile,
    pub script: ScriptSync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileList {
    pub profiles: Vec<String>,
    pub active: String,
}

#[derive(Debug, Clone)]
pub struct ConfigService {
    store: ProfileStore,
    script: LaunchScript,
}

impl ConfigService {
    pub fn new(store: ProfileStore, script: LaunchScript) -> Self {
        Self { store, script }
    }

    pub fn from_paths(paths: &Paths) -> Self {
        Self::new(
            ProfileStore::new(&paths.config),
            LaunchScript::new(&paths.script),
        )
    }

    fn resolve(&self, profile: Option<&str>) -> Result<String> {
        match profile {
            Some(name) => Ok(name.to_string()),
            None => self.store.active(),
        }
    }

    /// Values of `profile`, or of the active profile
    pub fn get_config(&self, profile: Option<&str>) -> Result<StoredProfile> {
        let name = self.resolve(profile)?;
        self.store.get_values(&name)
    }

    /// Validate, persist, then regenerate the script if the profile is active
    pub fn update_config(
        &self,
        profile: Option<&str>,
        values: ConfigurationValues,
    ) -> Result<Updated> {
        let name = self.resolve(profile)?;
        let stored = self.store.set_values(&name, values)?;
        let script = if stored.active {
            self.write_script(&stored.name, &stored.values)
        } else {
            debug!(profile = %stored.name, "profile is not active, script left alone");
            ScriptSync::Skipped
        };
        Ok(Updated {
            profile: stored,
            script,
        })
    }

    /// Replace every field from a raw name → value map
    pub fn update_config_raw(
        &self,
        profile: Option<&str>,
        raw: &Map<String, Value>,
    ) -> Result<Updated> {
        let values = schema::values_from_raw(raw)?;
        self.update_config(profile, values)
    }

    /// Change one field; all other fields keep their stored values
    pub fn update_field(&self, profile: Option<&str>, field: &str, raw: &Value) -> Result<Updated> {
        let current = self.get_config(profile)?;
        let mut values = current.values;
        let id = values.set_raw(field, raw)?;
        info!(profile = %current.name, field = id.name(), value = %values.get(id), "updating field");
        self.update_config(Some(&current.name), values)
    }

    /// Change several fields at once; nothing is stored unless all are valid
    pub fn update_fields(&self, profile: Option<&str>, raw: &Map<String, Value>) -> Result<Updated> {
        let current = self.get_config(profile)?;
        let values = current.values.merge_raw(raw)?;
        self.update_config(Some(&current.name), values)
    }

    pub fn list_profiles(&self) -> Result<ProfileList> {
        Ok(ProfileList::from(&self.store.load()?))
    }

    /// New profile copied from `source`; the script is unaffected
    pub fn create_profile(&self, name: &str, source: Option<&str>) -> Result<String> {
        self.store.create(name, source)
    }

    pub fn rename_profile(&self, old: &str, new: &str) -> Result<(Renamed, ScriptSync)> {
        let renamed = self.store.rename(old, new)?;
        let script = if renamed.active {
            self.sync_active()
        } else {
            ScriptSync::Skipped
        };
        Ok((renamed, script))
    }

    pub fn delete_profile(&self, name: &str) -> Result<(Deleted, ScriptSync)> {
        let deleted = self.store.delete(name)?;
        let script = if deleted.was_active {
            self.sync_active()
        } else {
            ScriptSync::Skipped
        };
        Ok((deleted, script))
    }

    pub fn set_active_profile(&self, name: &str) -> Result<(String, ScriptSync)> {
        let active = self.store.set_active(name)?;
        Ok((active, self.sync_active()))
    }

    /// Rewrite the script for the active profile; failures are errors here
    pub fn regenerate_script(&self) -> Result<String> {
        let active = self.get_config(None)?;
        self.script.write(&active.name, &active.values)?;
        Ok(active.name)
    }

    pub fn script_status(&self) -> Result<(String, ScriptStatus)> {
        let active = self.get_config(None)?;
        let status = self.script.status(&active.name, &active.values)?;
        Ok((active.name, status))
    }

    pub fn describe_schema(&self) -> Vec<FieldDescription> {
        schema::describe()
    }

    /// Every profile as a standalone TOML bundle
    pub fn export_profiles(&self) -> Result<String> {
        let doc = self.store.load()?;
        Ok(bundle::encode(&doc))
    }

    /// Create or overwrite the profiles of a bundle produced by `export_profiles`
    pub fn import_profiles(&self, text: &str) -> Result<(Imported, ScriptSync)> {
        let parsed = bundle::decode(text)?;
        let previous_active = self.store.active()?;
        let imported = self.store.import(parsed.profiles, parsed.active.as_deref())?;

        let touched_active = imported.active != previous_active
            || imported
                .created
                .iter()
                .chain(&imported.updated)
                .any(|name| *name == imported.active);
        let script = if touched_active {
            self.sync_active()
        } else {
            ScriptSync::Skipped
        };
        info!(
            created = imported.created.len(),
            updated = imported.updated.len(),
            "imported profiles"
        );
        Ok((imported, script))
    }

    fn write_script(&self, profile: &str, values: &ConfigurationValues) -> ScriptSync {
        match self.script.write(profile, values) {
            Ok(()) => ScriptSync::Regenerated,
            Err(e) => {
                warn!(profile = %profile, error = %e, "document saved but launch script was not updated");
                ScriptSync::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    fn sync_active(&self) -> ScriptSync {
        match self.get_config(None) {
            Ok(active) => self.write_script(&active.name, &active.values),
            Err(e) => {
                warn!(error = %e, "could not reload active profile for the launch script");
                ScriptSync::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Request dispatcher for UI clients; failures become `success: false`
    pub fn handle(&self, request: Request) -> Response {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                debug!(kind = e.kind(), error = %e, "request failed");
                Response::from(&e)
            }
        }
    }

    fn dispatch(&self, request: Request) -> Result<Response> {
        let response = match request {
            Request::GetConfiguration { profile } => {
                let stored = self.get_config(profile.as_deref())?;
                stored_response(stored)
            }
            Request::UpdateConfiguration { profile, values } => {
                updated_response(self.update_config_raw(profile.as_deref(), &values)?)
            }
            Request::UpdateFields { profile, values } => {
                updated_response(self.update_fields(profile.as_deref(), &values)?)
            }
            Request::UpdateField {
                profile,
                field,
                value,
            } => updated_response(self.update_field(profile.as_deref(), &field, &value)?),
            Request::ListProfiles => {
                let list = self.list_profiles()?;
                Response {
                    profiles: Some(list.profiles),
                    active_profile: Some(list.active),
                    ..Response::ok()
                }
            }
            Request::CreateProfile { name, source } => {
                let created = self.create_profile(&name, source.as_deref())?;
                Response {
                    message: Some(format!("created profile '{created}'")),
                    profile: Some(created),
                    ..Response::ok()
                }
            }
            Request::RenameProfile { name, new_name } => {
                let (renamed, script) = self.rename_profile(&name, &new_name)?;
                Response {
                    message: Some(format!("renamed '{}' to '{}'", renamed.from, renamed.to)),
                    profile: Some(renamed.to),
                    script: Some(script),
                    ..Response::ok()
                }
            }
            Request::DeleteProfile { name } => {
                let (deleted, script) = self.delete_profile(&name)?;
                Response {
                    message: Some(format!("deleted profile '{}'", deleted.name)),
                    profile: Some(deleted.name),
                    script: Some(script),
                    ..Response::ok()
                }
            }
            Request::SetActiveProfile { name } => {
                let (active, script) = self.set_active_profile(&name)?;
                Response {
                    active_profile: Some(active),
                    script: Some(script),
                    ..Response::ok()
                }
            }
            Request::RegenerateScript => {
                let active = self.regenerate_script()?;
                Response {
                    active_profile: Some(active),
                    script: Some(ScriptSync::Regenerated),
                    ..Response::ok()
                }
            }
            Request::ScriptStatus => {
                let (active, status) = self.script_status()?;
                Response {
                    active_profile: Some(active),
                    script_status: Some(status),
                    ..Response::ok()
                }
            }
            Request::DescribeSchema => Response {
                schema: Some(schema_json(&self.describe_schema())?),
                ..Response::ok()
            },
            Request::Ping => Response::ok().with_message("pong"),
            Request::Shutdown => Response::ok().with_message("shutting down"),
        };
        Ok(response)
    }
}

fn stored_response(stored: StoredProfile) -> Response {
    Response {
        values: Some(stored.values.to_json()),
        active_profile: stored.active.then(|| stored.name.clone()),
        profile: Some(stored.name),
        ..Response::ok()
    }
}

fn updated_response(updated: Updated) -> Response {
    Response {
        script: Some(updated.script),
        ..stored_response(updated.profile)
    }
}

fn schema_json(fields: &[FieldDescription]) -> Result<Value> {
    Ok(serde_json::to_value(fields)?)
}

/// Plain TOML exchange format: `active_profile` plus one table per profile.
///
/// Unlike the live document it is strict: unknown fields are errors.
mod bundle {
    use serde_json::Value;
    use toml::{Table, Value as TomlValue};

    use crate::config::codec::ProfileDocument;
    use crate::config::schema;
    use crate::config::values::{ConfigurationValues, FieldValue};
    use crate::error::{CodecError, Error, Result};

    pub(super) struct Bundle {
        pub profiles: Vec<(String, ConfigurationValues)>,
        pub active: Option<String>,
    }

    pub(super) fn encode(doc: &ProfileDocument) -> String {
        let mut profiles = Table::new();
        for profile in doc.profiles() {
            let table: Table = profile
                .values
                .iter()
                .map(|(id, value)| (id.name().to_string(), to_toml(value)))
                .collect();
            profiles.insert(profile.name.clone(), TomlValue::Table(table));
        }
        let mut root = Table::new();
        root.insert("active_profile".into(), doc.active().into());
        root.insert("profiles".into(), TomlValue::Table(profiles));
        root.to_string()
    }

    pub(super) fn decode(text: &str) -> Result<Bundle> {
        let root: Table = toml::from_str(text).map_err(|e| malformed(&e.to_string()))?;
        let active = match root.get("active_profile") {
            None => None,
            Some(TomlValue::String(name)) => Some(name.clone()),
            Some(_) => return Err(malformed("`active_profile` must be a string")),
        };
        let Some(TomlValue::Table(entries)) = root.get("profiles") else {
            return Err(malformed("bundle has no `profiles` table"));
        };

        let mut profiles = Vec::with_capacity(entries.len());
        for (name, entry) in entries {
            let TomlValue::Table(fields) = entry else {
                return Err(malformed(&format!("profile '{name}' must be a table")));
            };
            let raw = serde_json::to_value(fields)
                .map_err(|e| malformed(&e.to_string()))?;
            let Value::Object(raw) = raw else {
                return Err(malformed(&format!("profile '{name}' must be a table")));
            };
            let values = schema::defaults()
                .merge_raw(&raw)
                .map_err(|source| CodecError::InvalidField {
                    profile: name.clone(),
                    source,
                })?;
            profiles.push((name.clone(), values));
        }
        Ok(Bundle { profiles, active })
    }

    fn to_toml(value: &FieldValue) -> TomlValue {
        match value {
            FieldValue::Bool(b) => TomlValue::Boolean(*b),
            FieldValue::Int(i) => TomlValue::Integer(*i),
            FieldValue::Float(f) => TomlValue::Float(*f),
            FieldValue::Str(s) => TomlValue::String(s.clone()),
        }
    }

    fn malformed(message: &str) -> Error {
        CodecError::Malformed(message.to_string()).into()
    }
}

impl From<&ProfileDocument> for ProfileList {
    fn from(doc: &ProfileDocument) -> Self {
        Self {
            profiles: doc.names(),
            active: doc.active().to_string(),
        }
    }
}
