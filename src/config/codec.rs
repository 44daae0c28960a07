//! Profile document codec
//!
//! Maps between the on-disk TOML document and typed profiles:
//!
//! ```toml
//! version = 1
//! active_profile = "decky-lsfg-vk"
//!
//! [profiles.decky-lsfg-vk]
//! enable = true
//! multiplier = 2
//! ```
//!
//! The parsed `toml_edit` document is kept alongside the typed view, so
//! encoding only rewrites values that changed. Comments, formatting and
//! keys this schema does not know survive every round-trip.

use serde_json::{Map, Number, Value as Json};
use toml_edit::{DocumentMut, Item, Table, TomlError, Value, value};
use tracing::{debug, warn};

use super::schema::{self, Field};
use super::values::{ConfigurationValues, FieldValue};
use crate::constants::config::DOCUMENT_VERSION;
use crate::constants::profile::DEFAULT_PROFILE;
use crate::error::{CodecError, ProfileError};

const VERSION_KEY: &str = "version";
const ACTIVE_KEY: &str = "active_profile";
const PROFILES_KEY: &str = "profiles";

/// A named set of values as stored in the document
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub values: ConfigurationValues,
}

impl Profile {
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_PROFILE
    }
}

/// Typed view of the document plus the parsed text it came from
#[derive(Debug, Clone)]
pub struct ProfileDocument {
    raw: DocumentMut,
    profiles: Vec<Profile>,
    active: String,
}

impl Default for ProfileDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileDocument {
    /// Document holding only the default profile, which is also active
    pub fn new() -> Self {
        Self {
            raw: DocumentMut::new(),
            profiles: vec![Profile {
                name: DEFAULT_PROFILE.to_string(),
                values: schema::defaults(),
            }],
            active: DEFAULT_PROFILE.to_string(),
        }
    }

    /// Build a fresh document from name/value pairs.
    ///
    /// The default profile is added if absent; `active` must name one of the
    /// resulting profiles.
    pub fn from_profiles(
        profiles: impl IntoIterator<Item = (String, ConfigurationValues)>,
        active: &str,
    ) -> Result<Self, ProfileError> {
        let mut doc = Self::new();
        for (name, values) in profiles {
            match doc.position(&name) {
                Some(idx) if doc.profiles[idx].is_default() => doc.profiles[idx].values = values,
                Some(_) => return Err(ProfileError::AlreadyExists(name)),
                None => doc.insert(name, values),
            }
        }
        let active = doc
            .get(active)
            .map(|p| p.name.clone())
            .ok_or_else(|| ProfileError::NotFound(active.to_string()))?;
        doc.active = active;
        Ok(doc)
    }

    /// Profiles in display order, default first
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.iter().map(|p| p.name.clone()).collect()
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.position(name).map(|idx| &self.profiles[idx])
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Profile> {
        self.position(name).map(|idx| &mut self.profiles[idx])
    }

    fn position(&self, name: &str) -> Option<usize> {
        let wanted = name.to_lowercase();
        self.profiles
            .iter()
            .position(|p| p.name.to_lowercase() == wanted)
    }

    pub(crate) fn insert(&mut self, name: String, values: ConfigurationValues) {
        self.profiles.push(Profile { name, values });
    }

    /// Drop a profile together with its table (and any hand-written keys in it)
    pub(crate) fn remove(&mut self, name: &str) -> Option<Profile> {
        let idx = self.position(name)?;
        let profile = self.profiles.remove(idx);
        if let Some(tables) = self.raw.get_mut(PROFILES_KEY).and_then(Item::as_table_mut) {
            tables.remove(&profile.name);
        }
        Some(profile)
    }

    /// Rename in place; unknown keys and comments move with the table
    pub(crate) fn rename(&mut self, old: &str, new: String) -> bool {
        let Some(idx) = self.position(old) else {
            return false;
        };
        let previous = std::mem::replace(&mut self.profiles[idx].name, new.clone());
        if let Some(tables) = self.raw.get_mut(PROFILES_KEY).and_then(Item::as_table_mut)
            && let Some(table) = tables.remove(&previous)
        {
            tables.insert(&new, table);
        }
        if self.active == previous {
            self.active = new;
        }
        true
    }

    pub(crate) fn set_active(&mut self, name: String) {
        self.active = name;
    }
}

/// Parse document text.
///
/// Missing fields take their defaults and a missing default profile is
/// added; anything structurally wrong is rejected rather than repaired.
pub fn decode(text: &str) -> Result<ProfileDocument, CodecError> {
    let mut raw: DocumentMut = text
        .parse()
        .map_err(|e: TomlError| CodecError::Malformed(e.to_string()))?;

    if let Some(item) = raw.get(VERSION_KEY)
        && item.as_integer().is_none()
    {
        return Err(CodecError::Malformed(format!("`{VERSION_KEY}` must be an integer")));
    }

    let requested_active = match raw.get(ACTIVE_KEY) {
        None => None,
        Some(item) => Some(
            item.as_str()
                .ok_or_else(|| CodecError::Malformed(format!("`{ACTIVE_KEY}` must be a string")))?
                .to_string(),
        ),
    };

    let mut profiles: Vec<Profile> = Vec::new();
    if let Some(item) = raw.get_mut(PROFILES_KEY) {
        into_table(item, "`profiles`")?;
        if let Some(tables) = item.as_table_mut() {
            for (key, entry) in tables.iter_mut() {
                let name = key.get().to_string();
                into_table(entry, &format!("profile '{name}'"))?;
                if name.trim().is_empty() {
                    return Err(CodecError::Malformed("empty profile name".to_string()));
                }
                let lowered = name.to_lowercase();
                if profiles.iter().any(|p| p.name.to_lowercase() == lowered) {
                    return Err(CodecError::Malformed(format!(
                        "profile '{name}' is declared twice (names are case-insensitive)"
                    )));
                }
                let values = match entry.as_table() {
                    Some(table) => decode_values(&name, table)?,
                    None => schema::defaults(),
                };
                profiles.push(Profile { name, values });
            }
        }
    }

    match profiles.iter().position(Profile::is_default) {
        Some(0) => {}
        Some(idx) => {
            let default = profiles.remove(idx);
            profiles.insert(0, default);
        }
        None => {
            debug!("default profile missing from document, using defaults");
            profiles.insert(
                0,
                Profile {
                    name: DEFAULT_PROFILE.to_string(),
                    values: schema::defaults(),
                },
            );
        }
    }

    let active = match requested_active {
        None => DEFAULT_PROFILE.to_string(),
        Some(requested) => {
            let lowered = requested.to_lowercase();
            match profiles.iter().find(|p| p.name.to_lowercase() == lowered) {
                Some(profile) => profile.name.clone(),
                None => {
                    warn!(active = %requested, "active profile not found in document, falling back to default");
                    DEFAULT_PROFILE.to_string()
                }
            }
        }
    };

    Ok(ProfileDocument {
        raw,
        profiles,
        active,
    })
}

/// Render the document.
///
/// Fields of new profiles are written in schema order; existing values are
/// only replaced when they differ, keeping their comments.
pub fn encode(doc: &ProfileDocument) -> String {
    let mut raw = doc.raw.clone();
    let root = raw.as_table_mut();

    if !root.contains_key(VERSION_KEY) {
        root.insert(VERSION_KEY, value(DOCUMENT_VERSION));
    }
    set_value(root, ACTIVE_KEY, Value::from(doc.active.as_str()), |existing| {
        existing.as_str() == Some(doc.active.as_str())
    });

    let slot = root.entry(PROFILES_KEY).or_insert(Item::None);
    let mut tables = match std::mem::take(slot) {
        Item::Table(table) => table,
        _ => {
            let mut table = Table::new();
            table.set_implicit(true);
            table
        }
    };

    for profile in &doc.profiles {
        let slot = tables.entry(&profile.name).or_insert(Item::None);
        let mut table = match std::mem::take(slot) {
            Item::Table(table) => table,
            _ => Table::new(),
        };
        for field in schema::fields() {
            let new = profile.values.get(field.id);
            set_value(&mut table, field.name(), to_toml(new), |existing| {
                raw_matches(field, existing, new)
            });
        }
        *slot = Item::Table(table);
    }
    *slot = Item::Table(tables);

    raw.to_string()
}

/// Convenience wrapper: encode a fresh document from name/value pairs
pub fn encode_profiles(
    profiles: impl IntoIterator<Item = (String, ConfigurationValues)>,
    active: &str,
) -> Result<String, ProfileError> {
    ProfileDocument::from_profiles(profiles, active).map(|doc| encode(&doc))
}

fn decode_values(profile: &str, table: &Table) -> Result<ConfigurationValues, CodecError> {
    let mut values = schema::defaults();
    for field in schema::fields() {
        let Some(item) = table.get(field.name()) else {
            continue;
        };
        let raw = match item.as_value() {
            Some(value) => to_json(value),
            None => Json::Object(Map::new()),
        };
        let invalid = |source| CodecError::InvalidField {
            profile: profile.to_string(),
            source,
        };
        let typed = schema::coerce_field(field, &raw).map_err(invalid)?;
        values.set(field.id, typed).map_err(invalid)?;
    }
    Ok(values)
}

/// Turn inline tables into standard ones so entries can be edited in place
fn into_table(item: &mut Item, what: &str) -> Result<(), CodecError> {
    if item.is_table() {
        return Ok(());
    }
    match std::mem::take(item).into_table() {
        Ok(table) => {
            *item = Item::Table(table);
            Ok(())
        }
        Err(original) => {
            *item = original;
            Err(CodecError::Malformed(format!("{what} must be a table")))
        }
    }
}

/// Write `new` under `key` unless the current value already matches,
/// keeping the surrounding whitespace and comments of an existing entry
fn set_value(table: &mut Table, key: &str, new: Value, matches: impl Fn(&Value) -> bool) {
    match table.get_mut(key).and_then(Item::as_value_mut) {
        Some(existing) if matches(existing) => {}
        Some(existing) => {
            let decor = existing.decor().clone();
            *existing = new;
            *existing.decor_mut() = decor;
        }
        None => {
            table.insert(key, Item::Value(new));
        }
    }
}

fn raw_matches(field: &Field, existing: &Value, new: &FieldValue) -> bool {
    schema::coerce_field(field, &to_json(existing)).is_ok_and(|current| &current == new)
}

fn to_toml(value: &FieldValue) -> Value {
    match value {
        FieldValue::Bool(b) => Value::from(*b),
        FieldValue::Int(i) => Value::from(*i),
        FieldValue::Float(f) => Value::from(*f),
        FieldValue::Str(s) => Value::from(s.as_str()),
    }
}

fn to_json(value: &Value) -> Json {
    match value {
        Value::String(s) => Json::String(s.value().clone()),
        Value::Integer(i) => Json::from(*i.value()),
        Value::Float(f) => Number::from_f64(*f.value())
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Boolean(b) => Json::Bool(*b.value()),
        Value::Datetime(_) => Json::Null,
        Value::Array(_) => Json::Array(Vec::new()),
        Value::InlineTable(_) => Json::Object(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::FieldId;

    fn tweaked() -> ConfigurationValues {
        let mut values = schema::defaults();
        values.set(FieldId::Multiplier, FieldValue::Int(3)).unwrap();
        values.set(FieldId::FlowScale, FieldValue::Float(0.55)).unwrap();
        values.set(FieldId::HdrMode, FieldValue::Bool(true)).unwrap();
        values
            .set(FieldId::Dll, FieldValue::Str("/games/Lossless Scaling/Lossless.dll".into()))
            .unwrap();
        values
    }

    #[test]
    fn empty_text_decodes_to_default_document() {
        let doc = decode("").unwrap();
        assert_eq!(doc.names(), vec![DEFAULT_PROFILE.to_string()]);
        assert_eq!(doc.active(), DEFAULT_PROFILE);
        assert_eq!(doc.profiles()[0].values, schema::defaults());
    }

    #[test]
    fn roundtrip_preserves_values_and_active() {
        let text = encode_profiles([("fast".to_string(), tweaked())], "fast").unwrap();
        let doc = decode(&text).unwrap();

        assert_eq!(doc.active(), "fast");
        assert_eq!(doc.get("fast").unwrap().values, tweaked());
        assert_eq!(doc.get(DEFAULT_PROFILE).unwrap().values, schema::defaults());
    }

    #[test]
    fn encode_is_deterministic_and_schema_ordered() {
        let first = encode_profiles([("fast".to_string(), tweaked())], "fast").unwrap();
        let second = encode_profiles([("fast".to_string(), tweaked())], "fast").unwrap();
        assert_eq!(first, second);

        let enable = first.find("enable =").unwrap();
        let multiplier = first.find("multiplier =").unwrap();
        let no_fp16 = first.find("no_fp16 =").unwrap();
        assert!(enable < multiplier && multiplier < no_fp16);
        assert!(first.starts_with("version = 1"));
        assert!(!first.contains("[profiles]\n"));
    }

    #[test]
    fn missing_fields_filled_from_defaults() {
        let doc = decode(
            r#"
active_profile = "quiet"

[profiles.quiet]
multiplier = 4
"#,
        )
        .unwrap();

        let quiet = doc.get("quiet").unwrap();
        assert_eq!(quiet.values.get(FieldId::Multiplier), &FieldValue::Int(4));
        assert_eq!(quiet.values.get(FieldId::FlowScale), &FieldValue::Float(0.8));
        assert_eq!(doc.profiles()[0].name, DEFAULT_PROFILE);
    }

    #[test]
    fn unknown_keys_and_comments_survive_edit() {
        let text = r#"# my lsfg setup
version = 1
active_profile = "decky-lsfg-vk"
future_option = "keep me"

[profiles.decky-lsfg-vk]
# two frames is enough for the deck
multiplier = 2 # tuned
frame_pacing = "smooth"

[plugin]
last_seen = 42
"#;
        let mut doc = decode(text).unwrap();
        doc.get_mut(DEFAULT_PROFILE)
            .unwrap()
            .values
            .set(FieldId::HdrMode, FieldValue::Bool(true))
            .unwrap();
        let out = encode(&doc);

        assert!(out.contains("# my lsfg setup"));
        assert!(out.contains("# two frames is enough for the deck"));
        assert!(out.contains("multiplier = 2 # tuned"));
        assert!(out.contains("frame_pacing = \"smooth\""));
        assert!(out.contains("future_option = \"keep me\""));
        assert!(out.contains("[plugin]\nlast_seen = 42"));
        assert!(out.contains("hdr_mode = true"));

        let again = decode(&out).unwrap();
        assert_eq!(
            again.get(DEFAULT_PROFILE).unwrap().values.get(FieldId::HdrMode),
            &FieldValue::Bool(true)
        );
    }

    #[test]
    fn unchanged_document_encodes_stably() {
        let first = encode(&ProfileDocument::new());
        let second = encode(&decode(&first).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn integer_flow_scale_is_left_alone_when_equal() {
        let text = "[profiles.decky-lsfg-vk]\nflow_scale = 1\n";
        let doc = decode(text).unwrap();
        assert_eq!(
            doc.profiles()[0].values.get(FieldId::FlowScale),
            &FieldValue::Float(1.0)
        );
        assert!(encode(&doc).contains("flow_scale = 1\n"));
    }

    #[test]
    fn inline_tables_are_accepted() {
        let doc = decode(r#"profiles = { handheld = { multiplier = 3 } }"#).unwrap();
        let handheld = doc.get("handheld").unwrap();
        assert_eq!(handheld.values.get(FieldId::Multiplier), &FieldValue::Int(3));
        assert!(decode(&encode(&doc)).is_ok());
    }

    #[test]
    fn malformed_structure_rejected() {
        for text in [
            "this is = = not toml",
            "profiles = 3",
            "[profiles]\nbroken = 1",
            "active_profile = 7",
            "version = \"one\"",
            "[profiles.Fast]\n[profiles.fast]\n",
        ] {
            assert!(
                matches!(decode(text), Err(CodecError::Malformed(_))),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn invalid_recognized_value_is_not_reset() {
        let err = decode("[profiles.decky-lsfg-vk]\nmultiplier = \"lots\"\n").unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { ref profile, .. } if profile == DEFAULT_PROFILE));

        let err = decode("[profiles.decky-lsfg-vk]\nmultiplier = 12\n").unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { .. }));
    }

    #[test]
    fn dangling_active_falls_back_to_default() {
        let doc = decode("active_profile = \"gone\"\n").unwrap();
        assert_eq!(doc.active(), DEFAULT_PROFILE);
    }

    #[test]
    fn active_lookup_is_case_insensitive() {
        let doc = decode("active_profile = \"FAST\"\n[profiles.Fast]\n").unwrap();
        assert_eq!(doc.active(), "Fast");
    }

    #[test]
    fn rename_carries_unknown_keys() {
        let mut doc = decode("[profiles.old]\nmultiplier = 3\ncustom = \"yes\"\n").unwrap();
        assert!(doc.rename("old", "new".to_string()));
        let out = encode(&doc);
        assert!(!out.contains("[profiles.old]"));
        assert!(out.contains("[profiles.new]"));
        assert!(out.contains("custom = \"yes\""));
    }

    #[test]
    fn remove_drops_table() {
        let mut doc = decode("[profiles.old]\ncustom = 1\n").unwrap();
        assert!(doc.remove("OLD").is_some());
        let out = encode(&doc);
        assert!(!out.contains("old"));
        assert!(!out.contains("custom"));
    }

    #[test]
    fn from_profiles_rejects_unknown_active() {
        let err = ProfileDocument::from_profiles(Vec::new(), "nope").unwrap_err();
        assert_eq!(err, ProfileError::NotFound("nope".into()));
    }
}
