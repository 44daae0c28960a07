//! Schema registry
//!
//! Static, ordered declaration of every configuration field: its type,
//! default, constraint and how (or whether) it reaches the launch script.
//! Field order drives both the document layout and the script layout, so
//! new fields are appended, never inserted.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};

use super::values::{ConfigurationValues, FieldValue};
use crate::error::SchemaError;

/// Closed set of field identifiers, declared in schema order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldId {
    Enable,
    Dll,
    Multiplier,
    FlowScale,
    PerformanceMode,
    HdrMode,
    ExperimentalPresentMode,
    DxvkFrameRate,
    EnableWow64,
    DisableSteamdeckMode,
    MangohudWorkaround,
    DisableVkbasalt,
    NoFp16,
}

impl FieldId {
    pub const ALL: [FieldId; 13] = [
        FieldId::Enable,
        FieldId::Dll,
        FieldId::Multiplier,
        FieldId::FlowScale,
        FieldId::PerformanceMode,
        FieldId::HdrMode,
        FieldId::ExperimentalPresentMode,
        FieldId::DxvkFrameRate,
        FieldId::EnableWow64,
        FieldId::DisableSteamdeckMode,
        FieldId::MangohudWorkaround,
        FieldId::DisableVkbasalt,
        FieldId::NoFp16,
    ];

    /// Persisted key; stable across schema versions
    pub const fn name(self) -> &'static str {
        match self {
            FieldId::Enable => "enable",
            FieldId::Dll => "dll",
            FieldId::Multiplier => "multiplier",
            FieldId::FlowScale => "flow_scale",
            FieldId::PerformanceMode => "performance_mode",
            FieldId::HdrMode => "hdr_mode",
            FieldId::ExperimentalPresentMode => "experimental_present_mode",
            FieldId::DxvkFrameRate => "dxvk_frame_rate",
            FieldId::EnableWow64 => "enable_wow64",
            FieldId::DisableSteamdeckMode => "disable_steamdeck_mode",
            FieldId::MangohudWorkaround => "mangohud_workaround",
            FieldId::DisableVkbasalt => "disable_vkbasalt",
            FieldId::NoFp16 => "no_fp16",
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    pub fn field(self) -> &'static Field {
        &FIELDS[self.index()]
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldId {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldId::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| SchemaError::UnknownField(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    String,
}

impl FieldKind {
    pub const fn name(self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::String => "string",
        }
    }
}

/// Compile-time default; turned into a [`FieldValue`] on demand
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'static str),
}

impl DefaultValue {
    pub fn to_value(self) -> FieldValue {
        match self {
            DefaultValue::Bool(b) => FieldValue::Bool(b),
            DefaultValue::Int(i) => FieldValue::Int(i),
            DefaultValue::Float(f) => FieldValue::Float(f),
            DefaultValue::Str(s) => FieldValue::Str(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    None,
    IntRange { min: i64, max: i64 },
    FloatRange { min: f64, max: f64 },
    OneOf { values: &'static [&'static str] },
}

/// How a field reaches the launch script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Export {
    /// Stored in the document only
    ConfigOnly,
    /// `export VAR=value` while the bool is true, commented out otherwise
    Flag { var: &'static str, value: &'static str },
    /// Always exported with the field's value
    Always { var: &'static str },
    /// Exported only for non-empty strings
    NonEmpty { var: &'static str },
    /// Exported only for integers above zero
    Positive { var: &'static str },
}

impl Export {
    pub fn var(self) -> Option<&'static str> {
        match self {
            Export::ConfigOnly => None,
            Export::Flag { var, .. }
            | Export::Always { var }
            | Export::NonEmpty { var }
            | Export::Positive { var } => Some(var),
        }
    }
}

#[derive(Debug)]
pub struct Field {
    pub id: FieldId,
    pub kind: FieldKind,
    pub default: DefaultValue,
    pub constraint: Constraint,
    pub export: Export,
    pub description: &'static str,
}

impl Field {
    pub fn name(&self) -> &'static str {
        self.id.name()
    }
}

pub const PRESENT_MODES: &[&str] = &["", "fifo", "vsync", "mailbox", "immediate"];

static FIELDS: [Field; 13] = [
    Field {
        id: FieldId::Enable,
        kind: FieldKind::Bool,
        default: DefaultValue::Bool(true),
        constraint: Constraint::None,
        export: Export::Flag { var: "ENABLE_LSFG", value: "1" },
        description: "enable/disable lsfg on every game",
    },
    Field {
        id: FieldId::Dll,
        kind: FieldKind::String,
        default: DefaultValue::Str(""),
        constraint: Constraint::None,
        export: Export::ConfigOnly,
        description: "specify where Lossless.dll is stored",
    },
    Field {
        id: FieldId::Multiplier,
        kind: FieldKind::Int,
        default: DefaultValue::Int(2),
        constraint: Constraint::IntRange { min: 1, max: 4 },
        export: Export::Always { var: "LSFG_MULTIPLIER" },
        description: "change the fps multiplier",
    },
    Field {
        id: FieldId::FlowScale,
        kind: FieldKind::Float,
        default: DefaultValue::Float(0.8),
        constraint: Constraint::FloatRange { min: 0.25, max: 1.0 },
        export: Export::Always { var: "LSFG_FLOW_SCALE" },
        description: "change the flow scale",
    },
    Field {
        id: FieldId::PerformanceMode,
        kind: FieldKind::Bool,
        default: DefaultValue::Bool(true),
        constraint: Constraint::None,
        export: Export::Flag { var: "LSFG_PERF_MODE", value: "1" },
        description: "use a lighter model for FG (recommended for most games)",
    },
    Field {
        id: FieldId::HdrMode,
        kind: FieldKind::Bool,
        default: DefaultValue::Bool(false),
        constraint: Constraint::None,
        export: Export::Flag { var: "LSFG_HDR", value: "1" },
        description: "enable HDR mode (only for games that support HDR)",
    },
    Field {
        id: FieldId::ExperimentalPresentMode,
        kind: FieldKind::String,
        default: DefaultValue::Str("fifo"),
        constraint: Constraint::OneOf { values: PRESENT_MODES },
        export: Export::NonEmpty { var: "MESA_VK_WSI_PRESENT_MODE" },
        description: "override Vulkan present mode (may cause crashes)",
    },
    Field {
        id: FieldId::DxvkFrameRate,
        kind: FieldKind::Int,
        default: DefaultValue::Int(0),
        constraint: Constraint::IntRange { min: 0, max: 1000 },
        export: Export::Positive { var: "DXVK_FRAME_RATE" },
        description: "base framerate cap for DirectX games before frame multiplier (0 = disabled)",
    },
    Field {
        id: FieldId::EnableWow64,
        kind: FieldKind::Bool,
        default: DefaultValue::Bool(false),
        constraint: Constraint::None,
        export: Export::Flag { var: "PROTON_USE_WOW64", value: "1" },
        description: "enable PROTON_USE_WOW64=1 for 32-bit games (use with ProtonGE to fix crashing)",
    },
    Field {
        id: FieldId::DisableSteamdeckMode,
        kind: FieldKind::Bool,
        default: DefaultValue::Bool(false),
        constraint: Constraint::None,
        export: Export::Flag { var: "SteamDeck", value: "0" },
        description: "disable Steam Deck mode (unlocks hidden settings in some games)",
    },
    Field {
        id: FieldId::MangohudWorkaround,
        kind: FieldKind::Bool,
        default: DefaultValue::Bool(false),
        constraint: Constraint::None,
        export: Export::Flag { var: "MANGOHUD", value: "1" },
        description: "enable MangoHud workaround (fixes frame generation with the overlay)",
    },
    Field {
        id: FieldId::DisableVkbasalt,
        kind: FieldKind::Bool,
        default: DefaultValue::Bool(false),
        constraint: Constraint::None,
        export: Export::Flag { var: "DISABLE_VKBASALT", value: "1" },
        description: "disable the vkBasalt layer (can conflict with frame generation)",
    },
    Field {
        id: FieldId::NoFp16,
        kind: FieldKind::Bool,
        default: DefaultValue::Bool(false),
        constraint: Constraint::None,
        export: Export::ConfigOnly,
        description: "force-disable fp16 (use on older nvidia cards)",
    },
];

/// Ordered field list
pub fn fields() -> &'static [Field] {
    &FIELDS
}

pub fn field(name: &str) -> Result<&'static Field, SchemaError> {
    name.parse::<FieldId>().map(FieldId::field)
}

/// One value per field, each set to its default
pub fn defaults() -> ConfigurationValues {
    ConfigurationValues::from_fn(|id| id.field().default.to_value())
}

/// Convert a raw value for the named field, enforcing type and constraint.
///
/// Booleans accept `true`/`false`, `1`/`0` and their string forms. Numbers
/// are parsed but never clamped.
pub fn coerce(name: &str, raw: &Value) -> Result<FieldValue, SchemaError> {
    coerce_field(field(name)?, raw)
}

pub fn coerce_field(field: &Field, raw: &Value) -> Result<FieldValue, SchemaError> {
    let mismatch = || SchemaError::TypeMismatch {
        field: field.name().to_string(),
        expected: field.kind.name(),
        found: describe_raw(raw),
    };

    let value = match field.kind {
        FieldKind::Bool => match raw {
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(1) => FieldValue::Bool(true),
                Some(0) => FieldValue::Bool(false),
                _ => return Err(mismatch()),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => FieldValue::Bool(true),
                "0" | "false" => FieldValue::Bool(false),
                _ => return Err(mismatch()),
            },
            _ => return Err(mismatch()),
        },
        FieldKind::Int => match raw {
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => FieldValue::Int(i),
                (None, Some(f))
                    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 =>
                {
                    FieldValue::Int(f as i64)
                }
                _ => return Err(mismatch()),
            },
            Value::String(s) => FieldValue::Int(s.trim().parse().map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        FieldKind::Float => {
            let f = match raw {
                Value::Number(n) => n.as_f64().ok_or_else(mismatch)?,
                Value::String(s) => s.trim().parse::<f64>().map_err(|_| mismatch())?,
                _ => return Err(mismatch()),
            };
            if !f.is_finite() {
                return Err(mismatch());
            }
            FieldValue::Float(f)
        }
        FieldKind::String => match raw {
            Value::String(s) => FieldValue::Str(s.clone()),
            _ => return Err(mismatch()),
        },
    };

    check(field, &value)?;
    Ok(value)
}

/// Check an already-typed value against its field's type and constraint
pub fn check(field: &Field, value: &FieldValue) -> Result<(), SchemaError> {
    if value.kind() != field.kind {
        return Err(SchemaError::TypeMismatch {
            field: field.name().to_string(),
            expected: field.kind.name(),
            found: value.kind().name().to_string(),
        });
    }

    let violation = |reason: String| SchemaError::ConstraintViolation {
        field: field.name().to_string(),
        value: value.to_string(),
        reason,
    };

    match (field.constraint, value) {
        (Constraint::IntRange { min, max }, FieldValue::Int(i)) if !(min..=max).contains(i) => {
            Err(violation(format!("must be between {min} and {max}")))
        }
        (Constraint::FloatRange { min, max }, FieldValue::Float(f)) => {
            if !f.is_finite() {
                Err(violation("must be a finite number".to_string()))
            } else if !(min..=max).contains(f) {
                Err(violation(format!("must be between {min} and {max}")))
            } else {
                Ok(())
            }
        }
        (Constraint::OneOf { values }, FieldValue::Str(s)) if !values.contains(&s.as_str()) => {
            Err(violation(format!("must be one of {values:?}")))
        }
        _ => Ok(()),
    }
}

/// Re-check every entry of a full value set
pub fn validate(values: &ConfigurationValues) -> Result<(), SchemaError> {
    values.iter().try_for_each(|(id, value)| check(id.field(), value))
}

/// Build a full value set from a raw name → value map.
///
/// Every schema field must be present and no unknown names are allowed.
pub fn values_from_raw(raw: &Map<String, Value>) -> Result<ConfigurationValues, SchemaError> {
    if let Some(unknown) = raw.keys().find(|name| name.parse::<FieldId>().is_err()) {
        return Err(SchemaError::UnknownField(unknown.clone()));
    }

    let mut values = defaults();
    for field in fields() {
        let raw_value = raw.get(field.name()).ok_or_else(|| SchemaError::TypeMismatch {
            field: field.name().to_string(),
            expected: field.kind.name(),
            found: "missing value".to_string(),
        })?;
        values.set(field.id, coerce_field(field, raw_value)?)?;
    }
    Ok(values)
}

/// Serializable description of one field, shared with client code
#[derive(Debug, Clone, Serialize)]
pub struct FieldDescription {
    pub name: &'static str,
    pub kind: FieldKind,
    pub default: FieldValue,
    pub constraint: Constraint,
    pub export: Export,
    pub description: &'static str,
}

pub fn describe() -> Vec<FieldDescription> {
    fields()
        .iter()
        .map(|field| FieldDescription {
            name: field.name(),
            kind: field.kind,
            default: field.default.to_value(),
            constraint: field.constraint,
            export: field.export,
            description: field.description,
        })
        .collect()
}

fn describe_raw(raw: &Value) -> String {
    match raw {
        Value::Null => "null".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "table".to_string(),
        other => other.to_string(),
    }
}
