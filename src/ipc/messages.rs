//! IPC message types for client ↔ service communication

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::script::ScriptStatus;

/// Requests sent by a UI or the CLI to the service
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Values of one profile (the active one when `profile` is omitted)
    GetConfiguration {
        #[serde(default)]
        profile: Option<String>,
    },

    /// Replace every field of a profile
    UpdateConfiguration {
        #[serde(default)]
        profile: Option<String>,
        values: Map<String, Value>,
    },

    /// Change some fields of a profile, leaving the rest as stored
    UpdateFields {
        #[serde(default)]
        profile: Option<String>,
        values: Map<String, Value>,
    },

    UpdateField {
        #[serde(default)]
        profile: Option<String>,
        field: String,
        value: Value,
    },

    ListProfiles,

    /// Copy `source` (the active profile by default) under a new name
    CreateProfile {
        name: String,
        #[serde(default)]
        source: Option<String>,
    },

    RenameProfile { name: String, new_name: String },

    DeleteProfile { name: String },

    SetActiveProfile { name: String },

    /// Rewrite the launch script from the stored active profile
    RegenerateScript,

    ScriptStatus,

    DescribeSchema,

    /// Health check
    Ping,

    /// Stop the server after replying
    Shutdown,
}

/// Outcome of keeping the launch script in step with a document write
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScriptSync {
    Regenerated,
    /// The change did not affect the active profile
    Skipped,
    /// The document was saved but the script could not be written
    Failed { message: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Reply to every request; payload fields are present only when relevant
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptSync>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_status: Option<ScriptStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(ErrorBody {
                kind: kind.into(),
                message: message.into(),
            }),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl From<&Error> for Response {
    fn from(err: &Error) -> Self {
        Self::failure(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_use_op_tag() {
        let req: Request = serde_json::from_value(json!({
            "op": "update_field",
            "field": "multiplier",
            "value": 3
        }))
        .unwrap();
        assert_eq!(
            req,
            Request::UpdateField {
                profile: None,
                field: "multiplier".into(),
                value: json!(3)
            }
        );

        let req: Request = serde_json::from_str(r#"{"op":"list_profiles"}"#).unwrap();
        assert_eq!(req, Request::ListProfiles);
    }

    #[test]
    fn unknown_op_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"op":"format_disk"}"#).is_err());
    }

    #[test]
    fn response_omits_empty_payload() {
        let json = serde_json::to_value(Response::ok().with_message("pong")).unwrap();
        assert_eq!(json, json!({"success": true, "message": "pong"}));

        let json = serde_json::to_value(Response::failure("NotFound", "profile 'x' not found")).unwrap();
        assert_eq!(json["error"]["kind"], "NotFound");
        assert_eq!(json["success"], false);
    }

    #[test]
    fn script_sync_serializes_with_status() {
        let json = serde_json::to_value(ScriptSync::Failed {
            message: "disk full".into(),
        })
        .unwrap();
        assert_eq!(json, json!({"status": "failed", "message": "disk full"}));
    }
}
