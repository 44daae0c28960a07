//! Configuration model and persistence
//!
//! - **schema** / **values**: the typed field registry and value sets
//! - **codec**: TOML document mapping that keeps comments and unknown keys
//! - **store**: named profiles and the active marker on disk
//! - **paths**: where the document, script and socket live

pub mod codec;
pub mod paths;
pub mod schema;
pub mod store;
pub mod values;

pub use codec::{Profile, ProfileDocument};
pub use paths::{Overrides, Paths};
pub use schema::{Field, FieldId, FieldKind};
pub use store::{ProfileStore, normalize_name};
pub use values::{ConfigurationValues, FieldValue};
