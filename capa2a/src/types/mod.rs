//! Wire types and data models.
//!
//! Field names and enum strings are the serialization contract with clients:
//! camelCase fields, kebab-case task states and tool statuses.

mod agent;
mod message;
mod params;
mod part;
mod task;
mod tool;

pub use agent::*;
pub use message::*;
pub use params::*;
pub use part::*;
pub use task::*;
pub use tool::*;

/// Opaque key-value metadata.
pub type Metadata = std::collections::HashMap<String, serde_json::Value>;
