pub mod build;
pub mod event;
pub mod meta;
pub mod project;
pub mod secret;
pub mod watch;

pub use build::{BuildRequest, Revision};
pub use event::{Event, ObjectReference};
pub use meta::{ListMeta, ObjectList, ObjectMeta, Status};
pub use project::{Project, Repo};
pub use secret::Secret;
pub use watch::WatchEvent;

/// Serde adapter encoding raw bytes as standard base64 strings.
///
/// Matches how the Kubernetes API and Brigade represent `[]byte` fields.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
