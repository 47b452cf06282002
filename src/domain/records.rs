use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog record for a built image, one per resolved tag.
///
/// Records are identified by their image `name` and `tag`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRecord {
    pub uuid: Uuid,
    pub name: String,
    pub tag: String,
    pub runtime_id: String,
    pub is_available: bool,
}

impl ImageRecord {
    pub fn new(name: impl Into<String>, tag: impl Into<String>, runtime_id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            tag: tag.into(),
            runtime_id: runtime_id.into(),
            is_available: true,
        }
    }
}

/// Catalog record for a created service container.
///
/// Records are identified by their container `name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerRecord {
    pub uuid: Uuid,
    pub name: String,
    pub runtime_id: String,
    pub is_available: bool,
}

impl ContainerRecord {
    pub fn new(name: impl Into<String>, runtime_id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            runtime_id: runtime_id.into(),
            is_available: true,
        }
    }
}
