use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::RoleWrite;

/// Result of an insert, in the document-store shape the web client reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
    pub acknowledged: bool,
    pub inserted_id: Uuid,
}

impl InsertOutcome {
    pub fn new(inserted_id: Uuid) -> Self {
        Self {
            acknowledged: true,
            inserted_id,
        }
    }
}

/// Result of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
}

impl UpdateOutcome {
    pub fn modified() -> Self {
        Self {
            acknowledged: true,
            matched_count: 1,
            modified_count: 1,
            upserted_count: 0,
        }
    }

    pub fn unchanged() -> Self {
        Self {
            acknowledged: true,
            matched_count: 1,
            modified_count: 0,
            upserted_count: 0,
        }
    }

    pub fn upserted() -> Self {
        Self {
            acknowledged: true,
            matched_count: 0,
            modified_count: 0,
            upserted_count: 1,
        }
    }
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub acknowledged: bool,
    pub deleted_count: u64,
    /// Bookings removed along with the session.
    pub bookings_removed: u64,
}

impl From<RoleWrite> for UpdateOutcome {
    fn from(write: RoleWrite) -> Self {
        match write {
            RoleWrite::Inserted => UpdateOutcome::upserted(),
            RoleWrite::Changed => UpdateOutcome::modified(),
            RoleWrite::Unchanged => UpdateOutcome::unchanged(),
        }
    }
}
