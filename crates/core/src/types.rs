/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Intent and run identifiers are producer-assigned UUIDs.
pub type IntentId = uuid::Uuid;
