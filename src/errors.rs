use thiserror::Error;

/// Errors that can arise while driving quest progression or its collaborators.
#[derive(Debug, Error)]
pub enum SideQuestError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around JSON encoding and decoding errors for stored documents.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when a referenced user, quest or sidequest is not present.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Returned when decoding a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Manual completion attempted while sidequests remain open.
    #[error("quest {quest_id} still has {remaining} incomplete sidequest(s)")]
    QuestIncomplete { quest_id: String, remaining: usize },

    /// Manual completion attempted on a quest without any sidequests.
    #[error("quest {0} has no sidequests")]
    EmptyQuest(String),

    /// Completion (or mutation) attempted on something already completed.
    #[error("{entity} already completed: {id}")]
    AlreadyCompleted { entity: &'static str, id: String },

    /// A sidequest was completed before the current one of its quest.
    #[error("sidequest {sidequest_id} is not the current sidequest (expected {expected})")]
    OutOfOrder {
        sidequest_id: String,
        expected: String,
    },

    /// An XP value above what a single quest, sidequest or award may carry.
    #[error("xp value {value} exceeds the maximum of {max}")]
    XpOutOfRange { value: u64, max: u64 },

    /// Generated plan parsed as JSON but does not have the required shape.
    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    /// Text generation returned something that could not be parsed at all.
    #[error("invalid AI response: {0}")]
    InvalidAiResponse(String),

    /// A required external setting (e.g. API key) is absent.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// Transport level failure talking to the text-generation endpoint.
    #[error("http error: {0}")]
    Http(String),

    /// Internal error (poisoned locks, unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

impl SideQuestError {
    pub fn not_found(entity: &'static str, id: &str) -> Self {
        SideQuestError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for the `NotFound` family, which several callers choose to tolerate.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SideQuestError::NotFound { .. })
    }
}
