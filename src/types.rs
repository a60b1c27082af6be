use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const USER_SCHEMA_VERSION: u8 = 1;
pub const QUEST_SCHEMA_VERSION: u8 = 1;
pub const SIDEQUEST_SCHEMA_VERSION: u8 = 1;

/// A registered user and their level progression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Always >= 1.
    pub level: u32,
    /// Always below `level * 100` once an award settles.
    pub current_xp: u64,
    pub schema_version: u8,
}

impl UserRecord {
    /// Sign-up record: level 1 with no XP.
    pub fn new(id: &str, display_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            created_at: now,
            updated_at: now,
            level: 1,
            current_xp: 0,
            schema_version: USER_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestStatus {
    #[default]
    Active,
    Completed,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::Active => "active",
            QuestStatus::Completed => "completed",
        }
    }
}

/// A user goal made of ordered sidequests, paying a bonus on completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    /// Bonus XP awarded when the quest completes.
    pub total_quest_xp: u64,
    #[serde(default)]
    pub status: QuestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Owned sidequest ids, in creation order.
    #[serde(default)]
    pub sidequest_ids: Vec<String>,
    pub schema_version: u8,
}

impl QuestRecord {
    pub fn new(id: &str, user_id: &str, title: &str, description: &str, total_quest_xp: u64) -> Self {
        Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            total_quest_xp,
            status: QuestStatus::Active,
            created_at: Utc::now(),
            completed_at: None,
            sidequest_ids: Vec::new(),
            schema_version: QUEST_SCHEMA_VERSION,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == QuestStatus::Active
    }

    pub fn is_completed(&self) -> bool {
        self.status == QuestStatus::Completed
    }

    pub fn mark_completed(&mut self) {
        self.status = QuestStatus::Completed;
        self.completed_at = Some(Utc::now());
    }
}

/// A single, sequentially gated step of a quest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SidequestRecord {
    pub id: String,
    pub quest_id: String,
    /// Owner of the parent quest, so XP can be paid even if the quest vanished.
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub total_sidequest_xp: u64,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Position in the quest's completion sequence, contiguous from 0.
    pub order_index: u32,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl SidequestRecord {
    pub fn new(
        id: &str,
        quest_id: &str,
        user_id: &str,
        title: &str,
        description: &str,
        total_sidequest_xp: u64,
        order_index: u32,
    ) -> Self {
        Self {
            id: id.to_string(),
            quest_id: quest_id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            total_sidequest_xp,
            is_completed: false,
            completed_at: None,
            order_index,
            created_at: Utc::now(),
            schema_version: SIDEQUEST_SCHEMA_VERSION,
        }
    }

    pub fn mark_completed(&mut self) {
        self.is_completed = true;
        self.completed_at = Some(Utc::now());
    }
}

/// Input for manual quest creation. `id` is caller-supplied so related
/// records can reference it before the first write lands.
#[derive(Debug, Clone, Default)]
pub struct NewQuest {
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub total_quest_xp: u64,
}

impl NewQuest {
    pub fn new(title: &str, description: &str, total_quest_xp: u64) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            description: description.to_string(),
            total_quest_xp,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
}

/// Input for manual sidequest creation.
#[derive(Debug, Clone, Default)]
pub struct NewSidequest {
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub total_sidequest_xp: u64,
}

impl NewSidequest {
    pub fn new(title: &str, description: &str, total_sidequest_xp: u64) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            description: description.to_string(),
            total_sidequest_xp,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
}

/// Completion counts for one quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestProgress {
    pub completed: usize,
    pub total: usize,
}

impl QuestProgress {
    pub fn remaining(&self) -> usize {
        self.total - self.completed
    }

    /// Manual completion gate: at least one sidequest and none open.
    pub fn can_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

/// Snapshot of a user's level for display (the XP bar).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserProgress {
    pub level: u32,
    pub current_xp: u64,
    pub threshold: u64,
    /// `current_xp / threshold`, clamped to 1.0.
    pub fraction: f64,
}
