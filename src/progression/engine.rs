//! Quest progression over an injected [`DocumentStore`].
//!
//! Every public operation is a short read-then-write sequence against the
//! store. Writes to one quest (and its sidequests) are serialized on the
//! `quest:` key, writes to one user's level on the `user:` key, so racing
//! completions cannot lose XP or pay a quest bonus twice.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::SideQuestError;
use crate::logutil::escape_log;
use crate::plan::{validate_proposals, QuestPlan, SidequestProposal};
use crate::progression::locks::KeyedLocks;
use crate::progression::ordering;
use crate::progression::xp::{self, LevelChange};
use crate::store::{from_document, patch, to_document, Collection, Document, DocumentStore, Filter};
use crate::types::{
    NewQuest, NewSidequest, QuestProgress, QuestRecord, QuestStatus, SidequestRecord, UserProgress,
    UserRecord, QUEST_SCHEMA_VERSION, SIDEQUEST_SCHEMA_VERSION, USER_SCHEMA_VERSION,
};

/// Behavior switches for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Reject completing anything but the current sidequest of a quest.
    pub harden_sidequest_order: bool,
    /// Delete a quest's sidequests together with the quest.
    pub cascade_quest_delete: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            harden_sidequest_order: true,
            cascade_quest_delete: true,
        }
    }
}

/// Outcome of a sidequest completion that actually happened.
#[derive(Debug, Clone, PartialEq)]
pub struct SidequestCompletion {
    pub sidequest: SidequestRecord,
    /// `None` when the owning user no longer exists.
    pub sidequest_award: Option<LevelChange>,
    /// The quest was auto-completed by this call.
    pub quest_completed: bool,
    pub quest_award: Option<LevelChange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestCompletion {
    pub quest: QuestRecord,
    pub award: Option<LevelChange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SidequestRemoval {
    pub removed: SidequestRecord,
    /// XP taken off the parent quest's bonus.
    pub reduction: u64,
    /// Parent bonus after the reduction; `None` if the quest was already gone.
    pub total_quest_xp: Option<u64>,
    /// Sidequests whose `order_index` moved.
    pub reindexed: usize,
}

/// A quest and its sidequests as written from a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedPlan {
    pub quest: QuestRecord,
    pub sidequests: Vec<SidequestRecord>,
}

trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;
    const SCHEMA_VERSION: u8;
    fn schema_version(&self) -> u8;
    fn id(&self) -> &str;
}

impl Record for UserRecord {
    const COLLECTION: Collection = Collection::Users;
    const SCHEMA_VERSION: u8 = USER_SCHEMA_VERSION;
    fn schema_version(&self) -> u8 {
        self.schema_version
    }
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for QuestRecord {
    const COLLECTION: Collection = Collection::Quests;
    const SCHEMA_VERSION: u8 = QUEST_SCHEMA_VERSION;
    fn schema_version(&self) -> u8 {
        self.schema_version
    }
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for SidequestRecord {
    const COLLECTION: Collection = Collection::Sidequests;
    const SCHEMA_VERSION: u8 = SIDEQUEST_SCHEMA_VERSION;
    fn schema_version(&self) -> u8 {
        self.schema_version
    }
    fn id(&self) -> &str {
        &self.id
    }
}

/// Decode a stored document, rejecting records written under another schema.
fn decode<T: Record>(doc: Document) -> Result<T, SideQuestError> {
    let record: T = from_document(doc)?;
    if record.schema_version() != T::SCHEMA_VERSION {
        return Err(SideQuestError::SchemaMismatch {
            entity: T::COLLECTION.entity(),
            expected: T::SCHEMA_VERSION,
            found: record.schema_version(),
        });
    }
    Ok(record)
}

fn json<T: Serialize>(value: &T) -> Result<Value, SideQuestError> {
    Ok(serde_json::to_value(value)?)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct ProgressionEngine {
    store: Arc<dyn DocumentStore>,
    locks: KeyedLocks,
    options: EngineOptions,
}

impl ProgressionEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_options(store, EngineOptions::default())
    }

    pub fn with_options(store: Arc<dyn DocumentStore>, options: EngineOptions) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            options,
        }
    }

    // ---- record access -------------------------------------------------

    fn load<T: Record>(&self, id: &str) -> Result<Option<T>, SideQuestError> {
        self.store.get(T::COLLECTION, id)?.map(decode::<T>).transpose()
    }

    fn query<T: Record>(&self, filter: &Filter) -> Result<Vec<T>, SideQuestError> {
        self.store
            .query(T::COLLECTION, filter)?
            .into_iter()
            .map(decode::<T>)
            .collect()
    }

    fn require<T: Record>(&self, id: &str) -> Result<T, SideQuestError> {
        self.load(id)?
            .ok_or_else(|| SideQuestError::not_found(T::COLLECTION.entity(), id))
    }

    fn put<T: Record>(&self, record: &T) -> Result<(), SideQuestError> {
        self.store
            .create(T::COLLECTION, Some(record.id()), to_document(record)?)?;
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, SideQuestError> {
        self.load(user_id)
    }

    pub fn get_quest(&self, quest_id: &str) -> Result<Option<QuestRecord>, SideQuestError> {
        self.load(quest_id)
    }

    pub fn get_sidequest(&self, sidequest_id: &str) -> Result<Option<SidequestRecord>, SideQuestError> {
        self.load(sidequest_id)
    }

    /// A user's quests, newest first.
    pub fn list_quests(&self, user_id: &str) -> Result<Vec<QuestRecord>, SideQuestError> {
        let mut quests: Vec<QuestRecord> = self.query(&Filter::eq("userId", user_id))?;
        quests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(quests)
    }

    /// A quest's sidequests in completion order.
    pub fn list_sidequests(&self, quest_id: &str) -> Result<Vec<SidequestRecord>, SideQuestError> {
        let mut sidequests: Vec<SidequestRecord> = self.query(&Filter::eq("questId", quest_id))?;
        ordering::sort_by_order(&mut sidequests);
        Ok(sidequests)
    }

    /// The lowest-index incomplete sidequest, i.e. the only one completable now.
    pub fn current_sidequest(&self, quest_id: &str) -> Result<Option<SidequestRecord>, SideQuestError> {
        let sidequests = self.list_sidequests(quest_id)?;
        Ok(ordering::current_sidequest(&sidequests).cloned())
    }

    pub fn quest_progress(&self, quest_id: &str) -> Result<QuestProgress, SideQuestError> {
        self.require::<QuestRecord>(quest_id)?;
        Ok(ordering::progress(&self.list_sidequests(quest_id)?))
    }

    /// Whether `complete_quest` would succeed right now.
    pub fn can_complete_quest(&self, quest_id: &str) -> Result<bool, SideQuestError> {
        let quest: QuestRecord = self.require(quest_id)?;
        Ok(quest.is_active() && ordering::progress(&self.list_sidequests(quest_id)?).can_complete())
    }

    pub fn user_progress(&self, user_id: &str) -> Result<UserProgress, SideQuestError> {
        let user: UserRecord = self.require(user_id)?;
        Ok(UserProgress {
            level: user.level,
            current_xp: user.current_xp,
            threshold: xp::threshold(user.level),
            fraction: xp::progress_fraction(user.level, user.current_xp),
        })
    }

    // ---- users & XP ----------------------------------------------------

    /// Sign-up. Returns the existing record untouched if the id is taken.
    pub fn create_user(&self, user_id: &str, display_name: &str) -> Result<UserRecord, SideQuestError> {
        self.locks.with(&KeyedLocks::user_key(user_id), || {
            if let Some(existing) = self.load::<UserRecord>(user_id)? {
                debug!("user {} already exists", user_id);
                return Ok(existing);
            }
            let user = UserRecord::new(user_id, display_name);
            self.put(&user)?;
            info!("created user {} ({})", user_id, escape_log(display_name));
            Ok(user)
        })
    }

    /// Add XP to a user and level them up as far as it reaches.
    ///
    /// A missing user yields `Ok(None)` rather than an error so cascades can
    /// ignore accounts that were deleted underneath them. A zero award reads
    /// but never writes.
    pub fn award_xp(&self, user_id: &str, amount: u64) -> Result<Option<LevelChange>, SideQuestError> {
        xp::check_xp_value(amount)?;
        self.locks.with(&KeyedLocks::user_key(user_id), || {
            let Some(user) = self.load::<UserRecord>(user_id)? else {
                warn!("xp award of {} skipped: user {} not found", amount, user_id);
                return Ok(None);
            };
            let change = xp::apply_xp(user.level, user.current_xp, amount)?;
            if amount == 0 {
                return Ok(Some(change));
            }
            let mut updated = user;
            updated.level = change.level;
            updated.current_xp = change.current_xp;
            updated.touch();
            self.store.update(
                Collection::Users,
                user_id,
                patch([
                    ("level", json(&updated.level)?),
                    ("currentXp", json(&updated.current_xp)?),
                    ("updatedAt", json(&updated.updated_at)?),
                ]),
            )?;
            if change.leveled_up() {
                info!(
                    "user {} reached level {} (+{} xp)",
                    user_id, change.level, amount
                );
            } else {
                debug!("user {} +{} xp ({}/{})", user_id, amount, change.current_xp, xp::threshold(change.level));
            }
            Ok(Some(change))
        })
    }

    // ---- quests --------------------------------------------------------

    pub fn create_quest(&self, user_id: &str, new: NewQuest) -> Result<QuestRecord, SideQuestError> {
        xp::check_xp_value(new.total_quest_xp)?;
        self.require::<UserRecord>(user_id)?;
        let id = new.id.unwrap_or_else(new_id);
        let quest = QuestRecord::new(&id, user_id, &new.title, &new.description, new.total_quest_xp);
        self.locks.with(&KeyedLocks::quest_key(&id), || self.put(&quest))?;
        info!("created quest {} \"{}\"", id, escape_log(&quest.title));
        Ok(quest)
    }

    /// Manually complete a quest whose sidequests are all done.
    ///
    /// Fails with `AlreadyCompleted` on a second call so the bonus is never
    /// paid twice, `EmptyQuest` with no sidequests, and `QuestIncomplete`
    /// (carrying the open count) otherwise. Failures write nothing.
    pub fn complete_quest(&self, quest_id: &str) -> Result<QuestCompletion, SideQuestError> {
        self.locks.with(&KeyedLocks::quest_key(quest_id), || {
            let mut quest: QuestRecord = self.require(quest_id)?;
            if quest.is_completed() {
                return Err(SideQuestError::AlreadyCompleted {
                    entity: "quest",
                    id: quest_id.to_string(),
                });
            }
            let progress = ordering::progress(&self.list_sidequests(quest_id)?);
            if progress.total == 0 {
                return Err(SideQuestError::EmptyQuest(quest_id.to_string()));
            }
            if progress.remaining() > 0 {
                return Err(SideQuestError::QuestIncomplete {
                    quest_id: quest_id.to_string(),
                    remaining: progress.remaining(),
                });
            }
            let award = self.finish_quest_locked(&mut quest)?;
            Ok(QuestCompletion { quest, award })
        })
    }

    /// Flip an active quest to completed and pay its bonus. Caller holds the quest lock.
    fn finish_quest_locked(&self, quest: &mut QuestRecord) -> Result<Option<LevelChange>, SideQuestError> {
        quest.mark_completed();
        self.store.update(
            Collection::Quests,
            &quest.id,
            patch([
                ("status", json(&QuestStatus::Completed)?),
                ("completedAt", json(&quest.completed_at)?),
            ]),
        )?;
        info!(
            "quest {} \"{}\" completed, bonus {} xp",
            quest.id,
            escape_log(&quest.title),
            quest.total_quest_xp
        );
        self.award_xp(&quest.user_id, quest.total_quest_xp)
    }

    /// Remove a quest, and its sidequests when cascading is enabled.
    /// Returns the number of sidequests removed.
    pub fn delete_quest(&self, quest_id: &str) -> Result<usize, SideQuestError> {
        self.locks.with(&KeyedLocks::quest_key(quest_id), || {
            self.require::<QuestRecord>(quest_id)?;
            let mut removed = 0;
            if self.options.cascade_quest_delete {
                for sidequest in self.list_sidequests(quest_id)? {
                    self.store.delete(Collection::Sidequests, &sidequest.id)?;
                    removed += 1;
                }
            }
            self.store.delete(Collection::Quests, quest_id)?;
            info!("deleted quest {} ({} sidequests)", quest_id, removed);
            Ok(removed)
        })
    }

    // ---- sidequests ----------------------------------------------------

    /// Append a sidequest at the next free index of an active quest.
    pub fn add_sidequest(&self, quest_id: &str, new: NewSidequest) -> Result<SidequestRecord, SideQuestError> {
        xp::check_xp_value(new.total_sidequest_xp)?;
        self.locks.with(&KeyedLocks::quest_key(quest_id), || {
            let mut quest = self.require_active_quest(quest_id)?;
            let start = ordering::next_order_index(&self.list_sidequests(quest_id)?);
            let proposal = SidequestProposal {
                title: new.title,
                description: new.description,
                xp: new.total_sidequest_xp,
            };
            let mut created =
                self.insert_sidequests_locked(&mut quest, start, std::slice::from_ref(&proposal), new.id)?;
            created
                .pop()
                .ok_or_else(|| SideQuestError::Internal("sidequest insert produced nothing".to_string()))
        })
    }

    fn require_active_quest(&self, quest_id: &str) -> Result<QuestRecord, SideQuestError> {
        let quest: QuestRecord = self.require(quest_id)?;
        if quest.is_completed() {
            return Err(SideQuestError::AlreadyCompleted {
                entity: "quest",
                id: quest_id.to_string(),
            });
        }
        Ok(quest)
    }

    /// Write proposals as sidequests starting at `start`, linking each id onto
    /// the quest as it lands. `first_id` overrides the id of the first one.
    fn insert_sidequests_locked(
        &self,
        quest: &mut QuestRecord,
        start: u32,
        proposals: &[SidequestProposal],
        first_id: Option<String>,
    ) -> Result<Vec<SidequestRecord>, SideQuestError> {
        let mut first_id = first_id;
        let mut created = Vec::with_capacity(proposals.len());
        for (offset, proposal) in proposals.iter().enumerate() {
            let id = first_id.take().unwrap_or_else(new_id);
            let sidequest = SidequestRecord::new(
                &id,
                &quest.id,
                &quest.user_id,
                &proposal.title,
                &proposal.description,
                proposal.xp,
                start + offset as u32,
            );
            self.put(&sidequest)?;
            quest.sidequest_ids.push(id);
            self.store.update(
                Collection::Quests,
                &quest.id,
                patch([("sidequestIds", json(&quest.sidequest_ids)?)]),
            )?;
            debug!(
                "sidequest {} \"{}\" added to quest {} at index {}",
                sidequest.id,
                escape_log(&sidequest.title),
                quest.id,
                sidequest.order_index
            );
            created.push(sidequest);
        }
        Ok(created)
    }

    /// Complete a sidequest, pay its XP, and auto-complete the quest if it
    /// was the last open one.
    ///
    /// `Ok(None)` when the sidequest does not exist. With
    /// `harden_sidequest_order` only the current sidequest may complete.
    pub fn complete_sidequest(&self, sidequest_id: &str) -> Result<Option<SidequestCompletion>, SideQuestError> {
        let Some(peek) = self.load::<SidequestRecord>(sidequest_id)? else {
            warn!("complete skipped: sidequest {} not found", sidequest_id);
            return Ok(None);
        };
        let quest_id = peek.quest_id;
        self.locks.with(&KeyedLocks::quest_key(&quest_id), || {
            // re-read under the lock; it may have been deleted or completed meanwhile
            let Some(mut sidequest) = self.load::<SidequestRecord>(sidequest_id)? else {
                warn!("complete skipped: sidequest {} vanished", sidequest_id);
                return Ok(None);
            };
            if sidequest.is_completed {
                return Err(SideQuestError::AlreadyCompleted {
                    entity: "sidequest",
                    id: sidequest_id.to_string(),
                });
            }
            if self.options.harden_sidequest_order {
                let siblings = self.list_sidequests(&quest_id)?;
                if let Some(current) = ordering::current_sidequest(&siblings) {
                    if current.id != sidequest.id {
                        return Err(SideQuestError::OutOfOrder {
                            sidequest_id: sidequest_id.to_string(),
                            expected: current.id.clone(),
                        });
                    }
                }
            }

            sidequest.mark_completed();
            self.store.update(
                Collection::Sidequests,
                sidequest_id,
                patch([
                    ("isCompleted", Value::Bool(true)),
                    ("completedAt", json(&sidequest.completed_at)?),
                ]),
            )?;
            info!(
                "sidequest {} \"{}\" completed (+{} xp)",
                sidequest_id,
                escape_log(&sidequest.title),
                sidequest.total_sidequest_xp
            );
            let sidequest_award = self.award_xp(&sidequest.user_id, sidequest.total_sidequest_xp)?;

            let mut quest_completed = false;
            let mut quest_award = None;
            match self.load::<QuestRecord>(&quest_id)? {
                None => warn!("quest {} not found; bonus cascade skipped", quest_id),
                Some(mut quest) => {
                    let progress = ordering::progress(&self.list_sidequests(&quest_id)?);
                    if quest.is_active() && progress.can_complete() {
                        quest_award = self.finish_quest_locked(&mut quest)?;
                        quest_completed = true;
                    }
                }
            }

            Ok(Some(SidequestCompletion {
                sidequest,
                sidequest_award,
                quest_completed,
                quest_award,
            }))
        })
    }

    /// Remove a sidequest, shrink the quest bonus in proportion to the XP it
    /// carried, and close the gap in `order_index`.
    pub fn delete_sidequest(&self, sidequest_id: &str, quest_id: &str) -> Result<SidequestRemoval, SideQuestError> {
        self.locks.with(&KeyedLocks::quest_key(quest_id), || {
            let removed: SidequestRecord = self.require(sidequest_id)?;
            if removed.quest_id != quest_id {
                return Err(SideQuestError::not_found("sidequest", sidequest_id));
            }
            let siblings = self.list_sidequests(quest_id)?;
            let total_xp = siblings
                .iter()
                .try_fold(0u64, |acc, s| acc.checked_add(s.total_sidequest_xp))
                .ok_or_else(|| {
                    SideQuestError::Internal(format!("sidequest xp of quest {} overflows", quest_id))
                })?;

            self.store.delete(Collection::Sidequests, sidequest_id)?;

            let mut remaining: Vec<SidequestRecord> =
                siblings.into_iter().filter(|s| s.id != sidequest_id).collect();
            let moved = ordering::reindex(&mut remaining);
            debug_assert!(ordering::is_contiguous(&remaining));
            for sidequest in remaining.iter().filter(|s| moved.contains(&s.id)) {
                self.store.update(
                    Collection::Sidequests,
                    &sidequest.id,
                    patch([("orderIndex", json(&sidequest.order_index)?)]),
                )?;
            }

            let mut reduction = 0;
            let total_quest_xp = match self.load::<QuestRecord>(quest_id)? {
                None => {
                    warn!("quest {} not found; sidequest {} removed without xp adjustment", quest_id, sidequest_id);
                    None
                }
                Some(mut quest) => {
                    reduction = ordering::proportional_reduction(
                        quest.total_quest_xp,
                        removed.total_sidequest_xp,
                        total_xp,
                    );
                    quest.total_quest_xp = quest.total_quest_xp.saturating_sub(reduction);
                    quest.sidequest_ids.retain(|id| id != sidequest_id);
                    self.store.update(
                        Collection::Quests,
                        quest_id,
                        patch([
                            ("totalQuestXp", json(&quest.total_quest_xp)?),
                            ("sidequestIds", json(&quest.sidequest_ids)?),
                        ]),
                    )?;
                    Some(quest.total_quest_xp)
                }
            };

            info!(
                "deleted sidequest {} from quest {} (bonus -{}, {} reindexed)",
                sidequest_id,
                quest_id,
                reduction,
                moved.len()
            );
            Ok(SidequestRemoval {
                removed,
                reduction,
                total_quest_xp,
                reindexed: moved.len(),
            })
        })
    }

    // ---- plans ---------------------------------------------------------

    /// Write a validated plan as a new active quest with its sidequests at
    /// indices `0..n`. Nothing is written if the plan or user is invalid.
    pub fn create_quest_from_plan(&self, user_id: &str, plan: &QuestPlan) -> Result<MaterializedPlan, SideQuestError> {
        plan.validate()?;
        self.require::<UserRecord>(user_id)?;
        let id = new_id();
        self.locks.with(&KeyedLocks::quest_key(&id), || {
            let mut quest = QuestRecord::new(&id, user_id, &plan.title, &plan.description, plan.quest_xp);
            self.put(&quest)?;
            let sidequests = self.insert_sidequests_locked(&mut quest, 0, &plan.sidequests, None)?;
            info!(
                "materialized plan \"{}\" as quest {} with {} sidequests ({} xp + {} bonus)",
                escape_log(&plan.title),
                quest.id,
                sidequests.len(),
                plan.sidequest_xp(),
                plan.quest_xp
            );
            Ok(MaterializedPlan { quest, sidequests })
        })
    }

    /// Append generated sidequests after the quest's existing ones.
    pub fn append_generated_sidequests(
        &self,
        quest_id: &str,
        proposals: &[SidequestProposal],
    ) -> Result<Vec<SidequestRecord>, SideQuestError> {
        validate_proposals(proposals)?;
        self.locks.with(&KeyedLocks::quest_key(quest_id), || {
            let mut quest = self.require_active_quest(quest_id)?;
            let start = ordering::next_order_index(&self.list_sidequests(quest_id)?);
            self.insert_sidequests_locked(&mut quest, start, proposals, None)
        })
    }

    /// Full replace: drop every existing sidequest (completion state included),
    /// rewrite the quest's title, description and bonus from the plan, then
    /// insert the plan's sidequests from index 0.
    pub fn replace_quest_plan(&self, quest_id: &str, plan: &QuestPlan) -> Result<MaterializedPlan, SideQuestError> {
        plan.validate()?;
        self.locks.with(&KeyedLocks::quest_key(quest_id), || {
            let mut quest = self.require_active_quest(quest_id)?;
            let previous = self.list_sidequests(quest_id)?;
            for sidequest in &previous {
                self.store.delete(Collection::Sidequests, &sidequest.id)?;
            }
            quest.title = plan.title.clone();
            quest.description = plan.description.clone();
            quest.total_quest_xp = plan.quest_xp;
            quest.sidequest_ids.clear();
            self.store.update(
                Collection::Quests,
                quest_id,
                patch([
                    ("title", json(&quest.title)?),
                    ("description", json(&quest.description)?),
                    ("totalQuestXp", json(&quest.total_quest_xp)?),
                    ("sidequestIds", json(&quest.sidequest_ids)?),
                ]),
            )?;
            let sidequests = self.insert_sidequests_locked(&mut quest, 0, &plan.sidequests, None)?;
            info!(
                "replaced plan of quest {}: {} sidequests dropped, {} inserted",
                quest_id,
                previous.len(),
                sidequests.len()
            );
            Ok(MaterializedPlan { quest, sidequests })
        })
    }
}
