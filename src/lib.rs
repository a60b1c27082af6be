//! # SideQuest - quest progression engine
//!
//! SideQuest turns goals into **quests** made of ordered **sidequests**. Finishing
//! a sidequest pays XP, finishing the last one auto-completes the quest and pays
//! its bonus, and XP levels the user up on a linear `level * 100` schedule.
//! Quest breakdowns can be proposed by a chat-completion model.
//!
//! ## Features
//!
//! - **Progression Engine**: sequential sidequest gating, completion cascades,
//!   proportional bonus shrink on deletion, contiguous reindexing.
//! - **Injected Storage**: any [`store::DocumentStore`]; sled and in-memory backends included.
//! - **Plan Generation**: prompt, parse and validate AI quest plans before anything is written.
//! - **Serialized Writes**: per-user and per-quest locks so racing completions never lose XP.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sidequest::progression::ProgressionEngine;
//! use sidequest::store::SledDocumentStore;
//! use sidequest::types::{NewQuest, NewSidequest};
//!
//! fn main() -> Result<(), sidequest::SideQuestError> {
//!     let store = Arc::new(SledDocumentStore::open("data/sidequest")?);
//!     let engine = ProgressionEngine::new(store);
//!
//!     engine.create_user("alice", "Alice")?;
//!     let quest = engine.create_quest("alice", NewQuest::new("Run a 10k", "Train for it", 300))?;
//!     let step = engine.add_sidequest(&quest.id, NewSidequest::new("Buy shoes", "", 50))?;
//!     if let Some(done) = engine.complete_sidequest(&step.id)? {
//!         println!("quest completed: {}", done.quest_completed);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`progression`] - XP arithmetic, ordering rules and the engine
//! - [`store`] - document store trait and backends
//! - [`plan`] - generated plan parsing and validation
//! - [`generator`] - text-generation trait and the quest planner
//! - [`openai`] - HTTP chat-completion client (feature `ai`)
//! - [`config`] - TOML configuration
//! - [`types`] - stored records
//! - [`errors`] - error taxonomy

pub mod config;
pub mod errors;
pub mod generator;
pub mod logutil;
#[cfg(feature = "ai")]
pub mod openai;
pub mod plan;
pub mod progression;
pub mod store;
pub mod types;

pub use errors::SideQuestError;
