//! Quest progression: XP leveling, sidequest ordering, completion cascades.
//!
//! The arithmetic in [`xp`] and [`ordering`] is pure; [`engine`] applies it to
//! records held in a [`crate::store::DocumentStore`].

pub mod engine;
pub mod locks;
pub mod ordering;
pub mod xp;

pub use engine::{
    EngineOptions, MaterializedPlan, ProgressionEngine, QuestCompletion, SidequestCompletion,
    SidequestRemoval,
};
pub use xp::{apply_xp, LevelChange, MAX_XP_VALUE, XP_PER_LEVEL};
