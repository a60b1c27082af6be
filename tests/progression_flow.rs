/// End-to-end progression flows: sidequest completion cascades, manual quest
/// completion, deletion with bonus shrink and reindexing. Every scenario runs
/// against both the sled and the in-memory store.
use std::sync::Arc;

use sidequest::progression::{EngineOptions, ProgressionEngine};
use sidequest::store::{DocumentStore, MemoryDocumentStore, SledDocumentStoreBuilder};
use sidequest::types::{NewQuest, NewSidequest, QuestStatus};
use sidequest::SideQuestError;
use tempfile::TempDir;

fn backends() -> Vec<(&'static str, Arc<dyn DocumentStore>, Option<TempDir>)> {
    let temp_dir = TempDir::new().unwrap();
    let sled = SledDocumentStoreBuilder::new(temp_dir.path())
        .without_flush()
        .open()
        .expect("open sled store");
    vec![
        ("sled", Arc::new(sled) as Arc<dyn DocumentStore>, Some(temp_dir)),
        ("memory", Arc::new(MemoryDocumentStore::new()) as Arc<dyn DocumentStore>, None),
    ]
}

/// User "alice" with one quest (bonus `quest_xp`) and sidequests carrying `xps`.
fn seed(engine: &ProgressionEngine, quest_xp: u64, xps: &[u64]) -> (String, Vec<String>) {
    engine.create_user("alice", "Alice").unwrap();
    let quest = engine
        .create_quest("alice", NewQuest::new("Learn Rust", "Ship a crate", quest_xp))
        .unwrap();
    let ids = xps
        .iter()
        .enumerate()
        .map(|(i, xp)| {
            engine
                .add_sidequest(&quest.id, NewSidequest::new(&format!("Step {}", i + 1), "", *xp))
                .unwrap()
                .id
        })
        .collect();
    (quest.id, ids)
}

#[test]
fn last_sidequest_completes_quest_and_pays_both_awards_once() {
    for (name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        let (quest_id, ids) = seed(&engine, 100, &[50]);

        let done = engine
            .complete_sidequest(&ids[0])
            .unwrap()
            .expect("sidequest exists");
        assert!(done.quest_completed, "{}: quest should auto-complete", name);
        assert_eq!(done.sidequest_award.unwrap().awarded, 50);
        assert_eq!(done.quest_award.unwrap().awarded, 100);

        let user = engine.get_user("alice").unwrap().unwrap();
        assert_eq!((user.level, user.current_xp), (2, 50), "{}: 150 xp from level 1", name);

        let quest = engine.get_quest(&quest_id).unwrap().unwrap();
        assert_eq!(quest.status, QuestStatus::Completed);
        assert!(quest.completed_at.is_some());

        // bonus is never paid a second time
        let err = engine.complete_quest(&quest_id).unwrap_err();
        assert!(matches!(err, SideQuestError::AlreadyCompleted { .. }), "{}: {:?}", name, err);
        let err = engine.complete_sidequest(&ids[0]).unwrap_err();
        assert!(matches!(err, SideQuestError::AlreadyCompleted { .. }));
        let user = engine.get_user("alice").unwrap().unwrap();
        assert_eq!((user.level, user.current_xp), (2, 50));
    }
}

#[test]
fn partial_progress_leaves_quest_active() {
    for (name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        let (quest_id, ids) = seed(&engine, 200, &[30, 30, 40]);

        let done = engine.complete_sidequest(&ids[0]).unwrap().unwrap();
        assert!(!done.quest_completed);
        assert!(done.quest_award.is_none());

        let progress = engine.quest_progress(&quest_id).unwrap();
        assert_eq!((progress.completed, progress.total), (1, 3), "{}", name);
        assert_eq!(engine.current_sidequest(&quest_id).unwrap().unwrap().id, ids[1]);
        assert!(!engine.can_complete_quest(&quest_id).unwrap());
    }
}

#[test]
fn manual_completion_of_unfinished_quest_changes_nothing() {
    for (name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        let (quest_id, ids) = seed(&engine, 200, &[30, 30]);
        engine.complete_sidequest(&ids[0]).unwrap();
        let before = engine.get_user("alice").unwrap().unwrap();

        match engine.complete_quest(&quest_id) {
            Err(SideQuestError::QuestIncomplete { remaining, .. }) => assert_eq!(remaining, 1, "{}", name),
            other => panic!("{}: expected QuestIncomplete, got {:?}", name, other),
        }

        let quest = engine.get_quest(&quest_id).unwrap().unwrap();
        assert_eq!(quest.status, QuestStatus::Active);
        assert_eq!(engine.get_user("alice").unwrap().unwrap(), before);
    }
}

#[test]
fn empty_quest_cannot_be_completed() {
    for (_name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        let (quest_id, _) = seed(&engine, 100, &[]);
        assert!(matches!(
            engine.complete_quest(&quest_id),
            Err(SideQuestError::EmptyQuest(_))
        ));
        assert!(!engine.can_complete_quest(&quest_id).unwrap());
    }
}

#[test]
fn manual_completion_after_soft_order_pays_bonus() {
    for (name, store, _guard) in backends() {
        let engine = ProgressionEngine::with_options(
            store,
            EngineOptions {
                harden_sidequest_order: false,
                ..EngineOptions::default()
            },
        );
        let (quest_id, ids) = seed(&engine, 100, &[10, 10]);

        // out of order is tolerated when not hardened
        engine.complete_sidequest(&ids[1]).unwrap().unwrap();
        let done = engine.complete_sidequest(&ids[0]).unwrap().unwrap();
        assert!(done.quest_completed, "{}", name);
        assert!(matches!(
            engine.complete_quest(&quest_id),
            Err(SideQuestError::AlreadyCompleted { .. })
        ));
        let user = engine.get_user("alice").unwrap().unwrap();
        assert_eq!((user.level, user.current_xp), (2, 20));
    }
}

#[test]
fn skipping_ahead_is_rejected_when_hardened() {
    for (name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        let (_quest_id, ids) = seed(&engine, 100, &[10, 10, 10]);

        match engine.complete_sidequest(&ids[2]) {
            Err(SideQuestError::OutOfOrder { expected, .. }) => assert_eq!(expected, ids[0], "{}", name),
            other => panic!("{}: expected OutOfOrder, got {:?}", name, other),
        }
        let untouched = engine.get_sidequest(&ids[2]).unwrap().unwrap();
        assert!(!untouched.is_completed);
        assert_eq!(engine.get_user("alice").unwrap().unwrap().current_xp, 0);
    }
}

#[test]
fn completing_missing_sidequest_is_a_no_op() {
    for (_name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        engine.create_user("alice", "Alice").unwrap();
        assert!(engine.complete_sidequest("nope").unwrap().is_none());
        assert_eq!(engine.get_user("alice").unwrap().unwrap().current_xp, 0);
    }
}

#[test]
fn deleting_sidequest_shrinks_bonus_and_reindexes() {
    for (name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        let (quest_id, ids) = seed(&engine, 400, &[100, 100, 200]);

        let removal = engine.delete_sidequest(&ids[2], &quest_id).unwrap();
        assert_eq!(removal.reduction, 200, "{}: 400 * 200 / 400", name);
        assert_eq!(removal.total_quest_xp, Some(200));

        let quest = engine.get_quest(&quest_id).unwrap().unwrap();
        assert_eq!(quest.total_quest_xp, 200);
        assert_eq!(quest.sidequest_ids, vec![ids[0].clone(), ids[1].clone()]);

        let removal = engine.delete_sidequest(&ids[0], &quest_id).unwrap();
        assert_eq!(removal.reduction, 100, "{}: 200 * 100 / 200", name);
        assert_eq!(removal.reindexed, 1);

        let remaining = engine.list_sidequests(&quest_id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, ids[1]);
        assert_eq!(remaining[0].order_index, 0);
    }
}

#[test]
fn deleting_zero_xp_sidequest_keeps_bonus() {
    for (name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        let (quest_id, ids) = seed(&engine, 300, &[0, 0]);

        let removal = engine.delete_sidequest(&ids[0], &quest_id).unwrap();
        assert_eq!(removal.reduction, 0, "{}", name);
        assert_eq!(engine.get_quest(&quest_id).unwrap().unwrap().total_quest_xp, 300);
    }
}

#[test]
fn deleting_sidequest_under_wrong_quest_is_not_found() {
    for (_name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        let (quest_id, ids) = seed(&engine, 100, &[10]);
        let other = engine
            .create_quest("alice", NewQuest::new("Other", "", 10))
            .unwrap();

        let err = engine.delete_sidequest(&ids[0], &other.id).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(engine.list_sidequests(&quest_id).unwrap().len(), 1);
    }
}

#[test]
fn sidequest_xp_is_paid_when_quest_is_gone() {
    for (name, store, _guard) in backends() {
        let engine = ProgressionEngine::with_options(
            store,
            EngineOptions {
                cascade_quest_delete: false,
                ..EngineOptions::default()
            },
        );
        let (quest_id, ids) = seed(&engine, 500, &[40]);
        assert_eq!(engine.delete_quest(&quest_id).unwrap(), 0);

        let done = engine.complete_sidequest(&ids[0]).unwrap().unwrap();
        assert!(!done.quest_completed, "{}", name);
        assert!(done.quest_award.is_none());
        assert_eq!(engine.get_user("alice").unwrap().unwrap().current_xp, 40);
    }
}

#[test]
fn cascading_quest_delete_removes_sidequests() {
    for (_name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        let (quest_id, ids) = seed(&engine, 100, &[10, 20]);
        assert_eq!(engine.delete_quest(&quest_id).unwrap(), 2);
        assert!(engine.get_quest(&quest_id).unwrap().is_none());
        for id in ids {
            assert!(engine.get_sidequest(&id).unwrap().is_none());
        }
    }
}

#[test]
fn quests_list_newest_first() {
    for (_name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        engine.create_user("alice", "Alice").unwrap();
        let first = engine.create_quest("alice", NewQuest::new("First", "", 0)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = engine.create_quest("alice", NewQuest::new("Second", "", 0)).unwrap();

        let ids: Vec<_> = engine
            .list_quests("alice")
            .unwrap()
            .into_iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(engine.list_quests("bob").unwrap().is_empty());
    }
}

#[test]
fn awarding_unknown_user_is_skipped() {
    for (_name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        assert!(engine.award_xp("ghost", 100).unwrap().is_none());
        assert!(engine.get_user("ghost").unwrap().is_none());
    }
}

#[test]
fn large_award_crosses_several_levels() {
    for (_name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        engine.create_user("alice", "Alice").unwrap();
        engine.award_xp("alice", 95).unwrap();
        let change = engine.award_xp("alice", 210).unwrap().unwrap();
        assert_eq!((change.previous_level, change.level, change.current_xp), (1, 3, 5));
        assert_eq!(change.levels_gained(), 2);

        let progress = engine.user_progress("alice").unwrap();
        assert_eq!(progress.threshold, 300);
        assert!((progress.fraction - 5.0 / 300.0).abs() < 1e-9);
    }
}

#[test]
fn creating_quest_for_unknown_user_fails() {
    for (_name, store, _guard) in backends() {
        let engine = ProgressionEngine::new(store);
        let err = engine
            .create_quest("ghost", NewQuest::new("Nope", "", 10))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
