//! End-to-end tests for manifest construction and refresh over a real
//! namespace.

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration as StdDuration;

use ctxvault_core::{
    estimate_tokens, BackendKind, ContextUpdater, Manifest, MemoryCategory, ScoringStrategy,
    Transcript, TranscriptEntry, UpdateMode, Vault, VaultConfig, DEFAULT_STALENESS_THRESHOLD,
};
use tempfile::TempDir;

fn vault(backend: BackendKind) -> (TempDir, Vault) {
    let dir = tempfile::tempdir().unwrap();
    let config = VaultConfig {
        backend,
        ..VaultConfig::with_base_dir(dir.path())
    };
    let vault = Vault::open(&config).unwrap();
    (dir, vault)
}

fn tick() {
    sleep(StdDuration::from_millis(5));
}

// ---- Construction ----

#[test]
fn facts_fit_large_budget_and_none_fit_tiny_budget() {
    for backend in [BackendKind::Filesystem, BackendKind::Sqlite, BackendKind::Memory] {
        let (_dir, vault) = vault(backend);
        vault
            .memory()
            .store("proj", MemoryCategory::Fact, "db", "PostgreSQL")
            .unwrap();
        vault
            .memory()
            .store("proj", MemoryCategory::Fact, "lang", "Python")
            .unwrap();

        let big = vault
            .constructor()
            .construct("proj", 8000, ScoringStrategy::Recency)
            .unwrap();
        assert_eq!(big.len(), 2, "backend {backend}");
        assert_eq!(
            big.total_tokens,
            estimate_tokens("PostgreSQL") + estimate_tokens("Python")
        );
        assert_eq!(big.excluded_count, 0);

        // smaller than either entry ("Python" alone costs one token)
        let tiny = vault
            .constructor()
            .construct("proj", 0, ScoringStrategy::Recency)
            .unwrap();
        assert!(tiny.is_empty(), "backend {backend}");
        assert_eq!(tiny.excluded_count, 2);
    }
}

#[test]
fn budget_is_never_exceeded() {
    let (_dir, vault) = vault(BackendKind::Memory);
    for (i, words) in [3usize, 40, 7, 12, 90, 1, 25].into_iter().enumerate() {
        let value = vec!["word"; words].join(" ");
        vault
            .memory()
            .store("proj", MemoryCategory::Episodic, &format!("e{i}"), &value)
            .unwrap();
    }
    vault
        .history()
        .ingest_session(&Transcript::new("a short raw session"), "proj", Some("s1"))
        .unwrap();

    for budget in [0, 1, 5, 20, 50, 100, 1000] {
        for strategy in [ScoringStrategy::Recency, ScoringStrategy::Relevance] {
            let m = vault.constructor().construct("proj", budget, strategy).unwrap();
            assert!(m.total_tokens <= budget);
            assert_eq!(m.len() + m.excluded_count, 8);
            let sum: u64 = m.items.iter().map(|n| n.metadata.token_estimate).sum();
            assert_eq!(sum, m.total_tokens);
        }
    }
}

#[test]
fn recency_puts_latest_write_first() {
    let (_dir, vault) = vault(BackendKind::Memory);
    vault.memory().store("proj", MemoryCategory::User, "a", "first").unwrap();
    tick();
    vault.memory().store("proj", MemoryCategory::Fact, "b", "second").unwrap();
    tick();
    vault
        .history()
        .ingest_session(&Transcript::new("third"), "proj", Some("s"))
        .unwrap();

    let m = vault
        .constructor()
        .construct("proj", 8000, ScoringStrategy::Recency)
        .unwrap();
    assert_eq!(
        m.paths(),
        vec![
            "/context/history/proj/s",
            "/context/memory/proj/facts/b",
            "/context/memory/proj/user/a",
        ]
    );
}

/// Relevance orders by category priority and, within one priority, takes
/// the oldest entry first. A tight budget therefore keeps the older fact.
#[test]
fn relevance_favors_oldest_within_category() {
    let (_dir, vault) = vault(BackendKind::Memory);
    vault
        .history()
        .ingest_session(&Transcript::new("digest"), "proj", Some("s"))
        .unwrap();
    vault.memory().store("proj", MemoryCategory::User, "theme", "dark").unwrap();
    vault.memory().store("proj", MemoryCategory::Fact, "older", "old fact").unwrap();
    tick();
    vault.memory().store("proj", MemoryCategory::Fact, "newer", "new fact").unwrap();
    vault
        .memory()
        .store("proj", MemoryCategory::Experiential, "lesson", "learned")
        .unwrap();

    let m = vault
        .constructor()
        .construct("proj", 8000, ScoringStrategy::Relevance)
        .unwrap();
    assert_eq!(
        m.paths(),
        vec![
            "/context/memory/proj/facts/older",
            "/context/memory/proj/facts/newer",
            "/context/memory/proj/experiential/lesson",
            "/context/memory/proj/user/theme",
            "/context/history/proj/s",
        ]
    );

    let tight = vault
        .constructor()
        .construct("proj", 2, ScoringStrategy::Relevance)
        .unwrap();
    assert_eq!(tight.paths(), vec!["/context/memory/proj/facts/older"]);
    assert_eq!(tight.excluded_count, 4);
}

#[test]
fn unknown_project_yields_empty_manifest() {
    let (_dir, vault) = vault(BackendKind::Filesystem);
    let m = vault
        .constructor()
        .construct("ghost", 8000, ScoringStrategy::Recency)
        .unwrap();
    assert_eq!(m, Manifest::default());
}

#[test]
fn dot_tmp_names_behave_alike_on_every_backend() {
    for backend in [BackendKind::Filesystem, BackendKind::Sqlite, BackendKind::Memory] {
        let (_dir, vault) = vault(backend);
        vault
            .memory()
            .store("proj", MemoryCategory::Fact, ".tmpcfg", "strict mode")
            .unwrap();
        vault.scratchpad().create("t1", ".tmpnote", "draft").unwrap();

        let facts = vault.memory().recall_all("proj", MemoryCategory::Fact).unwrap();
        assert_eq!(facts.len(), 1, "backend {backend}");
        let m = vault
            .constructor()
            .construct("proj", 8000, ScoringStrategy::Recency)
            .unwrap();
        assert_eq!(m.paths(), vec!["/context/memory/proj/facts/.tmpcfg"], "backend {backend}");

        let later = chrono::Utc::now() + chrono::Duration::hours(2);
        assert_eq!(vault.scratchpad().gc_at(later).unwrap(), 1, "backend {backend}");
    }
}

// ---- Updates ----

fn updater(vault: &Vault) -> &ContextUpdater {
    vault.updater()
}

#[test]
fn incremental_is_stable_without_writes() {
    let (_dir, vault) = vault(BackendKind::Filesystem);
    vault.memory().store("proj", MemoryCategory::Fact, "a", "alpha").unwrap();
    vault.memory().store("proj", MemoryCategory::Episodic, "b", "beta").unwrap();

    let first = updater(&vault)
        .update("proj", 8000, ScoringStrategy::Recency, UpdateMode::Snapshot, None)
        .unwrap();
    let second = updater(&vault)
        .update(
            "proj",
            8000,
            ScoringStrategy::Recency,
            UpdateMode::Incremental,
            Some(&first),
        )
        .unwrap();
    let third = updater(&vault)
        .update(
            "proj",
            8000,
            ScoringStrategy::Recency,
            UpdateMode::Incremental,
            Some(&second),
        )
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(third, second);
}

#[test]
fn incremental_appends_new_and_drops_removed() {
    let (_dir, vault) = vault(BackendKind::Sqlite);
    vault.memory().store("proj", MemoryCategory::Fact, "a", "alpha").unwrap();
    vault.memory().store("proj", MemoryCategory::Fact, "b", "beta").unwrap();
    let first = vault
        .constructor()
        .construct("proj", 8000, ScoringStrategy::Recency)
        .unwrap();

    tick();
    vault.memory().forget("proj", MemoryCategory::Fact, "a").unwrap();
    vault.memory().store("proj", MemoryCategory::Fact, "c", "gamma").unwrap();

    let next = updater(&vault)
        .update(
            "proj",
            8000,
            ScoringStrategy::Recency,
            UpdateMode::Incremental,
            Some(&first),
        )
        .unwrap();
    assert_eq!(
        next.paths(),
        vec!["/context/memory/proj/facts/b", "/context/memory/proj/facts/c"]
    );
}

#[test]
fn adaptive_takes_newer_value_at_shared_path() {
    let (_dir, vault) = vault(BackendKind::Filesystem);
    vault.memory().store("proj", MemoryCategory::Fact, "k", "old").unwrap();
    let snapshot = updater(&vault)
        .update("proj", 8000, ScoringStrategy::Recency, UpdateMode::Snapshot, None)
        .unwrap();

    tick();
    vault.memory().store("proj", MemoryCategory::Fact, "k", "new").unwrap();
    let adapted = updater(&vault)
        .update(
            "proj",
            8000,
            ScoringStrategy::Recency,
            UpdateMode::Adaptive,
            Some(&snapshot),
        )
        .unwrap();

    assert_eq!(adapted.len(), 1);
    assert_eq!(adapted.items[0].content.as_deref(), Some("new"));
    assert_eq!(adapted.items[0].metadata.version, 2);
}

#[test]
fn staleness_tracks_oldest_share() {
    let (_dir, vault) = vault(BackendKind::Memory);
    vault.memory().store("proj", MemoryCategory::Fact, "a", "1").unwrap();
    tick();
    vault.memory().store("proj", MemoryCategory::Fact, "b", "2").unwrap();
    tick();
    vault.memory().store("proj", MemoryCategory::Fact, "c", "3").unwrap();

    let m = vault
        .constructor()
        .construct("proj", 8000, ScoringStrategy::Recency)
        .unwrap();
    // one of three items carries the oldest timestamp
    assert!(!updater(&vault).should_refresh(&m, DEFAULT_STALENESS_THRESHOLD));
    assert!(updater(&vault).should_refresh(&m, 0.3));
    assert!(updater(&vault).should_refresh(&Manifest::default(), DEFAULT_STALENESS_THRESHOLD));
}

#[test]
fn digest_sections_reach_the_manifest() {
    let (_dir, vault) = vault(BackendKind::Memory);
    let transcript = Transcript::new("{\"raw\": true}")
        .with_entry(TranscriptEntry::Summary {
            text: "Refactored the parser".into(),
            session_id: Some("sess-1".into()),
        })
        .with_entry(TranscriptEntry::Error {
            text: "borrow checker complaint".into(),
        });
    let id = vault.history().ingest_session(&transcript, "proj", None).unwrap();
    assert_eq!(id, "sess-1");

    let m = vault
        .constructor()
        .construct("proj", 8000, ScoringStrategy::Recency)
        .unwrap();
    let content = m.items[0].content.as_deref().unwrap();
    assert!(content.starts_with("## Summary\nRefactored the parser"));
    assert!(content.ends_with("## Errors\n- borrow checker complaint"));
}

#[test]
fn repositories_share_one_namespace() {
    let (_dir, vault) = vault(BackendKind::Memory);
    let memory = vault.memory().clone();
    let handle = std::thread::spawn(move || {
        memory
            .store("proj", MemoryCategory::Fact, "from-thread", "v")
            .unwrap();
    });
    handle.join().unwrap();
    assert!(Arc::strong_count(vault.namespace()) >= 4);
    assert!(vault
        .memory()
        .recall("proj", MemoryCategory::Fact, "from-thread")
        .unwrap()
        .is_some());
}
