//! Trait contract tests for StorageBackend.
//!
//! Every scenario runs against the file-tree, SQLite and in-memory backends;
//! any conforming implementation must produce the same observable results.

use chrono::{Duration, Utc};
use ctxvault_state::storage_traits::*;
use ctxvault_state::{FsBackend, MemoryBackend, Node, NodeMetadata, SqliteBackend, StateError};
use serde_json::json;
use tempfile::TempDir;

fn backends() -> (TempDir, Vec<Box<dyn StorageBackend>>) {
    let dir = tempfile::tempdir().unwrap();
    let fs = FsBackend::new(dir.path().join("fs")).unwrap();
    let db = SqliteBackend::open(dir.path().join("db/nodes.sqlite")).unwrap();
    let mem = MemoryBackend::new();
    (dir, vec![Box::new(fs), Box::new(db), Box::new(mem)])
}

fn file(path: &str, content: &str, tags: &[&str], source: &str) -> Node {
    Node::file(
        path,
        content,
        NodeMetadata::fresh(Utc::now())
            .with_source(source)
            .with_tags(tags.iter().copied()),
    )
}

// ===========================================================================
// read / write
// ===========================================================================

#[test]
fn write_then_read_round_trips_exactly() {
    let (_dir, backends) = backends();
    for be in &backends {
        let mut meta = NodeMetadata::fresh(Utc::now())
            .with_source("user")
            .with_tags(["b", "a"])
            .with_ttl(Some(120))
            .with_token_estimate(42);
        meta.content_type = "text/markdown".into();
        meta.version = 7;
        meta.extra.insert("nested".into(), json!({"k": [1, "two", null]}));
        meta.extra.insert("flag".into(), json!(true));
        let node = Node::file("/context/memory/p/facts/db", "PostgreSQL", meta);

        be.write("p/facts/db", &node).unwrap();
        let got = be.read("p/facts/db").unwrap();
        assert_eq!(got.as_ref(), Some(&node), "backend {}", be.kind());
    }
}

#[test]
fn read_missing_is_none() {
    let (_dir, backends) = backends();
    for be in &backends {
        assert!(be.read("nope/here").unwrap().is_none(), "backend {}", be.kind());
        assert!(be.read("").unwrap().is_none(), "backend {}", be.kind());
    }
}

#[test]
fn write_is_replace_not_merge() {
    let (_dir, backends) = backends();
    for be in &backends {
        be.write("k", &file("/k", "first", &["x", "y"], "a")).unwrap();
        let second = file("/k", "second", &["z"], "b");
        be.write("k", &second).unwrap();
        assert_eq!(be.read("k").unwrap(), Some(second), "backend {}", be.kind());
    }
}

#[test]
fn directory_nodes_round_trip() {
    let (_dir, backends) = backends();
    for be in &backends {
        let dir = Node::directory("/group", NodeMetadata::fresh(Utc::now()));
        be.write("group", &dir).unwrap();
        assert_eq!(be.read("group").unwrap(), Some(dir), "backend {}", be.kind());
    }
}

#[test]
fn invalid_paths_are_rejected() {
    let (_dir, backends) = backends();
    for be in &backends {
        let n = file("/x", "x", &[], "");
        for bad in ["", "a/../b", "a//b", "x.meta.json", ".versions/x", "a/.ctxvault-tmpx"] {
            let err = be.write(bad, &n).unwrap_err();
            assert!(matches!(err, StateError::InvalidPath(_)), "backend {} path {bad}", be.kind());
        }
    }
}

// ===========================================================================
// list / delete
// ===========================================================================

#[test]
fn list_returns_sorted_immediate_children() {
    let (_dir, backends) = backends();
    for be in &backends {
        for key in ["proj/facts/b", "proj/facts/a", "proj/user/theme", "proj/s1", "other/z"] {
            be.write(key, &file(&format!("/{key}"), "v", &[], "")).unwrap();
        }
        assert_eq!(
            be.list("proj").unwrap(),
            vec!["facts", "s1", "user"],
            "backend {}",
            be.kind()
        );
        assert_eq!(be.list("proj/facts").unwrap(), vec!["a", "b"]);
        assert_eq!(be.list("").unwrap(), vec!["other", "proj"]);
        assert_eq!(be.list("/proj/facts/").unwrap(), vec!["a", "b"]);
    }
}

#[test]
fn dot_tmp_names_are_ordinary_keys() {
    let (_dir, backends) = backends();
    for be in &backends {
        let cfg = file("/p/.tmpcfg", "settings", &["fact"], "user");
        be.write("p/.tmpcfg", &cfg).unwrap();
        be.write("p/.tmp/inner", &file("/p/.tmp/inner", "x", &[], "")).unwrap();

        assert_eq!(be.read("p/.tmpcfg").unwrap(), Some(cfg), "backend {}", be.kind());
        assert_eq!(be.list("p").unwrap(), vec![".tmp", ".tmpcfg"], "backend {}", be.kind());
        let tagged = be.search("p", &SearchFilter::all().with_tag("fact")).unwrap();
        assert_eq!(tagged.len(), 1, "backend {}", be.kind());
        assert_eq!(tagged[0].path, "/p/.tmpcfg");
        assert_eq!(be.search("", &SearchFilter::all()).unwrap().len(), 2, "backend {}", be.kind());
        assert!(be.delete("p/.tmpcfg").unwrap());
    }
}

#[test]
fn list_missing_subtree_is_empty() {
    let (_dir, backends) = backends();
    for be in &backends {
        assert!(be.list("ghost").unwrap().is_empty(), "backend {}", be.kind());
    }
}

#[test]
fn delete_reports_existence() {
    let (_dir, backends) = backends();
    for be in &backends {
        be.write("a/b", &file("/a/b", "v", &[], "")).unwrap();
        assert!(be.delete("a/b").unwrap(), "backend {}", be.kind());
        assert!(!be.delete("a/b").unwrap(), "backend {}", be.kind());
        assert!(be.read("a/b").unwrap().is_none());
        assert!(be.list("").unwrap().is_empty(), "backend {}", be.kind());
    }
}

// ===========================================================================
// search
// ===========================================================================

#[test]
fn search_applies_all_filters() {
    let (_dir, backends) = backends();
    for be in &backends {
        be.write("p/a", &file("/p/a", "1", &["session", "history"], "capture"))
            .unwrap();
        be.write("p/b", &file("/p/b", "2", &["session"], "user")).unwrap();
        be.write("p/deep/c", &file("/p/deep/c", "3", &["history", "session"], "capture"))
            .unwrap();
        be.write("q/d", &file("/q/d", "4", &["session", "history"], "capture"))
            .unwrap();

        let all = be.search("p", &SearchFilter::all()).unwrap();
        let paths: Vec<&str> = all.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["/p/a", "/p/b", "/p/deep/c"], "backend {}", be.kind());

        let tagged = be
            .search("p", &SearchFilter::all().with_tags(["history", "session"]))
            .unwrap();
        assert_eq!(tagged.len(), 2, "backend {}", be.kind());

        let by_source = be
            .search("p", &SearchFilter::all().with_source("user"))
            .unwrap();
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].path, "/p/b");

        let future = be
            .search("", &SearchFilter::all().since(Utc::now() + Duration::hours(1)))
            .unwrap();
        assert!(future.is_empty(), "backend {}", be.kind());

        let past = be
            .search("", &SearchFilter::all().since(Utc::now() - Duration::hours(1)))
            .unwrap();
        assert_eq!(past.len(), 4, "backend {}", be.kind());
    }
}

#[test]
fn search_missing_subtree_is_empty() {
    let (_dir, backends) = backends();
    for be in &backends {
        assert!(be
            .search("ghost", &SearchFilter::all())
            .unwrap()
            .is_empty());
    }
}

#[test]
fn search_excludes_node_at_subtree_root() {
    let (_dir, backends) = backends();
    for be in &backends {
        be.write("p", &file("/p", "self", &[], "")).unwrap();
        be.write("p2/x", &file("/p2/x", "sibling", &[], "")).unwrap();
        assert!(be.search("p", &SearchFilter::all()).unwrap().is_empty(), "backend {}", be.kind());
    }
}

// ===========================================================================
// revisions
// ===========================================================================

#[test]
fn only_file_tree_keeps_revisions() {
    let (_dir, backends) = backends();
    for be in &backends {
        let first = file("/k", "one", &[], "");
        let mut second = file("/k", "two", &[], "");
        second.metadata = NodeMetadata::revise(Some(&first.metadata), Utc::now());
        be.write("k", &first).unwrap();
        be.write("k", &second).unwrap();

        let versions = be.versions("k").unwrap();
        if be.kind() == "filesystem" {
            assert_eq!(versions, vec![1]);
            let old = be.read_version("k", 1).unwrap().unwrap();
            assert_eq!(old, first);
        } else {
            assert!(versions.is_empty(), "backend {}", be.kind());
        }
    }
}
