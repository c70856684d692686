// tests/vault_sink.rs
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use vault_watch::vault::{VaultStatus, DONE_DIR, NEEDS_ACTION_DIR};
use vault_watch::{Item, ItemSink, ItemSource, Vault, VaultSink, Watcher};

fn mail(id: &str, title: &str) -> Item {
    Item::new(id, "gmail", "email")
        .with_title(title)
        .with_sender("Alice <alice@example.test>")
        .with_body("Hello there.")
}

struct Inbox(Vec<Item>);

#[async_trait]
impl ItemSource for Inbox {
    async fn fetch_candidates(&self) -> Result<Vec<Item>> {
        Ok(self.0.clone())
    }
    fn name(&self) -> &'static str {
        "gmail"
    }
}

fn md_files(dir: &std::path::Path) -> Vec<String> {
    let mut v: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".md"))
        .collect();
    v.sort();
    v
}

#[tokio::test]
async fn rewriting_the_same_item_keeps_one_note() {
    let tmp = tempfile::tempdir().unwrap();
    let vault = Vault::new(tmp.path());
    vault.ensure_structure().await.unwrap();
    let sink = VaultSink::new(vault.clone());

    let item = mail("m-1", "Quarterly report");
    sink.write(&item).await.unwrap();
    sink.write(&item).await.unwrap();

    let files = md_files(&vault.inbox_path());
    assert_eq!(files.len(), 1, "re-delivery must overwrite, got {files:?}");

    let note = std::fs::read_to_string(sink.note_path(&item)).unwrap();
    assert!(note.starts_with("---\n"));
    assert!(note.contains("item_id: \"m-1\""));
    assert!(note.contains("# Quarterly report"));
    assert!(note.contains("**From:** Alice <alice@example.test>"));
    assert!(note.trim_end().ends_with("Hello there."));
}

#[tokio::test]
async fn recorded_ids_and_status_reflect_the_folders() {
    let tmp = tempfile::tempdir().unwrap();
    let vault = Vault::new(tmp.path());

    // Missing folders count as empty.
    assert_eq!(vault.status().await.unwrap(), VaultStatus::default());
    assert!(vault.recorded_ids().await.unwrap().is_empty());

    vault.ensure_structure().await.unwrap();
    let sink = VaultSink::new(vault.clone());
    for it in [mail("b", "Second"), mail("a", "First")] {
        sink.write(&it).await.unwrap();
    }
    std::fs::write(tmp.path().join(DONE_DIR).join("old.md"), "# done\n").unwrap();
    std::fs::write(tmp.path().join(NEEDS_ACTION_DIR).join("notes.txt"), "x").unwrap();
    // Hand-written note without front-matter: counted, but has no id.
    std::fs::write(vault.inbox_path().join("scratch.md"), "just text\n").unwrap();

    let st = vault.status().await.unwrap();
    assert_eq!(
        st,
        VaultStatus {
            inbox: 3,
            needs_action: 0,
            done: 1
        }
    );
    assert_eq!(
        vault.recorded_ids().await.unwrap(),
        vec!["a".to_string(), "b".to_string()]
    );
}

#[tokio::test]
async fn restart_seeded_from_vault_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let vault = Vault::new(tmp.path());
    vault.ensure_structure().await.unwrap();
    let items = vec![mail("x1", "One"), mail("x2", "Two")];

    let first = Watcher::builder("gmail")
        .source(Inbox(items.clone()))
        .sink(VaultSink::new(vault.clone()))
        .build()
        .unwrap();
    assert_eq!(first.poll_once().await.persisted_count(), 2);
    drop(first);

    // Simulated process restart: fresh tracker, seeded from disk.
    let history = vault.recorded_ids().await.unwrap();
    let sink = Arc::new(VaultSink::new(vault.clone()));
    let second = Watcher::builder("gmail")
        .source(Inbox(items))
        .sink(sink.clone())
        .seed_history(history)
        .build()
        .unwrap();
    let r = second.poll_once().await;
    assert_eq!(r.fetched, 2);
    assert_eq!(r.skipped, 2);
    assert!(r.persisted.is_empty());
    assert_eq!(md_files(&vault.inbox_path()).len(), 2);
}

#[tokio::test]
async fn notes_moved_downstream_still_count_as_recorded() {
    let tmp = tempfile::tempdir().unwrap();
    let vault = Vault::new(tmp.path());
    vault.ensure_structure().await.unwrap();
    let sink = VaultSink::new(vault.clone());

    let done = mail("msg-1", "Handled already");
    let pending = mail("msg-2", "Waiting on me");
    sink.write(&done).await.unwrap();
    sink.write(&pending).await.unwrap();

    let moved = |item: &Item, folder: &str| {
        let from = sink.note_path(item);
        let to = tmp.path().join(folder).join(from.file_name().unwrap());
        std::fs::rename(from, to).unwrap();
    };
    moved(&done, DONE_DIR);
    moved(&pending, NEEDS_ACTION_DIR);
    assert!(md_files(&vault.inbox_path()).is_empty());

    assert_eq!(
        vault.recorded_ids().await.unwrap(),
        vec!["msg-1".to_string(), "msg-2".to_string()]
    );

    // A restart seeded from the vault does not bring them back to Inbox/.
    let w = Watcher::builder("gmail")
        .source(Inbox(vec![done, pending]))
        .sink(sink.clone())
        .seed_history(vault.recorded_ids().await.unwrap())
        .build()
        .unwrap();
    assert!(w.poll_once().await.persisted.is_empty());
    assert!(md_files(&vault.inbox_path()).is_empty());
}

#[tokio::test]
async fn ids_with_odd_whitespace_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let vault = Vault::new(tmp.path());
    let sink = VaultSink::new(vault.clone());

    let id = "thread  42 \"quoted\" ";
    sink.write(&mail(id, "Spacing")).await.unwrap();

    assert_eq!(vault.recorded_ids().await.unwrap(), vec![id.to_string()]);
}
