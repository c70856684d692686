// src/vault/mod.rs
//! Markdown vault: `Inbox/`, `Needs_Action/`, `Done/` folders of notes.
//! [`VaultSink`] records each item as one note in `Inbox/`.

pub mod memory;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::watch::types::{Item, ItemSink};

pub const INBOX_DIR: &str = "Inbox";
pub const NEEDS_ACTION_DIR: &str = "Needs_Action";
pub const DONE_DIR: &str = "Done";

const ID_KEY: &str = "item_id";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct VaultStatus {
    pub inbox: usize,
    pub needs_action: usize,
    pub done: usize,
}

#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inbox_path(&self) -> PathBuf {
        self.root.join(INBOX_DIR)
    }

    pub async fn ensure_structure(&self) -> Result<()> {
        for dir in [INBOX_DIR, NEEDS_ACTION_DIR, DONE_DIR] {
            let p = self.root.join(dir);
            fs::create_dir_all(&p)
                .await
                .with_context(|| format!("creating {}", p.display()))?;
        }
        Ok(())
    }

    /// Markdown note counts per folder; missing folders count as empty.
    pub async fn status(&self) -> Result<VaultStatus> {
        Ok(VaultStatus {
            inbox: self.notes_in(INBOX_DIR).await?.len(),
            needs_action: self.notes_in(NEEDS_ACTION_DIR).await?.len(),
            done: self.notes_in(DONE_DIR).await?.len(),
        })
    }

    /// Identifiers of the items already recorded anywhere in the vault, read
    /// from each note's front-matter. Notes moved on to `Needs_Action/` or
    /// `Done/` still count. Unreadable notes are skipped with a warning.
    pub async fn recorded_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for folder in [INBOX_DIR, NEEDS_ACTION_DIR, DONE_DIR] {
            for path in self.notes_in(folder).await? {
                match fs::read_to_string(&path).await {
                    Ok(s) => ids.extend(front_matter_value(&s, ID_KEY)),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = ?e, "unreadable note")
                    }
                }
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn notes_in(&self, folder: &str) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(folder);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
        };
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if !hidden && path.extension().and_then(|s| s.to_str()) == Some("md") {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Writes each item as a markdown note under `Inbox/`. The file name depends
/// only on the item, so a re-delivered item overwrites its own note.
#[derive(Debug, Clone)]
pub struct VaultSink {
    vault: Vault,
}

impl VaultSink {
    pub fn new(vault: Vault) -> Self {
        Self { vault }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn note_path(&self, item: &Item) -> PathBuf {
        self.vault.inbox_path().join(note_file_name(item))
    }
}

#[async_trait::async_trait]
impl ItemSink for VaultSink {
    async fn write(&self, item: &Item) -> Result<()> {
        let inbox = self.vault.inbox_path();
        fs::create_dir_all(&inbox)
            .await
            .with_context(|| format!("creating {}", inbox.display()))?;

        let path = self.note_path(item);
        // Hidden temp name: never picked up by `recorded_ids`.
        let tmp = inbox.join(format!(
            ".{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("note")
        ));
        fs::write(&tmp, render_note(item))
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("moving note into {}", path.display()))?;
        tracing::debug!(item_id = %item.id, path = %path.display(), "note written");
        Ok(())
    }
}

/// `<source>_<sha256(id) prefix>_<title slug>.md`
pub fn note_file_name(item: &Item) -> String {
    let digest = Sha256::digest(item.id.as_bytes());
    let mut hash = String::with_capacity(12);
    for b in digest.iter().take(6) {
        let _ = write!(hash, "{b:02x}");
    }
    let source = slug(&item.source, 20);
    let title = slug(&item.title, 50);
    if title.is_empty() {
        format!("{source}_{hash}.md")
    } else {
        format!("{source}_{hash}_{title}.md")
    }
}

/// Alphanumerics, `-` and `_` kept; runs of anything else become one `_`.
fn slug(s: &str, max_chars: usize) -> String {
    static RE_UNSAFE: OnceCell<Regex> = OnceCell::new();
    let re = RE_UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("static regex"));
    let cleaned = re.replace_all(s.trim(), "_");
    cleaned
        .chars()
        .take(max_chars)
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// Front-matter values must stay on one line.
fn fm_value(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn render_note(item: &Item) -> String {
    let sender = item.sender.as_deref().unwrap_or("Unknown");
    let received = item.received_at.to_rfc3339();

    let mut out = String::new();
    out.push_str("---\n");
    let _ = writeln!(out, "type: {}", fm_value(&item.kind));
    let _ = writeln!(out, "source: {}", fm_value(&item.source));
    // Quoted verbatim: the id is read back as the dedup key.
    let _ = writeln!(out, "{ID_KEY}: {}", serde_json::Value::from(item.id.as_str()));
    let _ = writeln!(out, "title: {}", fm_value(&item.title));
    let _ = writeln!(out, "sender: {}", fm_value(sender));
    let _ = writeln!(out, "received_at: {received}");
    if let Some(url) = &item.url {
        let _ = writeln!(out, "url: {}", fm_value(url));
    }
    for (k, v) in &item.meta {
        let _ = writeln!(out, "{}: {}", slug(k, 40), fm_value(v));
    }
    out.push_str("---\n\n");

    let heading = if item.title.trim().is_empty() {
        "(No Title)"
    } else {
        item.title.trim()
    };
    let _ = writeln!(out, "# {heading}\n");
    let _ = writeln!(out, "**From:** {sender}");
    let _ = writeln!(out, "**Received:** {received}");
    if let Some(url) = &item.url {
        let _ = writeln!(out, "**Link:** {url}");
    }
    out.push_str("\n---\n\n");
    out.push_str(item.body.trim_end());
    out.push('\n');
    out
}

/// Value of `key` in a leading `---` delimited front-matter block.
fn front_matter_value(doc: &str, key: &str) -> Option<String> {
    let mut lines = doc.lines();
    if lines.next()?.trim_end() != "---" {
        return None;
    }
    for line in lines {
        if line.trim_end() == "---" {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            if k.trim() == key {
                let v = v.trim();
                if v.starts_with('"') {
                    if let Ok(quoted) = serde_json::from_str::<String>(v) {
                        return (!quoted.is_empty()).then_some(quoted);
                    }
                }
                return (!v.is_empty()).then(|| v.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Item {
        let mut it = Item::new("msg-42", "gmail", "email")
            .with_title("Re: Invoice #7 / March")
            .with_sender("Bob <bob@example.test>")
            .with_body("line one\nline two\n");
        it.meta.insert("to".into(), "me@example.test".into());
        it
    }

    #[test]
    fn file_name_is_deterministic_and_safe() {
        let a = note_file_name(&sample());
        let b = note_file_name(&sample());
        assert_eq!(a, b);
        assert!(a.starts_with("gmail_"));
        assert!(a.ends_with("_Re_Invoice_7_March.md"), "{a}");
        assert!(!a.contains('/'));

        let mut other = sample();
        other.id = "msg-43".into();
        assert_ne!(note_file_name(&other), a);
    }

    #[test]
    fn note_round_trips_item_id() {
        let mut it = sample();
        it.id = "urn:li:notification:(1,2)".into();
        it.title = "multi\nline title".into();
        let doc = render_note(&it);
        assert!(doc.contains("title: multi line title\n"));
        assert_eq!(
            front_matter_value(&doc, ID_KEY).as_deref(),
            Some("urn:li:notification:(1,2)")
        );
        assert!(doc.contains("item_id: \"urn:li:notification:(1,2)\"\n"));

        it.id = "  spaced   id\t".into();
        let doc = render_note(&it);
        assert_eq!(
            front_matter_value(&doc, ID_KEY).as_deref(),
            Some("  spaced   id\t")
        );
        // Hand-written notes may leave the id unquoted.
        assert_eq!(
            front_matter_value("---\nitem_id: plain-1\n---\n", ID_KEY).as_deref(),
            Some("plain-1")
        );
        assert!(doc.contains("**From:** Bob <bob@example.test>"));
        assert!(doc.ends_with("line one\nline two\n"));
    }

    #[test]
    fn front_matter_requires_leading_delimiter() {
        assert_eq!(front_matter_value("item_id: x\n", ID_KEY), None);
        assert_eq!(front_matter_value("---\ntitle: t\n---\nitem_id: x\n", ID_KEY), None);
    }
}
