//! The persistent catalog database (`zealcore_cache.sqlite3`).
//!
//! Tracks which docsets each repository offers (`available_docs`, with the
//! upstream catalog JSON cached per row), which of them are installed
//! (`installed_docs`), cached raw repository payloads (`kv`), and
//! user-defined search groups (`groups`). The connection is process-wide
//! and serialized behind a mutex.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};

use crate::types::{Group, RepoItem};
use crate::Result;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS kv (key, value);
    CREATE TABLE IF NOT EXISTS installed_docs (available_doc_id);
    CREATE TABLE IF NOT EXISTS available_docs (
        id INTEGER PRIMARY KEY AUTOINCREMENT, repo_id, name, json);
    CREATE TABLE IF NOT EXISTS groups (
        id INTEGER PRIMARY KEY AUTOINCREMENT, icon, name, docs_list);
";

/// Process-wide catalog store.
pub struct CatalogDb {
    conn: Mutex<Connection>,
}

impl CatalogDb {
    /// Opens (creating if needed) the catalog database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory catalog, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        conn.execute("INSERT INTO kv(key, value) VALUES (?1, ?2)", (key, value))?;
        Ok(())
    }

    /// Inserts or refreshes catalog rows for `repo_id`, assigning each item
    /// its stable row id.
    ///
    /// Rows are keyed by docset name: a known name gets its JSON refreshed
    /// in place so the id (and any `installed_docs` reference to it)
    /// survives catalog updates.
    pub fn upsert_available(&self, repo_id: i64, items: &mut [RepoItem]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for item in items.iter_mut() {
            let json = serde_json::to_string(item)?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM available_docs WHERE repo_id = ?1 AND name = ?2",
                    (repo_id, &item.name),
                    |row| row.get(0),
                )
                .optional()?;
            let id = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE available_docs SET json = ?1 WHERE id = ?2",
                        (&json, id),
                    )?;
                    id
                },
                None => {
                    tx.execute(
                        "INSERT INTO available_docs (repo_id, name, json) VALUES (?1, ?2, ?3)",
                        (repo_id, &item.name, &json),
                    )?;
                    tx.last_insert_rowid()
                },
            };
            item.id = id.to_string();
        }
        tx.commit()?;
        Ok(())
    }

    /// All catalog rows for a repository, ids filled in from the table.
    pub fn available(&self, repo_id: i64) -> Result<Vec<RepoItem>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id, json FROM available_docs WHERE repo_id = ?1")?;
        let rows = stmt.query_map([repo_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut items = Vec::new();
        for row in rows {
            let (id, json) = row?;
            let mut item: RepoItem = serde_json::from_str(&json)?;
            item.id = id.to_string();
            items.push(item);
        }
        Ok(items)
    }

    pub fn available_by_id(&self, id: &str) -> Result<Option<RepoItem>> {
        let conn = self.conn.lock();
        let row: Option<String> = conn
            .query_row(
                "SELECT json FROM available_docs WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        match row {
            Some(json) => {
                let mut item: RepoItem = serde_json::from_str(&json)?;
                item.id = id.to_string();
                Ok(Some(item))
            },
            None => Ok(None),
        }
    }

    /// Like [`Self::available_by_id`], but only when the row belongs to
    /// `repo_id`. Repositories use this so dispatch stays first-match-wins.
    pub fn available_in_repo_by_id(&self, id: &str, repo_id: i64) -> Result<Option<RepoItem>> {
        let conn = self.conn.lock();
        let row: Option<String> = conn
            .query_row(
                "SELECT json FROM available_docs WHERE id = ?1 AND repo_id = ?2",
                (id, repo_id),
                |row| row.get(0),
            )
            .optional()?;
        match row {
            Some(json) => {
                let mut item: RepoItem = serde_json::from_str(&json)?;
                item.id = id.to_string();
                Ok(Some(item))
            },
            None => Ok(None),
        }
    }

    pub fn mark_installed(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO installed_docs(available_doc_id) VALUES (?1)",
            [id],
        )?;
        Ok(())
    }

    pub fn remove_installed(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM installed_docs WHERE available_doc_id = ?1",
            [id],
        )?;
        Ok(())
    }

    /// Installed docsets of one repository.
    pub fn installed(&self, repo_id: i64) -> Result<Vec<RepoItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT a.id, a.json FROM installed_docs i
             INNER JOIN available_docs a ON i.available_doc_id = a.id
             WHERE a.repo_id = ?1",
        )?;
        let rows = stmt.query_map([repo_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut items = Vec::new();
        for row in rows {
            let (id, json) = row?;
            let mut item: RepoItem = serde_json::from_str(&json)?;
            item.id = id.to_string();
            items.push(item);
        }
        Ok(items)
    }

    /// Resolves an installed docset by its catalog name, returning
    /// `(id, repo_id)`.
    pub fn installed_lookup_by_name(&self, name: &str) -> Result<Option<(String, i64)>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, repo_id FROM available_docs
                 WHERE name = ?1
                 AND id IN (SELECT available_doc_id FROM installed_docs)",
                [name],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(id, repo_id)| (id.to_string(), repo_id)))
    }

    pub fn add_group(&self, icon: &str, name: &str, docs: &[String]) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO groups(icon, name, docs_list) VALUES (?1, ?2, ?3)",
            (icon, name, docs.join(",")),
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn groups(&self) -> Result<Vec<Group>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, icon, name, docs_list FROM groups")?;
        let rows = stmt.query_map([], |row| {
            Ok(Group {
                id: row.get(0)?,
                icon: row.get(1)?,
                name: row.get(2)?,
                docs: split_docs_list(&row.get::<_, String>(3)?),
            })
        })?;
        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }

    pub fn group_by_id(&self, id: i64) -> Result<Option<Group>> {
        let conn = self.conn.lock();
        let group = conn
            .query_row(
                "SELECT id, icon, name, docs_list FROM groups WHERE id = ?1",
                [id],
                |row| {
                    Ok(Group {
                        id: row.get(0)?,
                        icon: row.get(1)?,
                        name: row.get(2)?,
                        docs: split_docs_list(&row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()?;
        Ok(group)
    }

    /// Replaces a group's fields; false when the id is unknown.
    pub fn update_group(&self, group: &Group) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE groups SET icon = ?1, name = ?2, docs_list = ?3 WHERE id = ?4",
            (&group.icon, &group.name, group.docs.join(","), group.id),
        )?;
        Ok(changed > 0)
    }

    pub fn delete_group(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM groups WHERE id = ?1", [id])? > 0)
    }
}

fn split_docs_list(docs_list: &str) -> Vec<String> {
    docs_list
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, title: &str) -> RepoItem {
        RepoItem {
            source_id: "com.kapeli".into(),
            name: name.into(),
            title: title.into(),
            ..RepoItem::default()
        }
    }

    #[test]
    fn kv_round_trip_overwrites() {
        let db = CatalogDb::open_in_memory().unwrap();
        assert_eq!(db.kv_get("repo_json_1").unwrap(), None);
        db.kv_set("repo_json_1", "[]").unwrap();
        db.kv_set("repo_json_1", "[{}]").unwrap();
        assert_eq!(db.kv_get("repo_json_1").unwrap(), Some("[{}]".into()));
    }

    #[test]
    fn upsert_assigns_and_keeps_ids() {
        let db = CatalogDb::open_in_memory().unwrap();
        let mut items = vec![item("Go", "Go"), item("Qt", "Qt 5")];
        db.upsert_available(1, &mut items).unwrap();
        let first_ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        assert!(first_ids.iter().all(|id| !id.is_empty()));

        // A catalog refresh with changed metadata keeps row ids stable.
        let mut refreshed = vec![item("Go", "Go 1.22"), item("Qt", "Qt 5")];
        db.upsert_available(1, &mut refreshed).unwrap();
        let second_ids: Vec<String> = refreshed.iter().map(|i| i.id.clone()).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(db.available(1).unwrap()[0].title, "Go 1.22");
    }

    #[test]
    fn installed_tracks_marked_rows() {
        let db = CatalogDb::open_in_memory().unwrap();
        let mut items = vec![item("Go", "Go"), item("Qt", "Qt 5")];
        db.upsert_available(1, &mut items).unwrap();

        db.mark_installed(&items[0].id).unwrap();
        let installed = db.installed(1).unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].name, "Go");
        assert_eq!(
            db.installed_lookup_by_name("Go").unwrap(),
            Some((items[0].id.clone(), 1))
        );
        assert_eq!(db.installed_lookup_by_name("Qt").unwrap(), None);

        db.remove_installed(&items[0].id).unwrap();
        assert!(db.installed(1).unwrap().is_empty());
    }

    #[test]
    fn repos_do_not_share_catalog_rows() {
        let db = CatalogDb::open_in_memory().unwrap();
        let mut official = vec![item("Go", "Go")];
        let mut contrib = vec![item("Zig", "Zig")];
        db.upsert_available(1, &mut official).unwrap();
        db.upsert_available(2, &mut contrib).unwrap();
        assert_eq!(db.available(1).unwrap().len(), 1);
        assert_eq!(db.available(2).unwrap().len(), 1);
        assert_eq!(db.available(2).unwrap()[0].name, "Zig");
    }

    #[test]
    fn group_crud() {
        let db = CatalogDb::open_in_memory().unwrap();
        let id = db
            .add_group("", "frontend", &["React".into(), "Vue".into()])
            .unwrap();
        let group = db.group_by_id(id).unwrap().unwrap();
        assert_eq!(group.name, "frontend");
        assert_eq!(group.docs, vec!["React", "Vue"]);

        let mut updated = group.clone();
        updated.docs = vec!["React".into()];
        assert!(db.update_group(&updated).unwrap());
        assert_eq!(db.group_by_id(id).unwrap().unwrap().docs, vec!["React"]);

        assert!(db.delete_group(id).unwrap());
        assert!(db.group_by_id(id).unwrap().is_none());
        assert!(!db.delete_group(id).unwrap());
    }

    #[test]
    fn empty_docs_list_parses_to_empty_vec() {
        let db = CatalogDb::open_in_memory().unwrap();
        let id = db.add_group("", "empty", &[]).unwrap();
        assert!(db.group_by_id(id).unwrap().unwrap().docs.is_empty());
    }
}
