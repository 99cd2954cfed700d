use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::models::item::{Item, ItemDraft};
use crate::models::note::{Note, NoteChanges, ValidatedNote};
use crate::models::tag::{Tag, TagName};
use crate::models::utc_now;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence boundary. Handlers only see this trait; values handed in have
/// already passed validation.
pub trait Repository: Send + Sync {
    fn list_notes(&self) -> StoreResult<Vec<Note>>;
    fn get_note(&self, id: i64) -> StoreResult<Note>;
    fn insert_note(&self, note: ValidatedNote) -> StoreResult<Note>;
    fn update_note(&self, id: i64, changes: &NoteChanges) -> StoreResult<Note>;
    fn delete_note(&self, id: i64) -> StoreResult<()>;

    fn list_tags(&self) -> StoreResult<Vec<Tag>>;
    fn insert_tag(&self, name: TagName) -> StoreResult<Tag>;

    fn insert_item(&self, draft: ItemDraft) -> StoreResult<Item>;
    fn get_item(&self, id: i64) -> StoreResult<Item>;
}

pub type SharedStore = Arc<dyn Repository>;

#[derive(Debug)]
struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
struct Tables {
    notes: Table<Note>,
    tags: Table<Tag>,
    items: Table<Item>,
}

/// Process-local store. Ids start at 1 and are never reused.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }
}

impl Repository for MemoryStore {
    fn list_notes(&self) -> StoreResult<Vec<Note>> {
        let tables = self.read()?;
        let mut notes: Vec<Note> = tables.notes.rows.values().cloned().collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(notes)
    }

    fn get_note(&self, id: i64) -> StoreResult<Note> {
        self.read()?
            .notes
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("note"))
    }

    fn insert_note(&self, note: ValidatedNote) -> StoreResult<Note> {
        let mut tables = self.write()?;
        let id = tables.notes.next_id();
        let note = note.into_note(id, utc_now());
        tables.notes.rows.insert(id, note.clone());
        tracing::debug!(note_id = id, "Note stored");
        Ok(note)
    }

    fn update_note(&self, id: i64, changes: &NoteChanges) -> StoreResult<Note> {
        let mut tables = self.write()?;
        let current = tables
            .notes
            .rows
            .get(&id)
            .ok_or(StoreError::NotFound("note"))?;
        let next = changes.apply(current, utc_now());
        tables.notes.rows.insert(id, next.clone());
        Ok(next)
    }

    fn delete_note(&self, id: i64) -> StoreResult<()> {
        self.write()?
            .notes
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("note"))
    }

    fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        Ok(self.read()?.tags.rows.values().cloned().collect())
    }

    fn insert_tag(&self, name: TagName) -> StoreResult<Tag> {
        let mut tables = self.write()?;
        let id = tables.tags.next_id();
        tracing::debug!(tag_id = id, tag = name.as_str(), "Tag stored");
        let tag = name.into_tag(id);
        tables.tags.rows.insert(id, tag.clone());
        Ok(tag)
    }

    fn insert_item(&self, draft: ItemDraft) -> StoreResult<Item> {
        let mut tables = self.write()?;
        let id = tables.items.next_id();
        let item = draft.into_item(id);
        tables.items.rows.insert(id, item.clone());
        Ok(item)
    }

    fn get_item(&self, id: i64) -> StoreResult<Item> {
        self.read()?
            .items
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("item"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value, json};

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn note(title: &str) -> ValidatedNote {
        ValidatedNote::from_input(&object(json!({ "title": title, "body": "body" }))).unwrap()
    }

    #[test]
    fn test_note_lifecycle() {
        let store = MemoryStore::new();
        let created = store.insert_note(note("First")).unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(store.get_note(1).unwrap(), created);

        let changes = NoteChanges::from_input(&object(json!({ "body": "edited" }))).unwrap();
        let updated = store.update_note(1, &changes).unwrap();
        assert_eq!(updated.title, "First");
        assert_eq!(updated.body, "edited");
        assert!(updated.updated_at >= created.updated_at);

        store.delete_note(1).unwrap();
        assert!(matches!(store.get_note(1), Err(StoreError::NotFound("note"))));
    }

    #[test]
    fn test_missing_rows_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.get_note(999_999), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete_note(3), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.update_note(3, &NoteChanges::default()),
            Err(StoreError::NotFound(_))
        ));
        let err = store.get_item(1).unwrap_err();
        assert_eq!(err.to_string(), "item not found");
    }

    #[test]
    fn test_ids_are_not_reused() {
        let store = MemoryStore::new();
        store.insert_note(note("One")).unwrap();
        store.delete_note(1).unwrap();
        assert_eq!(store.insert_note(note("Two")).unwrap().id, 2);
    }

    #[test]
    fn test_tags_and_items() {
        let store = MemoryStore::new();
        let tag = TagName::from_input(&object(json!({ "name": "math" }))).unwrap();
        store.insert_tag(tag).unwrap();
        assert_eq!(store.list_tags().unwrap()[0].name, "math");

        let draft = ItemDraft::from_input(&object(json!({ "name": "Pen", "price": "1.50" }))).unwrap();
        let item = store.insert_item(draft).unwrap();
        assert_eq!(store.get_item(item.id).unwrap(), item);
    }

    #[test]
    fn test_poisoned_lock_is_backend_failure() {
        let store = Arc::new(MemoryStore::new());
        let poisoner = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.tables.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(matches!(store.list_notes(), Err(StoreError::Backend(_))));
    }
}
