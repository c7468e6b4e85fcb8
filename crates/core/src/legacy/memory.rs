//! In-memory legacy collection.

use super::{LegacyCursor, LegacyStore};
use crate::errors::{ConvertError, CursorError};
use crate::models::LegacyIdentity;

/// Legacy documents held in memory, optionally failing part-way through to
/// mimic a store that becomes unreachable.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Vec<LegacyIdentity>,
    fail_after: Option<(usize, String)>,
}

impl MemoryStore {
    pub fn new(docs: Vec<LegacyIdentity>) -> Self {
        Self {
            docs,
            fail_after: None,
        }
    }

    /// Make every cursor fail with `message` after yielding `count`
    /// documents.
    pub fn failing_after(mut self, count: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((count, message.into()));
        self
    }
}

impl LegacyStore for MemoryStore {
    type Cursor<'a> = MemoryCursor<'a>;

    fn identities(&self) -> MemoryCursor<'_> {
        MemoryCursor {
            store: self,
            next: 0,
            current: None,
            error: None,
        }
    }
}

/// Cursor over a [`MemoryStore`].
pub struct MemoryCursor<'a> {
    store: &'a MemoryStore,
    next: usize,
    current: Option<&'a LegacyIdentity>,
    error: Option<CursorError>,
}

impl LegacyCursor for MemoryCursor<'_> {
    fn advance(&mut self) -> bool {
        self.current = None;
        if let Some((count, message)) = &self.store.fail_after {
            if self.next >= *count {
                if self.next == *count {
                    self.error = Some(CursorError::Other(message.clone()));
                    self.next += 1;
                }
                return false;
            }
        }
        match self.store.docs.get(self.next) {
            Some(doc) => {
                self.next += 1;
                self.current = Some(doc);
                true
            }
            None => false,
        }
    }

    fn current(&self) -> Option<Result<&LegacyIdentity, &ConvertError>> {
        self.current.map(Ok)
    }

    fn take_error(&mut self) -> Option<CursorError> {
        self.error.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(names: &[&str]) -> Vec<LegacyIdentity> {
        names
            .iter()
            .map(|n| LegacyIdentity {
                username: n.to_string(),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_yields_all_documents() {
        let store = MemoryStore::new(docs(&["a", "b"]));
        let mut cursor = store.identities();
        assert!(cursor.advance());
        assert!(cursor.advance());
        assert_eq!(cursor.current().unwrap().unwrap().username, "b");
        assert!(!cursor.advance());
        assert!(cursor.take_error().is_none());
    }

    #[test]
    fn test_failure_reported_once() {
        let store = MemoryStore::new(docs(&["a", "b", "c"])).failing_after(1, "boom");
        let mut cursor = store.identities();
        assert!(cursor.advance());
        assert!(!cursor.advance());
        assert!(!cursor.advance());
        assert_eq!(cursor.take_error().unwrap().to_string(), "boom");
        assert!(cursor.take_error().is_none());
    }
}
