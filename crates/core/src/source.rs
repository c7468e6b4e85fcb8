//! Streaming conversion of a legacy collection into canonical identities.
//!
//! [`LegacySource`] pulls one legacy document at a time, converts it, and
//! exposes the result as its current identity. Documents that cannot be
//! decoded or converted are reported to a [`DiagnosticSink`] and skipped;
//! only a failing cursor ends iteration early.

use tracing::warn;

use crate::convert::convert;
use crate::errors::{ConvertError, SourceError};
use crate::legacy::{LegacyCursor, LegacyStore};
use crate::models::{Identity, LegacyIdentity};

/// A pull-based stream of canonical identities.
pub trait Source {
    /// Move to the next identity. Returns `false` when there are no more,
    /// either because the source is exhausted or because it failed.
    fn advance(&mut self) -> bool;

    /// The identity produced by the last successful `advance`.
    fn identity(&self) -> Option<&Identity>;

    /// The error that ended iteration, if any.
    fn err(&self) -> Option<&SourceError>;

    /// Take ownership of the error that ended iteration.
    fn take_err(&mut self) -> Option<SourceError>;

    /// Number of records dropped so far because they could not be converted.
    fn skipped(&self) -> u64 {
        0
    }
}

/// Receives documents that were dropped because they could not be converted.
pub trait DiagnosticSink {
    fn skipped(&mut self, doc: &LegacyIdentity, err: &ConvertError);

    /// A stored document that could not be decoded at all, so there is no
    /// [`LegacyIdentity`] to report. `err` carries its position.
    fn undecodable(&mut self, err: &ConvertError) {
        warn!(error = %err, "cannot decode identity (skipping)");
    }
}

impl<F> DiagnosticSink for F
where
    F: FnMut(&LegacyIdentity, &ConvertError),
{
    fn skipped(&mut self, doc: &LegacyIdentity, err: &ConvertError) {
        self(doc, err)
    }
}

/// Logs each skipped document as a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn skipped(&mut self, doc: &LegacyIdentity, err: &ConvertError) {
        warn!(
            username = %doc.username,
            external_id = %doc.external_id,
            error = %err,
            "cannot convert identity (skipping)"
        );
    }
}

/// A [`Source`] reading from a legacy store.
///
/// The cursor is opened on the first call to `advance`. A source must be
/// driven by a single caller; dropping it releases the cursor.
pub struct LegacySource<'a, S: LegacyStore + 'a, D = TracingSink> {
    store: &'a S,
    cursor: Option<S::Cursor<'a>>,
    identity: Option<Identity>,
    err: Option<SourceError>,
    sink: D,
    skipped: u64,
}

impl<'a, S: LegacyStore + 'a> LegacySource<'a, S> {
    /// Create a source over `store` that logs skipped documents.
    pub fn new(store: &'a S) -> Self {
        Self::with_sink(store, TracingSink)
    }
}

impl<'a, S: LegacyStore + 'a, D: DiagnosticSink> LegacySource<'a, S, D> {
    /// Create a source over `store` reporting skipped documents to `sink`.
    pub fn with_sink(store: &'a S, sink: D) -> Self {
        Self {
            store,
            cursor: None,
            identity: None,
            err: None,
            sink,
            skipped: 0,
        }
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }
}

impl<'a, S: LegacyStore + 'a, D: DiagnosticSink> Source for LegacySource<'a, S, D> {
    fn advance(&mut self) -> bool {
        let store = self.store;
        let cursor = self.cursor.get_or_insert_with(|| store.identities());
        while cursor.advance() {
            match cursor.current() {
                None => continue,
                Some(Err(e)) => {
                    self.skipped += 1;
                    self.sink.undecodable(e);
                }
                Some(Ok(doc)) => match convert(doc) {
                    Ok(identity) => {
                        self.identity = Some(identity);
                        return true;
                    }
                    Err(e) => {
                        self.skipped += 1;
                        self.sink.skipped(doc, &e);
                    }
                },
            }
        }
        if let Some(e) = cursor.take_error() {
            self.err = Some(e.into());
        }
        false
    }

    fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    fn err(&self) -> Option<&SourceError> {
        self.err.as_ref()
    }

    fn take_err(&mut self) -> Option<SourceError> {
        self.err.take()
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<'a, S: LegacyStore + 'a, D: DiagnosticSink> Iterator for LegacySource<'a, S, D> {
    type Item = Identity;

    fn next(&mut self) -> Option<Identity> {
        if self.advance() {
            self.identity.clone()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CursorError;
    use crate::legacy::{DumpFile, MemoryStore};
    use crate::models::ProviderIdentity;

    fn doc(username: &str, external_id: &str) -> LegacyIdentity {
        LegacyIdentity {
            username: username.into(),
            external_id: external_id.into(),
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<(String, ConvertError)>);

    impl DiagnosticSink for Recorder {
        fn skipped(&mut self, doc: &LegacyIdentity, err: &ConvertError) {
            self.0.push((doc.username.clone(), err.clone()));
        }

        fn undecodable(&mut self, err: &ConvertError) {
            self.0.push((String::new(), err.clone()));
        }
    }

    #[test]
    fn test_not_started_has_no_identity() {
        let store = MemoryStore::new(vec![doc("alice", "")]);
        let source = LegacySource::new(&store);
        assert!(source.identity().is_none());
        assert!(source.err().is_none());
    }

    #[test]
    fn test_yields_converted_identities_in_order() {
        let store = MemoryStore::new(vec![
            doc("alice", ""),
            doc("bob", "openid-connect:bob@example.com"),
        ]);
        let mut source = LegacySource::new(&store);

        assert!(source.advance());
        assert_eq!(
            source.identity().unwrap().provider_id,
            ProviderIdentity::new("idm", "alice")
        );
        assert!(source.advance());
        assert_eq!(
            source.identity().unwrap().provider_id,
            ProviderIdentity::new("azure", "bob@example.com")
        );
        assert!(!source.advance());
        assert!(source.err().is_none());
    }

    #[test]
    fn test_skips_unconvertible_and_continues() {
        let store = MemoryStore::new(vec![
            doc("a", ""),
            doc("b", "usso-openid:b"),
            doc("k", "kerberos:k@REALM"),
            doc("c", "https://login.ubuntu.com/+id/c"),
            doc("d", ""),
        ]);
        let mut source = LegacySource::with_sink(&store, Recorder::default());

        let names: Vec<String> = source.by_ref().map(|i| i.username).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert!(source.err().is_none());
        assert_eq!(source.skipped(), 1);

        let diagnostics = &source.sink().0;
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].0, "k");
        assert_eq!(
            diagnostics[0].1,
            ConvertError::UnrecognizedExternalId {
                external_id: "kerberos:k@REALM".into()
            }
        );
    }

    #[test]
    fn test_malformed_documents_skipped_and_iteration_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.jsonl");
        std::fs::write(
            &path,
            concat!(
                "{\"username\":\"a\"}\n",
                "{\"username\":\"b\",\"lastlogin\":\"never\"}\n",
                "{\"external_id\":\"\"}\n",
                "{\"username\":\"c\"}\n",
                "{\"username\":\"d\"}\n",
            ),
        )
        .unwrap();
        let dump = DumpFile::new(&path);
        let mut source = LegacySource::with_sink(&dump, Recorder::default());

        let names: Vec<String> = source.by_ref().map(|i| i.username).collect();
        assert_eq!(names, vec!["a", "c", "d"]);
        assert!(source.err().is_none());
        assert_eq!(source.skipped(), 2);

        let diagnostics = &source.sink().0;
        assert!(matches!(
            diagnostics[0].1,
            ConvertError::Undecodable { position: 2, .. }
        ));
        assert_eq!(diagnostics[1].1, ConvertError::MissingUsername);
    }

    #[test]
    fn test_unknown_owner_skipped() {
        let mut owned = doc("agent", "");
        owned.owner = "mallory@idm".into();
        let store = MemoryStore::new(vec![owned, doc("alice", "")]);
        let mut source = LegacySource::with_sink(&store, Recorder::default());

        assert!(source.advance());
        assert_eq!(source.identity().unwrap().username, "alice");
        assert!(matches!(
            source.sink().0[0].1,
            ConvertError::UnrecognizedOwner { .. }
        ));
    }

    #[test]
    fn test_cursor_error_after_three_documents() {
        let store = MemoryStore::new(vec![
            doc("a", ""),
            doc("b", ""),
            doc("c", ""),
            doc("d", ""),
        ])
        .failing_after(3, "connection reset by peer");
        let mut source = LegacySource::new(&store);

        for expected in ["a", "b", "c"] {
            assert!(source.advance());
            assert_eq!(source.identity().unwrap().username, expected);
        }
        assert!(!source.advance());
        let err = source.err().expect("cursor error should be reported");
        assert!(matches!(err, SourceError::Cursor(CursorError::Other(_))));
        assert!(err.to_string().contains("connection reset by peer"));

        // Further calls neither resume nor clear the error.
        assert!(!source.advance());
        assert!(source.err().is_some());
    }

    #[test]
    fn test_all_documents_skipped() {
        let store = MemoryStore::new(vec![doc("x", "bogus"), doc("y", "bogus")]);
        let mut count = 0;
        let mut source = LegacySource::with_sink(&store, |_: &LegacyIdentity, _: &ConvertError| {
            count += 1
        });
        assert!(!source.advance());
        assert!(source.err().is_none());
        assert_eq!(source.skipped(), 2);
        drop(source);
        assert_eq!(count, 2);
    }
}
