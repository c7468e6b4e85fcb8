//! Legacy identities exported as a JSON-lines dump.
//!
//! One [`LegacyIdentity`] document per line; blank lines are ignored. The
//! file is opened when a cursor first advances, so a missing or unreadable
//! dump surfaces as a cursor error like any other read failure. A line that
//! is not a valid document only affects that line.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{decode_record, LegacyCursor, LegacyRecord, LegacyStore};
use crate::errors::{ConvertError, CursorError};
use crate::models::LegacyIdentity;

/// A JSON-lines dump of the legacy identity collection.
#[derive(Debug, Clone)]
pub struct DumpFile {
    path: PathBuf,
}

impl DumpFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LegacyStore for DumpFile {
    type Cursor<'a> = DumpCursor<'a>;

    fn identities(&self) -> DumpCursor<'_> {
        DumpCursor {
            path: &self.path,
            reader: None,
            line_no: 0,
            current: None,
            error: None,
            done: false,
        }
    }
}

/// Cursor over a [`DumpFile`], in file order.
pub struct DumpCursor<'a> {
    path: &'a Path,
    reader: Option<BufReader<File>>,
    line_no: u64,
    current: Option<LegacyRecord>,
    error: Option<CursorError>,
    done: bool,
}

impl DumpCursor<'_> {
    fn stop(&mut self, error: Option<CursorError>) -> bool {
        self.done = true;
        self.current = None;
        self.reader = None;
        if error.is_some() {
            self.error = error;
        }
        false
    }

    /// Read the next non-blank line, opening the file if needed.
    fn next_line(&mut self) -> Result<Option<String>, CursorError> {
        if self.reader.is_none() {
            info!(path = %self.path.display(), "opening legacy dump");
            self.reader = Some(BufReader::new(File::open(self.path)?));
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }
    }
}

impl LegacyCursor for DumpCursor<'_> {
    fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        let line = match self.next_line() {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(lines = self.line_no, "legacy dump exhausted");
                return self.stop(None);
            }
            Err(e) => return self.stop(Some(e)),
        };
        self.current = Some(decode_record(&line, self.line_no));
        true
    }

    fn current(&self) -> Option<Result<&LegacyIdentity, &ConvertError>> {
        self.current.as_ref().map(Result::as_ref)
    }

    fn take_error(&mut self) -> Option<CursorError> {
        self.error.take()
    }
}
