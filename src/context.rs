//! Persistence of the conversation context.
//!
//! The context is a JSON array of `{"role", "content"}` objects. Stores only
//! report what happened; deciding to ignore a corrupt document is left to the
//! caller (see [`ChatSession::load_context`](crate::session::ChatSession::load_context)).

use std::cell::RefCell;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ContextError;
use crate::model::Message;

pub trait ContextStore {
    /// Returns the stored turns, or an empty sequence when nothing is stored.
    fn load(&self) -> Result<Vec<Message>, ContextError>;

    /// Replaces whatever is stored with `messages`.
    fn save(&self, messages: &[Message]) -> Result<(), ContextError>;

    /// Removes the stored context. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), ContextError>;
}

pub fn decode_context(raw: &str) -> Result<Vec<Message>, ContextError> {
    serde_json::from_str(raw).map_err(ContextError::Parse)
}

pub fn encode_context(messages: &[Message]) -> Result<String, ContextError> {
    serde_json::to_string(messages).map_err(ContextError::Encode)
}

#[derive(Debug, Clone)]
pub struct FileContextStore {
    path: PathBuf,
}

impl FileContextStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContextStore for FileContextStore {
    fn load(&self) -> Result<Vec<Message>, ContextError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no context file found");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(ContextError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        decode_context(&raw)
    }

    fn save(&self, messages: &[Message]) -> Result<(), ContextError> {
        let encoded = encode_context(messages)?;
        let write_err = |source: std::io::Error| ContextError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        fs::write(&self.path, encoded).map_err(write_err)?;

        debug!(
            path = %self.path.display(),
            message_count = messages.len(),
            "wrote context file"
        );
        Ok(())
    }

    fn clear(&self) -> Result<(), ContextError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ContextError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Keeps the encoded document in memory instead of on disk.
#[derive(Debug, Default)]
pub struct MemoryContextStore {
    contents: RefCell<Option<String>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an arbitrary document, which does not have to be valid.
    pub fn with_contents(raw: impl Into<String>) -> Self {
        Self {
            contents: RefCell::new(Some(raw.into())),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.borrow().clone()
    }
}

impl ContextStore for MemoryContextStore {
    fn load(&self) -> Result<Vec<Message>, ContextError> {
        match self.contents.borrow().as_deref() {
            Some(raw) => decode_context(raw),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, messages: &[Message]) -> Result<(), ContextError> {
        let encoded = encode_context(messages)?;
        *self.contents.borrow_mut() = Some(encoded);
        Ok(())
    }

    fn clear(&self) -> Result<(), ContextError> {
        self.contents.borrow_mut().take();
        Ok(())
    }
}
