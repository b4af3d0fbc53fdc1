//! Stale state left by the previous storage scheme.
//!
//! Older releases cached every document's records in a separate store keyed
//! by the document uuid. When a document is first opened, the residual state
//! (if any) is found here and the user decides what happens to it:
//!
//! - keep it: the residual records replace the ones decoded from the file
//! - discard it: the residual records are deleted
//! - cancel: opening the document is aborted
//!
//! The check runs once per main store, before its first snapshot exists, and
//! races against the unload token of the view that asked for the document.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use tokio_util::sync::CancellationToken;

use crate::document::{DocumentMeta, Snapshot};
use crate::error::{CanvasDocError, Result};
use crate::host::BoxFuture;

/// What the resolver knows about the document being opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictContext {
    /// Backing document path.
    pub path: PathBuf,
    /// Metadata decoded from the backing document.
    pub meta: DocumentMeta,
}

/// The user's answer to a conflict prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyDecision {
    /// Use the residual records instead of the file contents.
    Keep(Snapshot),
    /// Delete the residual records and use the file contents.
    Discard,
    /// Abort opening the document.
    Cancel,
}

/// Store of residual state from the previous storage scheme.
pub trait LegacyStateStore: Send + Sync {
    /// Whether residual state exists for the document.
    fn exists<'a>(&'a self, uuid: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Ask the user what to do with the residual state. May never complete
    /// if the user never answers.
    fn resolve<'a>(
        &'a self,
        uuid: &'a str,
        context: &'a ConflictContext,
    ) -> BoxFuture<'a, Result<LegacyDecision>>;

    /// Delete the residual state.
    fn discard<'a>(&'a self, uuid: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// A legacy store that never holds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLegacyState;

impl LegacyStateStore for NoLegacyState {
    fn exists<'a>(&'a self, _uuid: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async { Ok(false) })
    }

    fn resolve<'a>(
        &'a self,
        _uuid: &'a str,
        _context: &'a ConflictContext,
    ) -> BoxFuture<'a, Result<LegacyDecision>> {
        Box::pin(async { Ok(LegacyDecision::Discard) })
    }

    fn discard<'a>(&'a self, _uuid: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Scripted answer of a [`MemoryLegacyStore`] prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptedAnswer {
    /// Keep the stored residual records.
    Keep,
    /// Discard them.
    #[default]
    Discard,
    /// Cancel the prompt.
    Cancel,
    /// Never answer (the prompt stays open).
    Never,
}

/// In-memory legacy store with a scripted prompt, for tests and embedders
/// that migrate residual state themselves.
#[derive(Debug, Default)]
pub struct MemoryLegacyStore {
    states: RwLock<HashMap<String, Snapshot>>,
    answer: Mutex<ScriptedAnswer>,
    prompts: AtomicUsize,
}

impl MemoryLegacyStore {
    /// Create an empty store that answers prompts with "discard".
    pub fn new() -> Self {
        Self::default()
    }

    /// Add residual state for a document (builder pattern).
    pub fn with_state(self, uuid: impl Into<String>, snapshot: Snapshot) -> Self {
        self.states.write().unwrap().insert(uuid.into(), snapshot);
        self
    }

    /// Set how future prompts are answered.
    pub fn set_answer(&self, answer: ScriptedAnswer) {
        *self.answer.lock().unwrap() = answer;
    }

    /// Whether residual state is still stored for the document.
    pub fn contains(&self, uuid: &str) -> bool {
        self.states.read().unwrap().contains_key(uuid)
    }

    /// Number of prompts shown so far.
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl LegacyStateStore for MemoryLegacyStore {
    fn exists<'a>(&'a self, uuid: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.contains(uuid)) })
    }

    fn resolve<'a>(
        &'a self,
        uuid: &'a str,
        _context: &'a ConflictContext,
    ) -> BoxFuture<'a, Result<LegacyDecision>> {
        Box::pin(async move {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            let answer = *self.answer.lock().unwrap();
            match answer {
                ScriptedAnswer::Keep => {
                    let snapshot = self
                        .states
                        .read()
                        .unwrap()
                        .get(uuid)
                        .cloned()
                        .ok_or_else(|| {
                            CanvasDocError::LegacyStore(format!("No residual state for {}", uuid))
                        })?;
                    Ok(LegacyDecision::Keep(snapshot))
                }
                ScriptedAnswer::Discard => Ok(LegacyDecision::Discard),
                ScriptedAnswer::Cancel => Ok(LegacyDecision::Cancel),
                ScriptedAnswer::Never => std::future::pending().await,
            }
        })
    }

    fn discard<'a>(&'a self, uuid: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.states.write().unwrap().remove(uuid);
            Ok(())
        })
    }
}

/// Which residual data won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Residual records replaced the file contents.
    Keep,
    /// Residual records were deleted.
    Discard,
}

/// State of a conflict check. Every state but `Checking` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictState {
    /// Looking for residual state or waiting on the prompt.
    Checking,
    /// No residual state for this document.
    NotFound,
    /// The user chose what to do with the residual state.
    Resolved(Resolution),
    /// The user dismissed the prompt.
    Cancelled,
    /// The requesting view or registry went away first.
    Unloaded,
}

impl ConflictState {
    /// Whether the check has finished.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConflictState::Checking)
    }
}

/// Outcome of a finished conflict check.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictResolution {
    /// Terminal state reached.
    pub state: ConflictState,
    /// Records to use instead of the file contents (only for `Resolved(Keep)`).
    pub snapshot: Option<Snapshot>,
    uuid: String,
}

impl ConflictResolution {
    /// Turn the outcome into the main store's initial records.
    ///
    /// `Ok(None)` keeps the file contents. Cancelled and unloaded checks
    /// become their dedicated errors.
    pub fn into_initial_snapshot(self) -> Result<Option<Snapshot>> {
        match self.state {
            ConflictState::Cancelled => {
                Err(CanvasDocError::ConflictResolutionCancelled { uuid: self.uuid })
            }
            ConflictState::Unloaded => {
                Err(CanvasDocError::ConflictResolutionViewUnloaded { uuid: self.uuid })
            }
            _ => Ok(self.snapshot),
        }
    }
}

/// One-shot conflict check for a document that is being opened.
pub struct LegacyConflictCheck<'a> {
    store: &'a dyn LegacyStateStore,
    context: ConflictContext,
    state: ConflictState,
}

impl<'a> LegacyConflictCheck<'a> {
    /// A check in the `Checking` state.
    pub fn new(store: &'a dyn LegacyStateStore, context: ConflictContext) -> Self {
        Self {
            store,
            context,
            state: ConflictState::Checking,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConflictState {
        self.state
    }

    /// Run the check to a terminal state.
    ///
    /// `unload` is checked before the lookup, raced against every await, and
    /// checked again after the user answered: a cancelled token always ends
    /// in [`ConflictState::Unloaded`].
    pub async fn run(mut self, unload: &CancellationToken) -> Result<ConflictResolution> {
        let uuid = self.context.meta.uuid.clone();
        let mut snapshot = None;

        if unload.is_cancelled() {
            return Ok(self.finish(ConflictState::Unloaded, None));
        }

        let exists = tokio::select! {
            biased;
            _ = unload.cancelled() => None,
            exists = self.store.exists(&uuid) => Some(exists?),
        };
        let Some(exists) = exists else {
            return Ok(self.finish(ConflictState::Unloaded, None));
        };
        if !exists {
            return Ok(self.finish(ConflictState::NotFound, None));
        }

        log::debug!("[LegacyConflictCheck] Residual state found for {}", uuid);
        let decision = tokio::select! {
            biased;
            _ = unload.cancelled() => None,
            decision = self.store.resolve(&uuid, &self.context) => Some(decision?),
        };
        let decision = match decision {
            Some(decision) if !unload.is_cancelled() => decision,
            _ => return Ok(self.finish(ConflictState::Unloaded, None)),
        };

        let state = match decision {
            LegacyDecision::Keep(kept) => {
                // The kept records are persisted over the file, so the
                // residual copy is not needed afterwards.
                self.store.discard(&uuid).await?;
                snapshot = Some(kept);
                ConflictState::Resolved(Resolution::Keep)
            }
            LegacyDecision::Discard => {
                self.store.discard(&uuid).await?;
                ConflictState::Resolved(Resolution::Discard)
            }
            LegacyDecision::Cancel => ConflictState::Cancelled,
        };
        Ok(self.finish(state, snapshot))
    }

    fn finish(&mut self, state: ConflictState, snapshot: Option<Snapshot>) -> ConflictResolution {
        debug_assert!(state.is_terminal());
        self.state = state;
        log::debug!(
            "[LegacyConflictCheck] {} finished as {:?}",
            self.context.path.display(),
            state
        );
        ConflictResolution {
            state,
            snapshot,
            uuid: self.context.meta.uuid.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn context(uuid: &str) -> ConflictContext {
        ConflictContext {
            path: PathBuf::from("drawing.tldr"),
            meta: DocumentMeta {
                uuid: uuid.into(),
                app_version: "1.0.0".into(),
            },
        }
    }

    fn residual() -> Snapshot {
        Snapshot::from_records([("shape:legacy", json!({ "x": 9 }))])
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = MemoryLegacyStore::new();
        let resolution = LegacyConflictCheck::new(&store, context("u1"))
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolution.state, ConflictState::NotFound);
        assert_eq!(store.prompt_count(), 0);
        assert_eq!(resolution.into_initial_snapshot().unwrap(), None);
    }

    #[tokio::test]
    async fn test_keep_uses_residual_records() {
        let store = MemoryLegacyStore::new().with_state("u1", residual());
        store.set_answer(ScriptedAnswer::Keep);

        let resolution = LegacyConflictCheck::new(&store, context("u1"))
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolution.state, ConflictState::Resolved(Resolution::Keep));
        assert_eq!(resolution.into_initial_snapshot().unwrap(), Some(residual()));
        assert!(!store.contains("u1"));
    }

    #[tokio::test]
    async fn test_discard_deletes_residual_records() {
        let store = MemoryLegacyStore::new().with_state("u1", residual());

        let resolution = LegacyConflictCheck::new(&store, context("u1"))
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolution.state, ConflictState::Resolved(Resolution::Discard));
        assert!(resolution.snapshot.is_none());
        assert!(!store.contains("u1"));
    }

    #[tokio::test]
    async fn test_cancel_keeps_residual_records() {
        let store = MemoryLegacyStore::new().with_state("u1", residual());
        store.set_answer(ScriptedAnswer::Cancel);

        let resolution = LegacyConflictCheck::new(&store, context("u1"))
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolution.state, ConflictState::Cancelled);
        assert!(store.contains("u1"));
        assert!(matches!(
            resolution.into_initial_snapshot(),
            Err(CanvasDocError::ConflictResolutionCancelled { uuid }) if uuid == "u1"
        ));
    }

    #[tokio::test]
    async fn test_already_unloaded() {
        let store = MemoryLegacyStore::new().with_state("u1", residual());
        let token = CancellationToken::new();
        token.cancel();

        let resolution = LegacyConflictCheck::new(&store, context("u1"))
            .run(&token)
            .await
            .unwrap();
        assert_eq!(resolution.state, ConflictState::Unloaded);
        assert_eq!(store.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_unload_while_prompt_is_open() {
        let store = Arc::new(MemoryLegacyStore::new().with_state("u1", residual()));
        store.set_answer(ScriptedAnswer::Never);
        let token = CancellationToken::new();

        let task = {
            let store = Arc::clone(&store);
            let token = token.clone();
            tokio::spawn(async move {
                LegacyConflictCheck::new(store.as_ref(), context("u1"))
                    .run(&token)
                    .await
            })
        };

        while store.prompt_count() == 0 {
            tokio::task::yield_now().await;
        }
        token.cancel();

        let resolution = task.await.unwrap().unwrap();
        assert_eq!(resolution.state, ConflictState::Unloaded);
        assert!(store.contains("u1"));
        assert!(matches!(
            resolution.into_initial_snapshot(),
            Err(CanvasDocError::ConflictResolutionViewUnloaded { .. })
        ));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ConflictState::Checking.is_terminal());
        assert!(ConflictState::NotFound.is_terminal());
        assert!(ConflictState::Resolved(Resolution::Keep).is_terminal());
        assert!(ConflictState::Cancelled.is_terminal());
        assert!(ConflictState::Unloaded.is_terminal());
    }

    #[test]
    fn test_no_legacy_state() {
        let store = NoLegacyState;
        assert!(!futures_lite::future::block_on(store.exists("anything")).unwrap());
    }
}
