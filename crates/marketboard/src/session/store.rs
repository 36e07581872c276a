//! Store of in-progress creation sessions, keyed by workspace id.
//!
//! State changes run inside `DashMap` entry access, so each check and write
//! on one workspace is atomic with respect to concurrent events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::error::SessionError;
use super::state::{CreationSession, TextOutcome};
use crate::listing::{Category, ListingDraft};

/// Sessions by workspace id. Cheap to clone.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, CreationSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for a freshly created workspace.
    pub fn start(
        &self,
        workspace_id: &str,
        owner_id: &str,
        category: Category,
    ) -> Result<(), SessionError> {
        match self.sessions.entry(workspace_id.to_string()) {
            Entry::Occupied(_) => Err(SessionError::DuplicateSession {
                workspace_id: workspace_id.to_string(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(CreationSession::new(workspace_id, owner_id, category));
                debug!(workspace_id = %workspace_id, owner_id = %owner_id, category = %category, "Session started");
                Ok(())
            }
        }
    }

    /// Feed chat text to the workspace's session. `None` if there is no session.
    pub fn submit_text(&self, workspace_id: &str, text: &str) -> Option<TextOutcome> {
        let mut session = self.sessions.get_mut(workspace_id)?;
        Some(session.submit_text(text))
    }

    /// Claim the session for publishing. At most one caller gets the draft.
    pub fn begin_publish(&self, workspace_id: &str, anonymous: bool) -> Option<ListingDraft> {
        self.sessions
            .get_mut(workspace_id)
            .and_then(|mut session| session.begin_publish(anonymous))
    }

    /// Undo [`begin_publish`](Self::begin_publish) after a failed post.
    pub fn abort_publish(&self, workspace_id: &str) -> bool {
        self.sessions
            .get_mut(workspace_id)
            .is_some_and(|mut session| session.abort_publish())
    }

    /// Remove a session whose listing has been published.
    pub fn finish(&self, workspace_id: &str) -> Option<CreationSession> {
        self.sessions
            .remove_if(workspace_id, |_, session| session.is_publishing())
            .map(|(_, session)| session)
    }

    /// Remove a session regardless of its state (workspace gone).
    pub fn remove(&self, workspace_id: &str) -> Option<CreationSession> {
        self.sessions.remove(workspace_id).map(|(_, session)| session)
    }

    /// Remove and return sessions created before `cutoff`.
    ///
    /// Sessions in the middle of publishing are left alone.
    pub fn expire_created_before(&self, cutoff: DateTime<Utc>) -> Vec<CreationSession> {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.created_at < cutoff && !s.is_publishing())
            .map(|s| s.key().clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| {
                self.sessions
                    .remove_if(&id, |_, s| s.created_at < cutoff && !s.is_publishing())
                    .map(|(_, session)| session)
            })
            .collect()
    }

    pub fn get(&self, workspace_id: &str) -> Option<CreationSession> {
        self.sessions.get(workspace_id).map(|s| s.clone())
    }

    pub fn contains(&self, workspace_id: &str) -> bool {
        self.sessions.contains_key(workspace_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
