//! Creation session state machine.
//!
//! A session walks `AwaitingDescription → AwaitingReward →
//! AwaitingVisibility → Publishing`. Each state carries exactly the fields
//! captured so far, so a reward can never exist without a description.

use chrono::{DateTime, Utc};

use crate::listing::{Category, ListingDraft, Reward};

/// Progress of a creation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitingDescription,
    AwaitingReward {
        description: String,
    },
    AwaitingVisibility {
        description: String,
        reward: Reward,
    },
    /// Visibility chosen; the listing is being posted.
    Publishing {
        description: String,
        reward: Reward,
        anonymous: bool,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::AwaitingDescription => "awaiting-description",
            SessionState::AwaitingReward { .. } => "awaiting-reward",
            SessionState::AwaitingVisibility { .. } => "awaiting-visibility",
            SessionState::Publishing { .. } => "publishing",
        }
    }
}

/// Result of feeding a chat message to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOutcome {
    /// The text became the description; ask for a reward next.
    DescriptionCaptured,
    /// The text became the reward; ask for visibility next.
    RewardCaptured,
    /// Nothing left to capture (or blank text).
    Ignored,
}

/// In-progress listing draft bound to one private workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationSession {
    pub workspace_id: String,
    pub owner_id: String,
    pub category: Category,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl CreationSession {
    pub fn new(
        workspace_id: impl Into<String>,
        owner_id: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            owner_id: owner_id.into(),
            category,
            state: SessionState::AwaitingDescription,
            created_at: Utc::now(),
        }
    }

    /// Capture the next text field. First message wins for each field.
    pub fn submit_text(&mut self, text: &str) -> TextOutcome {
        if text.trim().is_empty() {
            return TextOutcome::Ignored;
        }

        match std::mem::replace(&mut self.state, SessionState::AwaitingDescription) {
            SessionState::AwaitingDescription => {
                self.state = SessionState::AwaitingReward {
                    description: text.to_string(),
                };
                TextOutcome::DescriptionCaptured
            }
            SessionState::AwaitingReward { description } => {
                self.state = SessionState::AwaitingVisibility {
                    description,
                    reward: Reward::parse(text),
                };
                TextOutcome::RewardCaptured
            }
            other => {
                self.state = other;
                TextOutcome::Ignored
            }
        }
    }

    /// Record the visibility choice and move to `Publishing`.
    ///
    /// Returns the draft to publish, or `None` if the session is not waiting
    /// for a visibility choice (including a publish already in flight).
    pub fn begin_publish(&mut self, anonymous: bool) -> Option<ListingDraft> {
        let SessionState::AwaitingVisibility {
            description,
            reward,
        } = &self.state
        else {
            return None;
        };

        let draft = ListingDraft {
            creator_id: self.owner_id.clone(),
            category: self.category,
            description: description.clone(),
            reward: reward.clone(),
            anonymous,
        };
        self.state = SessionState::Publishing {
            description: draft.description.clone(),
            reward: draft.reward.clone(),
            anonymous,
        };
        Some(draft)
    }

    /// Return a failed publish to `AwaitingVisibility` so the member can retry.
    pub fn abort_publish(&mut self) -> bool {
        match std::mem::replace(&mut self.state, SessionState::AwaitingDescription) {
            SessionState::Publishing {
                description,
                reward,
                ..
            } => {
                self.state = SessionState::AwaitingVisibility {
                    description,
                    reward,
                };
                true
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    pub fn is_publishing(&self) -> bool {
        matches!(self.state, SessionState::Publishing { .. })
    }

    pub fn description(&self) -> Option<&str> {
        match &self.state {
            SessionState::AwaitingDescription => None,
            SessionState::AwaitingReward { description }
            | SessionState::AwaitingVisibility { description, .. }
            | SessionState::Publishing { description, .. } => Some(description),
        }
    }

    pub fn reward(&self) -> Option<&Reward> {
        match &self.state {
            SessionState::AwaitingVisibility { reward, .. }
            | SessionState::Publishing { reward, .. } => Some(reward),
            _ => None,
        }
    }

    pub fn anonymous(&self) -> Option<bool> {
        match &self.state {
            SessionState::Publishing { anonymous, .. } => Some(*anonymous),
            _ => None,
        }
    }
}
