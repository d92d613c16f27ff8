//! `InterviewStore` trait: single async interface for session and profile persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::interview::InterviewSession;
use crate::memory::MemoryProfile;

/// Backend-agnostic persistence for sessions and memory profiles.
#[async_trait]
pub trait InterviewStore: Send + Sync {
    /// Get a session by ID.
    async fn load_session(&self, id: Uuid) -> Result<Option<InterviewSession>, DatabaseError>;

    /// Insert or replace a session.
    async fn save_session(&self, session: &InterviewSession) -> Result<(), DatabaseError>;

    /// Get a user's profile, if one has been saved.
    async fn load_profile(&self, user_id: &str) -> Result<Option<MemoryProfile>, DatabaseError>;

    /// Insert or replace a profile.
    async fn save_profile(&self, profile: &MemoryProfile) -> Result<(), DatabaseError>;
}
