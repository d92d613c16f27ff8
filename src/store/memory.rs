//! Process-local store backed by tokio `RwLock` maps.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::interview::InterviewSession;
use crate::memory::MemoryProfile;
use crate::research::{ResearchCache, ResearchContext};
use crate::store::traits::InterviewStore;

/// In-memory `InterviewStore` and `ResearchCache`. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<Uuid, InterviewSession>>,
    profiles: RwLock<HashMap<String, MemoryProfile>>,
    research: RwLock<HashMap<String, ResearchContext>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn research_count(&self) -> usize {
        self.research.read().await.len()
    }
}

#[async_trait]
impl InterviewStore for MemoryStore {
    async fn load_session(&self, id: Uuid) -> Result<Option<InterviewSession>, DatabaseError> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn save_session(&self, session: &InterviewSession) -> Result<(), DatabaseError> {
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn load_profile(&self, user_id: &str) -> Result<Option<MemoryProfile>, DatabaseError> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn save_profile(&self, profile: &MemoryProfile) -> Result<(), DatabaseError> {
        self.profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

#[async_trait]
impl ResearchCache for MemoryStore {
    async fn get_research(&self, key: &str) -> Result<Option<ResearchContext>, DatabaseError> {
        Ok(self.research.read().await.get(key).cloned())
    }

    async fn put_research(
        &self,
        key: &str,
        context: &ResearchContext,
    ) -> Result<(), DatabaseError> {
        self.research
            .write()
            .await
            .insert(key.to_string(), context.clone());
        Ok(())
    }
}
