use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::traits::UserDirectory;
use crate::types::{LedgerError, UserId, UserProfile};

/// In-memory user profiles
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: DashMap<UserId, UserProfile>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn get(&self, user_id: UserId) -> Result<Option<UserProfile>, LedgerError> {
        Ok(self.users.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, profile: UserProfile) -> Result<(), LedgerError> {
        self.users.insert(profile.id, profile);
        Ok(())
    }
}
