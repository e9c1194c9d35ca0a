use serde::{Deserialize, Serialize};

use crate::DomainResult;

/// Denormalized sender shape rendered into timeline items. The profile
/// catalog itself is owned by a collaborator service; this side only reads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileSummary {
    pub user_id: String,
    pub display_name: String,
    pub title: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileSummary {
    /// Placeholder used when the catalog has no row for a sender.
    pub fn bare(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            display_name: user_id.clone(),
            user_id,
            title: None,
            avatar_url: None,
        }
    }
}

pub trait ProfileRepository: Send + Sync {
    fn get_profile(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<ProfileSummary>>>;
}
