use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// Contact details of a wallet owner, used for self-transfer detection and
/// deposit checkouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
}
