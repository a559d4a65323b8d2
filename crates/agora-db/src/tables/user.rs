use agora_core::Timestamp;
use bincode::{Decode, Encode};
use serde::Serialize;

#[derive(Encode, Decode, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
    Superadmin,
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub role: UserRole,
    /// Profile visible in the public directory.
    pub public: bool,
    pub created_at: Timestamp,
}
