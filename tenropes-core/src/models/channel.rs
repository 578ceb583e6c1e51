use serde::{Deserialize, Serialize};

use crate::models::ChannelId;
use crate::theme::AuthoredTheme;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub img: String,
    #[serde(default)]
    pub status: String,
}

impl UserMetadata {
    /// Name shown next to a message, the username when no display name is set.
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.username
        } else {
            &self.display_name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMetadata {
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub img: String,
    #[serde(default)]
    pub creator: String,
    // channels created before themes existed have none
    #[serde(default)]
    pub theme: Option<AuthoredTheme>,
    #[serde(default)]
    pub users: Vec<String>,
}

impl ChannelMetadata {
    pub fn theme_or_default(&self) -> AuthoredTheme {
        self.theme.clone().unwrap_or_default()
    }
}
