//! Canonical user records
//!
//! The directory is owned by the wider application; this crate only reads
//! users (and their live approval/admin flags) through [`UserDirectory`].

use async_trait::async_trait;
use handoff_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A canonical user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub limited_access: bool,
    #[serde(default)]
    pub admin: bool,
}

impl User {
    /// An approved, non-admin user
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: None,
            image: None,
            approved: true,
            limited_access: false,
            admin: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }
}

/// Lookup of canonical users
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch a user by id. `Ok(None)` when the user does not exist.
    async fn get_user(&self, id: &str) -> Result<Option<User>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredUsers {
    users: HashMap<String, User>,
}

/// User directory backed by a JSON file (or memory only)
pub struct FileUserDirectory {
    path: Option<PathBuf>,
    data: RwLock<StoredUsers>,
}

impl FileUserDirectory {
    /// Directory that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(StoredUsers::default()),
        }
    }

    /// Load the directory from `path`, creating it on first write
    pub fn with_path(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&contents) {
                Ok(data) => {
                    info!("Loaded user directory from {:?}", path);
                    data
                }
                Err(e) => {
                    warn!("Failed to parse user directory, starting empty: {}", e);
                    StoredUsers::default()
                }
            }
        } else {
            debug!("No existing user directory, creating new");
            StoredUsers::default()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    fn persist(&self, data: &StoredUsers) -> Result<()> {
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(data)?;
            std::fs::write(path, json)?;
            debug!("Saved user directory to {:?}", path);
        }
        Ok(())
    }

    /// Add or replace a user
    pub async fn upsert(&self, user: User) -> Result<()> {
        if user.id.trim().is_empty() {
            return Err(Error::validation("user id is required"));
        }
        let mut data = self.data.write().await;
        let id = user.id.clone();
        let previous = data.users.insert(id.clone(), user);

        if let Err(e) = self.persist(&data) {
            match previous {
                Some(previous) => data.users.insert(id, previous),
                None => data.users.remove(&id),
            };
            return Err(e);
        }
        info!("Saved user {}", id);
        Ok(())
    }

    /// Update a user's authorization flags in place
    pub async fn set_flags(&self, id: &str, approved: bool, admin: bool) -> Result<User> {
        let mut data = self.data.write().await;
        let user = data
            .users
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("User {} not found", id)))?;
        let previous = user.clone();
        user.approved = approved;
        user.admin = admin;
        let updated = user.clone();

        if let Err(e) = self.persist(&data) {
            data.users.insert(id.to_string(), previous);
            return Err(e);
        }
        Ok(updated)
    }

    /// Remove a user
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut data = self.data.write().await;
        let Some(previous) = data.users.remove(id) else {
            return Err(Error::NotFound(format!("User {} not found", id)));
        };

        if let Err(e) = self.persist(&data) {
            data.users.insert(id.to_string(), previous);
            return Err(e);
        }
        info!("Removed user {}", id);
        Ok(())
    }

    pub async fn list(&self) -> Vec<User> {
        self.data.read().await.users.values().cloned().collect()
    }
}

#[async_trait]
impl UserDirectory for FileUserDirectory {
    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.data.read().await.users.get(id).cloned())
    }
}
