use tracing::warn;
use uuid::Uuid;

use connect_types::models::{Profile, User};

use crate::error::{ServiceError, ServiceResult};
use crate::store::Store;

/// Turns user ids into the names and roles shown next to requests,
/// notifications and chats.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Store,
}

impl IdentityResolver {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, user_id: Uuid) -> ServiceResult<Option<Profile>> {
        let user = self.store.run(move |db| db.get_user(user_id)).await?;
        Ok(user.as_ref().map(profile_of))
    }

    /// Like `resolve`, but an unknown id is an error.
    pub async fn require(&self, user_id: Uuid) -> ServiceResult<Profile> {
        self.resolve(user_id).await?.ok_or(ServiceError::NotFound("user"))
    }

    /// Always yields a name. Unknown ids get the placeholder form.
    pub async fn display_name(&self, user_id: Uuid) -> ServiceResult<String> {
        Ok(match self.resolve(user_id).await? {
            Some(profile) => profile.display_name,
            None => fallback_name(user_id),
        })
    }

    /// For texts written after a change was already committed: a lookup
    /// failure is logged and the placeholder name is used.
    pub async fn name_or_fallback(&self, user_id: Uuid) -> String {
        match self.display_name(user_id).await {
            Ok(name) => name,
            Err(e) => {
                warn!("Could not resolve name for {}: {}", user_id, e);
                fallback_name(user_id)
            }
        }
    }
}

pub fn profile_of(user: &User) -> Profile {
    Profile {
        id: user.id,
        display_name: display_name_for(&user.first_name, &user.last_name, user.id),
        role: Some(user.role),
        verified: user.verified,
        photo_url: user.photo_url.clone(),
    }
}

pub fn display_name_for(first_name: &str, last_name: &str, user_id: Uuid) -> String {
    let full = format!("{} {}", first_name.trim(), last_name.trim());
    let full = full.trim();
    if full.is_empty() {
        fallback_name(user_id)
    } else {
        full.to_string()
    }
}

pub fn fallback_name(user_id: Uuid) -> String {
    let id = user_id.to_string();
    format!("User_{}", &id[..8])
}
