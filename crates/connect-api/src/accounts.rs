use std::sync::Arc;

use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use connect_db::InsertOutcome;
use connect_db::queries::NewUser;
use connect_types::api::{Claims, SessionResponse};
use connect_types::models::{Role, User};

use crate::clock::SharedClock;
use crate::error::{ServiceError, ServiceResult};
use crate::otp::{IssuedOtp, OtpService, normalize_email};
use crate::store::Store;

const MIN_PASSWORD_LEN: usize = 8;
const TOKEN_LIFETIME_DAYS: i64 = 30;

/// Input for `register`, already stripped of transport concerns.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Profile fields a user may change about themself.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Registration, activation, login and account administration.
#[derive(Clone)]
pub struct AccountService {
    store: Store,
    otp: OtpService,
    clock: SharedClock,
    jwt_secret: Arc<str>,
}

impl AccountService {
    pub fn new(store: Store, otp: OtpService, clock: SharedClock, jwt_secret: Arc<str>) -> Self {
        Self {
            store,
            otp,
            clock,
            jwt_secret,
        }
    }

    /// Creates an unverified account and mails its activation code. If the
    /// code can't be issued the account is removed again.
    pub async fn register(&self, account: NewAccount) -> ServiceResult<(User, IssuedOtp)> {
        let first_name = required_name(&account.first_name, "firstName")?;
        let last_name = required_name(&account.last_name, "lastName")?;
        let email = normalize_email(&account.email)?;
        if account.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if !account.role.may_self_register() {
            return Err(ServiceError::forbidden("admin accounts cannot be self-registered"));
        }

        let lookup = email.clone();
        if self.store.run(move |db| db.get_user_by_email(&lookup)).await?.is_some() {
            return Err(ServiceError::conflict("email is already registered"));
        }

        let password_hash = hash_password(account.password).await?;

        let id = Uuid::new_v4();
        let now = self.clock.now();
        let role = account.role;
        let key = email.clone();
        let outcome = self
            .store
            .run(move |db| {
                db.create_user(&NewUser {
                    id,
                    first_name: &first_name,
                    last_name: &last_name,
                    email: &key,
                    password_hash: &password_hash,
                    role,
                    created_at: now,
                })
            })
            .await?;
        let user = match outcome {
            InsertOutcome::Inserted(user) => user,
            InsertOutcome::Duplicate => return Err(ServiceError::conflict("email is already registered")),
        };

        match self.otp.issue(&email).await {
            Ok(issued) => {
                info!("Registered {} ({}) as {}", user.id, email, user.role);
                Ok((user, issued))
            }
            Err(e) => {
                let key = email.clone();
                if let Err(cleanup) = self.store.run(move |db| db.delete_user_by_email(&key)).await {
                    warn!("Failed to roll back registration of {}: {}", email, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Verifies the code, flags the account verified and opens a session.
    pub async fn activate(&self, email: &str, code: &str) -> ServiceResult<SessionResponse> {
        let email = normalize_email(email)?;
        self.otp.verify(&email, code).await?;

        let key = email.clone();
        let user = self
            .store
            .run(move |db| db.mark_user_verified(&key))
            .await?
            .ok_or(ServiceError::NotFound("account"))?;

        info!("Activated account {} ({})", user.id, email);
        self.session_for(&user)
    }

    /// Sends a fresh code to an existing account.
    pub async fn resend(&self, email: &str) -> ServiceResult<IssuedOtp> {
        let email = normalize_email(email)?;
        let key = email.clone();
        if self.store.run(move |db| db.get_user_by_email(&key)).await?.is_none() {
            return Err(ServiceError::NotFound("account"));
        }
        self.otp.resend(&email).await
    }

    pub async fn login(&self, email: &str, password: &str) -> ServiceResult<SessionResponse> {
        let email = normalize_email(email).map_err(|_| ServiceError::AuthRequired)?;
        let row = self
            .store
            .run(move |db| db.get_user_by_email(&email))
            .await?
            .ok_or(ServiceError::AuthRequired)?;

        verify_password(password.to_string(), row.password.clone()).await?;

        let user = row.into_user()?;
        if !user.verified {
            return Err(ServiceError::forbidden("account is not activated yet"));
        }
        self.session_for(&user)
    }

    pub async fn update_profile(&self, user_id: Uuid, changes: ProfileChanges) -> ServiceResult<User> {
        let first_name = changes
            .first_name
            .as_deref()
            .map(|n| required_name(n, "firstName"))
            .transpose()?;
        let last_name = changes
            .last_name
            .as_deref()
            .map(|n| required_name(n, "lastName"))
            .transpose()?;
        let photo_url = changes.photo_url.map(|u| u.trim().to_string());

        self.store
            .run(move |db| {
                db.update_profile(
                    user_id,
                    first_name.as_deref(),
                    last_name.as_deref(),
                    photo_url.as_deref(),
                )
            })
            .await?
            .ok_or(ServiceError::NotFound("user"))
    }

    pub async fn list_users(&self, actor: &Claims) -> ServiceResult<Vec<User>> {
        require_admin(actor)?;
        self.store.run(|db| db.list_users()).await
    }

    /// Hard-deletes `target` and everything that references it.
    pub async fn delete_user(&self, actor: &Claims, target: Uuid) -> ServiceResult<()> {
        require_admin(actor)?;
        if actor.sub == target {
            return Err(ServiceError::InvalidOperation("admins cannot delete themselves".into()));
        }
        if !self.store.run(move |db| db.delete_user(target)).await? {
            return Err(ServiceError::NotFound("user"));
        }
        info!("Admin {} deleted user {}", actor.sub, target);
        Ok(())
    }

    fn session_for(&self, user: &User) -> ServiceResult<SessionResponse> {
        let token = create_token(&self.jwt_secret, user.id, user.role)?;
        Ok(SessionResponse {
            user_id: user.id,
            role: user.role,
            token,
        })
    }
}

fn required_name(raw: &str, field: &str) -> ServiceResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        Err(ServiceError::validation(format!("{} must not be empty", field)))
    } else {
        Ok(name.to_string())
    }
}

fn require_admin(actor: &Claims) -> ServiceResult<()> {
    if actor.role.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::forbidden("admin role required"))
    }
}

/// Argon2id with a random salt. Runs on the blocking pool.
async fn hash_password(password: String) -> ServiceResult<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| anyhow!("password hashing failed: {}", e))
    })
    .await
    .map_err(|e| ServiceError::External(anyhow!("hashing task failed: {}", e)))?
    .map_err(ServiceError::External)
}

async fn verify_password(password: String, stored_hash: String) -> ServiceResult<()> {
    let matches = tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash).map_err(|e| anyhow!("corrupt password hash: {}", e))?;
        Ok::<_, anyhow::Error>(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    })
    .await
    .map_err(|e| ServiceError::External(anyhow!("hashing task failed: {}", e)))??;

    if matches {
        Ok(())
    } else {
        Err(ServiceError::AuthRequired)
    }
}

pub fn create_token(secret: &str, user_id: Uuid, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
