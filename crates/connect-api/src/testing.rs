//! Shared fixtures for the service tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use uuid::Uuid;

use connect_db::Database;
use connect_db::queries::NewUser;
use connect_gateway::Dispatcher;
use connect_types::models::{ItemType, Post, Role, Startup};

use crate::accounts::AccountService;
use crate::chat::ChatChannel;
use crate::clock::ManualClock;
use crate::favorites::FavoriteService;
use crate::identity::IdentityResolver;
use crate::ledger::RequestLedger;
use crate::mailer::{Mailer, OutgoingMail};
use crate::notifications::NotificationSink;
use crate::otp::OtpService;
use crate::posts::PostFeed;
use crate::startups::StartupCatalog;
use crate::state::{ApiSettings, AppState, AppStateInner};

pub const TEST_JWT_SECRET: &str = "test-secret";

/// Keeps every mail it is asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    /// The six-digit code from the latest mail to `to`.
    pub fn last_code(&self, to: &str) -> Option<String> {
        self.sent()
            .iter()
            .rev()
            .find(|m| m.to == to)
            .and_then(|m| m.text.split(|c: char| !c.is_ascii_digit()).find(|t| t.len() == 6).map(str::to_string))
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _mail: &OutgoingMail) -> anyhow::Result<()> {
        anyhow::bail!("relay unreachable")
    }
}

pub struct Fixture {
    pub db: Arc<Database>,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<RecordingMailer>,
    pub dispatcher: Dispatcher,
    pub state: AppState,
    pub identity: IdentityResolver,
    pub otp: OtpService,
    pub notifications: NotificationSink,
    pub ledger: RequestLedger,
    pub chats: ChatChannel,
    pub accounts: AccountService,
    pub startups: StartupCatalog,
    pub favorites: FavoriteService,
    pub posts: PostFeed,
}

impl Fixture {
    pub fn new() -> Self {
        let mailer = Arc::new(RecordingMailer::default());
        Self::build(mailer.clone(), mailer)
    }

    pub fn with_failing_mailer() -> Self {
        Self::build(Arc::new(FailingMailer), Arc::new(RecordingMailer::default()))
    }

    fn build(active: Arc<dyn Mailer>, recorder: Arc<RecordingMailer>) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()));
        let dispatcher = Dispatcher::new();
        let settings = ApiSettings {
            jwt_secret: TEST_JWT_SECRET.into(),
            otp_ttl: chrono::Duration::seconds(300),
            store_timeout: Duration::from_secs(5),
            mail_timeout: Duration::from_secs(5),
        };
        let state: AppState = Arc::new(AppStateInner::new(
            db.clone(),
            dispatcher.clone(),
            active,
            clock.clone(),
            settings,
        ));

        Self {
            identity: state.identity.clone(),
            otp: state.otp.clone(),
            notifications: state.notifications.clone(),
            ledger: state.ledger.clone(),
            chats: state.chats.clone(),
            accounts: state.accounts.clone(),
            startups: state.startups.clone(),
            favorites: state.favorites.clone(),
            posts: state.posts.clone(),
            db,
            clock,
            mailer: recorder,
            dispatcher,
            state,
        }
    }

    /// A verified account.
    pub fn user(&self, first_name: &str, last_name: &str, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        let email = format!("{}@example.com", id.simple());
        self.db
            .create_user(&NewUser {
                id,
                first_name,
                last_name,
                email: &email,
                password_hash: "not-a-real-hash",
                role,
                created_at: Utc::now(),
            })
            .unwrap();
        self.db.mark_user_verified(&email).unwrap();
        id
    }

    pub fn startup(&self, owner_id: Uuid, name: &str) -> Uuid {
        let startup = Startup {
            id: Uuid::new_v4(),
            name: name.into(),
            description: "Test startup".into(),
            pitch_deck: None,
            owner_id,
            industry: None,
            location: None,
            funding_stage: None,
            created_at: Utc::now(),
        };
        self.db.insert_startup(&startup).unwrap();
        startup.id
    }

    /// A feed post by `author`. Startup posts get a startup of their own.
    pub fn post(&self, author: Uuid, kind: ItemType) -> Uuid {
        let startup_id = match kind {
            ItemType::Startup => Some(self.startup(author, "Posted startup")),
            ItemType::Investment => None,
        };
        let post = Post {
            id: Uuid::new_v4(),
            user_id: author,
            kind,
            title: "Test post".into(),
            description: "Looking for partners".into(),
            startup_id,
            created_at: Utc::now(),
        };
        self.db.insert_post(&post).unwrap();
        post.id
    }

    /// Makes every later notification insert fail.
    pub fn break_notification_writes(&self) {
        self.db
            .with_conn(|conn| Ok(conn.execute_batch("DROP TABLE notifications")?))
            .unwrap();
    }

    /// Makes every later user lookup fail while leaving the ids valid for
    /// foreign keys.
    pub fn break_user_lookups(&self) {
        self.db
            .with_conn(|conn| Ok(conn.execute_batch("ALTER TABLE users RENAME COLUMN first_name TO given_name")?))
            .unwrap();
    }
}
