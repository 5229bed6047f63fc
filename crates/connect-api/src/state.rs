use std::sync::Arc;
use std::time::Duration;

use connect_db::Database;
use connect_gateway::Dispatcher;

use crate::accounts::AccountService;
use crate::chat::ChatChannel;
use crate::clock::SharedClock;
use crate::favorites::FavoriteService;
use crate::identity::IdentityResolver;
use crate::ledger::RequestLedger;
use crate::mailer::Mailer;
use crate::notifications::NotificationSink;
use crate::otp::OtpService;
use crate::posts::PostFeed;
use crate::startups::StartupCatalog;
use crate::store::Store;

pub type AppState = Arc<AppStateInner>;

/// Knobs the binary reads from its environment.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub jwt_secret: String,
    pub otp_ttl: chrono::Duration,
    pub store_timeout: Duration,
    pub mail_timeout: Duration,
}

pub struct AppStateInner {
    pub jwt_secret: String,
    pub store: Store,
    pub dispatcher: Dispatcher,
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

impl AppStateInner {
    /// Wires every service onto one store, dispatcher and clock.
    pub fn new(
        db: Arc<Database>,
        dispatcher: Dispatcher,
        mailer: Arc<dyn Mailer>,
        clock: SharedClock,
        settings: ApiSettings,
    ) -> Self {
        let store = Store::new(db, settings.store_timeout);
        let identity = IdentityResolver::new(store.clone());
        let otp = OtpService::new(
            store.clone(),
            mailer,
            clock.clone(),
            settings.otp_ttl,
            settings.mail_timeout,
        );
        let notifications = NotificationSink::new(store.clone(), dispatcher.clone(), identity.clone(), clock.clone());
        let posts = PostFeed::new(store.clone(), identity.clone(), clock.clone());
        let ledger = RequestLedger::new(store.clone(), identity.clone(), notifications.clone(), clock.clone());
        let chats = ChatChannel::new(
            store.clone(),
            identity.clone(),
            notifications.clone(),
            dispatcher.clone(),
            clock.clone(),
        );
        let accounts = AccountService::new(
            store.clone(),
            otp.clone(),
            clock.clone(),
            Arc::from(settings.jwt_secret.as_str()),
        );
        let startups = StartupCatalog::new(store.clone(), clock.clone());
        let favorites = FavoriteService::new(store.clone(), clock);

        Self {
            jwt_secret: settings.jwt_secret,
            store,
            dispatcher,
            identity,
            otp,
            notifications,
            ledger,
            chats,
            accounts,
            startups,
            favorites,
            posts,
        }
    }
}
