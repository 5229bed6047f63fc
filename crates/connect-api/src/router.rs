use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, favorites, gateway, messages, notifications, posts, requests, startups, users};

/// The full HTTP surface. `/auth/*`, `/health` and the gateway upgrade are
/// public; everything else needs a bearer token.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/activate", post(auth::activate))
        .route("/auth/otp", post(auth::resend_otp))
        .route("/gateway", get(gateway::gateway_upgrade));

    let protected = Router::new()
        .route(
            "/requests",
            post(requests::create_connection)
                .get(requests::list_connections)
                .patch(requests::update_connection),
        )
        .route(
            "/investment_requests",
            post(requests::create_investment)
                .get(requests::list_investments)
                .patch(requests::update_investment),
        )
        .route(
            "/favorites",
            post(favorites::add_favorite)
                .get(favorites::list_favorites)
                .delete(favorites::remove_favorite),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read", post(notifications::mark_all_read))
        .route("/chats", get(messages::list_chats).post(messages::open_chat))
        .route(
            "/chats/{id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/startups", get(startups::list_startups).post(startups::create_startup))
        .route("/startups/{id}", get(startups::get_startup))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/{id}", get(posts::get_post))
        .route("/users/me", get(users::get_me).patch(users::update_me))
        .route("/users/{id}", get(users::get_profile))
        .route("/admin/users", get(users::admin_list_users))
        .route("/admin/users/{id}", delete(users::admin_delete_user))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public.merge(protected).with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
