use std::collections::HashMap;

use axum::{Extension, Json, extract::State, http::StatusCode};
use tracing::info;
use uuid::Uuid;

use connect_types::api::{Claims, CreatePostRequest, PostQuery, PostView};
use connect_types::models::{ItemType, Post, Profile};

use crate::clock::SharedClock;
use crate::error::{ApiJson, ApiPath, ApiQuery, ServiceError, ServiceResult};
use crate::identity::{IdentityResolver, fallback_name};
use crate::startups::non_blank;
use crate::state::AppState;
use crate::store::Store;

/// The newsfeed. Startup posts are written by `StartupCatalog::create`;
/// investors post investment offers here.
#[derive(Clone)]
pub struct PostFeed {
    store: Store,
    identity: IdentityResolver,
    clock: SharedClock,
}

impl PostFeed {
    pub fn new(store: Store, identity: IdentityResolver, clock: SharedClock) -> Self {
        Self { store, identity, clock }
    }

    pub async fn create(&self, author: &Claims, req: CreatePostRequest) -> ServiceResult<Post> {
        if !author.role.may_post_investments() {
            return Err(ServiceError::forbidden(
                "only investors can post investment offers; startup posts come with a startup listing",
            ));
        }

        let title = non_blank(req.title).ok_or_else(|| ServiceError::missing("title"))?;
        let description = non_blank(req.description).ok_or_else(|| ServiceError::missing("description"))?;

        let post = Post {
            id: Uuid::new_v4(),
            user_id: author.sub,
            kind: ItemType::Investment,
            title,
            description,
            startup_id: None,
            created_at: self.clock.now(),
        };

        let row = post.clone();
        self.store.run(move |db| db.insert_post(&row)).await?;
        info!("Post {} '{}' by {}", post.id, post.title, author.sub);
        Ok(post)
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<Post> {
        self.store
            .run(move |db| db.get_post(id))
            .await?
            .ok_or(ServiceError::NotFound("post"))
    }

    /// Newest first, with author names resolved.
    pub async fn list(&self, limit: Option<usize>) -> ServiceResult<Vec<PostView>> {
        if limit == Some(0) {
            return Err(ServiceError::validation("limit must be positive"));
        }
        let posts = self.store.run(move |db| db.list_posts(limit)).await?;

        let mut authors: HashMap<Uuid, Option<Profile>> = HashMap::new();
        let mut views = Vec::with_capacity(posts.len());
        for post in posts {
            if !authors.contains_key(&post.user_id) {
                let profile = self.identity.resolve(post.user_id).await?;
                authors.insert(post.user_id, profile);
            }
            let author = authors.get(&post.user_id).and_then(Option::as_ref);
            views.push(PostView {
                user_name: author.map_or_else(|| fallback_name(post.user_id), |p| p.display_name.clone()),
                user_photo_url: author.and_then(|p| p.photo_url.clone()),
                post,
            });
        }
        Ok(views)
    }
}

// -- Handlers --

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreatePostRequest>,
) -> ServiceResult<(StatusCode, Json<Post>)> {
    let post = state.posts.create(&claims, req).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn list_posts(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PostQuery>,
) -> ServiceResult<Json<Vec<PostView>>> {
    Ok(Json(state.posts.list(query.limit).await?))
}

pub async fn get_post(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ServiceResult<Json<Post>> {
    Ok(Json(state.posts.get(id).await?))
}
