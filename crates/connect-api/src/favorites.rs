use axum::{Extension, Json, extract::State, http::StatusCode};
use uuid::Uuid;

use connect_db::InsertOutcome;
use connect_types::api::{
    AddFavoriteRequest, Claims, FavoriteCreatedResponse, MessageResponse, RemoveFavoriteRequest, UserQuery,
};
use connect_types::models::Favorite;

use crate::clock::SharedClock;
use crate::error::{ApiJson, ApiQuery, ServiceError, ServiceResult};
use crate::requests::own_user_id;
use crate::state::AppState;
use crate::store::Store;

/// Startups a user has bookmarked.
#[derive(Clone)]
pub struct FavoriteService {
    store: Store,
    clock: SharedClock,
}

impl FavoriteService {
    pub fn new(store: Store, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    pub async fn add(&self, user_id: Uuid, startup_id: Uuid) -> ServiceResult<Favorite> {
        let id = Uuid::new_v4();
        let now = self.clock.now();
        let outcome = self
            .store
            .run(move |db| {
                if db.get_startup(startup_id)?.is_none() {
                    return Ok(None);
                }
                db.insert_favorite(id, user_id, startup_id, now).map(Some)
            })
            .await?;

        match outcome {
            None => Err(ServiceError::NotFound("startup")),
            Some(InsertOutcome::Inserted(favorite)) => Ok(favorite),
            Some(InsertOutcome::Duplicate) => Err(ServiceError::conflict("startup is already a favorite")),
        }
    }

    pub async fn list(&self, user_id: Uuid) -> ServiceResult<Vec<Favorite>> {
        self.store.run(move |db| db.list_favorites(user_id)).await
    }

    pub async fn remove(&self, user_id: Uuid, favorite_id: Uuid) -> ServiceResult<()> {
        let favorite = self
            .store
            .run(move |db| db.get_favorite(favorite_id))
            .await?
            .ok_or(ServiceError::NotFound("favorite"))?;
        if favorite.user_id != user_id {
            return Err(ServiceError::forbidden("favorite belongs to another user"));
        }
        self.store.run(move |db| db.delete_favorite(favorite_id)).await?;
        Ok(())
    }
}

// -- Handlers --

pub async fn add_favorite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<AddFavoriteRequest>,
) -> ServiceResult<(StatusCode, Json<FavoriteCreatedResponse>)> {
    let startup_id = req.startup_id.ok_or_else(|| ServiceError::missing("startupId"))?;
    let user_id = req.user_id.unwrap_or(claims.sub);
    if user_id != claims.sub {
        return Err(ServiceError::forbidden("userId must be the signed-in user"));
    }

    let favorite = state.favorites.add(user_id, startup_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(FavoriteCreatedResponse {
            favorite_id: favorite.id,
        }),
    ))
}

pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> ServiceResult<Json<Vec<Favorite>>> {
    let user_id = own_user_id(&claims, query.user_id)?;
    Ok(Json(state.favorites.list(user_id).await?))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<RemoveFavoriteRequest>,
) -> ServiceResult<Json<MessageResponse>> {
    let favorite_id = req.favorite_id.ok_or_else(|| ServiceError::missing("favoriteId"))?;
    state.favorites.remove(claims.sub, favorite_id).await?;
    Ok(Json(MessageResponse {
        message: "Favorite removed".into(),
    }))
}
