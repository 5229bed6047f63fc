use axum::{Extension, Json, extract::State, http::StatusCode};
use tracing::info;
use uuid::Uuid;

use connect_types::api::{Claims, CreateStartupRequest, StartupQuery};
use connect_types::models::{ItemType, Post, Startup};

use crate::clock::SharedClock;
use crate::error::{ApiJson, ApiPath, ApiQuery, ServiceError, ServiceResult};
use crate::state::AppState;
use crate::store::Store;

/// Startup listings. Only entrepreneurs create them; everyone reads them.
/// Each new listing is also announced as a startup post in the feed.
#[derive(Clone)]
pub struct StartupCatalog {
    store: Store,
    clock: SharedClock,
}

impl StartupCatalog {
    pub fn new(store: Store, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    pub async fn create(&self, owner: &Claims, req: CreateStartupRequest) -> ServiceResult<Startup> {
        if !owner.role.may_own_startups() {
            return Err(ServiceError::forbidden("only entrepreneurs can list startups"));
        }

        let name = non_blank(req.name).ok_or_else(|| ServiceError::missing("name"))?;
        let description = non_blank(req.description).ok_or_else(|| ServiceError::missing("description"))?;

        let startup = Startup {
            id: Uuid::new_v4(),
            name,
            description,
            pitch_deck: non_blank(req.pitch_deck),
            owner_id: owner.sub,
            industry: non_blank(req.industry),
            location: non_blank(req.location),
            funding_stage: non_blank(req.funding_stage),
            created_at: self.clock.now(),
        };

        let post = Post {
            id: Uuid::new_v4(),
            user_id: owner.sub,
            kind: ItemType::Startup,
            title: startup.name.clone(),
            description: startup.description.clone(),
            startup_id: Some(startup.id),
            created_at: startup.created_at,
        };

        let row = startup.clone();
        self.store
            .run(move |db| db.insert_startup_with_post(&row, &post))
            .await?;
        info!("Startup {} '{}' listed by {}", startup.id, startup.name, owner.sub);
        Ok(startup)
    }

    /// Every startup, or only those of `owner_id`.
    pub async fn list(&self, owner_id: Option<Uuid>) -> ServiceResult<Vec<Startup>> {
        match owner_id {
            Some(owner_id) => self.store.run(move |db| db.list_startups_by_owner(owner_id)).await,
            None => self.store.run(|db| db.list_startups()).await,
        }
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<Startup> {
        self.store
            .run(move |db| db.get_startup(id))
            .await?
            .ok_or(ServiceError::NotFound("startup"))
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// -- Handlers --

pub async fn create_startup(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateStartupRequest>,
) -> ServiceResult<(StatusCode, Json<Startup>)> {
    let startup = state.startups.create(&claims, req).await?;
    Ok((StatusCode::CREATED, Json(startup)))
}

pub async fn list_startups(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StartupQuery>,
) -> ServiceResult<Json<Vec<Startup>>> {
    Ok(Json(state.startups.list(query.owner_id).await?))
}

pub async fn get_startup(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ServiceResult<Json<Startup>> {
    Ok(Json(state.startups.get(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use connect_types::models::Role;

    fn claims(sub: Uuid, role: Role) -> Claims {
        Claims { sub, role, exp: 0 }
    }

    fn request(name: &str) -> CreateStartupRequest {
        CreateStartupRequest {
            name: Some(name.into()),
            description: Some("Mechanical computing".into()),
            pitch_deck: Some("  ".into()),
            industry: Some("hardware".into()),
            location: None,
            funding_stage: None,
        }
    }

    #[tokio::test]
    async fn entrepreneurs_list_startups() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let grace = fx.user("Grace", "Hopper", Role::Investor);

        let created = fx
            .startups
            .create(&claims(ada, Role::Entrepreneur), request("Engines"))
            .await
            .unwrap();
        assert_eq!(created.owner_id, ada);
        assert_eq!(created.pitch_deck, None);

        assert!(matches!(
            fx.startups.create(&claims(grace, Role::Investor), request("Nope")).await,
            Err(ServiceError::Forbidden(_))
        ));

        let mut nameless = request("");
        nameless.name = None;
        assert!(matches!(
            fx.startups.create(&claims(ada, Role::Entrepreneur), nameless).await,
            Err(ServiceError::Validation(_))
        ));

        assert_eq!(fx.startups.list(None).await.unwrap().len(), 1);
        assert_eq!(fx.startups.list(Some(ada)).await.unwrap().len(), 1);
        assert!(fx.startups.list(Some(grace)).await.unwrap().is_empty());

        let feed = fx.posts.list(None).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].post.startup_id, Some(created.id));
        assert_eq!(feed[0].post.title, "Engines");
        assert_eq!(fx.startups.get(created.id).await.unwrap().name, "Engines");
        assert!(matches!(
            fx.startups.get(Uuid::new_v4()).await,
            Err(ServiceError::NotFound("startup"))
        ));
    }
}
