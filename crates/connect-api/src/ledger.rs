use tracing::info;
use uuid::Uuid;

use connect_db::{InsertOutcome, TransitionOutcome};
use connect_types::api::{ConnectionRequestsResponse, InvestmentRequestsResponse};
use connect_types::models::{ConnectionRequest, InvestmentRequest, NotificationKind, RequestStatus};

use crate::clock::SharedClock;
use crate::error::{ServiceError, ServiceResult};
use crate::identity::IdentityResolver;
use crate::notifications::NotificationSink;
use crate::store::Store;

/// Connection and investment requests. Both kinds start `pending` and move
/// exactly once, to `accepted` or `rejected`.
#[derive(Clone)]
pub struct RequestLedger {
    store: Store,
    identity: IdentityResolver,
    notifications: NotificationSink,
    clock: SharedClock,
}

impl RequestLedger {
    pub fn new(store: Store, identity: IdentityResolver, notifications: NotificationSink, clock: SharedClock) -> Self {
        Self {
            store,
            identity,
            notifications,
            clock,
        }
    }

    // -- Connection requests --

    pub async fn create_connection(&self, sender_id: Uuid, receiver_id: Uuid) -> ServiceResult<ConnectionRequest> {
        if sender_id == receiver_id {
            return Err(ServiceError::InvalidOperation(
                "cannot send a connection request to yourself".into(),
            ));
        }

        self.identity.require(receiver_id).await?;
        let sender = self.identity.require(sender_id).await?;
        if !sender.role.is_some_and(|r| r.may_connect()) {
            return Err(ServiceError::forbidden("only entrepreneurs and investors can send connection requests"));
        }

        let id = Uuid::new_v4();
        let now = self.clock.now();
        let request = match self
            .store
            .run(move |db| db.insert_connection_request(id, sender_id, receiver_id, now))
            .await?
        {
            InsertOutcome::Inserted(request) => request,
            InsertOutcome::Duplicate => {
                return Err(ServiceError::conflict(
                    "a pending connection request to this user already exists",
                ));
            }
        };

        info!("Connection request {} from {} to {}", request.id, sender_id, receiver_id);
        self.notifications
            .notify_best_effort(
                receiver_id,
                NotificationKind::RequestReceived,
                sender_id,
                format!("New connection request from {}", sender.display_name),
            )
            .await;

        Ok(request)
    }

    /// Settles a connection request on behalf of its receiver.
    pub async fn respond_connection(
        &self,
        responder_id: Uuid,
        request_id: Uuid,
        status: RequestStatus,
    ) -> ServiceResult<ConnectionRequest> {
        ensure_outcome(status)?;
        let request = self
            .store
            .run(move |db| db.get_connection_request(request_id))
            .await?
            .ok_or(ServiceError::NotFound("connection request"))?;
        if request.receiver_id != responder_id {
            return Err(ServiceError::forbidden("only the receiver can respond to this request"));
        }
        self.transition_connection(request_id, status).await
    }

    pub async fn transition_connection(&self, request_id: Uuid, to: RequestStatus) -> ServiceResult<ConnectionRequest> {
        let kind = ensure_outcome(to).map(NotificationKind::connection_outcome)?;
        let now = self.clock.now();
        let request = match self
            .store
            .run(move |db| db.transition_connection_request(request_id, to, now))
            .await?
        {
            TransitionOutcome::Updated(request) => request,
            TransitionOutcome::NotFound => return Err(ServiceError::NotFound("connection request")),
            TransitionOutcome::NotPending(from) => return Err(ServiceError::InvalidTransition { from, to }),
        };

        info!("Connection request {} {}", request.id, to);
        if let Some(kind) = kind {
            let responder = self.identity.name_or_fallback(request.receiver_id).await;
            self.notifications
                .notify_best_effort(
                    request.sender_id,
                    kind,
                    request.receiver_id,
                    format!("{} {} your connection request", responder, to),
                )
                .await;
        }

        Ok(request)
    }

    /// Newest first.
    pub async fn list_connections(&self, user_id: Uuid) -> ServiceResult<ConnectionRequestsResponse> {
        self.store
            .run(move |db| {
                Ok(ConnectionRequestsResponse {
                    sent: db.list_connection_requests_sent(user_id)?,
                    received: db.list_connection_requests_received(user_id)?,
                })
            })
            .await
    }

    // -- Investment requests --

    pub async fn create_investment(
        &self,
        startup_id: Uuid,
        investor_id: Uuid,
        owner_id: Uuid,
    ) -> ServiceResult<InvestmentRequest> {
        let startup = self
            .store
            .run(move |db| db.get_startup(startup_id))
            .await?
            .ok_or(ServiceError::NotFound("startup"))?;
        if startup.owner_id != owner_id {
            return Err(ServiceError::validation("ownerId does not match the startup's owner"));
        }

        let investor = self.identity.require(investor_id).await?;
        if !investor.role.is_some_and(|r| r.may_request_investment()) {
            return Err(ServiceError::forbidden("only investors can send investment requests"));
        }

        let id = Uuid::new_v4();
        let now = self.clock.now();
        let request = match self
            .store
            .run(move |db| db.insert_investment_request(id, startup_id, investor_id, owner_id, now))
            .await?
        {
            InsertOutcome::Inserted(request) => request,
            InsertOutcome::Duplicate => {
                return Err(ServiceError::conflict(
                    "a pending investment request for this startup already exists",
                ));
            }
        };

        info!("Investment request {} from {} for startup {}", request.id, investor_id, startup_id);
        self.notifications
            .notify_best_effort(
                owner_id,
                NotificationKind::InvestmentRequestReceived,
                investor_id,
                format!("New investment request from {} for {}", investor.display_name, startup.name),
            )
            .await;

        Ok(request)
    }

    /// Settles an investment request on behalf of the startup owner.
    pub async fn respond_investment(
        &self,
        responder_id: Uuid,
        request_id: Uuid,
        status: RequestStatus,
    ) -> ServiceResult<InvestmentRequest> {
        ensure_outcome(status)?;
        let request = self
            .store
            .run(move |db| db.get_investment_request(request_id))
            .await?
            .ok_or(ServiceError::NotFound("investment request"))?;
        if request.owner_id != responder_id {
            return Err(ServiceError::forbidden("only the startup owner can respond to this request"));
        }
        self.transition_investment(request_id, status).await
    }

    pub async fn transition_investment(&self, request_id: Uuid, to: RequestStatus) -> ServiceResult<InvestmentRequest> {
        let kind = ensure_outcome(to).map(NotificationKind::investment_outcome)?;
        let now = self.clock.now();
        let request = match self
            .store
            .run(move |db| db.transition_investment_request(request_id, to, now))
            .await?
        {
            TransitionOutcome::Updated(request) => request,
            TransitionOutcome::NotFound => return Err(ServiceError::NotFound("investment request")),
            TransitionOutcome::NotPending(from) => return Err(ServiceError::InvalidTransition { from, to }),
        };

        info!("Investment request {} {}", request.id, to);
        if let Some(kind) = kind {
            let owner = self.identity.name_or_fallback(request.owner_id).await;
            self.notifications
                .notify_best_effort(
                    request.investor_id,
                    kind,
                    request.owner_id,
                    format!("{} {} your investment request", owner, to),
                )
                .await;
        }

        Ok(request)
    }

    pub async fn list_investments(&self, owner_id: Uuid) -> ServiceResult<InvestmentRequestsResponse> {
        let received = self
            .store
            .run(move |db| db.list_investment_requests_received(owner_id))
            .await?;
        Ok(InvestmentRequestsResponse { received })
    }
}

/// Only terminal states are valid targets.
fn ensure_outcome(status: RequestStatus) -> ServiceResult<RequestStatus> {
    if status.is_terminal() {
        Ok(status)
    } else {
        Err(ServiceError::validation("status must be 'accepted' or 'rejected'"))
    }
}
