use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::warn;
use uuid::Uuid;

use parley_db::models::{ConnectOutcome, ConnectionRequestRow};
use parley_types::api::{
    Claims, ConnectionAction, ConnectionListResponse, ConnectionRequestView,
    RespondConnectionRequest,
};
use parley_types::models::ConnectionStatus;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Send a connection request. Costs the sender one connect credit;
/// a pending or accepted request already linking the pair is rejected.
pub async fn send_connection_request(
    State(state): State<AppState>,
    Path(receiver_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<(StatusCode, Json<ConnectionRequestView>), ApiError> {
    if receiver_id == claims.sub {
        return Err(ApiError::Validation(
            "cannot send a connection request to yourself".into(),
        ));
    }

    let db = state.clone();
    let rid = receiver_id.to_string();
    let receiver = blocking(move || db.db.get_user_by_id(&rid))
        .await?
        .ok_or(ApiError::NotFound)?;

    let now = chrono::Utc::now().timestamp();
    let sender = claims.sub.to_string();
    let db = state.clone();
    let rid = receiver.id;
    let outcome = blocking(move || db.db.create_connection_request(&sender, &rid, now)).await?;

    let request_id = match outcome {
        ConnectOutcome::Sent(id) => id,
        ConnectOutcome::Duplicate => {
            return Err(ApiError::Duplicate(
                "a connection request already links you with this user".into(),
            ));
        }
        ConnectOutcome::InsufficientCredit => {
            return Err(ApiError::InsufficientCredit("connect"));
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(ConnectionRequestView {
            id: request_id,
            sender_id: claims.sub,
            receiver_id,
            status: ConnectionStatus::Pending,
            created_at: now,
        }),
    ))
}

/// Accept or reject a pending request. Only the addressed receiver may
/// respond, and only while the request is still pending.
pub async fn respond_connection_request(
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RespondConnectionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let accept = req.action == ConnectionAction::Accept;
    let now = chrono::Utc::now().timestamp();

    let db = state.clone();
    let receiver = claims.sub.to_string();
    let updated =
        blocking(move || db.db.respond_connection_request(request_id, &receiver, accept, now))
            .await?;

    if !updated {
        return Err(ApiError::NotFound);
    }

    let status = if accept {
        ConnectionStatus::Accepted
    } else {
        ConnectionStatus::Rejected
    };
    Ok(Json(serde_json::json!({ "id": request_id, "status": status })))
}

/// Pending requests involving the caller, split by direction.
pub async fn list_connections(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ConnectionListResponse>, ApiError> {
    let db = state.clone();
    let user_id = claims.sub.to_string();
    let (incoming, outgoing) =
        blocking(move || db.db.pending_connection_requests(&user_id)).await?;

    Ok(Json(ConnectionListResponse {
        incoming: incoming.into_iter().map(row_to_view).collect(),
        outgoing: outgoing.into_iter().map(row_to_view).collect(),
    }))
}

fn row_to_view(row: ConnectionRequestRow) -> ConnectionRequestView {
    let parse = |raw: &str| {
        raw.parse().unwrap_or_else(|e| {
            warn!("Corrupt user id '{}' on connection request {}: {}", raw, row.id, e);
            Uuid::default()
        })
    };
    ConnectionRequestView {
        id: row.id,
        sender_id: parse(&row.sender_id),
        receiver_id: parse(&row.receiver_id),
        status: ConnectionStatus::parse(&row.status).unwrap_or_else(|| {
            warn!("Corrupt status '{}' on connection request {}", row.status, row.id);
            ConnectionStatus::Pending
        }),
        created_at: row.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{connect_balance, register_user, state};
    use parley_types::models::Role;

    #[tokio::test]
    async fn request_charges_and_blocks_duplicates() {
        let state = state();
        let ada = register_user(&state, "ada", Role::Investor);
        let bob = register_user(&state, "bob", Role::Freelancer);

        let (status, Json(view)) = send_connection_request(
            State(state.clone()),
            Path(bob.sub),
            Extension(ada.clone()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(view.status, ConnectionStatus::Pending);
        assert_eq!(connect_balance(&state, ada.sub), 9);

        let err = send_connection_request(
            State(state.clone()),
            Path(bob.sub),
            Extension(ada.clone()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Duplicate(_)));
        assert_eq!(connect_balance(&state, ada.sub), 9);
    }

    #[tokio::test]
    async fn self_requests_are_rejected() {
        let state = state();
        let ada = register_user(&state, "ada", Role::Investor);

        let err =
            send_connection_request(State(state.clone()), Path(ada.sub), Extension(ada.clone()))
                .await
                .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn responding_is_receiver_only() {
        let state = state();
        let ada = register_user(&state, "ada", Role::Investor);
        let bob = register_user(&state, "bob", Role::Freelancer);

        let (_, Json(view)) = send_connection_request(
            State(state.clone()),
            Path(bob.sub),
            Extension(ada.clone()),
        )
        .await
        .unwrap();

        // The sender cannot accept their own request.
        let err = respond_connection_request(
            State(state.clone()),
            Path(view.id),
            Extension(ada.clone()),
            Json(RespondConnectionRequest {
                action: ConnectionAction::Accept,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));

        let Json(result) = respond_connection_request(
            State(state.clone()),
            Path(view.id),
            Extension(bob.clone()),
            Json(RespondConnectionRequest {
                action: ConnectionAction::Accept,
            }),
        )
        .await
        .unwrap();
        assert_eq!(result["status"], "accepted");

        // Accepted requests disappear from both pending listings.
        let Json(for_bob) = list_connections(State(state.clone()), Extension(bob))
            .await
            .unwrap();
        assert!(for_bob.incoming.is_empty());
        let Json(for_ada) = list_connections(State(state.clone()), Extension(ada))
            .await
            .unwrap();
        assert!(for_ada.outgoing.is_empty());
    }
}
