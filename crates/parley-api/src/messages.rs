use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use parley_db::models::{GateOutcome, NewAttachment};
use parley_types::api::{
    AttachmentPayload, Claims, MessageResponse, SendMessageRequest, SendMessageResponse,
};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Send a message to another user. First contact runs the thread/credit
/// gate: a new thread costs the sender one connect credit, an existing
/// thread never re-charges.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    let text = req.text.trim().to_string();
    if text.is_empty() && req.attachments.is_empty() {
        return Err(ApiError::Validation(
            "message needs text or an attachment".into(),
        ));
    }
    if req.to_user == claims.sub {
        return Err(ApiError::Validation(
            "cannot start a conversation with yourself".into(),
        ));
    }

    let db = state.clone();
    let to = req.to_user.to_string();
    let recipient = blocking(move || db.db.get_user_by_id(&to))
        .await?
        .ok_or(ApiError::NotFound)?;

    let now = chrono::Utc::now().timestamp();
    let sender = claims.sub.to_string();
    let attachments: Vec<NewAttachment> = req
        .attachments
        .iter()
        .map(|a| NewAttachment {
            url: a.url.clone(),
            name: a.name.clone(),
            mime_type: a.mime_type.clone(),
        })
        .collect();

    let db = state.clone();
    let recipient_id = recipient.id;
    let body = text.clone();
    let (thread_id, thread_created, message_id) = blocking(move || {
        let (thread_id, created) = match db.db.open_thread(&sender, &recipient_id, now)? {
            GateOutcome::Existing(id) => (id, false),
            GateOutcome::Created(id) => (id, true),
            GateOutcome::InsufficientCredit => return Ok(None),
        };
        let message_id =
            db.db
                .insert_message(thread_id, &sender, &recipient_id, &body, &attachments, now)?;
        Ok(Some((thread_id, created, message_id)))
    })
    .await?
    .ok_or(ApiError::InsufficientCredit("connect"))?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            thread_id,
            thread_created,
            message: MessageResponse {
                id: message_id,
                thread_id,
                sender_id: claims.sub,
                recipient_id: req.to_user,
                body: text,
                created_at: now,
                read: false,
                attachments: req.attachments,
            },
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    /// Highest message id the client has already seen; only rows above it
    /// are returned.
    #[serde(default)]
    pub after: i64,
}

/// Short-poll read of a thread. Returns messages with id above the
/// watermark in ascending id order and marks the rows addressed to the
/// requester as read.
pub async fn poll_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
    Query(query): Query<PollQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let requester = claims.sub.to_string();
    let after = query.after;

    let db = state.clone();
    let (rows, attachment_rows) = blocking(move || {
        let Some(thread) = db.db.get_thread(thread_id)? else {
            return Ok(None);
        };
        if !thread.has_participant(&requester) {
            return Ok(None);
        }
        let rows = db.db.messages_after(thread_id, &requester, after)?;
        let ids: Vec<i64> = rows.iter().map(|m| m.id).collect();
        let attachments = db.db.attachments_for_messages(&ids)?;
        Ok(Some((rows, attachments)))
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    let mut attachment_map: HashMap<i64, Vec<AttachmentPayload>> = HashMap::new();
    for a in attachment_rows {
        attachment_map.entry(a.message_id).or_default().push(AttachmentPayload {
            url: a.url,
            name: a.name,
            mime_type: a.mime_type,
        });
    }

    let messages = rows
        .into_iter()
        .map(|row| MessageResponse {
            id: row.id,
            thread_id: row.thread_id,
            sender_id: parse_user_id(&row.sender_id, row.id),
            recipient_id: parse_user_id(&row.recipient_id, row.id),
            body: row.body,
            created_at: row.created_at,
            read: row.is_read,
            attachments: attachment_map.remove(&row.id).unwrap_or_default(),
        })
        .collect();

    Ok(Json(messages))
}

fn parse_user_id(raw: &str, message_id: i64) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt user id '{}' on message {}: {}", raw, message_id, e);
        Uuid::default()
    })
}
