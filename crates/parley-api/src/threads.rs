use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use parley_types::api::{Claims, CounterpartInfo, MessagePreview, ThreadSummary};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::meetings::MEETING_COOLDOWN_SECS;

/// A counterpart whose presence marker is younger than this counts as
/// online.
const ONLINE_THRESHOLD_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Case-insensitive substring over counterpart username, display name,
    /// or message text.
    pub search: Option<String>,
}

/// Contact listing: the caller's threads, most recently updated first,
/// with counterpart, unread count, and last-message preview.
pub async fn list_threads(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ThreadSummary>>, ApiError> {
    let user_id = claims.sub.to_string();

    let db = state.clone();
    let rows = blocking(move || db.db.list_threads(&user_id, query.search.as_deref())).await?;

    let now = chrono::Utc::now().timestamp();
    let summaries = rows
        .into_iter()
        .map(|row| {
            let counterpart_id: Uuid = row.counterpart_id.parse().unwrap_or_else(|e| {
                warn!("Corrupt user id '{}' on thread {}: {}", row.counterpart_id, row.id, e);
                Uuid::default()
            });

            let last_message = match (row.last_message_sender, row.last_message_body, row.last_message_at) {
                (Some(sender), Some(body), Some(created_at)) => Some(MessagePreview {
                    sender_id: sender.parse().unwrap_or_else(|e| {
                        warn!("Corrupt sender id '{}' on thread {}: {}", sender, row.id, e);
                        Uuid::default()
                    }),
                    body,
                    created_at,
                }),
                _ => None,
            };

            let meeting_active = row.meeting_url.is_some()
                && row
                    .meeting_issued_at
                    .is_some_and(|issued| now - issued < MEETING_COOLDOWN_SECS);

            ThreadSummary {
                thread_id: row.id,
                counterpart: CounterpartInfo {
                    user_id: counterpart_id,
                    username: row.counterpart_username,
                    display_name: row.counterpart_display_name,
                    online: now - row.counterpart_last_online < ONLINE_THRESHOLD_SECS,
                },
                last_message,
                unread_count: row.unread_count,
                meeting_active,
                last_updated: row.last_updated,
            }
        })
        .collect();

    Ok(Json(summaries))
}
