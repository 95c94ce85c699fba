use axum::{
    Extension, Json,
    extract::{Path, State},
};

use parley_types::api::{Claims, MeetingResponse};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// How long an issued meeting link stays active. Inside the window the
/// link is reused without charge; at or past it a new one is issued.
pub(crate) const MEETING_COOLDOWN_SECS: i64 = 3600;

#[derive(Debug, PartialEq)]
enum LinkState {
    Active { url: String, seconds_remaining: i64 },
    Stale,
}

fn link_state(url: Option<&str>, issued_at: Option<i64>, now: i64) -> LinkState {
    match (url, issued_at) {
        (Some(url), Some(issued)) if now - issued < MEETING_COOLDOWN_SECS => LinkState::Active {
            url: url.to_string(),
            seconds_remaining: MEETING_COOLDOWN_SECS - (now - issued),
        },
        _ => LinkState::Stale,
    }
}

fn reuse_announcement(url: &str, seconds_remaining: i64) -> String {
    let minutes = (seconds_remaining + 59) / 60;
    let unit = if minutes == 1 { "minute" } else { "minutes" };
    format!(
        "A video meeting is already active. Join here: {url}. This link expires in {minutes} {unit}."
    )
}

fn new_announcement(url: &str) -> String {
    format!("A video meeting has been started. Join here: {url}. This link expires in 60 minutes.")
}

/// Meeting-link cooldown protocol. An active link is re-posted into the
/// chat free of charge; otherwise a new meeting is created through the
/// provider, one invite credit is spent, and the link is stored and
/// announced. A provider failure charges nothing and posts nothing.
pub async fn create_or_reuse_meeting(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MeetingResponse>, ApiError> {
    if !claims.role.can_start_meetings() {
        return Err(ApiError::Forbidden(
            "only investors can start meetings".into(),
        ));
    }

    let requester = claims.sub.to_string();
    let db = state.clone();
    let thread = blocking(move || db.db.get_thread(thread_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    if !thread.has_participant(&requester) {
        return Err(ApiError::NotFound);
    }
    let counterpart = thread.counterpart_of(&requester).to_string();

    let now = chrono::Utc::now().timestamp();

    match link_state(thread.meeting_url.as_deref(), thread.meeting_issued_at, now) {
        LinkState::Active {
            url,
            seconds_remaining,
        } => {
            // No charge inside the window; re-post the link with the time left.
            let body = reuse_announcement(&url, seconds_remaining);
            let db = state.clone();
            let sender = requester.clone();
            blocking(move || {
                db.db
                    .insert_message(thread_id, &sender, &counterpart, &body, &[], now)
            })
            .await?;

            let remaining = invite_balance(&state, &requester).await?;
            Ok(Json(MeetingResponse {
                url,
                reused: true,
                seconds_remaining,
                invite_credits_remaining: remaining,
            }))
        }
        LinkState::Stale => {
            // Balance check comes before the external call.
            if invite_balance(&state, &requester).await? < 1 {
                return Err(ApiError::InsufficientCredit("invite"));
            }

            let topic = format!("Meeting with {}", claims.username);
            let url = state
                .meet
                .create_meeting(&topic)
                .await
                .map_err(|e| ApiError::Upstream(format!("meeting creation failed: {e}")))?;

            // Conditional spend; losing a concurrent race means no charge
            // and no stored link.
            let db = state.clone();
            let spender = requester.clone();
            if !blocking(move || db.db.spend_invite_credit(&spender)).await? {
                return Err(ApiError::InsufficientCredit("invite"));
            }

            let db = state.clone();
            let sender = requester.clone();
            let stored_url = url.clone();
            let body = new_announcement(&url);
            blocking(move || {
                db.db.set_meeting_link(thread_id, &stored_url, now)?;
                db.db
                    .insert_message(thread_id, &sender, &counterpart, &body, &[], now)?;
                Ok(())
            })
            .await?;

            let remaining = invite_balance(&state, &requester).await?;
            Ok(Json(MeetingResponse {
                url,
                reused: false,
                seconds_remaining: MEETING_COOLDOWN_SECS,
                invite_credits_remaining: remaining,
            }))
        }
    }
}

async fn invite_balance(state: &AppState, user_id: &str) -> Result<i64, ApiError> {
    let db = state.clone();
    let uid = user_id.to_string();
    Ok(blocking(move || db.db.credit_balances(&uid))
        .await?
        .map(|b| b.invite_credits)
        .unwrap_or(0))
}
