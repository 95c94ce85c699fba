use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ConnectionStatus, Role};

// -- JWT Claims --

/// JWT claims shared between token minting (register/login) and the REST
/// middleware. Canonical definition lives here in parley-types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub token: String,
}

// -- Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentPayload {
    pub url: String,
    pub name: String,
    pub mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub to_user: Uuid,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub thread_id: i64,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub body: String,
    pub created_at: i64,
    pub read: bool,
    pub attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub thread_id: i64,
    /// True when this send created the thread (and charged a connect credit).
    pub thread_created: bool,
    pub message: MessageResponse,
}

// -- Thread listing --

#[derive(Debug, Serialize)]
pub struct CounterpartInfo {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub online: bool,
}

#[derive(Debug, Serialize)]
pub struct MessagePreview {
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct ThreadSummary {
    pub thread_id: i64,
    pub counterpart: CounterpartInfo,
    pub last_message: Option<MessagePreview>,
    pub unread_count: i64,
    pub meeting_active: bool,
    pub last_updated: i64,
}

// -- Meetings --

#[derive(Debug, Serialize)]
pub struct MeetingResponse {
    pub url: String,
    pub reused: bool,
    pub seconds_remaining: i64,
    pub invite_credits_remaining: i64,
}

// -- Connection requests --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionAction {
    Accept,
    Reject,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespondConnectionRequest {
    pub action: ConnectionAction,
}

#[derive(Debug, Serialize)]
pub struct ConnectionRequestView {
    pub id: i64,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: ConnectionStatus,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct ConnectionListResponse {
    pub incoming: Vec<ConnectionRequestView>,
    pub outgoing: Vec<ConnectionRequestView>,
}

// -- Credits --

#[derive(Debug, Serialize)]
pub struct CreditBalances {
    pub connect: i64,
    pub invite: i64,
    pub bid: i64,
}

// -- Files --

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub url: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}
