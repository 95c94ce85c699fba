use std::sync::Arc;

use uuid::Uuid;

use parley_db::Database;
use parley_types::api::Claims;
use parley_types::models::Role;

use crate::auth::{AppState, AppStateInner};
use crate::meet::{MeetingProvider, UnconfiguredProvider};

pub fn state() -> AppState {
    state_with(Arc::new(UnconfiguredProvider))
}

pub fn state_with(meet: Arc<dyn MeetingProvider>) -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: "test-secret".into(),
        upload_dir: std::env::temp_dir(),
        meet,
    })
}

/// Insert a user directly and hand back the claims a real token would carry.
pub fn register_user(state: &AppState, username: &str, role: Role) -> Claims {
    let id = Uuid::new_v4();
    state
        .db
        .create_user(&id.to_string(), username, username, "hash", role)
        .unwrap();
    Claims {
        sub: id,
        username: username.to_string(),
        role,
        exp: usize::MAX,
    }
}

pub fn connect_balance(state: &AppState, user: Uuid) -> i64 {
    state
        .db
        .credit_balances(&user.to_string())
        .unwrap()
        .unwrap()
        .connect_credits
}

pub fn drain_connect_credits(state: &AppState, user: Uuid) {
    state
        .db
        .with_conn_mut(|conn| {
            conn.execute(
                "UPDATE credits SET connect_credits = 0 WHERE user_id = ?1",
                [user.to_string()],
            )?;
            Ok(())
        })
        .unwrap();
}
