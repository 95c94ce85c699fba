use axum::{Extension, Json, extract::State};
use tracing::warn;

use parley_types::api::{Claims, CreditBalances};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Read-only view of the caller's credit counters.
pub async fn get_credits(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<CreditBalances>, ApiError> {
    let db = state.clone();
    let user_id = claims.sub.to_string();
    let row = blocking(move || db.db.credit_balances(&user_id)).await?;

    let balances = match row {
        Some(row) => CreditBalances {
            connect: row.connect_credits,
            invite: row.invite_credits,
            bid: row.bid_credits,
        },
        None => {
            warn!("No credit row for user {}", claims.sub);
            CreditBalances {
                connect: 0,
                invite: 0,
                bid: 0,
            }
        }
    };

    Ok(Json(balances))
}
