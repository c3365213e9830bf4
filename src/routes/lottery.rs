use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};

use rust_decimal::Decimal;

use crate::db::SharedStorage;
use crate::error::{ApiError, StorageError};
use crate::models::{
    parse_amount, CurrentRoundResponse, EnterRequest, EnterResponse, NewPlayer, Winner,
};

/// Amount added to the prize pool for every entry (0.05).
pub const ENTRY_PRICE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Number of winners returned by GET /api/lottery/winners.
pub const WINNERS_SHOWN: usize = 5;

// GET /api/lottery/current - Active round with its players
pub async fn get_current_round(
    State(store): State<SharedStorage>,
) -> Result<Json<CurrentRoundResponse>, ApiError> {
    const FAILED: &str = "Failed to fetch lottery data";

    let round = store
        .get_current_round()
        .await
        .map_err(|e| ApiError::storage(FAILED, e))?
        .ok_or(ApiError::NotFound("No active lottery round found"))?;

    let player_count = store
        .get_player_count(round.id)
        .await
        .map_err(|e| ApiError::storage(FAILED, e))?;
    let players = store
        .get_players_by_round(round.id)
        .await
        .map_err(|e| ApiError::storage(FAILED, e))?;

    Ok(Json(CurrentRoundResponse {
        round,
        player_count,
        players,
    }))
}

// GET /api/lottery/winners - Most recent winners, newest first
pub async fn get_recent_winners(
    State(store): State<SharedStorage>,
) -> Result<Json<Vec<Winner>>, ApiError> {
    let winners = store
        .get_recent_winners(WINNERS_SHOWN)
        .await
        .map_err(|e| ApiError::storage("Failed to fetch winners", e))?;

    Ok(Json(winners))
}

// POST /api/lottery/enter - Register one entry for an address in the active round
//
// Every call appends a new player row with a single entry, even when the
// address already entered this round.
pub async fn enter_lottery(
    State(store): State<SharedStorage>,
    payload: Result<Json<EnterRequest>, JsonRejection>,
) -> Result<Json<EnterResponse>, ApiError> {
    const FAILED: &str = "Failed to enter lottery";

    let address = payload
        .ok()
        .and_then(|Json(body)| body.address)
        .filter(|address| !address.is_empty())
        .ok_or(ApiError::BadRequest("Wallet address is required"))?;

    let round = store
        .get_current_round()
        .await
        .map_err(|e| ApiError::storage(FAILED, e))?
        .ok_or(ApiError::NotFound("No active lottery round"))?;

    // Refuse before writing anything if the pool cannot be increased
    if parse_amount(&round.prize_pool).is_none() {
        return Err(ApiError::storage(
            FAILED,
            StorageError::InvalidAmount(round.prize_pool),
        ));
    }

    let existing = store
        .get_players_by_round(round.id)
        .await
        .map_err(|e| ApiError::storage(FAILED, e))?;
    if existing.iter().any(|p| p.address == address) {
        tracing::debug!(%address, round_id = round.id, "address already entered this round");
    }

    let player = store
        .add_player(NewPlayer {
            address,
            round_id: round.id,
            entry_count: 1,
        })
        .await
        .map_err(|e| ApiError::storage(FAILED, e))?;

    store
        .increase_prize_pool(round.id, ENTRY_PRICE)
        .await
        .map_err(|e| ApiError::storage(FAILED, e))?;

    tracing::info!(address = %player.address, round_id = round.id, "lottery entry registered");

    Ok(Json(EnterResponse {
        message: "Successfully entered lottery".to_string(),
        player,
    }))
}
