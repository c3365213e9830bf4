use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::error::StorageError;
use crate::models::*;

pub mod memory;
pub mod sqlite;

pub use memory::MemStorage;
pub use sqlite::SqliteStorage;

/// Repository for rounds, players and winners.
///
/// Absence is reported through `Option` or an empty `Vec`; `Err` is reserved
/// for backend failures.
#[async_trait]
pub trait Storage: Send + Sync {
    // Lottery rounds
    async fn get_current_round(&self) -> Result<Option<LotteryRound>, StorageError>;
    async fn create_lottery_round(&self, round: NewLotteryRound) -> Result<LotteryRound, StorageError>;
    async fn update_lottery_round(
        &self,
        id: i64,
        update: LotteryRoundUpdate,
    ) -> Result<Option<LotteryRound>, StorageError>;
    /// Add `increment` to the round's prize pool in one atomic step.
    async fn increase_prize_pool(
        &self,
        id: i64,
        increment: Decimal,
    ) -> Result<Option<LotteryRound>, StorageError>;

    // Players
    async fn get_players_by_round(&self, round_id: i64) -> Result<Vec<Player>, StorageError>;
    async fn add_player(&self, player: NewPlayer) -> Result<Player, StorageError>;
    /// Sum of entry counts for the round, not the number of rows.
    async fn get_player_count(&self, round_id: i64) -> Result<i64, StorageError>;

    // Winners
    /// Newest first, at most `limit` rows. There is no default limit; the
    /// winners route asks for five.
    async fn get_recent_winners(&self, limit: usize) -> Result<Vec<Winner>, StorageError>;
    async fn add_winner(&self, winner: NewWinner) -> Result<Winner, StorageError>;
}

pub type SharedStorage = Arc<dyn Storage>;

// Seed fixtures shared by every backend

pub(crate) fn seed_round() -> NewLotteryRound {
    NewLotteryRound {
        round_number: 1248,
        prize_pool: "12.45".to_string(),
        winner: None,
        is_active: true,
    }
}

/// Past winners paired with their (backdated) creation time.
pub(crate) fn seed_winners(now: DateTime<Utc>) -> Vec<(NewWinner, DateTime<Utc>)> {
    vec![
        (
            NewWinner {
                address: "0x1234567890123456789012345678901234567890".to_string(),
                round_number: 1247,
                prize_amount: "8.75".to_string(),
            },
            now - Duration::hours(2),
        ),
        (
            NewWinner {
                address: "0x9876543210987654321098765432109876543210".to_string(),
                round_number: 1246,
                prize_amount: "15.2".to_string(),
            },
            now - Duration::days(1),
        ),
        (
            NewWinner {
                address: "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd".to_string(),
                round_number: 1245,
                prize_amount: "22.1".to_string(),
            },
            now - Duration::days(3),
        ),
    ]
}

pub(crate) fn seed_players(round_id: i64) -> Vec<NewPlayer> {
    [
        ("0x1111111111111111111111111111111111111111", 1),
        ("0x2222222222222222222222222222222222222222", 3),
        ("0x3333333333333333333333333333333333333333", 2),
    ]
    .into_iter()
    .map(|(address, entry_count)| NewPlayer {
        address: address.to_string(),
        round_id,
        entry_count,
    })
    .collect()
}
