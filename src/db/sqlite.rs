use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use super::{seed_players, seed_round, seed_winners, Storage};
use crate::error::StorageError;
use crate::models::*;

const CREATE_ROUNDS: &str = r#"
    CREATE TABLE IF NOT EXISTS lottery_rounds (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        round_number INTEGER NOT NULL,
        prize_pool TEXT NOT NULL,
        winner TEXT,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        ended_at TEXT
    )"#;

const CREATE_PLAYERS: &str = r#"
    CREATE TABLE IF NOT EXISTS players (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        address TEXT NOT NULL,
        round_id INTEGER NOT NULL,
        entry_count INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )"#;

const CREATE_WINNERS: &str = r#"
    CREATE TABLE IF NOT EXISTS winners (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        address TEXT NOT NULL,
        round_number INTEGER NOT NULL,
        prize_amount TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#;

/// SQLite-backed store, used when `DATABASE_URL` is set.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Connect, create the schema if missing and seed an empty database.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // A single long-lived connection keeps `sqlite::memory:` databases alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;
        storage.seed_if_empty().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in [CREATE_ROUNDS, CREATE_PLAYERS, CREATE_WINNERS] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn seed_if_empty(&self) -> Result<(), StorageError> {
        let rounds: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM lottery_rounds"#)
            .fetch_one(&self.pool)
            .await?;
        if rounds > 0 {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let round = insert_round(&mut tx, seed_round()).await?;
        for (winner, created_at) in seed_winners(Utc::now()) {
            insert_winner_at(&mut tx, winner, created_at).await?;
        }
        for player in seed_players(round.id) {
            insert_player(&mut tx, player).await?;
        }
        tx.commit().await?;

        tracing::info!(round_id = round.id, "seeded empty database");
        Ok(())
    }
}

async fn fetch_round(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
) -> Result<Option<LotteryRound>, sqlx::Error> {
    sqlx::query_as::<_, LotteryRound>(r#"SELECT * FROM lottery_rounds WHERE id = ?"#)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
}

async fn write_round(
    tx: &mut Transaction<'_, Sqlite>,
    round: &LotteryRound,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE lottery_rounds
           SET round_number = ?, prize_pool = ?, winner = ?, is_active = ?,
               created_at = ?, ended_at = ?
           WHERE id = ?"#,
    )
    .bind(round.round_number)
    .bind(&round.prize_pool)
    .bind(&round.winner)
    .bind(round.is_active)
    .bind(round.created_at)
    .bind(round.ended_at)
    .bind(round.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_round(
    tx: &mut Transaction<'_, Sqlite>,
    data: NewLotteryRound,
) -> Result<LotteryRound, sqlx::Error> {
    sqlx::query_as::<_, LotteryRound>(
        r#"INSERT INTO lottery_rounds (round_number, prize_pool, winner, is_active, created_at, ended_at)
           VALUES (?, ?, ?, ?, ?, NULL)
           RETURNING *"#,
    )
    .bind(data.round_number)
    .bind(data.prize_pool)
    .bind(data.winner)
    .bind(data.is_active)
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await
}

async fn insert_player(
    tx: &mut Transaction<'_, Sqlite>,
    data: NewPlayer,
) -> Result<Player, sqlx::Error> {
    sqlx::query_as::<_, Player>(
        r#"INSERT INTO players (address, round_id, entry_count, created_at)
           VALUES (?, ?, ?, ?)
           RETURNING *"#,
    )
    .bind(data.address)
    .bind(data.round_id)
    .bind(data.entry_count)
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await
}

async fn insert_winner_at(
    tx: &mut Transaction<'_, Sqlite>,
    data: NewWinner,
    created_at: DateTime<Utc>,
) -> Result<Winner, sqlx::Error> {
    sqlx::query_as::<_, Winner>(
        r#"INSERT INTO winners (address, round_number, prize_amount, created_at)
           VALUES (?, ?, ?, ?)
           RETURNING *"#,
    )
    .bind(data.address)
    .bind(data.round_number)
    .bind(data.prize_amount)
    .bind(created_at)
    .fetch_one(&mut **tx)
    .await
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_current_round(&self) -> Result<Option<LotteryRound>, StorageError> {
        let round = sqlx::query_as::<_, LotteryRound>(
            r#"SELECT * FROM lottery_rounds WHERE is_active = 1 ORDER BY id LIMIT 1"#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(round)
    }

    async fn create_lottery_round(&self, round: NewLotteryRound) -> Result<LotteryRound, StorageError> {
        let mut tx = self.pool.begin().await?;
        let round = insert_round(&mut tx, round).await?;
        tx.commit().await?;
        Ok(round)
    }

    async fn update_lottery_round(
        &self,
        id: i64,
        update: LotteryRoundUpdate,
    ) -> Result<Option<LotteryRound>, StorageError> {
        let mut tx = self.pool.begin().await?;
        let Some(mut round) = fetch_round(&mut tx, id).await? else {
            return Ok(None);
        };
        round.apply(update);
        write_round(&mut tx, &round).await?;
        tx.commit().await?;
        Ok(Some(round))
    }

    async fn increase_prize_pool(
        &self,
        id: i64,
        increment: Decimal,
    ) -> Result<Option<LotteryRound>, StorageError> {
        let mut tx = self.pool.begin().await?;
        let Some(mut round) = fetch_round(&mut tx, id).await? else {
            return Ok(None);
        };
        round.prize_pool = add_to_amount(&round.prize_pool, increment)
            .ok_or_else(|| StorageError::InvalidAmount(round.prize_pool.clone()))?;
        write_round(&mut tx, &round).await?;
        tx.commit().await?;
        Ok(Some(round))
    }

    async fn get_players_by_round(&self, round_id: i64) -> Result<Vec<Player>, StorageError> {
        let players = sqlx::query_as::<_, Player>(
            r#"SELECT * FROM players WHERE round_id = ? ORDER BY id"#,
        )
        .bind(round_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(players)
    }

    async fn add_player(&self, player: NewPlayer) -> Result<Player, StorageError> {
        let mut tx = self.pool.begin().await?;
        let player = insert_player(&mut tx, player).await?;
        tx.commit().await?;
        Ok(player)
    }

    async fn get_player_count(&self, round_id: i64) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COALESCE(SUM(entry_count), 0) FROM players WHERE round_id = ?"#,
        )
        .bind(round_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn get_recent_winners(&self, limit: usize) -> Result<Vec<Winner>, StorageError> {
        let winners = sqlx::query_as::<_, Winner>(
            r#"SELECT * FROM winners ORDER BY created_at DESC, id DESC LIMIT ?"#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(winners)
    }

    async fn add_winner(&self, winner: NewWinner) -> Result<Winner, StorageError> {
        let mut tx = self.pool.begin().await?;
        let winner = insert_winner_at(&mut tx, winner, Utc::now()).await?;
        tx.commit().await?;
        Ok(winner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStorage {
        SqliteStorage::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn seeds_empty_database() {
        let store = store().await;
        let round = store.get_current_round().await.unwrap().unwrap();
        assert_eq!(round.round_number, 1248);
        assert_eq!(round.prize_pool, "12.45");
        assert_eq!(store.get_player_count(round.id).await.unwrap(), 6);

        let winners = store.get_recent_winners(5).await.unwrap();
        let rounds: Vec<i64> = winners.iter().map(|w| w.round_number).collect();
        assert_eq!(rounds, vec![1247, 1246, 1245]);
    }

    #[tokio::test]
    async fn seeding_runs_once() {
        let store = store().await;
        store.seed_if_empty().await.unwrap();
        let round = store.get_current_round().await.unwrap().unwrap();
        assert_eq!(store.get_players_by_round(round.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn update_merges_and_missing_id_is_none() {
        let store = store().await;
        let round = store.get_current_round().await.unwrap().unwrap();

        assert!(store
            .update_lottery_round(round.id + 100, LotteryRoundUpdate::default())
            .await
            .unwrap()
            .is_none());

        let ended = store
            .update_lottery_round(
                round.id,
                LotteryRoundUpdate {
                    is_active: Some(false),
                    winner: Some(Some("0x1111111111111111111111111111111111111111".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(!ended.is_active);
        assert_eq!(ended.prize_pool, "12.45");
        assert!(store.get_current_round().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enter_flow_appends_and_increases_pool() {
        let store = store().await;
        let round = store.get_current_round().await.unwrap().unwrap();

        let player = store
            .add_player(NewPlayer {
                address: "0x2222222222222222222222222222222222222222".to_string(),
                round_id: round.id,
                entry_count: 1,
            })
            .await
            .unwrap();
        assert_eq!(player.id, 4);

        let round = store.increase_prize_pool(round.id, Decimal::new(5, 2)).await.unwrap().unwrap();
        assert_eq!(round.prize_pool, "12.50");
        assert_eq!(store.get_player_count(round.id).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn added_winner_is_most_recent() {
        let store = store().await;
        let winner = store
            .add_winner(NewWinner {
                address: "0xbeef".to_string(),
                round_number: 1248,
                prize_amount: "12.45".to_string(),
            })
            .await
            .unwrap();

        let recent = store.get_recent_winners(1).await.unwrap();
        assert_eq!(recent, vec![winner]);
    }
}
