use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{seed_players, seed_round, seed_winners, Storage};
use crate::error::StorageError;
use crate::models::*;

/// Monotonic id source, one per table.
#[derive(Debug)]
struct IdAllocator {
    next: i64,
}

impl IdAllocator {
    fn new() -> Self {
        Self { next: 1 }
    }

    fn next_id(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[derive(Debug)]
struct Tables {
    rounds: BTreeMap<i64, LotteryRound>,
    players: BTreeMap<i64, Player>,
    winners: BTreeMap<i64, Winner>,
    round_ids: IdAllocator,
    player_ids: IdAllocator,
    winner_ids: IdAllocator,
}

impl Tables {
    fn new() -> Self {
        Self {
            rounds: BTreeMap::new(),
            players: BTreeMap::new(),
            winners: BTreeMap::new(),
            round_ids: IdAllocator::new(),
            player_ids: IdAllocator::new(),
            winner_ids: IdAllocator::new(),
        }
    }

    fn insert_round(&mut self, data: NewLotteryRound) -> LotteryRound {
        let round = LotteryRound {
            id: self.round_ids.next_id(),
            round_number: data.round_number,
            prize_pool: data.prize_pool,
            winner: data.winner,
            is_active: data.is_active,
            created_at: Utc::now(),
            ended_at: None,
        };
        self.rounds.insert(round.id, round.clone());
        round
    }

    fn insert_player(&mut self, data: NewPlayer) -> Player {
        let player = Player {
            id: self.player_ids.next_id(),
            address: data.address,
            round_id: data.round_id,
            entry_count: data.entry_count,
            created_at: Utc::now(),
        };
        self.players.insert(player.id, player.clone());
        player
    }

    fn insert_winner_at(&mut self, data: NewWinner, created_at: DateTime<Utc>) -> Winner {
        let winner = Winner {
            id: self.winner_ids.next_id(),
            address: data.address,
            round_number: data.round_number,
            prize_amount: data.prize_amount,
            created_at,
        };
        self.winners.insert(winner.id, winner.clone());
        winner
    }
}

/// In-memory store. Tables are `BTreeMap`s keyed by id, so scans run in
/// insertion order.
#[derive(Debug)]
pub struct MemStorage {
    tables: RwLock<Tables>,
}

impl MemStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
        }
    }

    /// Create a store holding the fixture round, winners and players.
    pub fn seeded() -> Self {
        let mut tables = Tables::new();
        let round = tables.insert_round(seed_round());
        for (winner, created_at) in seed_winners(Utc::now()) {
            tables.insert_winner_at(winner, created_at);
        }
        for player in seed_players(round.id) {
            tables.insert_player(player);
        }

        tracing::debug!(round_id = round.id, "seeded in-memory store");

        Self {
            tables: RwLock::new(tables),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned)
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn get_current_round(&self) -> Result<Option<LotteryRound>, StorageError> {
        let tables = self.read()?;
        Ok(tables.rounds.values().find(|r| r.is_active).cloned())
    }

    async fn create_lottery_round(&self, round: NewLotteryRound) -> Result<LotteryRound, StorageError> {
        Ok(self.write()?.insert_round(round))
    }

    async fn update_lottery_round(
        &self,
        id: i64,
        update: LotteryRoundUpdate,
    ) -> Result<Option<LotteryRound>, StorageError> {
        let mut tables = self.write()?;
        let Some(round) = tables.rounds.get_mut(&id) else {
            return Ok(None);
        };
        round.apply(update);
        Ok(Some(round.clone()))
    }

    async fn increase_prize_pool(
        &self,
        id: i64,
        increment: Decimal,
    ) -> Result<Option<LotteryRound>, StorageError> {
        let mut tables = self.write()?;
        let Some(round) = tables.rounds.get_mut(&id) else {
            return Ok(None);
        };
        let pool = add_to_amount(&round.prize_pool, increment)
            .ok_or_else(|| StorageError::InvalidAmount(round.prize_pool.clone()))?;
        round.prize_pool = pool;
        Ok(Some(round.clone()))
    }

    async fn get_players_by_round(&self, round_id: i64) -> Result<Vec<Player>, StorageError> {
        let tables = self.read()?;
        Ok(tables
            .players
            .values()
            .filter(|p| p.round_id == round_id)
            .cloned()
            .collect())
    }

    async fn add_player(&self, player: NewPlayer) -> Result<Player, StorageError> {
        Ok(self.write()?.insert_player(player))
    }

    async fn get_player_count(&self, round_id: i64) -> Result<i64, StorageError> {
        let tables = self.read()?;
        Ok(tables
            .players
            .values()
            .filter(|p| p.round_id == round_id)
            .map(|p| p.entry_count)
            .sum())
    }

    async fn get_recent_winners(&self, limit: usize) -> Result<Vec<Winner>, StorageError> {
        let tables = self.read()?;
        let mut winners: Vec<Winner> = tables.winners.values().cloned().collect();
        winners.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        winners.truncate(limit);
        Ok(winners)
    }

    async fn add_winner(&self, winner: NewWinner) -> Result<Winner, StorageError> {
        Ok(self.write()?.insert_winner_at(winner, Utc::now()))
    }
}
