use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Lottery round row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LotteryRound {
    pub id: i64,
    pub round_number: i64,
    /// Decimal amount kept as a string, e.g. "12.45"
    pub prize_pool: String,
    pub winner: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl LotteryRound {
    /// Merge the fields present in `update` into this round.
    pub fn apply(&mut self, update: LotteryRoundUpdate) {
        if let Some(round_number) = update.round_number {
            self.round_number = round_number;
        }
        if let Some(prize_pool) = update.prize_pool {
            self.prize_pool = prize_pool;
        }
        if let Some(winner) = update.winner {
            self.winner = winner;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        if let Some(created_at) = update.created_at {
            self.created_at = created_at;
        }
        if let Some(ended_at) = update.ended_at {
            self.ended_at = ended_at;
        }
    }
}

/// Payload for inserting a round; id and timestamps are assigned by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLotteryRound {
    pub round_number: i64,
    pub prize_pool: String,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_is_active() -> bool {
    true
}

/// Optional field overrides for a round.
///
/// `winner` and `ended_at` are doubly optional: `None` leaves the field alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct LotteryRoundUpdate {
    pub round_number: Option<i64>,
    pub prize_pool: Option<String>,
    pub winner: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub ended_at: Option<Option<DateTime<Utc>>>,
}

/// Player entry row. Several rows may share the same address and round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: i64,
    pub address: String,
    pub round_id: i64,
    pub entry_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlayer {
    pub address: String,
    pub round_id: i64,
    #[serde(default = "default_entry_count")]
    pub entry_count: i64,
}

fn default_entry_count() -> i64 {
    1
}

/// Historical payout record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub id: i64,
    pub address: String,
    pub round_number: i64,
    pub prize_amount: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWinner {
    pub address: String,
    pub round_number: i64,
    pub prize_amount: String,
}

/// Response for GET /api/lottery/current
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentRoundResponse {
    pub round: LotteryRound,
    /// Sum of entry counts, not the number of rows
    pub player_count: i64,
    pub players: Vec<Player>,
}

/// Body of POST /api/lottery/enter
#[derive(Debug, Deserialize)]
pub struct EnterRequest {
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnterResponse {
    pub message: String,
    pub player: Player,
}

/// Read the leading number of an amount string, ignoring any trailing text
/// such as a currency suffix ("12.45 ETH" reads as 12.45).
pub fn parse_amount(amount: &str) -> Option<Decimal> {
    let s = amount.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |start: usize| {
        bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let mut end = 0;
    let negative = match bytes.first() {
        Some(b'-') => {
            end = 1;
            true
        }
        Some(b'+') => {
            end = 1;
            false
        }
        _ => false,
    };

    let int_len = digits_from(end);
    let int_part = &s[end..end + int_len];
    end += int_len;

    let mut frac_part = "";
    if bytes.get(end) == Some(&b'.') {
        let frac_len = digits_from(end + 1);
        frac_part = &s[end + 1..end + 1 + frac_len];
        if frac_len > 0 || int_len > 0 {
            end += 1 + frac_len;
        }
    }
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mantissa = format!(
        "{}{}.{}",
        if negative { "-" } else { "" },
        if int_part.is_empty() { "0" } else { int_part },
        if frac_part.is_empty() { "0" } else { frac_part },
    );

    // Optional exponent, only when at least one exponent digit follows
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_start = end + 1;
        if matches!(bytes.get(exp_start), Some(b'+' | b'-')) {
            exp_start += 1;
        }
        let exp_len = digits_from(exp_start);
        if exp_len > 0 {
            let exponent = &s[end + 1..exp_start + exp_len];
            return Decimal::from_scientific(&format!("{}e{}", mantissa, exponent)).ok();
        }
    }

    Decimal::from_str(&mantissa).ok()
}

/// Add `increment` to a decimal amount string and format the result with two
/// decimals, rounding halves upwards. Returns `None` when `amount` does not
/// start with a number.
pub fn add_to_amount(amount: &str, increment: Decimal) -> Option<String> {
    let total = parse_amount(amount)?.checked_add(increment)?;
    let strategy = if total.is_sign_negative() {
        RoundingStrategy::MidpointTowardZero
    } else {
        RoundingStrategy::MidpointAwayFromZero
    };
    Some(format!("{:.2}", total.round_dp_with_strategy(2, strategy)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round() -> LotteryRound {
        LotteryRound {
            id: 1,
            round_number: 1248,
            prize_pool: "12.45".to_string(),
            winner: None,
            is_active: true,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    fn cents(n: i64) -> Decimal {
        Decimal::new(n, 2)
    }

    #[test]
    fn add_to_amount_formats_two_decimals() {
        assert_eq!(add_to_amount("12.45", cents(5)).as_deref(), Some("12.50"));
        assert_eq!(add_to_amount("0", cents(5)).as_deref(), Some("0.05"));
        assert_eq!(add_to_amount("15.2", cents(5)).as_deref(), Some("15.25"));
        assert_eq!(add_to_amount("12", cents(5)).as_deref(), Some("12.05"));
    }

    #[test]
    fn add_to_amount_rounds_halves_up() {
        assert_eq!(add_to_amount("0.075", cents(5)).as_deref(), Some("0.13"));
        assert_eq!(add_to_amount("12.575", cents(5)).as_deref(), Some("12.63"));
        assert_eq!(add_to_amount("1.12345678", cents(5)).as_deref(), Some("1.17"));
        assert_eq!(add_to_amount("-0.175", cents(5)).as_deref(), Some("-0.12"));
    }

    #[test]
    fn add_to_amount_reads_leading_number() {
        assert_eq!(add_to_amount("12.45 ETH", cents(5)).as_deref(), Some("12.50"));
        assert_eq!(add_to_amount("  3.5", cents(5)).as_deref(), Some("3.55"));
        assert_eq!(add_to_amount(".5", cents(5)).as_deref(), Some("0.55"));
        assert_eq!(add_to_amount("7.", cents(5)).as_deref(), Some("7.05"));
        assert_eq!(add_to_amount("1e1", cents(5)).as_deref(), Some("10.05"));
        assert_eq!(add_to_amount("2e", cents(5)).as_deref(), Some("2.05"));
    }

    #[test]
    fn add_to_amount_rejects_garbage() {
        assert_eq!(add_to_amount("twelve", cents(5)), None);
        assert_eq!(add_to_amount("", cents(5)), None);
        assert_eq!(add_to_amount("NaN", cents(5)), None);
        assert_eq!(add_to_amount("-", cents(5)), None);
        assert_eq!(add_to_amount(".", cents(5)), None);
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let mut r = round();
        let created_at = r.created_at;
        r.apply(LotteryRoundUpdate {
            prize_pool: Some("13.00".to_string()),
            ..Default::default()
        });

        assert_eq!(r.prize_pool, "13.00");
        assert_eq!(r.round_number, 1248);
        assert!(r.is_active);
        assert_eq!(r.created_at, created_at);
    }

    #[test]
    fn apply_can_clear_and_set_optional_fields() {
        let mut r = round();
        let ended = Utc::now();
        r.apply(LotteryRoundUpdate {
            winner: Some(Some("0xabc".to_string())),
            is_active: Some(false),
            ended_at: Some(Some(ended)),
            ..Default::default()
        });
        assert_eq!(r.winner.as_deref(), Some("0xabc"));
        assert!(!r.is_active);
        assert_eq!(r.ended_at, Some(ended));

        r.apply(LotteryRoundUpdate {
            winner: Some(None),
            ..Default::default()
        });
        assert_eq!(r.winner, None);
        assert_eq!(r.ended_at, Some(ended));
    }

    #[test]
    fn round_serializes_camel_case() {
        let json = serde_json::to_value(round()).unwrap();
        assert_eq!(json["roundNumber"], 1248);
        assert_eq!(json["prizePool"], "12.45");
        assert_eq!(json["isActive"], true);
        assert!(json["endedAt"].is_null());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn new_player_defaults_entry_count() {
        let p: NewPlayer =
            serde_json::from_str(r#"{"address":"0x1","roundId":1}"#).unwrap();
        assert_eq!(p.entry_count, 1);
    }
}
