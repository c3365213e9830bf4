pub mod health;
pub mod lottery;
