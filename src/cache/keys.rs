use std::time::Duration;

use chrono::NaiveDate;

pub const CHALLENGE_BOARD_TTL: Duration = Duration::from_secs(60);
pub const ACHIEVEMENT_LIST_TTL: Duration = Duration::from_secs(5 * 60);

pub fn challenge_board_key(user_id: &str, date: NaiveDate) -> String {
    format!("progress:{}:challenges:{}", user_id, date)
}

pub fn achievement_list_key(user_id: &str) -> String {
    format!("progress:{}:achievements", user_id)
}
