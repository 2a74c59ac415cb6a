//! Leaderboard ranking, derived from user records on demand

use crate::user::UserRecord;
use shared::LeaderboardEntry;

/// Top `limit` records by points, highest first. Ties are ordered by id so
/// repeated queries over the same data agree.
pub fn rank<'a>(
    records: impl IntoIterator<Item = &'a UserRecord>,
    limit: usize,
) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = records
        .into_iter()
        .map(UserRecord::leaderboard_entry)
        .collect();
    entries.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.id.cmp(&b.id)));
    entries.truncate(limit);
    entries
}
