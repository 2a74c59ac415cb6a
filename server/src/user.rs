use serde::{Deserialize, Serialize};
use shared::{LeaderboardEntry, Upgrade, UserData};
use std::collections::BTreeSet;

/// Persistent per-identity progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub username: Option<String>,
    pub points: u64,
    pub owned_upgrades: BTreeSet<Upgrade>,
    /// Unix millis of the last successful nuke
    #[serde(default)]
    pub last_nuke_at: Option<u64>,
}

impl UserRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: None,
            points: 0,
            owned_upgrades: BTreeSet::new(),
            last_nuke_at: None,
        }
    }

    pub fn owns(&self, upgrade: Upgrade) -> bool {
        self.owned_upgrades.contains(&upgrade)
    }

    pub fn has_username(&self) -> bool {
        self.username
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
    }

    pub fn user_data(&self) -> UserData {
        UserData {
            points: self.points,
            owned_upgrades: self.owned_upgrades.clone(),
        }
    }

    pub fn leaderboard_entry(&self) -> LeaderboardEntry {
        LeaderboardEntry {
            id: self.id.clone(),
            username: self.username.clone(),
            points: self.points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = UserRecord::new("sub-1");
        assert_eq!(record.id, "sub-1");
        assert_eq!(record.points, 0);
        assert!(record.owned_upgrades.is_empty());
        assert!(!record.has_username());
        assert_eq!(record.last_nuke_at, None);
    }

    #[test]
    fn test_blank_username_counts_as_unset() {
        let mut record = UserRecord::new("sub-1");
        record.username = Some("   ".to_string());
        assert!(!record.has_username());
        record.username = Some("miner".to_string());
        assert!(record.has_username());
    }

    #[test]
    fn test_record_without_cooldown_field_loads() {
        let json = r#"{"id":"a","username":null,"points":5,"ownedUpgrades":["double"]}"#;
        let record: UserRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.points, 5);
        assert!(record.owns(Upgrade::Double));
        assert_eq!(record.last_nuke_at, None);
    }
}
