//! Point economy: multipliers, purchases, earnings and the nuke cooldown
//!
//! Every derived number (multiplier, cost, reward) is computed here from the
//! caller's stored entitlements. Clients only ever report raw facts.

use crate::user::UserRecord;
use log::debug;
use shared::Upgrade;
use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Outcome of a purchase attempt. Only `Bought` changes the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Purchase {
    Bought(Upgrade),
    Unknown(String),
    AlreadyOwned(Upgrade),
    InsufficientPoints { cost: u64, available: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NukeDenied {
    NotOwned,
    CoolingDown { remaining: Duration },
}

/// Point multiplier for a set of entitlements: x2 per owned multiplier tier.
pub fn multiplier(owned: &BTreeSet<Upgrade>) -> u64 {
    let tiers = owned.iter().filter(|upgrade| upgrade.is_multiplier()).count() as u32;
    1u64 << tiers
}

/// Applies the owner's multiplier to a base amount, saturating on overflow.
pub fn apply_multiplier(owned: &BTreeSet<Upgrade>, base: u64) -> u64 {
    base.saturating_mul(multiplier(owned))
}

pub fn purchase(record: &mut UserRecord, upgrade_id: &str) -> Purchase {
    let upgrade = match upgrade_id.parse::<Upgrade>() {
        Ok(upgrade) => upgrade,
        Err(_) => return Purchase::Unknown(upgrade_id.to_string()),
    };

    if record.owns(upgrade) {
        return Purchase::AlreadyOwned(upgrade);
    }

    let cost = upgrade.cost();
    match record.points.checked_sub(cost) {
        Some(remaining) => {
            record.points = remaining;
            record.owned_upgrades.insert(upgrade);
            Purchase::Bought(upgrade)
        }
        None => Purchase::InsufficientPoints {
            cost,
            available: record.points,
        },
    }
}

/// Credits a reported base amount. Reports outside `1..=max_base` are
/// dropped. Returns the amount actually credited.
pub fn earn(record: &mut UserRecord, base: u64, max_base: u64) -> Option<u64> {
    if base == 0 || base > max_base {
        debug!(
            "Rejecting point report of {} from {} (max {})",
            base, record.id, max_base
        );
        return None;
    }

    let credited = apply_multiplier(&record.owned_upgrades, base);
    record.points = record.points.saturating_add(credited);
    Some(credited)
}

pub fn check_nuke(record: &UserRecord, now_ms: u64, cooldown: Duration) -> Result<(), NukeDenied> {
    if !record.owns(Upgrade::Nuker) {
        return Err(NukeDenied::NotOwned);
    }

    if let Some(last) = record.last_nuke_at {
        let ready_at = last.saturating_add(cooldown.as_millis() as u64);
        if now_ms < ready_at {
            return Err(NukeDenied::CoolingDown {
                remaining: Duration::from_millis(ready_at - now_ms),
            });
        }
    }

    Ok(())
}

/// Credits a nuke reward for `destroyed` blocks and restarts the cooldown.
pub fn credit_nuke(record: &mut UserRecord, destroyed: usize, now_ms: u64) -> u64 {
    let reward = apply_multiplier(&record.owned_upgrades, destroyed as u64);
    record.points = record.points.saturating_add(reward);
    record.last_nuke_at = Some(now_ms);
    reward
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
