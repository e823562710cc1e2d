//! Killmail generators.

use chrono::{Duration, Utc};

use feed_core::{Attacker, Killmail, KillmailSummary, Victim};
use upstream::HistoryEntry;

/// A fully-detailed killmail with one victim and the given attackers.
pub fn killmail(id: u64, victim_id: Option<u64>, attacker_ids: &[u64]) -> Killmail {
    Killmail {
        killmail_id: id,
        kill_time: Utc::now() - Duration::minutes(id as i64),
        solar_system_id: 30000142,
        victim: Victim {
            character_id: victim_id,
            corporation_id: Some(2001),
            alliance_id: None,
            ship_type_id: 587,
            damage_taken: 4242,
        },
        attackers: attacker_ids
            .iter()
            .map(|&id| Attacker {
                character_id: Some(id),
                corporation_id: None,
                alliance_id: None,
                damage_done: 1000,
                final_blow: false,
                ship_type_id: Some(17),
                weapon_type_id: Some(3001),
            })
            .collect(),
        hash: Some(format!("hash-{id}")),
        total_value: 12_500_000,
        points: 3,
        labels: vec!["lowsec".into()],
        is_npc: false,
        is_solo: false,
        is_awox: false,
    }
}

/// A killmail that happened the given number of hours ago.
pub fn killmail_aged(id: u64, victim_id: Option<u64>, age_hours: i64) -> Killmail {
    let mut km = killmail(id, victim_id, &[42]);
    km.kill_time = Utc::now() - Duration::hours(age_hours);
    km
}

/// The index-service summary for a killmail.
pub fn summary_of(km: &Killmail) -> KillmailSummary {
    KillmailSummary {
        killmail_id: km.killmail_id,
        hash: km.hash.clone().expect("fixture killmails carry a hash"),
        total_value: km.total_value,
        points: km.points,
        labels: km.labels.clone(),
    }
}

/// A history page row pointing at a killmail.
pub fn history_entry(km: &Killmail) -> HistoryEntry {
    HistoryEntry {
        killmail_id: km.killmail_id,
        hash: km.hash.clone().expect("fixture killmails carry a hash"),
        kill_time: Some(km.kill_time),
    }
}
