//! Killmail domain types.
//!
//! A killmail is a fact-plus-two-relations record: one victim, zero
//! or more attackers, plus a valuation summary from the index
//! service. Ids are assigned upstream and never locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One attacker row on a killmail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attacker {
    /// Absent for NPC/environmental attackers.
    pub character_id: Option<u64>,
    pub corporation_id: Option<u64>,
    pub alliance_id: Option<u64>,
    pub damage_done: i64,
    #[serde(default)]
    pub final_blow: bool,
    pub ship_type_id: Option<u64>,
    pub weapon_type_id: Option<u64>,
}

/// The victim row on a killmail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Victim {
    pub character_id: Option<u64>,
    pub corporation_id: Option<u64>,
    pub alliance_id: Option<u64>,
    pub ship_type_id: u64,
    pub damage_taken: i64,
}

/// Completeness of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completeness {
    /// Summary only; attacker/victim detail defaulted. Eligible for
    /// enrichment and may be overwritten by a fuller write.
    Partial,
    /// Fully detailed. Immutable except for Loss re-derivation.
    Full,
}

/// A killmail draft: the in-memory record all three feeds converge
/// on before the coordinator decides skip/partial/full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Killmail {
    pub killmail_id: u64,
    pub kill_time: DateTime<Utc>,
    pub solar_system_id: u64,
    pub victim: Victim,
    #[serde(default)]
    pub attackers: Vec<Attacker>,
    /// Content hash required by the detail service. Retained on
    /// partial records so enrichment can complete them.
    pub hash: Option<String>,
    /// Valuation in smallest currency units. Never a float.
    pub total_value: i64,
    pub points: i64,
    #[serde(default)]
    pub labels: Vec<String>,
    /// No attacker has a character id.
    #[serde(default)]
    pub is_npc: bool,
    /// Exactly one attacker row.
    #[serde(default)]
    pub is_solo: bool,
    /// Friendly fire. Unresolved business rule: the upstream value
    /// passes through and nothing derives it locally.
    #[serde(default)]
    pub is_awox: bool,
}

impl Killmail {
    /// All character ids referenced by this killmail, victim first.
    pub fn involved_character_ids(&self) -> Vec<u64> {
        let mut ids = Vec::with_capacity(self.attackers.len() + 1);
        if let Some(id) = self.victim.character_id {
            ids.push(id);
        }
        ids.extend(self.attackers.iter().filter_map(|a| a.character_id));
        ids
    }

    /// Applies the ingestion-time classification rules.
    pub fn classify(&mut self) {
        self.is_npc = !self.attackers.iter().any(|a| a.character_id.is_some());
        self.is_solo = self.attackers.len() == 1;
    }

}

/// Index-service summary for a killmail: everything the lightweight
/// service knows without the full detail payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillmailSummary {
    pub killmail_id: u64,
    pub hash: String,
    pub total_value: i64,
    pub points: i64,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl KillmailSummary {
    /// Builds a partial draft from the summary alone. Detail fields
    /// are defaulted so the event is not silently lost; enrichment
    /// fills them in later.
    pub fn into_partial_draft(self) -> Killmail {
        Killmail {
            killmail_id: self.killmail_id,
            kill_time: Utc::now(),
            solar_system_id: 0,
            victim: Victim {
                character_id: None,
                corporation_id: None,
                alliance_id: None,
                ship_type_id: 0,
                damage_taken: 0,
            },
            attackers: Vec::new(),
            hash: Some(self.hash),
            total_value: self.total_value,
            points: self.points,
            labels: self.labels,
            is_npc: false,
            is_solo: false,
            is_awox: false,
        }
    }
}

/// Per-tracked-character view of a killmail, derived when the victim
/// is on the roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loss {
    pub character_id: u64,
    pub killmail_id: u64,
    pub kill_time: DateTime<Utc>,
    pub ship_type_id: u64,
    pub solar_system_id: u64,
    pub total_value: i64,
    pub attacker_count: usize,
    pub labels: Vec<String>,
}

impl Loss {
    /// Derives the loss view for a tracked victim.
    pub fn derive(killmail: &Killmail, character_id: u64) -> Self {
        Self {
            character_id,
            killmail_id: killmail.killmail_id,
            kill_time: killmail.kill_time,
            ship_type_id: killmail.victim.ship_type_id,
            solar_system_id: killmail.solar_system_id,
            total_value: killmail.total_value,
            attacker_count: killmail.attackers.len(),
            labels: killmail.labels.clone(),
        }
    }
}

/// Which path produced a draft. Threaded explicitly through the
/// coordinator; never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOrigin {
    /// Historical catch-up for one character; relevance degenerates
    /// to "the subject character is tracked".
    Backfill { character_id: u64 },
    Realtime,
    Enrichment,
}

impl IngestOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backfill { .. } => "backfill",
            Self::Realtime => "realtime",
            Self::Enrichment => "enrichment",
        }
    }
}
