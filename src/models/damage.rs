use serde::{Deserialize, Serialize};

use super::enums::{DamageStatus, DamageType, Severity, Trust};
use super::lenient;

/// One damage observation reported by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageItem {
    #[serde(rename = "type")]
    pub damage_type: DamageType,
    pub location: Option<String>,
    pub severity: Severity,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub size: Option<String>,
    pub description: Option<String>,
    pub likely_cause: Option<String>,
    /// Only set in reference-comparison mode.
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_flag")]
    pub is_new: Option<bool>,
}

/// Result of analyzing one photo for damage, with or without check-in references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageAnalysis {
    pub status: DamageStatus,
    #[serde(deserialize_with = "lenient::flag")]
    pub damage_found: bool,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_flag")]
    pub same_room: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_flag")]
    pub angle_matches_reference: Option<bool>,
    pub damages: Vec<DamageItem>,
    #[serde(deserialize_with = "lenient::strings")]
    pub pre_existing_noted: Vec<String>,
    pub overall_condition: Option<String>,
    pub message: Option<String>,
    pub repair_urgency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_shows: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_shows: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Unparsed model reply, kept so callers can degrade gracefully.
    pub raw_analysis: Option<String>,
    pub trust: Trust,
}

impl DamageAnalysis {
    /// Reconcile the status, `damage_found` flag and damage list.
    ///
    /// A wrong-room answer never reports damage. Otherwise a non-empty damage
    /// list means damage was found, and the status follows the flag within its
    /// mode (reference comparison or standalone).
    pub fn reconciled(mut self, reference_mode: bool) -> Self {
        if self.status == DamageStatus::WrongRoom || self.same_room == Some(false) {
            self.status = DamageStatus::WrongRoom;
            self.damage_found = false;
            self.damages.clear();
            return self;
        }

        self.damage_found = self.damage_found || !self.damages.is_empty();
        if self.status != DamageStatus::Error {
            self.status = match (reference_mode, self.damage_found) {
                (true, true) => DamageStatus::NewDamageFound,
                (true, false) => DamageStatus::NoNewDamage,
                (false, true) => DamageStatus::DamageFound,
                (false, false) => DamageStatus::NoDamage,
            };
        }
        self
    }
}
