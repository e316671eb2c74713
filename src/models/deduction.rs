use serde::{Deserialize, Serialize};

use super::enums::{RecordStatus, Severity, Trust};
use super::lenient;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deduction {
    pub item: String,
    pub damage_severity: Severity,
    #[serde(deserialize_with = "lenient::number")]
    pub deduction_amount: f64,
    pub justification: Option<String>,
    #[serde(deserialize_with = "lenient::flag")]
    pub is_beyond_normal_wear: bool,
}

/// Itemized deposit deductions and the amount returned to the tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositDeduction {
    pub status: RecordStatus,
    pub original_deposit: f64,
    pub currency: String,
    pub deductions: Vec<Deduction>,
    pub total_deductions: f64,
    pub deposit_return: f64,
    pub summary: Option<String>,
    pub landlord_notes: Option<String>,
    pub disputed_items: Vec<String>,
    pub message: Option<String>,
    /// Unparsed model reply when the breakdown could not be read as structured data.
    pub raw_response: Option<String>,
    pub trust: Trust,
}

/// Shape the model is asked to reply with. Totals are recomputed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeductionReply {
    pub deductions: Vec<Deduction>,
    #[serde(deserialize_with = "lenient::opt_number")]
    pub total_deductions: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_number")]
    pub deposit_return: Option<f64>,
    pub summary: Option<String>,
    pub landlord_notes: Option<String>,
    #[serde(deserialize_with = "lenient::strings")]
    pub disputed_items: Vec<String>,
}
