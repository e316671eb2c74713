use serde::{Deserialize, Serialize};

use super::enums::{RecordStatus, Trust};
use super::lenient;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialLine {
    pub name: String,
    #[serde(deserialize_with = "lenient::number")]
    pub quantity: f64,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub unit: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    pub unit_price: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub total: f64,
    pub for_damage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaborLine {
    pub task: String,
    #[serde(deserialize_with = "lenient::number")]
    pub hours: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub hourly_rate: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub total: f64,
    pub worker_type: Option<String>,
}

/// Totals block. Always recomputed from the line items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteSummary {
    #[serde(deserialize_with = "lenient::number")]
    pub materials_total: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub labor_total: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub subtotal: f64,
    #[serde(rename = "contingency_10_percent", deserialize_with = "lenient::number")]
    pub contingency: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub grand_total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositComparison {
    pub deposit_amount: f64,
    pub repair_cost: f64,
    /// deposit minus repair cost; negative when repairs exceed the deposit.
    pub difference: f64,
    pub covers_repairs: bool,
    pub tenant_owes_extra: f64,
}

/// Regionalized repair quote for a set of damages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairQuote {
    pub status: RecordStatus,
    pub country: String,
    pub currency: String,
    pub materials: Vec<MaterialLine>,
    pub labor: Vec<LaborLine>,
    pub summary: QuoteSummary,
    pub deposit_comparison: Option<DepositComparison>,
    pub notes: Option<String>,
    pub message: Option<String>,
    /// Unparsed model reply when the quote could not be read as structured data.
    pub raw_quote: Option<String>,
    pub trust: Trust,
}

/// Shape the model is asked to reply with. Its totals are read but discarded.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuoteReply {
    pub materials: Vec<MaterialLine>,
    pub labor: Vec<LaborLine>,
    pub summary: Option<QuoteSummary>,
    pub notes: Option<String>,
}
