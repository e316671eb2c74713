use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::lenient;

/// An amount with its currency, as printed in the lease.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Money {
    #[serde(deserialize_with = "lenient::opt_number")]
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityDeposit {
    #[serde(deserialize_with = "lenient::opt_number")]
    pub amount: Option<f64>,
    pub currency: Option<String>,
    /// Conditions the lease attaches to returning the deposit.
    pub conditions: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyDetails {
    #[serde(rename = "type")]
    pub property_type: Option<String>,
    #[serde(deserialize_with = "lenient::opt_count")]
    pub bedrooms: Option<u32>,
    #[serde(deserialize_with = "lenient::opt_count")]
    pub bathrooms: Option<u32>,
    #[serde(deserialize_with = "lenient::opt_flag")]
    pub furnished: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_flag")]
    pub parking: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageLiability {
    #[serde(deserialize_with = "lenient::strings")]
    pub tenant_responsible_for: Vec<String>,
    #[serde(deserialize_with = "lenient::opt_flag")]
    pub normal_wear_excluded: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_flag")]
    pub inspection_required: Option<bool>,
}

/// Lease terms read from a lease document.
///
/// Every field is optional: a lease that omits a term is a valid result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseInfo {
    pub property_address: Option<String>,
    pub tenant_name: Option<String>,
    pub landlord_name: Option<String>,
    /// YYYY-MM-DD as requested from the model; kept verbatim.
    pub lease_start_date: Option<String>,
    pub lease_end_date: Option<String>,
    pub monthly_rent: Option<Money>,
    pub security_deposit: Option<SecurityDeposit>,
    pub property_details: Option<PropertyDetails>,
    pub damage_liability: Option<DamageLiability>,
    #[serde(deserialize_with = "lenient::strings")]
    pub special_clauses: Vec<String>,
    #[serde(deserialize_with = "lenient::opt_flag")]
    pub has_floor_plan: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_count")]
    pub floor_plan_page: Option<u32>,
}

impl LeaseInfo {
    pub fn deposit_amount(&self) -> Option<f64> {
        self.security_deposit.as_ref().and_then(|d| d.amount)
    }

    /// Deposit currency, defaulting to USD when the lease names none.
    pub fn deposit_currency(&self) -> String {
        self.security_deposit
            .as_ref()
            .and_then(|d| d.currency.clone())
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "USD".to_string())
    }

    pub fn lease_start(&self) -> Option<NaiveDate> {
        self.lease_start_date.as_deref().and_then(parse_lease_date)
    }

    pub fn lease_end(&self) -> Option<NaiveDate> {
        self.lease_end_date.as_deref().and_then(parse_lease_date)
    }
}

/// Parse a lease date. Accepts ISO dates plus the day-first and month-name
/// forms models fall back to when the document itself is not ISO.
pub fn parse_lease_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    ["%Y-%m-%d", "%d/%m/%Y", "%B %d, %Y", "%d %B %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}
