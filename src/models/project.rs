use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::checklist::InspectionChecklist;
use super::deduction::DepositDeduction;
use super::floor_plan::{FloorPlan, Layout3d};
use super::lease::LeaseInfo;
use super::quote::RepairQuote;

/// Everything known about one property handover, keyed by a client-supplied id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub lease_info: Option<LeaseInfo>,
    pub deposit_amount: Option<f64>,
    pub deposit_currency: Option<String>,
    pub floor_plan: Option<FloorPlan>,
    pub layout_3d: Option<Layout3d>,
    pub inspection_checklist: Option<InspectionChecklist>,
    pub repair_quote: Option<RepairQuote>,
    pub deposit_deductions: Option<DepositDeduction>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Field-level update for a project. `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub lease_info: Option<LeaseInfo>,
    pub floor_plan: Option<FloorPlan>,
    pub layout_3d: Option<Layout3d>,
    pub inspection_checklist: Option<InspectionChecklist>,
    pub repair_quote: Option<RepairQuote>,
    pub deposit_deductions: Option<DepositDeduction>,
}

impl ProjectPatch {
    pub fn is_empty(&self) -> bool {
        self.lease_info.is_none()
            && self.floor_plan.is_none()
            && self.layout_3d.is_none()
            && self.inspection_checklist.is_none()
            && self.repair_quote.is_none()
            && self.deposit_deductions.is_none()
    }
}

impl Project {
    pub fn empty(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            ..Default::default()
        }
    }

    /// Apply a patch. Lease info also refreshes the cached deposit fields.
    pub fn apply(&mut self, patch: ProjectPatch) {
        if let Some(lease) = patch.lease_info {
            if let Some(amount) = lease.deposit_amount() {
                self.deposit_amount = Some(amount);
                self.deposit_currency = Some(lease.deposit_currency());
            }
            self.lease_info = Some(lease);
        }
        if let Some(plan) = patch.floor_plan {
            self.floor_plan = Some(plan);
        }
        if let Some(layout) = patch.layout_3d {
            self.layout_3d = Some(layout);
        }
        if let Some(checklist) = patch.inspection_checklist {
            self.inspection_checklist = Some(checklist);
        }
        if let Some(quote) = patch.repair_quote {
            self.repair_quote = Some(quote);
        }
        if let Some(deductions) = patch.deposit_deductions {
            self.deposit_deductions = Some(deductions);
        }
        self.updated_at = Some(Utc::now());
    }
}
