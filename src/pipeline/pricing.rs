//! Repair quotes and deposit deductions.
//!
//! The model supplies the judgment (local prices, labor rates, what is fair
//! to deduct). Every derived total is recomputed here and the model's own
//! arithmetic is discarded.

use super::extractor::ParseOutcome;
use super::prompts;
use super::stage::StageExecutor;
use crate::models::{
    DamageItem, DeductionReply, DepositComparison, DepositDeduction, QuoteReply, QuoteSummary,
    RecordStatus, RepairQuote, Trust,
};

pub const CONTINGENCY_RATE: f64 = 0.10;

/// Round to cents, half away from zero.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

// ──────────────────────────────────────────────
// Quote arithmetic
// ──────────────────────────────────────────────

/// Line total from its factors. Lump-sum lines (a factor missing) keep the
/// stated total.
fn line_total(factor: f64, rate: f64, stated: f64) -> f64 {
    let (factor, rate) = (non_negative(factor), non_negative(rate));
    if factor > 0.0 && rate > 0.0 {
        round2(factor * rate)
    } else {
        round2(non_negative(stated))
    }
}

/// Recompute line totals and the summary block.
pub fn recompute_quote(quote: &mut RepairQuote, deposit_amount: Option<f64>) {
    for line in &mut quote.materials {
        line.total = line_total(line.quantity, line.unit_price, line.total);
    }
    for line in &mut quote.labor {
        line.total = line_total(line.hours, line.hourly_rate, line.total);
    }

    let materials_total = round2(quote.materials.iter().map(|m| m.total).sum());
    let labor_total = round2(quote.labor.iter().map(|l| l.total).sum());
    quote.summary = summarize(materials_total, labor_total);
    quote.deposit_comparison = deposit_amount
        .filter(|d| *d > 0.0)
        .map(|d| compare_with_deposit(d, quote.summary.grand_total));
}

fn summarize(materials_total: f64, labor_total: f64) -> QuoteSummary {
    let subtotal = round2(materials_total + labor_total);
    let contingency = round2(subtotal * CONTINGENCY_RATE);
    QuoteSummary {
        materials_total,
        labor_total,
        subtotal,
        contingency,
        grand_total: round2(subtotal + contingency),
    }
}

pub fn compare_with_deposit(deposit_amount: f64, grand_total: f64) -> DepositComparison {
    DepositComparison {
        deposit_amount,
        repair_cost: grand_total,
        difference: round2(deposit_amount - grand_total),
        covers_repairs: grand_total <= deposit_amount,
        tenant_owes_extra: round2((grand_total - deposit_amount).max(0.0)),
    }
}

fn empty_quote(status: RecordStatus, country: &str, currency: &str) -> RepairQuote {
    RepairQuote {
        status,
        country: country.to_string(),
        currency: currency.to_string(),
        materials: Vec::new(),
        labor: Vec::new(),
        summary: QuoteSummary::default(),
        deposit_comparison: None,
        notes: None,
        message: None,
        raw_quote: None,
        trust: Trust::Structured,
    }
}

/// Regionalized repair quote for `damages`.
pub async fn price_damages(
    exec: &StageExecutor,
    damages: &[DamageItem],
    country: &str,
    currency: &str,
    deposit_amount: Option<f64>,
) -> RepairQuote {
    if damages.is_empty() {
        let mut quote = empty_quote(RecordStatus::NoDamages, country, currency);
        quote.message = Some("No damages to quote".into());
        recompute_quote(&mut quote, deposit_amount);
        return quote;
    }

    let prompt = prompts::repair_quote_prompt(damages, country, currency, deposit_amount);
    let (outcome, raw) = match exec.extract::<QuoteReply>(&prompt, &[]).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "repair quote call failed");
            let mut quote = empty_quote(RecordStatus::Error, country, currency);
            quote.message = Some(format!("Repair quote failed: {e}"));
            return quote;
        }
    };

    match outcome {
        ParseOutcome::Structured(reply) => {
            let mut quote = empty_quote(RecordStatus::Success, country, currency);
            quote.materials = reply.materials;
            quote.labor = reply.labor;
            quote.notes = reply.notes;
            if let Some(claimed) = reply.summary {
                tracing::debug!(claimed_total = claimed.grand_total, "discarding model totals");
            }
            recompute_quote(&mut quote, deposit_amount);
            tracing::info!(
                lines = quote.materials.len() + quote.labor.len(),
                grand_total = quote.summary.grand_total,
                "repair quote priced"
            );
            quote
        }
        ParseOutcome::Heuristic { .. } => {
            let mut quote = empty_quote(RecordStatus::Partial, country, currency);
            quote.message = Some("Could not parse quote; raw reply provided".into());
            quote.raw_quote = Some(raw);
            quote.trust = Trust::Heuristic;
            recompute_quote(&mut quote, deposit_amount);
            quote
        }
    }
}

// ──────────────────────────────────────────────
// Deduction arithmetic
// ──────────────────────────────────────────────

/// Clamp each deduction and recompute the totals.
pub fn recompute_deduction(deduction: &mut DepositDeduction) {
    for d in &mut deduction.deductions {
        d.deduction_amount = round2(non_negative(d.deduction_amount));
    }
    deduction.total_deductions = round2(deduction.deductions.iter().map(|d| d.deduction_amount).sum());
    deduction.deposit_return = round2((deduction.original_deposit - deduction.total_deductions).max(0.0));
}

fn empty_deduction(status: RecordStatus, deposit_amount: f64, currency: &str) -> DepositDeduction {
    DepositDeduction {
        status,
        original_deposit: deposit_amount,
        currency: currency.to_string(),
        deductions: Vec::new(),
        total_deductions: 0.0,
        deposit_return: round2(deposit_amount.max(0.0)),
        summary: None,
        landlord_notes: None,
        disputed_items: Vec::new(),
        message: None,
        raw_response: None,
        trust: Trust::Structured,
    }
}

/// Itemized deductions from the security deposit.
pub async fn compute_deductions(
    exec: &StageExecutor,
    damages: &[DamageItem],
    deposit_amount: f64,
    currency: &str,
    quote: Option<&RepairQuote>,
) -> DepositDeduction {
    if damages.is_empty() {
        let mut deduction = empty_deduction(RecordStatus::NoDamages, deposit_amount, currency);
        deduction.summary = Some("No damages found; the full deposit is returned".into());
        return deduction;
    }

    let prompt = prompts::deduction_prompt(damages, deposit_amount, currency, quote);
    let (outcome, raw) = match exec.extract::<DeductionReply>(&prompt, &[]).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "deduction call failed");
            let mut deduction = empty_deduction(RecordStatus::Error, deposit_amount, currency);
            deduction.message = Some(format!("Deduction calculation failed: {e}"));
            return deduction;
        }
    };

    match outcome {
        ParseOutcome::Structured(reply) => {
            let mut deduction = empty_deduction(RecordStatus::Success, deposit_amount, currency);
            deduction.deductions = reply.deductions;
            deduction.summary = reply.summary;
            deduction.landlord_notes = reply.landlord_notes;
            deduction.disputed_items = reply.disputed_items;
            recompute_deduction(&mut deduction);
            if let Some(claimed) = reply.total_deductions {
                if (claimed - deduction.total_deductions).abs() > 0.005 {
                    tracing::debug!(
                        claimed,
                        recomputed = deduction.total_deductions,
                        "model deduction total disagreed"
                    );
                }
            }
            deduction
        }
        ParseOutcome::Heuristic { .. } => {
            let mut deduction = empty_deduction(RecordStatus::Partial, deposit_amount, currency);
            deduction.message = Some("Could not calculate deductions; raw reply provided".into());
            deduction.raw_response = Some(raw);
            deduction.trust = Trust::Heuristic;
            deduction
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::models::{DamageType, Severity};
    use crate::pipeline::model::{MockModelClient, MockReply, ModelError};
    use std::sync::Arc;

    fn executor(mock: MockModelClient) -> (Arc<MockModelClient>, StageExecutor) {
        let mock = Arc::new(mock);
        (mock.clone(), StageExecutor::new(mock, &Settings::default()))
    }

    fn crack() -> DamageItem {
        DamageItem {
            damage_type: DamageType::Crack,
            severity: Severity::Major,
            description: Some("crack above door".into()),
            ..Default::default()
        }
    }

    const QUOTE_REPLY: &str = r#"```json
{
  "materials": [
    {"name": "filler", "quantity": 2, "unit": "kg", "unit_price": 15, "total": 30},
    {"name": "paint", "quantity": 1, "unit": "l", "unit_price": 20, "total": 0}
  ],
  "labor": [
    {"task": "patch and paint", "hours": 4, "hourly_rate": 25, "total": 100}
  ],
  "summary": {"materials_total": 1, "labor_total": 2, "subtotal": 3, "contingency_10_percent": 4, "grand_total": 99999}
}
```"#;

    #[tokio::test]
    async fn empty_damages_skip_the_model() {
        let (mock, exec) = executor(MockModelClient::replying(QUOTE_REPLY));
        let quote = price_damages(&exec, &[], "France", "EUR", Some(500.0)).await;
        assert_eq!(quote.status, RecordStatus::NoDamages);
        assert_eq!(quote.summary, QuoteSummary::default());
        assert_eq!(mock.call_count(), 0);
        let comparison = quote.deposit_comparison.unwrap();
        assert!(comparison.covers_repairs);
        assert_eq!(comparison.tenant_owes_extra, 0.0);

        let deduction = compute_deductions(&exec, &[], 500.0, "EUR", None).await;
        assert_eq!(deduction.status, RecordStatus::NoDamages);
        assert_eq!(deduction.deposit_return, 500.0);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn model_totals_are_discarded() {
        let (_, exec) = executor(MockModelClient::replying(QUOTE_REPLY));
        let quote = price_damages(&exec, &[crack()], "France", "EUR", Some(100.0)).await;

        assert_eq!(quote.status, RecordStatus::Success);
        assert_eq!(quote.materials[1].total, 20.0);
        assert_eq!(quote.summary.materials_total, 50.0);
        assert_eq!(quote.summary.labor_total, 100.0);
        assert_eq!(quote.summary.subtotal, 150.0);
        assert_eq!(quote.summary.contingency, 15.0);
        assert_eq!(quote.summary.grand_total, 165.0);

        let comparison = quote.deposit_comparison.unwrap();
        assert!(!comparison.covers_repairs);
        assert_eq!(comparison.tenant_owes_extra, 65.0);
        assert_eq!(comparison.difference, -65.0);
    }

    #[test]
    fn grand_total_is_ten_percent_over_lines() {
        let mut quote = empty_quote(RecordStatus::Success, "Morocco", "MAD");
        quote.materials = vec![crate::models::MaterialLine {
            total: 123.45,
            ..Default::default()
        }];
        quote.labor = vec![crate::models::LaborLine {
            total: 76.55,
            ..Default::default()
        }];
        recompute_quote(&mut quote, None);
        assert_eq!(quote.summary.subtotal, 200.0);
        assert_eq!(quote.summary.grand_total, 220.0);
        assert!(quote.deposit_comparison.is_none());
    }

    #[test]
    fn line_totals_follow_their_factors() {
        let mut quote = empty_quote(RecordStatus::Success, "France", "EUR");
        quote.materials = vec![
            crate::models::MaterialLine {
                quantity: 2.0,
                unit_price: 15.0,
                total: 3000.0,
                ..Default::default()
            },
            crate::models::MaterialLine {
                name: "skip hire".into(),
                total: 80.0,
                ..Default::default()
            },
        ];
        quote.labor = vec![crate::models::LaborLine {
            hours: 3.0,
            hourly_rate: 40.0,
            total: 1.0,
            ..Default::default()
        }];
        recompute_quote(&mut quote, None);
        assert_eq!(quote.materials[0].total, 30.0);
        assert_eq!(quote.materials[1].total, 80.0);
        assert_eq!(quote.labor[0].total, 120.0);
        assert_eq!(quote.summary.materials_total, 110.0);
        assert_eq!(quote.summary.grand_total, 253.0);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(f64::NAN), 0.0);
    }

    #[tokio::test]
    async fn unparsable_quote_is_partial() {
        let (_, exec) = executor(MockModelClient::replying("It would cost roughly 200 euros."));
        let quote = price_damages(&exec, &[crack()], "France", "EUR", None).await;
        assert_eq!(quote.status, RecordStatus::Partial);
        assert_eq!(quote.trust, Trust::Heuristic);
        assert!(quote.materials.is_empty());
        assert_eq!(quote.summary.grand_total, 0.0);
        assert_eq!(quote.raw_quote.as_deref(), Some("It would cost roughly 200 euros."));
    }

    #[tokio::test]
    async fn quote_failure_is_error() {
        let (_, exec) = executor(MockModelClient::new(MockReply::Fail(ModelError::RateLimited(
            "quota".into(),
        ))));
        let quote = price_damages(&exec, &[crack()], "France", "EUR", None).await;
        assert_eq!(quote.status, RecordStatus::Error);
        assert!(quote.message.unwrap().contains("quota"));
    }

    #[tokio::test]
    async fn deposit_return_never_negative() {
        let reply = r#"{
            "deductions": [
                {"item": "wall", "damage_severity": "major", "deduction_amount": 400, "is_beyond_normal_wear": true},
                {"item": "floor", "damage_severity": "critical", "deduction_amount": 350.5, "is_beyond_normal_wear": true},
                {"item": "bogus", "deduction_amount": -80}
            ],
            "total_deductions": 12,
            "deposit_return": 9999,
            "summary": "Most of the deposit is retained"
        }"#;
        let (_, exec) = executor(MockModelClient::replying(reply));
        let deduction = compute_deductions(&exec, &[crack()], 600.0, "USD", None).await;

        assert_eq!(deduction.status, RecordStatus::Success);
        assert_eq!(deduction.deductions[2].deduction_amount, 0.0);
        assert_eq!(deduction.total_deductions, 750.5);
        assert_eq!(deduction.deposit_return, 0.0);
    }

    #[tokio::test]
    async fn unparsable_deduction_keeps_deposit() {
        let (_, exec) = executor(MockModelClient::replying("Deduct about half."));
        let deduction = compute_deductions(&exec, &[crack()], 600.0, "USD", None).await;
        assert_eq!(deduction.status, RecordStatus::Partial);
        assert_eq!(deduction.deposit_return, 600.0);
        assert_eq!(deduction.raw_response.as_deref(), Some("Deduct about half."));
    }
}
