//! Damage analysis of inspection photos, with or without check-in references.

use super::extractor::ParseOutcome;
use super::media;
use super::model::Attachment;
use super::prompts;
use super::stage::StageExecutor;
use crate::models::{DamageAnalysis, DamageStatus, Trust};

fn photo(bytes: &[u8]) -> Attachment {
    let detected = media::detect_media_type(bytes);
    let media_type = if media::is_image(detected) {
        detected
    } else {
        media::JPEG
    };
    Attachment::new(bytes.to_vec(), media_type)
}

/// Name for each reference photo; missing names become `reference_<n>`.
pub fn reference_names(count: usize, names: &[String]) -> Vec<String> {
    (0..count)
        .map(|i| match names.get(i).map(|n| n.trim()) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("reference_{}", i + 1),
        })
        .collect()
}

/// Compare a check-out photo against check-in references; only new damage
/// is reported. Without references this is a standalone analysis.
pub async fn analyze_against_reference(
    exec: &StageExecutor,
    current: &[u8],
    references: &[Vec<u8>],
    names: &[String],
) -> DamageAnalysis {
    if references.is_empty() {
        return analyze_standalone(exec, current).await;
    }

    let names = reference_names(references.len(), names);
    let prompt = prompts::damage_reference_prompt(&names);
    let mut attachments: Vec<Attachment> = references.iter().map(|r| photo(r)).collect();
    attachments.push(photo(current));

    tracing::debug!(references = references.len(), "comparing against check-in photos");
    analyze(exec, &prompt, &attachments, true).await
}

/// Look for any damage in a single photo.
pub async fn analyze_standalone(exec: &StageExecutor, current: &[u8]) -> DamageAnalysis {
    let prompt = prompts::damage_standalone_prompt();
    analyze(exec, &prompt, &[photo(current)], false).await
}

async fn analyze(
    exec: &StageExecutor,
    prompt: &str,
    attachments: &[Attachment],
    reference_mode: bool,
) -> DamageAnalysis {
    let (outcome, raw) = match exec.extract::<DamageAnalysis>(prompt, attachments).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, reference_mode, "damage analysis failed");
            return DamageAnalysis {
                status: DamageStatus::Error,
                message: Some(format!("Damage analysis failed: {e}")),
                ..Default::default()
            };
        }
    };

    let analysis = match outcome {
        ParseOutcome::Structured(analysis) => DamageAnalysis {
            raw_analysis: Some(raw),
            trust: Trust::Structured,
            ..analysis
        }
        .reconciled(reference_mode),
        ParseOutcome::Heuristic {
            damage_found,
            message,
        } => DamageAnalysis {
            status: if damage_found {
                DamageStatus::DamageFound
            } else {
                DamageStatus::NoDamage
            },
            damage_found,
            message: Some(message),
            raw_analysis: Some(raw),
            trust: Trust::Heuristic,
            ..Default::default()
        },
    };

    tracing::info!(
        status = analysis.status.as_str(),
        damages = analysis.damages.len(),
        trust = ?analysis.trust,
        "damage analysis finished"
    );
    analysis
}
