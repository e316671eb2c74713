//! The workflow catalogue: each entry point builds a stage graph, runs it,
//! merges the successful artifacts into the project store and returns a
//! caller-facing record.

use std::sync::Arc;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::checklist::{build_checklist, derive_layout};
use super::damage;
use super::extractor::{parse_array_lenient, ParseOutcome};
use super::media;
use super::model::{Attachment, ResponseModality};
use super::orchestrator::{RunStatus, Workflow, WorkflowRun};
use super::pricing;
use super::prompts;
use super::stage::{StageExecutor, StageResult};
use super::PipelineError;
use crate::models::{
    DamageAnalysis, DamageItem, DepositDeduction, FloorPlan, FloorPlanInfo, InspectionChecklist,
    Layout3d, LeaseInfo, Project, ProjectPatch, RecordStatus, RenderedImage, RepairQuote, Room,
};
use crate::store::ProjectStateStore;

pub const EXTRACT_LEASE: &str = "extract_lease_info";
pub const IDENTIFY_FLOOR_PLAN: &str = "identify_floor_plan";
pub const PARSE_ROOMS: &str = "parse_rooms";
pub const DERIVE_LAYOUT: &str = "derive_layout";
pub const BUILD_CHECKLIST: &str = "build_checklist";
pub const RENDER_3D: &str = "render_3d";

pub const NO_FLOOR_PLAN_CODE: &str = "no_floor_plan";

const DEFAULT_RENDER_MEDIA_TYPE: &str = "image/png";

// ──────────────────────────────────────────────
// Records
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseExtraction {
    pub status: RecordStatus,
    pub lease_info: Option<LeaseInfo>,
    /// Unparsed reply when the lease could not be read as structured data.
    pub raw_extraction: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseDocumentRecord {
    pub project_id: String,
    pub status: RecordStatus,
    pub lease: LeaseExtraction,
    pub floor_plan_info: Option<FloorPlanInfo>,
    pub ready_for_inspection: bool,
    pub deposit_amount: Option<f64>,
    pub deposit_currency: String,
    pub run: WorkflowRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorPlanRecord {
    pub project_id: String,
    pub status: RecordStatus,
    pub floor_plan_info: Option<FloorPlanInfo>,
    pub floor_plan: Option<FloorPlan>,
    pub layout_3d: Option<Layout3d>,
    pub inspection_checklist: Option<InspectionChecklist>,
    pub render: Option<RenderedImage>,
    pub raw_analysis: Option<String>,
    pub run: WorkflowRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRecord {
    pub status: RecordStatus,
    pub render: Option<RenderedImage>,
    pub message: Option<String>,
    /// Text the model streamed alongside (or instead of) an image.
    pub text_response: Option<String>,
}

fn record_status(run: &WorkflowRun) -> RecordStatus {
    match run.status {
        RunStatus::Success => RecordStatus::Success,
        RunStatus::Partial => RecordStatus::Partial,
        RunStatus::Failed => RecordStatus::Error,
    }
}

fn hit_no_floor_plan(run: &WorkflowRun) -> bool {
    run.stages
        .iter()
        .any(|s| s.stage != RENDER_3D && s.code.as_deref() == Some(NO_FLOOR_PLAN_CODE))
}

// ──────────────────────────────────────────────
// Stage bodies
// ──────────────────────────────────────────────

async fn lease_stage(exec: StageExecutor, document: Attachment) -> StageResult {
    exec.run::<LeaseInfo>(EXTRACT_LEASE, &prompts::lease_prompt(), &[document])
        .await
}

async fn identify_stage(exec: StageExecutor, document: Attachment) -> StageResult {
    let prompt = prompts::identify_floor_plan_prompt();
    let (outcome, raw) = match exec.extract::<serde_json::Value>(&prompt, &[document]).await {
        Ok(reply) => reply,
        Err(e) => return StageResult::from_model_error(IDENTIFY_FLOOR_PLAN, &e),
    };
    // an unreadable answer counts as "no floor plan"
    let info = outcome
        .structured()
        .map(|value| FloorPlanInfo::from_reply(&value))
        .unwrap_or_default();
    let payload = serde_json::to_value(&info).unwrap_or_default();

    if info.has_floor_plan {
        StageResult::success(IDENTIFY_FLOOR_PLAN, payload).with_raw_text(raw)
    } else {
        StageResult {
            payload: Some(payload),
            ..StageResult::error(IDENTIFY_FLOOR_PLAN, "No floor plan found in document")
                .with_code(NO_FLOOR_PLAN_CODE)
                .with_raw_text(raw)
        }
    }
}

/// Build a floor plan from a loosely-shaped reply, dropping malformed rooms.
pub fn floor_plan_from_value(value: &serde_json::Value) -> FloorPlan {
    let text = |key: &str| value.get(key).and_then(|v| v.as_str()).map(String::from);
    let rooms: Vec<Room> = value
        .get("rooms")
        .map(parse_array_lenient::<Room>)
        .unwrap_or_default();
    let inspection_route = value
        .get("inspection_route")
        .and_then(|v| v.as_array())
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    FloorPlan {
        property_type: text("property_type"),
        rooms,
        inspection_route,
        entry_point: text("entry_point"),
    }
    .normalize()
}

async fn parse_rooms_stage(exec: StageExecutor, plan_source: Attachment) -> StageResult {
    let prompt = prompts::parse_rooms_prompt();
    match exec.extract::<serde_json::Value>(&prompt, &[plan_source]).await {
        Ok((ParseOutcome::Structured(value), raw)) => {
            let plan = floor_plan_from_value(&value);
            tracing::info!(rooms = plan.rooms.len(), "floor plan parsed");
            match serde_json::to_value(&plan) {
                Ok(payload) => StageResult::success(PARSE_ROOMS, payload).with_raw_text(raw),
                Err(e) => StageResult::error(PARSE_ROOMS, e.to_string()),
            }
        }
        Ok((ParseOutcome::Heuristic { .. }, raw)) => StageResult::partial(
            PARSE_ROOMS,
            serde_json::to_value(FloorPlan::default()).unwrap_or_default(),
            "floor plan reply could not be parsed; raw analysis provided",
        )
        .with_raw_text(raw),
        Err(e) => StageResult::from_model_error(PARSE_ROOMS, &e),
    }
}

fn plan_stage<T: Serialize>(stage: &str, plan: Option<FloorPlan>, f: impl FnOnce(&FloorPlan) -> T) -> StageResult {
    let Some(plan) = plan else {
        return StageResult::error(stage, "parsed floor plan unavailable");
    };
    match serde_json::to_value(f(&plan)) {
        Ok(payload) => StageResult::success(stage, payload),
        Err(e) => StageResult::error(stage, e.to_string()),
    }
}

async fn render_stage(exec: StageExecutor, source: Attachment) -> StageResult {
    let modalities = [ResponseModality::Image, ResponseModality::Text];

    let (prompt, attachments, origin) = if media::is_pdf(&source.media_type) {
        let description = match exec
            .invoke(&prompts::describe_floor_plan_prompt(), &[source])
            .await
        {
            Ok(text) => text,
            Err(e) => return StageResult::from_model_error(RENDER_3D, &e),
        };
        if description.contains(prompts::NO_FLOOR_PLAN_MARKER) {
            return StageResult::error(RENDER_3D, "No floor plan found in document")
                .with_code(NO_FLOOR_PLAN_CODE)
                .with_raw_text(description);
        }
        (
            prompts::render_from_description_prompt(&description),
            Vec::new(),
            "pdf_description",
        )
    } else {
        let media_type = if media::is_image(&source.media_type) {
            source.media_type.clone()
        } else {
            media::JPEG.to_string()
        };
        (
            prompts::render_from_image_prompt(),
            vec![Attachment::new(source.data.clone(), media_type)],
            "image",
        )
    };

    let output = match exec.invoke_streaming(&prompt, &attachments, &modalities).await {
        Ok(out) => out,
        Err(e) => return StageResult::from_model_error(RENDER_3D, &e),
    };

    match output.binary {
        Some((bytes, media_type)) => {
            let description = if output.text.trim().is_empty() {
                match origin {
                    "pdf_description" => "3D visualization generated from PDF",
                    _ => "3D visualization generated",
                }
                .to_string()
            } else {
                output.text
            };
            let render = RenderedImage {
                image_base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
                mime_type: if media_type.is_empty() {
                    DEFAULT_RENDER_MEDIA_TYPE.to_string()
                } else {
                    media_type
                },
                description,
                source: origin.to_string(),
            };
            match serde_json::to_value(&render) {
                Ok(payload) => StageResult::success(RENDER_3D, payload),
                Err(e) => StageResult::error(RENDER_3D, e.to_string()),
            }
        }
        None => StageResult::error(RENDER_3D, "No image generated")
            .with_code("no_image")
            .with_raw_text(output.text),
    }
}

// ──────────────────────────────────────────────
// Catalogue
// ──────────────────────────────────────────────

/// Entry points for every pipeline, bound to one executor and store.
#[derive(Clone)]
pub struct Workflows {
    exec: StageExecutor,
    store: Arc<ProjectStateStore>,
}

impl Workflows {
    pub fn new(exec: StageExecutor, store: Arc<ProjectStateStore>) -> Self {
        Self { exec, store }
    }

    pub fn store(&self) -> &Arc<ProjectStateStore> {
        &self.store
    }

    pub fn executor(&self) -> &StageExecutor {
        &self.exec
    }

    /// Catalogue for a single request, sharing the store. Its token can be
    /// cancelled (e.g. on client disconnect) without touching other requests.
    pub fn scoped(&self) -> Self {
        Self {
            exec: self.exec.scoped(),
            store: self.store.clone(),
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        self.exec.cancellation_token()
    }

    /// Lease terms plus floor-plan identification, run concurrently.
    pub async fn process_lease_document(
        &self,
        project_id: &str,
        document: &[u8],
        media_type: Option<&str>,
    ) -> Result<LeaseDocumentRecord, PipelineError> {
        let doc = Attachment::new(document.to_vec(), media::resolve(document, media_type));
        let (e1, d1) = (self.exec.clone(), doc.clone());
        let (e2, d2) = (self.exec.clone(), doc);

        let run = Workflow::new("process_lease_document")
            .stage(EXTRACT_LEASE, &[], move |_| lease_stage(e1, d1))
            .stage(IDENTIFY_FLOOR_PLAN, &[], move |_| identify_stage(e2, d2))
            .run()
            .await?;

        let lease = lease_extraction(run.stage(EXTRACT_LEASE));
        let floor_plan_info: Option<FloorPlanInfo> = run
            .stage(IDENTIFY_FLOOR_PLAN)
            .and_then(|s| s.payload_as());
        let ready_for_inspection = floor_plan_info.as_ref().is_some_and(|i| i.has_floor_plan);

        if let Some(info) = &lease.lease_info {
            self.store.merge(
                project_id,
                ProjectPatch {
                    lease_info: Some(info.clone()),
                    ..Default::default()
                },
            )?;
        }

        Ok(LeaseDocumentRecord {
            project_id: project_id.to_string(),
            status: record_status(&run),
            deposit_amount: lease.lease_info.as_ref().and_then(|l| l.deposit_amount()),
            deposit_currency: lease
                .lease_info
                .as_ref()
                .map(|l| l.deposit_currency())
                .unwrap_or_else(|| "USD".to_string()),
            lease,
            floor_plan_info,
            ready_for_inspection,
            run,
        })
    }

    /// Lease terms only.
    pub async fn extract_lease_info(
        &self,
        project_id: &str,
        document: &[u8],
        media_type: Option<&str>,
    ) -> Result<LeaseExtraction, PipelineError> {
        let doc = Attachment::new(document.to_vec(), media::resolve(document, media_type));
        let exec = self.exec.clone();
        let run = Workflow::new("extract_lease_info")
            .stage(EXTRACT_LEASE, &[], move |_| lease_stage(exec, doc))
            .run()
            .await?;

        let lease = lease_extraction(run.stage(EXTRACT_LEASE));
        if let Some(info) = &lease.lease_info {
            self.store.merge(
                project_id,
                ProjectPatch {
                    lease_info: Some(info.clone()),
                    ..Default::default()
                },
            )?;
        }
        Ok(lease)
    }

    /// identify → parse rooms → {layout, checklist, render}.
    pub async fn generate_3d_from_document(
        &self,
        project_id: &str,
        document: &[u8],
        media_type: Option<&str>,
    ) -> Result<FloorPlanRecord, PipelineError> {
        let doc = Attachment::new(document.to_vec(), media::resolve(document, media_type));
        let (e1, d1) = (self.exec.clone(), doc.clone());
        let (e2, d2) = (self.exec.clone(), doc.clone());
        let (e3, d3) = (self.exec.clone(), doc);

        let workflow = Workflow::new("generate_3d_from_document")
            .stage(IDENTIFY_FLOOR_PLAN, &[], move |_| identify_stage(e1, d1))
            .stage(PARSE_ROOMS, &[IDENTIFY_FLOOR_PLAN], move |_| parse_rooms_stage(e2, d2));
        let run = with_plan_stages(workflow)
            .stage(RENDER_3D, &[PARSE_ROOMS], move |_| render_stage(e3, d3))
            .run()
            .await?;

        self.finish_floor_plan(project_id, run)
    }

    /// parse rooms → {layout, checklist} from a floor-plan image.
    pub async fn parse_floor_plan(
        &self,
        project_id: &str,
        image: &[u8],
        media_type: Option<&str>,
    ) -> Result<FloorPlanRecord, PipelineError> {
        let source = Attachment::new(image.to_vec(), media::resolve(image, media_type));
        let exec = self.exec.clone();
        let workflow = Workflow::new("parse_floor_plan")
            .stage(PARSE_ROOMS, &[], move |_| parse_rooms_stage(exec, source));
        let run = with_plan_stages(workflow).run().await?;

        self.finish_floor_plan(project_id, run)
    }

    /// Photorealistic 3D render of a floor plan image or PDF.
    pub async fn render_3d_image(
        &self,
        image: &[u8],
        media_type: Option<&str>,
    ) -> Result<RenderRecord, PipelineError> {
        let source = Attachment::new(image.to_vec(), media::resolve(image, media_type));
        let exec = self.exec.clone();
        let run = Workflow::new("render_3d_image")
            .stage(RENDER_3D, &[], move |_| render_stage(exec, source))
            .run()
            .await?;

        let stage = run.stage(RENDER_3D);
        let render: Option<RenderedImage> = run.payload_as(RENDER_3D);
        let status = match (&render, stage.and_then(|s| s.code.as_deref())) {
            (Some(_), _) => RecordStatus::Success,
            (None, Some(NO_FLOOR_PLAN_CODE)) => RecordStatus::NoFloorPlan,
            (None, _) => RecordStatus::Error,
        };
        Ok(RenderRecord {
            status,
            message: stage.and_then(|s| s.message.clone()),
            text_response: stage.and_then(|s| s.raw_text.clone()),
            render,
        })
    }

    /// Analyze an inspection photo. With a `room_id`, found damage is
    /// recorded on that room of the project's checklist.
    pub async fn analyze_damage(
        &self,
        project_id: &str,
        room_id: Option<&str>,
        current: &[u8],
        references: &[Vec<u8>],
        reference_names: &[String],
    ) -> Result<DamageAnalysis, PipelineError> {
        let analysis =
            damage::analyze_against_reference(&self.exec, current, references, reference_names)
                .await;

        if let Some(room_id) = room_id {
            if !analysis.damages.is_empty() {
                let damages = analysis.damages.clone();
                let recorded = self.store.update_existing(project_id, |project| {
                    let recorded = project
                        .inspection_checklist
                        .as_mut()
                        .is_some_and(|c| c.record_damages(room_id, damages));
                    if recorded {
                        project.updated_at = Some(chrono::Utc::now());
                    }
                    recorded
                })?;
                if recorded != Some(true) {
                    tracing::warn!(project_id, room_id, "room not on checklist, damages not recorded");
                }
            }
        }
        Ok(analysis)
    }

    /// Repair quote. Without explicit damages, every damage recorded on the
    /// project's checklist is priced; without a deposit, the lease's is used.
    pub async fn price_damages(
        &self,
        project_id: &str,
        damages: Option<Vec<DamageItem>>,
        country: &str,
        currency: &str,
        deposit_amount: Option<f64>,
    ) -> Result<RepairQuote, PipelineError> {
        let project = self.store.get(project_id)?;
        let damages = damages.unwrap_or_else(|| recorded_damages(&project));
        let deposit = deposit_amount.or(project.deposit_amount);

        let quote = pricing::price_damages(&self.exec, &damages, country, currency, deposit).await;
        if quote.status == RecordStatus::Success {
            self.store.merge(
                project_id,
                ProjectPatch {
                    repair_quote: Some(quote.clone()),
                    ..Default::default()
                },
            )?;
        }
        Ok(quote)
    }

    /// Deposit deductions, using the project's stored quote when present.
    pub async fn compute_deductions(
        &self,
        project_id: &str,
        damages: Option<Vec<DamageItem>>,
        deposit_amount: Option<f64>,
        currency: Option<&str>,
    ) -> Result<DepositDeduction, PipelineError> {
        let project = self.store.get(project_id)?;
        let damages = damages.unwrap_or_else(|| recorded_damages(&project));
        let deposit = deposit_amount.or(project.deposit_amount).unwrap_or(0.0);
        let currency = currency
            .map(String::from)
            .or_else(|| project.deposit_currency.clone())
            .unwrap_or_else(|| "USD".to_string());

        let deduction = pricing::compute_deductions(
            &self.exec,
            &damages,
            deposit,
            &currency,
            project.repair_quote.as_ref(),
        )
        .await;
        if matches!(deduction.status, RecordStatus::Success | RecordStatus::NoDamages) {
            self.store.merge(
                project_id,
                ProjectPatch {
                    deposit_deductions: Some(deduction.clone()),
                    ..Default::default()
                },
            )?;
        }
        Ok(deduction)
    }

    pub fn project(&self, project_id: &str) -> Result<Project, PipelineError> {
        Ok(self.store.get(project_id)?)
    }

    fn finish_floor_plan(
        &self,
        project_id: &str,
        run: WorkflowRun,
    ) -> Result<FloorPlanRecord, PipelineError> {
        let floor_plan: Option<FloorPlan> = run.payload_as(PARSE_ROOMS);
        let layout_3d: Option<Layout3d> = run.payload_as(DERIVE_LAYOUT);
        let inspection_checklist: Option<InspectionChecklist> = run.payload_as(BUILD_CHECKLIST);

        let patch = ProjectPatch {
            floor_plan: floor_plan.clone(),
            layout_3d: layout_3d.clone(),
            inspection_checklist: inspection_checklist.clone(),
            ..Default::default()
        };
        if !patch.is_empty() {
            self.store.merge(project_id, patch)?;
        }

        let status = if hit_no_floor_plan(&run) {
            RecordStatus::NoFloorPlan
        } else {
            record_status(&run)
        };

        Ok(FloorPlanRecord {
            project_id: project_id.to_string(),
            status,
            floor_plan_info: run.stage(IDENTIFY_FLOOR_PLAN).and_then(|s| s.payload_as()),
            render: run.payload_as(RENDER_3D),
            raw_analysis: run
                .stage(PARSE_ROOMS)
                .filter(|s| !s.is_success())
                .and_then(|s| s.raw_text.clone()),
            floor_plan,
            layout_3d,
            inspection_checklist,
            run,
        })
    }
}

/// Add the deterministic layout and checklist stages after `parse_rooms`.
fn with_plan_stages(workflow: Workflow) -> Workflow {
    workflow
        .stage(DERIVE_LAYOUT, &[PARSE_ROOMS], |inputs| async move {
            plan_stage(DERIVE_LAYOUT, inputs.payload_as(PARSE_ROOMS), derive_layout)
        })
        .stage(BUILD_CHECKLIST, &[PARSE_ROOMS], |inputs| async move {
            plan_stage(BUILD_CHECKLIST, inputs.payload_as(PARSE_ROOMS), build_checklist)
        })
}

fn lease_extraction(stage: Option<&StageResult>) -> LeaseExtraction {
    let Some(stage) = stage else {
        return LeaseExtraction {
            status: RecordStatus::Error,
            lease_info: None,
            raw_extraction: None,
            message: Some("lease stage did not run".into()),
        };
    };
    if stage.is_success() {
        LeaseExtraction {
            status: RecordStatus::Success,
            lease_info: stage.payload_as(),
            raw_extraction: None,
            message: None,
        }
    } else if stage.status == super::stage::StageStatus::Partial {
        LeaseExtraction {
            status: RecordStatus::Partial,
            lease_info: None,
            raw_extraction: stage.raw_text.clone(),
            message: Some("Could not parse structured data, raw extraction provided".into()),
        }
    } else {
        LeaseExtraction {
            status: RecordStatus::Error,
            lease_info: None,
            raw_extraction: None,
            message: stage.message.clone(),
        }
    }
}

fn recorded_damages(project: &Project) -> Vec<DamageItem> {
    project
        .inspection_checklist
        .as_ref()
        .map(|c| c.all_damages())
        .unwrap_or_default()
}
