//! Prompt templates for every model-backed stage.
//!
//! Each template opens with a distinct heading line (the `*_HEADING`
//! constants). Besides orienting the model, the heading identifies the
//! stage in logs and lets scripted clients route replies per stage.

use crate::models::{DamageItem, RepairQuote};

pub const LEASE_HEADING: &str = "TASK: LEASE TERMS EXTRACTION";
pub const IDENTIFY_HEADING: &str = "TASK: FLOOR PLAN IDENTIFICATION";
pub const DESCRIBE_HEADING: &str = "TASK: FLOOR PLAN DESCRIPTION";
pub const ROOMS_HEADING: &str = "TASK: FLOOR PLAN ROOM EXTRACTION";
pub const RENDER_IMAGE_HEADING: &str = "TASK: 3D RENDER FROM BLUEPRINT";
pub const RENDER_DESCRIPTION_HEADING: &str = "TASK: 3D RENDER FROM DESCRIPTION";
pub const DAMAGE_REFERENCE_HEADING: &str = "TASK: CHECK-OUT DAMAGE COMPARISON";
pub const DAMAGE_STANDALONE_HEADING: &str = "TASK: DAMAGE INSPECTION";
pub const QUOTE_HEADING: &str = "TASK: REPAIR COST ESTIMATE";
pub const DEDUCTION_HEADING: &str = "TASK: DEPOSIT DEDUCTION CALCULATION";

/// Marker the description stage answers with when the document has no plan.
pub const NO_FLOOR_PLAN_MARKER: &str = "NO_FLOOR_PLAN";

const JSON_ONLY: &str = "Return ONLY valid JSON. No markdown, no commentary.";

pub fn lease_prompt() -> String {
    format!(
        r#"{LEASE_HEADING}

You read residential lease documents. Extract the fields below from the attached document.
Reply with a JSON object of exactly this shape:
{{
  "property_address": "full address",
  "tenant_name": "tenant name(s)",
  "landlord_name": "landlord or property manager",
  "lease_start_date": "YYYY-MM-DD",
  "lease_end_date": "YYYY-MM-DD",
  "monthly_rent": {{ "amount": number, "currency": "ISO code" }},
  "security_deposit": {{ "amount": number, "currency": "ISO code", "conditions": "conditions for return" }},
  "property_details": {{
    "type": "apartment/house/studio/...",
    "bedrooms": number, "bathrooms": number,
    "furnished": true/false, "parking": true/false,
    "notes": "other details"
  }},
  "damage_liability": {{
    "tenant_responsible_for": ["items"],
    "normal_wear_excluded": true/false,
    "inspection_required": true/false
  }},
  "special_clauses": ["clauses about property condition or damage"],
  "has_floor_plan": true/false,
  "floor_plan_page": number or null
}}
Use null for anything the document does not state.
{JSON_ONLY}"#
    )
}

pub fn identify_floor_plan_prompt() -> String {
    format!(
        r#"{IDENTIFY_HEADING}

Decide whether the attached document contains a floor plan or layout diagram.
If it does, describe it and give the page it is on.
Reply with:
{{
  "has_floor_plan": true/false,
  "floor_plan_description": "what the plan shows",
  "page_number": number or null,
  "rooms_visible": ["rooms shown on the plan"],
  "confidence": "high/medium/low"
}}
{JSON_ONLY}"#
    )
}

pub fn describe_floor_plan_prompt() -> String {
    format!(
        r#"{DESCRIBE_HEADING}

Describe the floor plan in the attached document in enough detail to redraw it.
Use this layout:

PROPERTY TYPE: [type]
FLOORS: [number]

ROOMS:
- [room name]: [size estimate], [position], [adjacent rooms]

SPECIAL FEATURES:
- [feature]

LAYOUT DESCRIPTION:
[one paragraph walking through the property from the entrance]

If the document has no floor plan, reply with exactly:
{NO_FLOOR_PLAN_MARKER}: This document does not contain a floor plan."#
    )
}

pub fn parse_rooms_prompt() -> String {
    format!(
        r#"{ROOMS_HEADING}

List every room in the attached floor plan.
Positions are percentages of the whole plan, from the top-left corner.
Reply with:
{{
  "property_type": "apartment/house/studio",
  "rooms": [
    {{
      "id": "room_1",
      "name": "Living Room",
      "type": "living/bedroom/bathroom/kitchen/hallway/other",
      "position": {{ "x": 0-100, "y": 0-100, "width": 0-100, "height": 0-100 }},
      "features": ["window", "door"],
      "inspection_priority": "high/medium/low",
      "inspection_tips": ["Check corners for moisture"]
    }}
  ],
  "inspection_route": ["room_1", "room_2"],
  "entry_point": "room_1"
}}
{JSON_ONLY}"#
    )
}

const RENDER_RULES: &str = r#"Rules:
1. Include only rooms present in the source. Never add rooms.
2. Keep the exact count of bedrooms and bathrooms.
3. Keep room shapes, positions and proportions.
4. No text labels or annotations.

Visual treatment: furniture suited to each room, wood or tile floors, light walls,
natural light, isometric cutaway seen from above, photorealistic, plain light background."#;

pub fn render_from_image_prompt() -> String {
    format!(
        "{RENDER_IMAGE_HEADING}\n\nRender the attached 2D floor plan blueprint as a 3D visualization.\n\n{RENDER_RULES}"
    )
}

pub fn render_from_description_prompt(description: &str) -> String {
    format!(
        "{RENDER_DESCRIPTION_HEADING}\n\nRender a 3D visualization matching this floor plan description exactly.\n\nFLOOR PLAN DESCRIPTION:\n{description}\n\n{RENDER_RULES}"
    )
}

const DAMAGE_ITEM_SHAPE: &str = r#"{
      "type": "water_damage/crack/hole/dent/scratch/stain/peeling/mold/wear/other",
      "location": "where in the image",
      "severity": "minor/moderate/major/critical",
      "size": "estimated size",
      "description": "what the damage looks like",
      "likely_cause": "probable cause""#;

/// Reference-comparison prompt. Attachments follow in the order: every
/// check-in photo as named in `reference_names`, then the check-out photo.
pub fn damage_reference_prompt(reference_names: &[String]) -> String {
    let references = reference_names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("- attachment {}: check-in photo \"{}\"", i + 1, name))
        .collect::<Vec<_>>()
        .join("\n");
    let current = reference_names.len() + 1;

    format!(
        r#"{DAMAGE_REFERENCE_HEADING}

You inspect properties at move-out.
Attachments:
{references}
- attachment {current}: the check-out photo (current condition)

Step 1. Decide whether the check-out photo shows the same room as the check-in photos
(room type, windows, doors, fixtures, layout). If it does not, reply with:
{{
  "status": "wrong_room",
  "same_room": false,
  "damage_found": false,
  "reference_shows": "what the check-in photos show",
  "current_shows": "what the check-out photo shows",
  "message": "which room to go to",
  "suggestion": "how to find the right spot"
}}

Step 2. Same room (any angle): report only damage that is present now and absent at check-in.
Ignore normal wear and anything already visible at check-in. Reply with:
{{
  "status": "new_damage_found" or "no_new_damage",
  "same_room": true,
  "damage_found": true/false,
  "angle_matches_reference": true/false,
  "damages": [
    {DAMAGE_ITEM_SHAPE},
      "is_new": true
    }}
  ],
  "pre_existing_noted": ["conditions visible in both photos"],
  "overall_condition": "good/fair/poor/critical",
  "message": "summary of new damage the tenant is responsible for",
  "repair_urgency": "none/low/medium/high/immediate"
}}
{JSON_ONLY}"#
    )
}

pub fn damage_standalone_prompt() -> String {
    format!(
        r#"{DAMAGE_STANDALONE_HEADING}

Inspect the attached photo for any damage: water stains, bubbling or discoloration, cracks,
holes, dents, scratches, mold, peeling paint, broken fixtures, stains, heavy wear,
chipped surfaces, damaged flooring. Report everything you see.
Reply with:
{{
  "status": "damage_found" or "no_damage",
  "damage_found": true/false,
  "damages": [
    {DAMAGE_ITEM_SHAPE}
    }}
  ],
  "overall_condition": "good/fair/poor/critical",
  "message": "summary",
  "repair_urgency": "none/low/medium/high/immediate"
}}
{JSON_ONLY}"#
    )
}

fn damage_lines(damages: &[DamageItem]) -> String {
    damages
        .iter()
        .map(|d| {
            format!(
                "- {}: {} (location: {}, severity: {}, size: {})",
                d.damage_type,
                d.description.as_deref().unwrap_or("N/A"),
                d.location.as_deref().unwrap_or("N/A"),
                d.severity,
                d.size.as_deref().unwrap_or("N/A"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn repair_quote_prompt(
    damages: &[DamageItem],
    country: &str,
    currency: &str,
    deposit_amount: Option<f64>,
) -> String {
    let deposit = match deposit_amount {
        Some(amount) if amount > 0.0 => {
            format!("\nSECURITY DEPOSIT: {amount} {currency}\nState whether repairs exceed it.\n")
        }
        _ => String::new(),
    };

    format!(
        r#"{QUOTE_HEADING}

Estimate repair costs in {country}, priced in {currency}, for these damages:
{lines}
{deposit}
For each damage give the materials (quantity, unit, realistic local unit price) and the
labor (hours at local hourly rates, worker type).
Reply with:
{{
  "country": "{country}",
  "currency": "{currency}",
  "materials": [
    {{ "name": "material", "quantity": 1, "unit": "piece/kg/m2", "unit_price": 0, "total": 0, "for_damage": "which damage" }}
  ],
  "labor": [
    {{ "task": "what", "hours": 0, "hourly_rate": 0, "total": 0, "worker_type": "painter/plumber/general" }}
  ],
  "notes": "anything else about the repairs"
}}
{JSON_ONLY}"#,
        lines = damage_lines(damages),
    )
}

pub fn deduction_prompt(
    damages: &[DamageItem],
    deposit_amount: f64,
    currency: &str,
    quote: Option<&RepairQuote>,
) -> String {
    let damages_json = if damages.is_empty() {
        "No damages found".to_string()
    } else {
        serde_json::to_string_pretty(damages).unwrap_or_else(|_| damage_lines(damages))
    };
    let quote_json = quote
        .and_then(|q| serde_json::to_string_pretty(q).ok())
        .unwrap_or_else(|| "No quote available".to_string());

    format!(
        r#"{DEDUCTION_HEADING}

You advise on security deposit settlements.
Original deposit: {deposit_amount} {currency}

DAMAGES FOUND:
{damages_json}

REPAIR QUOTE:
{quote_json}

Deduct only for damage beyond normal wear, allowing for depreciation of paint, carpet
and fittings and for local rules limiting deductions to actual damage.
Reply with:
{{
  "deductions": [
    {{
      "item": "damage",
      "damage_severity": "minor/moderate/major/critical",
      "deduction_amount": number,
      "justification": "why the amount is fair",
      "is_beyond_normal_wear": true/false
    }}
  ],
  "summary": "short summary for the tenant",
  "landlord_notes": "notes for the landlord",
  "disputed_items": ["items likely to be contested"]
}}
{JSON_ONLY}"#
    )
}
