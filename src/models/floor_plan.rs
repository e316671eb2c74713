use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::enums::{InspectionPriority, RoomType};
use super::lenient;

/// Bounds of the normalized footprint grid.
pub const POSITION_MIN: f64 = 0.0;
pub const POSITION_MAX: f64 = 100.0;

fn default_extent() -> f64 {
    10.0
}

fn extent<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(lenient::number_of(&serde_json::Value::deserialize(deserializer)?)
        .unwrap_or_else(default_extent))
}

/// Normalized room footprint on a 0–100 grid (not absolute units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoomPosition {
    #[serde(default, deserialize_with = "lenient::number")]
    pub x: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub y: f64,
    #[serde(default = "default_extent", deserialize_with = "extent")]
    pub width: f64,
    #[serde(default = "default_extent", deserialize_with = "extent")]
    pub height: f64,
}

impl Default for RoomPosition {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: default_extent(),
            height: default_extent(),
        }
    }
}

impl RoomPosition {
    /// Clamp every coordinate into [0, 100]; NaN collapses to 0.
    pub fn clamped(self) -> Self {
        let clamp = |v: f64| {
            if v.is_nan() {
                POSITION_MIN
            } else {
                v.clamp(POSITION_MIN, POSITION_MAX)
            }
        };
        Self {
            x: clamp(self.x),
            y: clamp(self.y),
            width: clamp(self.width),
            height: clamp(self.height),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub room_type: RoomType,
    #[serde(default)]
    pub position: RoomPosition,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub features: Vec<String>,
    #[serde(default)]
    pub inspection_priority: InspectionPriority,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub inspection_tips: Vec<String>,
}

/// Rooms parsed from a floor plan plus the walkthrough order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorPlan {
    pub property_type: Option<String>,
    pub rooms: Vec<Room>,
    pub inspection_route: Vec<String>,
    pub entry_point: Option<String>,
}

impl FloorPlan {
    /// Enforce the invariants the model cannot be trusted with: positions
    /// inside the grid and room ids unique within the plan.
    ///
    /// Empty ids become `room_<n>` (1-based list position); a repeated id
    /// gets a `_<k>` suffix. Route entries keep referring to the first room
    /// carrying that id.
    pub fn normalize(mut self) -> Self {
        let mut seen: HashSet<String> = HashSet::new();
        for (index, room) in self.rooms.iter_mut().enumerate() {
            room.position = room.position.clamped();

            let base = if room.id.trim().is_empty() {
                format!("room_{}", index + 1)
            } else {
                room.id.trim().to_string()
            };
            let mut candidate = base.clone();
            let mut suffix = 2;
            while seen.contains(&candidate) {
                candidate = format!("{base}_{suffix}");
                suffix += 1;
            }
            seen.insert(candidate.clone());
            room.id = candidate;
        }
        self
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }
}

/// Answer to "does this document contain a floor plan?".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorPlanInfo {
    #[serde(deserialize_with = "lenient::flag")]
    pub has_floor_plan: bool,
    pub floor_plan_description: Option<String>,
    #[serde(deserialize_with = "lenient::opt_count")]
    pub page_number: Option<u32>,
    #[serde(deserialize_with = "lenient::strings")]
    pub rooms_visible: Vec<String>,
    #[serde(deserialize_with = "lenient::opt_text")]
    pub confidence: Option<String>,
}

impl FloorPlanInfo {
    /// Read an identification reply. `has_floor_plan` survives even when a
    /// sibling field has a shape no reader accepts.
    pub fn from_reply(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|_| Self {
            has_floor_plan: value
                .get("has_floor_plan")
                .and_then(lenient::flag_of)
                .unwrap_or(false),
            floor_plan_description: value
                .get("floor_plan_description")
                .and_then(lenient::text_of),
            page_number: value.get("page_number").and_then(lenient::count_of),
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub x: f64,
    pub z: f64,
    pub width: f64,
    pub depth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room3d {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    pub color: String,
    pub geometry: Geometry,
    pub inspection_priority: InspectionPriority,
}

/// Scene description a 3D viewer renders from a parsed floor plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout3d {
    #[serde(rename = "type")]
    pub kind: String,
    pub rooms: Vec<Room3d>,
    pub inspection_route: Vec<String>,
}

/// Generated 3D render of a floor plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedImage {
    pub image_base64: String,
    pub mime_type: String,
    pub description: String,
    /// `image` when rendered from the plan itself, `pdf_description` when
    /// rendered from a text description of a PDF.
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_is_clamped_into_grid() {
        let pos = RoomPosition {
            x: -5.0,
            y: 140.0,
            width: f64::NAN,
            height: 50.0,
        }
        .clamped();
        assert_eq!(pos.x, 0.0);
        assert_eq!(pos.y, 100.0);
        assert_eq!(pos.width, 0.0);
        assert_eq!(pos.height, 50.0);
    }

    #[test]
    fn missing_position_fields_use_defaults() {
        let room: Room = serde_json::from_str(r#"{"id": "r1", "position": {"x": 20}}"#).unwrap();
        assert_eq!(room.position.x, 20.0);
        assert_eq!(room.position.width, 10.0);
        assert_eq!(room.room_type, RoomType::Other);
        assert_eq!(room.inspection_priority, InspectionPriority::Medium);
    }

    #[test]
    fn normalize_makes_ids_unique() {
        let plan: FloorPlan = serde_json::from_str(
            r#"{"rooms": [{"id": "r1"}, {"id": "r1"}, {"id": ""}, {"id": "r1"}]}"#,
        )
        .unwrap();
        let ids: Vec<String> = plan.normalize().rooms.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["r1", "r1_2", "room_3", "r1_3"]);
    }

    #[test]
    fn floor_plan_info_tolerates_quoted_page_number() {
        let info: FloorPlanInfo = serde_json::from_str(
            r#"{"has_floor_plan": true, "page_number": "3", "rooms_visible": ["Kitchen", 2], "confidence": 0.8}"#,
        )
        .unwrap();
        assert!(info.has_floor_plan);
        assert_eq!(info.page_number, Some(3));
        assert_eq!(info.rooms_visible, vec!["Kitchen", "2"]);
        assert_eq!(info.confidence.as_deref(), Some("0.8"));
    }

    #[test]
    fn identification_flag_survives_unreadable_siblings() {
        let info = FloorPlanInfo::from_reply(&serde_json::json!({
            "has_floor_plan": "yes",
            "floor_plan_description": {"summary": "two rooms"},
            "page_number": 2
        }));
        assert!(info.has_floor_plan);
        assert_eq!(info.page_number, Some(2));
        assert!(info.floor_plan_description.is_none());
    }

    #[test]
    fn quoted_position_reads_as_number() {
        let room: Room =
            serde_json::from_str(r#"{"id": "r1", "position": {"x": "20", "width": "wide"}}"#).unwrap();
        assert_eq!(room.position.x, 20.0);
        assert_eq!(room.position.width, 10.0);
    }

    #[test]
    fn floor_plan_info_defaults_to_not_found() {
        let info: FloorPlanInfo = serde_json::from_str("{}").unwrap();
        assert!(!info.has_floor_plan);
    }
}
