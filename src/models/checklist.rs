use serde::{Deserialize, Serialize};

use super::damage::DamageItem;
use super::enums::{ChecklistStatus, InspectionPriority, RoomType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub item: String,
    pub checked: bool,
}

impl ChecklistItem {
    pub fn unchecked(item: &str) -> Self {
        Self {
            item: item.to_string(),
            checked: false,
        }
    }
}

/// Per-room inspection record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistEntry {
    pub room_id: String,
    pub room_name: String,
    pub room_type: RoomType,
    pub status: ChecklistStatus,
    pub priority: InspectionPriority,
    pub inspection_items: Vec<ChecklistItem>,
    pub tips: Vec<String>,
    pub damages_found: Vec<DamageItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    pub current_room: Option<String>,
    pub next_room: Option<String>,
    pub completed_rooms: usize,
    pub total_rooms: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionChecklist {
    pub total_rooms: usize,
    pub checklist: Vec<ChecklistEntry>,
    pub navigation: Navigation,
}

impl InspectionChecklist {
    pub fn entry(&self, room_id: &str) -> Option<&ChecklistEntry> {
        self.checklist.iter().find(|e| e.room_id == room_id)
    }

    /// Mark a room as being inspected. Returns `false` for an unknown room.
    pub fn start_room(&mut self, room_id: &str) -> bool {
        let Some(entry) = self.checklist.iter_mut().find(|e| e.room_id == room_id) else {
            return false;
        };
        if entry.status != ChecklistStatus::Done {
            entry.status = ChecklistStatus::InProgress;
        }
        self.navigation.current_room = Some(room_id.to_string());
        self.refresh_navigation();
        true
    }

    /// Append damages found while inspecting a room.
    pub fn record_damages(&mut self, room_id: &str, damages: Vec<DamageItem>) -> bool {
        match self.checklist.iter_mut().find(|e| e.room_id == room_id) {
            Some(entry) => {
                entry.damages_found.extend(damages);
                true
            }
            None => false,
        }
    }

    /// Finish a room: every item is checked and the status becomes done.
    pub fn complete_room(&mut self, room_id: &str) -> bool {
        let Some(entry) = self.checklist.iter_mut().find(|e| e.room_id == room_id) else {
            return false;
        };
        entry.status = ChecklistStatus::Done;
        for item in &mut entry.inspection_items {
            item.checked = true;
        }
        if self.navigation.current_room.as_deref() == Some(room_id) {
            self.navigation.current_room = None;
        }
        self.refresh_navigation();
        true
    }

    /// Every damage recorded across all rooms, in checklist order.
    pub fn all_damages(&self) -> Vec<DamageItem> {
        self.checklist
            .iter()
            .flat_map(|e| e.damages_found.iter().cloned())
            .collect()
    }

    fn refresh_navigation(&mut self) {
        let current = self.navigation.current_room.clone();
        self.navigation.completed_rooms = self
            .checklist
            .iter()
            .filter(|e| e.status == ChecklistStatus::Done)
            .count();
        self.navigation.next_room = self
            .checklist
            .iter()
            .find(|e| e.status != ChecklistStatus::Done && Some(&e.room_id) != current.as_ref())
            .map(|e| e.room_id.clone());
        self.navigation.total_rooms = self.checklist.len();
    }
}
