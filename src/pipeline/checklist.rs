//! Inspection checklist and 3D layout derived from a parsed floor plan.
//!
//! Both are deterministic: no model call, same plan in, same output out.

use std::collections::HashMap;

use crate::models::{
    ChecklistEntry, ChecklistItem, ChecklistStatus, FloorPlan, Geometry, InspectionChecklist,
    Layout3d, Navigation, Room, Room3d, RoomType,
};

/// Rank of rooms missing from the inspection route; sorts after every listed room.
const UNROUTED_RANK: usize = usize::MAX;

const UNIVERSAL_ITEMS: [&str; 3] = ["Walls", "Ceiling", "Floor"];

pub const LAYOUT_KIND: &str = "3d_floor_plan";

fn type_items(room_type: RoomType) -> &'static [&'static str] {
    match room_type {
        RoomType::Bathroom => &["Toilet", "Sink", "Shower"],
        RoomType::Kitchen => &["Cabinets", "Countertops", "Appliances"],
        RoomType::Bedroom => &["Windows", "Closet"],
        RoomType::Living => &["Windows", "Outlets"],
        RoomType::Hallway | RoomType::Other => &[],
    }
}

pub fn room_color(room_type: RoomType) -> &'static str {
    match room_type {
        RoomType::Living => "#4CAF50",
        RoomType::Bedroom => "#2196F3",
        RoomType::Bathroom => "#00BCD4",
        RoomType::Kitchen => "#FF9800",
        RoomType::Hallway => "#9E9E9E",
        RoomType::Other => "#607D8B",
    }
}

/// Rooms in walkthrough order: route position first, unrouted rooms last,
/// ties kept in plan order.
pub fn ordered_rooms(plan: &FloorPlan) -> Vec<&Room> {
    let mut rank: HashMap<&str, usize> = HashMap::new();
    for (i, id) in plan.inspection_route.iter().enumerate() {
        // a room listed twice keeps its first position
        rank.entry(id.as_str()).or_insert(i);
    }
    let mut rooms: Vec<&Room> = plan.rooms.iter().collect();
    // sort_by_key is stable
    rooms.sort_by_key(|r| rank.get(r.id.as_str()).copied().unwrap_or(UNROUTED_RANK));
    rooms
}

pub fn build_checklist(plan: &FloorPlan) -> InspectionChecklist {
    let checklist: Vec<ChecklistEntry> = ordered_rooms(plan)
        .into_iter()
        .map(|room| ChecklistEntry {
            room_id: room.id.clone(),
            room_name: room.name.clone(),
            room_type: room.room_type,
            status: ChecklistStatus::Pending,
            priority: room.inspection_priority,
            inspection_items: UNIVERSAL_ITEMS
                .iter()
                .chain(type_items(room.room_type))
                .map(|item| ChecklistItem::unchecked(item))
                .collect(),
            tips: room.inspection_tips.clone(),
            damages_found: Vec::new(),
        })
        .collect();

    let navigation = Navigation {
        current_room: None,
        next_room: checklist.first().map(|e| e.room_id.clone()),
        completed_rooms: 0,
        total_rooms: checklist.len(),
    };

    InspectionChecklist {
        total_rooms: plan.rooms.len(),
        checklist,
        navigation,
    }
}

pub fn derive_layout(plan: &FloorPlan) -> Layout3d {
    let rooms = plan
        .rooms
        .iter()
        .map(|room| Room3d {
            id: room.id.clone(),
            name: room.name.clone(),
            room_type: room.room_type,
            color: room_color(room.room_type).to_string(),
            geometry: Geometry {
                x: room.position.x,
                z: room.position.y,
                width: room.position.width,
                depth: room.position.height,
            },
            inspection_priority: room.inspection_priority,
        })
        .collect();

    Layout3d {
        kind: LAYOUT_KIND.to_string(),
        rooms,
        inspection_route: plan.inspection_route.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DamageItem, DamageType, InspectionPriority, RoomPosition};

    fn room(id: &str, room_type: RoomType) -> Room {
        Room {
            id: id.into(),
            name: format!("Room {id}"),
            room_type,
            position: RoomPosition::default(),
            features: vec![],
            inspection_priority: InspectionPriority::Medium,
            inspection_tips: vec![format!("tip for {id}")],
        }
    }

    fn plan(rooms: Vec<Room>, route: &[&str]) -> FloorPlan {
        FloorPlan {
            property_type: Some("apartment".into()),
            rooms,
            inspection_route: route.iter().map(|s| s.to_string()).collect(),
            entry_point: route.first().map(|s| s.to_string()),
        }
    }

    fn items(entry: &ChecklistEntry) -> Vec<&str> {
        entry.inspection_items.iter().map(|i| i.item.as_str()).collect()
    }

    #[test]
    fn route_defines_order() {
        let p = plan(
            vec![room("r1", RoomType::Bathroom), room("r2", RoomType::Kitchen)],
            &["r2", "r1"],
        );
        let checklist = build_checklist(&p);
        let order: Vec<_> = checklist.checklist.iter().map(|e| e.room_id.as_str()).collect();
        assert_eq!(order, vec!["r2", "r1"]);
        assert_eq!(
            items(&checklist.checklist[0]),
            vec!["Walls", "Ceiling", "Floor", "Cabinets", "Countertops", "Appliances"]
        );
        assert_eq!(
            items(&checklist.checklist[1]),
            vec!["Walls", "Ceiling", "Floor", "Toilet", "Sink", "Shower"]
        );
        assert!(checklist.checklist[0].inspection_items.iter().all(|i| !i.checked));
    }

    #[test]
    fn unrouted_rooms_go_last_in_plan_order() {
        let p = plan(
            vec![
                room("a", RoomType::Other),
                room("b", RoomType::Living),
                room("c", RoomType::Hallway),
                room("d", RoomType::Bedroom),
            ],
            &["d", "b"],
        );
        let checklist = build_checklist(&p);
        let order: Vec<_> = checklist.checklist.iter().map(|e| e.room_id.as_str()).collect();
        assert_eq!(order, vec!["d", "b", "a", "c"]);
        assert_eq!(items(&checklist.checklist[2]), vec!["Walls", "Ceiling", "Floor"]);
    }

    #[test]
    fn build_is_deterministic() {
        let p = plan(
            vec![
                room("x", RoomType::Kitchen),
                room("y", RoomType::Bedroom),
                room("z", RoomType::Living),
            ],
            &["z"],
        );
        assert_eq!(build_checklist(&p), build_checklist(&p));
    }

    #[test]
    fn navigation_starts_at_first_room() {
        let p = plan(vec![room("r1", RoomType::Kitchen)], &[]);
        let nav = build_checklist(&p).navigation;
        assert_eq!(nav.current_room, None);
        assert_eq!(nav.next_room.as_deref(), Some("r1"));
        assert_eq!(nav.completed_rooms, 0);
        assert_eq!(nav.total_rooms, 1);
    }

    #[test]
    fn empty_plan_builds_empty_checklist() {
        let checklist = build_checklist(&FloorPlan::default());
        assert!(checklist.checklist.is_empty());
        assert_eq!(checklist.navigation.next_room, None);
        assert_eq!(checklist.total_rooms, 0);
    }

    #[test]
    fn progress_updates_navigation() {
        let p = plan(
            vec![
                room("r1", RoomType::Kitchen),
                room("r2", RoomType::Bathroom),
                room("r3", RoomType::Bedroom),
            ],
            &["r1", "r2", "r3"],
        );
        let mut checklist = build_checklist(&p);

        assert!(checklist.start_room("r1"));
        assert_eq!(checklist.entry("r1").unwrap().status, ChecklistStatus::InProgress);
        assert_eq!(checklist.navigation.current_room.as_deref(), Some("r1"));
        assert_eq!(checklist.navigation.next_room.as_deref(), Some("r2"));

        let crack = DamageItem {
            damage_type: DamageType::Crack,
            ..Default::default()
        };
        assert!(checklist.record_damages("r1", vec![crack.clone()]));

        assert!(checklist.complete_room("r1"));
        let entry = checklist.entry("r1").unwrap();
        assert_eq!(entry.status, ChecklistStatus::Done);
        assert!(entry.inspection_items.iter().all(|i| i.checked));
        assert_eq!(checklist.navigation.completed_rooms, 1);
        assert_eq!(checklist.navigation.current_room, None);
        assert_eq!(checklist.navigation.next_room.as_deref(), Some("r2"));
        assert_eq!(checklist.all_damages(), vec![crack]);

        assert!(!checklist.start_room("ghost"));
        assert!(!checklist.complete_room("ghost"));
    }

    #[test]
    fn layout_maps_geometry_and_colors() {
        let mut kitchen = room("k", RoomType::Kitchen);
        kitchen.position = RoomPosition {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
        };
        let layout = derive_layout(&plan(vec![kitchen, room("h", RoomType::Hallway)], &["k"]));
        assert_eq!(layout.kind, "3d_floor_plan");
        assert_eq!(layout.rooms[0].color, "#FF9800");
        assert_eq!(
            layout.rooms[0].geometry,
            Geometry {
                x: 10.0,
                z: 20.0,
                width: 30.0,
                depth: 40.0
            }
        );
        assert_eq!(layout.rooms[1].color, "#9E9E9E");
        assert_eq!(layout.inspection_route, vec!["k"]);
    }
}
