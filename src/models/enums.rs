use serde::{Deserialize, Serialize};

/// Macro to generate an enum with as_str + lenient parsing.
///
/// Model replies are free text: values are matched case-insensitively with
/// spaces and dashes folded to underscores, aliases are accepted, and anything
/// unrecognized (or `null`) lands on the fallback variant instead of failing
/// the whole record.
macro_rules! str_enum {
    ($name:ident, fallback = $fallback:ident { $($variant:ident => $s:literal $(| $alias:literal)*),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub fn parse_lenient(s: &str) -> Self {
                let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
                match normalized.as_str() {
                    $($s $(| $alias)* => Self::$variant,)+
                    _ => Self::$fallback,
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$fallback
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = Option::<String>::deserialize(deserializer)?;
                Ok(raw.as_deref().map(Self::parse_lenient).unwrap_or_default())
            }
        }
    };
}

str_enum!(RoomType, fallback = Other {
    Living => "living" | "living_room" | "lounge" | "salon",
    Bedroom => "bedroom" | "master_bedroom",
    Bathroom => "bathroom" | "toilet" | "wc" | "shower_room",
    Kitchen => "kitchen" | "kitchenette",
    Hallway => "hallway" | "corridor" | "entrance" | "hall",
    Other => "other",
});

str_enum!(InspectionPriority, fallback = Medium {
    High => "high",
    Medium => "medium",
    Low => "low",
});

str_enum!(ChecklistStatus, fallback = Pending {
    Pending => "pending",
    InProgress => "in_progress",
    Done => "done" | "completed",
});

str_enum!(DamageType, fallback = Other {
    WaterDamage => "water_damage" | "water",
    Crack => "crack",
    Hole => "hole",
    Dent => "dent",
    Scratch => "scratch",
    Stain => "stain",
    Peeling => "peeling" | "peel",
    Mold => "mold" | "mould" | "mildew",
    Wear => "wear" | "wear_and_tear",
    Other => "other",
});

str_enum!(Severity, fallback = Moderate {
    Minor => "minor",
    Moderate => "moderate",
    Major => "major",
    Critical => "critical",
});

str_enum!(DamageStatus, fallback = NoDamage {
    DamageFound => "damage_found",
    NoDamage => "no_damage",
    NewDamageFound => "new_damage_found",
    NoNewDamage => "no_new_damage",
    WrongRoom => "wrong_room",
    Error => "error",
});

/// Whether a record came from a strict structured parse or the keyword fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trust {
    #[default]
    Structured,
    Heuristic,
}

/// Top-level discriminator on every record handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Success,
    Partial,
    Error,
    NoFloorPlan,
    WrongRoom,
    NoDamages,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Error => "error",
            Self::NoFloorPlan => "no_floor_plan",
            Self::WrongRoom => "wrong_room",
            Self::NoDamages => "no_damages",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_type_accepts_aliases_and_case() {
        assert_eq!(RoomType::parse_lenient("Living Room"), RoomType::Living);
        assert_eq!(RoomType::parse_lenient("BATHROOM"), RoomType::Bathroom);
        assert_eq!(RoomType::parse_lenient("corridor"), RoomType::Hallway);
        assert_eq!(RoomType::parse_lenient("garage"), RoomType::Other);
    }

    #[test]
    fn damage_type_folds_dashes() {
        assert_eq!(DamageType::parse_lenient("water-damage"), DamageType::WaterDamage);
        assert_eq!(DamageType::parse_lenient("Mould"), DamageType::Mold);
        assert_eq!(DamageType::parse_lenient("graffiti"), DamageType::Other);
    }

    #[test]
    fn null_deserializes_to_fallback() {
        let priority: InspectionPriority = serde_json::from_str("null").unwrap();
        assert_eq!(priority, InspectionPriority::Medium);
        let status: ChecklistStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(status, ChecklistStatus::Done);
    }

    #[test]
    fn serializes_as_canonical_string() {
        assert_eq!(
            serde_json::to_string(&ChecklistStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
    }

    #[test]
    fn record_status_matches_serde_name() {
        for status in [
            RecordStatus::Success,
            RecordStatus::Partial,
            RecordStatus::Error,
            RecordStatus::NoFloorPlan,
            RecordStatus::WrongRoom,
            RecordStatus::NoDamages,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }
}
