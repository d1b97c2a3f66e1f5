//! Field normalization for raw extracted requirement records.
//!
//! Generators drift on key naming (`watts`, `Power`, `WATTAGE`) and leave
//! attributes buried in prose descriptions. Normalization is two declarative
//! tables evaluated by a generic engine:
//!
//! 1. an alias table mapping each canonical field to a priority-ordered
//!    list of variant key names, and
//! 2. a mining table of one pattern per attribute's conventional notation,
//!    run over the description to backfill fields still missing.
//!
//! Mined values never override explicit ones, and both passes are
//! order-stable and idempotent. Variant keys are consumed as they are
//! resolved so a record never ends up carrying the same attribute under
//! two names.

use crate::records::is_available;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::OnceLock;

// ============================================================================
// Alias table
// ============================================================================

struct FieldAliases {
    canonical: &'static str,
    /// Variant key names in priority order. Case-sensitive, JSON keys are.
    aliases: &'static [&'static str],
}

const FIELD_ALIASES: &[FieldAliases] = &[
    FieldAliases {
        canonical: "id",
        aliases: &[
            "type_id", "Type_Id", "TYPE_ID", "ID", "Id", "ref", "Ref", "reference", "Reference",
            "item_id", "Item_ID", "code", "Code",
        ],
    },
    FieldAliases {
        canonical: "description",
        aliases: &[
            "Description", "DESCRIPTION", "desc", "Desc", "item_description", "Item_Description",
            "details", "Details",
        ],
    },
    FieldAliases {
        canonical: "Indoor_Outdoor",
        aliases: &[
            "indoor_outdoor", "IndoorOutdoor", "location", "Location", "environment",
            "Environment",
        ],
    },
    FieldAliases {
        canonical: "Installation_Type",
        aliases: &[
            "installation_type", "InstallationType", "installation", "Installation", "mounting",
            "Mounting", "Mounting_Type", "mounting_type", "mount", "Mount",
        ],
    },
    FieldAliases {
        canonical: "Fixture_Type",
        aliases: &[
            "fixture_type", "FixtureType", "fixture", "Fixture", "type", "Type",
            "luminaire_type", "Luminaire_Type", "Luminaire", "luminaire",
        ],
    },
    FieldAliases {
        canonical: "Wattage",
        aliases: &[
            "wattage", "WATTAGE", "Watts", "watts", "Power", "power", "Power_Rating",
            "power_rating",
        ],
    },
    FieldAliases {
        canonical: "IP_Rating",
        aliases: &[
            "ip_rating", "IPRating", "IP", "ip", "Ingress_Protection", "ingress_protection",
            "Protection_Rating", "protection_rating",
        ],
    },
    FieldAliases {
        canonical: "Beam_Angle",
        aliases: &["beam_angle", "BeamAngle", "Beam", "beam", "Angle", "angle"],
    },
    FieldAliases {
        canonical: "Driver_Type",
        aliases: &[
            "driver_type", "DriverType", "Driver", "driver", "Dimming", "dimming", "Control",
            "control",
        ],
    },
    FieldAliases {
        canonical: "Color_Temperature",
        aliases: &[
            "color_temperature", "ColorTemperature", "Colour_Temperature", "colour_temperature",
            "CCT", "cct", "Kelvin", "kelvin",
        ],
    },
    FieldAliases {
        canonical: "Shape",
        aliases: &["shape", "Form", "form", "Form_Factor", "form_factor"],
    },
    FieldAliases {
        canonical: "Dimension",
        aliases: &[
            "dimension", "Dimensions", "dimensions", "Size", "size", "Diameter", "diameter",
        ],
    },
    FieldAliases {
        canonical: "Luminous_Flux",
        aliases: &[
            "luminous_flux", "LuminousFlux", "Lumen_Output", "lumen_output", "Lumens", "lumens",
            "Flux", "flux",
        ],
    },
    FieldAliases {
        canonical: "Qty",
        aliases: &[
            "qty", "QTY", "Quantity", "quantity", "QUANTITY", "Count", "count", "Units", "units",
            "No_Of_Units", "no_of_units",
        ],
    },
    FieldAliases {
        canonical: "category",
        aliases: &["Category", "CATEGORY"],
    },
    FieldAliases {
        canonical: "importance",
        aliases: &["Importance", "IMPORTANCE", "priority", "Priority"],
    },
];

// ============================================================================
// Description mining table
// ============================================================================

struct MiningPattern {
    canonical: &'static str,
    regex: Regex,
    render: fn(&Captures) -> String,
}

/// One pattern per attribute notation, in a fixed evaluation order.
fn mining_patterns() -> &'static [MiningPattern] {
    static PATTERNS: OnceLock<Vec<MiningPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // "12W", "12.5 Watts"
            MiningPattern {
                canonical: "Wattage",
                regex: Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*w(?:att)?s?\b").unwrap(),
                render: |cap| format!("{}W", &cap[1]),
            },
            // "3000K", "4000 Kelvin"
            MiningPattern {
                canonical: "Color_Temperature",
                regex: Regex::new(r"(?i)\b(\d{3,4})\s*k(?:elvin)?\b").unwrap(),
                render: |cap| format!("{}K", &cap[1]),
            },
            // "IP44", "IP 65"
            MiningPattern {
                canonical: "IP_Rating",
                regex: Regex::new(r"(?i)\bIP\s*(\d{2})\b").unwrap(),
                render: |cap| format!("IP{}", &cap[1]),
            },
            // "38°", "24 deg", "60 degrees"
            MiningPattern {
                canonical: "Beam_Angle",
                regex: Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(?:°|deg(?:ree)?s?\b)").unwrap(),
                render: |cap| format!("{}°", &cap[1]),
            },
            // "1200lm", "800 lumens"
            MiningPattern {
                canonical: "Luminous_Flux",
                regex: Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(?:lm|lumens?)\b").unwrap(),
                render: |cap| format!("{}lm", &cap[1]),
            },
        ]
    })
}

// ============================================================================
// Engine
// ============================================================================

/// Canonicalizes a raw record in place: alias resolution first, then
/// description mining for canonical fields still missing.
pub fn normalize_fields(record: &mut Map<String, Value>) {
    for field in FIELD_ALIASES {
        let canonical_set = record.get(field.canonical).is_some_and(value_is_available);
        let mut resolved: Option<Value> = None;
        for alias in field.aliases {
            // Consume the variant key even when it loses, so the record
            // never carries one attribute under two names.
            let candidate = record.remove(*alias);
            if !canonical_set && resolved.is_none() {
                if let Some(value) = candidate {
                    if value_is_available(&value) {
                        resolved = Some(value);
                    }
                }
            }
        }
        if let Some(value) = resolved {
            record.insert(field.canonical.to_string(), value);
        }
    }
    mine_description(record);
}

fn mine_description(record: &mut Map<String, Value>) {
    let description = match record.get("description").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => return,
    };
    for pattern in mining_patterns() {
        if record.get(pattern.canonical).is_some_and(value_is_available) {
            continue;
        }
        if let Some(caps) = pattern.regex.captures(&description) {
            record.insert(
                pattern.canonical.to_string(),
                Value::String((pattern.render)(&caps)),
            );
        }
    }
}

/// Strings count when non-sentinel; numbers and booleans always count;
/// nulls and structured values never do.
fn value_is_available(value: &Value) -> bool {
    match value {
        Value::String(s) => is_available(s),
        Value::Number(_) | Value::Bool(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn alias_keys_resolve_in_priority_order() {
        let mut record = raw(json!({
            "type_id": "L1",
            "watts": "18W",
            "cct": "4000K"
        }));
        normalize_fields(&mut record);
        assert_eq!(record["id"], json!("L1"));
        assert_eq!(record["Wattage"], json!("18W"));
        assert_eq!(record["Color_Temperature"], json!("4000K"));
        assert!(!record.contains_key("type_id"));
        assert!(!record.contains_key("watts"));
    }

    #[test]
    fn sentinel_canonical_value_yields_to_alias() {
        let mut record = raw(json!({
            "Wattage": "N/A",
            "power": "24W"
        }));
        normalize_fields(&mut record);
        assert_eq!(record["Wattage"], json!("24W"));
    }

    #[test]
    fn description_mining_backfills_missing_fields() {
        let mut record = raw(json!({
            "Wattage": "12W",
            "Color_Temperature": "3000K",
            "Description": "Downlight 12W 3000K IP44"
        }));
        normalize_fields(&mut record);
        assert_eq!(record["IP_Rating"], json!("IP44"));
        assert_eq!(record["Wattage"], json!("12W"));
    }

    #[test]
    fn mined_values_never_override_explicit_fields() {
        let mut record = raw(json!({
            "Wattage": "15W",
            "Description": "Surface spot 12W 2700K"
        }));
        normalize_fields(&mut record);
        assert_eq!(record["Wattage"], json!("15W"));
        assert_eq!(record["Color_Temperature"], json!("2700K"));
    }

    #[test]
    fn mining_recognizes_each_notation() {
        let mut record = raw(json!({
            "Description": "Linear profile 24 Watts 4000 Kelvin IP 65 beam 38 deg 2400 lm"
        }));
        normalize_fields(&mut record);
        assert_eq!(record["Wattage"], json!("24W"));
        assert_eq!(record["Color_Temperature"], json!("4000K"));
        assert_eq!(record["IP_Rating"], json!("IP65"));
        assert_eq!(record["Beam_Angle"], json!("38°"));
        assert_eq!(record["Luminous_Flux"], json!("2400lm"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut record = raw(json!({
            "type_id": "F2",
            "Description": "Bollard 9W 3000K IP65",
            "quantity": 6
        }));
        normalize_fields(&mut record);
        let first = record.clone();
        normalize_fields(&mut record);
        assert_eq!(record, first);
    }

    #[test]
    fn unrelated_keys_are_preserved() {
        let mut record = raw(json!({
            "Description": "Pendant",
            "supplier_note": "lead time 3 weeks"
        }));
        normalize_fields(&mut record);
        assert_eq!(record["supplier_note"], json!("lead time 3 weeks"));
    }

    #[test]
    fn wattage_token_requires_unit_boundary() {
        // "wet" after the digits must not read as a wattage unit.
        let mut record = raw(json!({
            "Description": "44 wet rated fittings 2700K"
        }));
        normalize_fields(&mut record);
        assert!(!record.contains_key("Wattage"));
        assert_eq!(record["Color_Temperature"], json!("2700K"));
    }
}
