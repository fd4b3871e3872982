//! Field masking applied to results after execution.

use std::collections::HashMap;

use serde_json::Value;

use crate::db::types::JsonRow;

/// Literal substituted for masked field values.
pub const MASKED_VALUE: &str = "***MASKED***";

/// Replace masked fields with the mask literal, uniformly across rows.
///
/// Masks match bare field names regardless of origin table; the
/// synthesizer prompt requires masked fields to be projected under
/// table-unique names so the match is unambiguous. Re-masking an already
/// masked row is a no-op.
#[must_use]
pub fn apply_field_masks(
    rows: Vec<JsonRow>,
    field_masks: &HashMap<String, Vec<String>>,
) -> Vec<JsonRow> {
    if field_masks.is_empty() {
        return rows;
    }

    rows.into_iter()
        .map(|mut row| {
            for fields in field_masks.values() {
                for field in fields {
                    if let Some(value) = row.get_mut(field) {
                        *value = Value::String(MASKED_VALUE.to_string());
                    }
                }
            }
            row
        })
        .collect()
}
