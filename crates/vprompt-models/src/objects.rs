//! Per-object prompts and bounding boxes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Maximum number of annotated objects per task.
pub const MAX_OBJECTS: usize = 32;

/// Maximum prompt length.
pub const MAX_PROMPT_LENGTH: usize = 2000;

/// Axis-aligned box in source-frame pixel coordinates.
///
/// Serialized as `[x0, y0, x1, y1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i64; 4]", into = "[i64; 4]")]
pub struct BBox {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl BBox {
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Whether the corners are ordered (top-left before bottom-right).
    pub fn is_ordered(&self) -> bool {
        self.x0 <= self.x1 && self.y0 <= self.y1
    }
}

impl From<[i64; 4]> for BBox {
    fn from(v: [i64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [i64; 4] {
    fn from(b: BBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// Text prompt attached to one annotated region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectPrompt {
    pub prompt: String,
    pub bbox: BBox,
}

impl ObjectPrompt {
    pub fn new(prompt: impl Into<String>, bbox: BBox) -> Self {
        Self {
            prompt: prompt.into(),
            bbox,
        }
    }
}

/// Label (e.g. `Object_1`) to prompt mapping. Keys are unique, order is irrelevant.
pub type ObjectMap = BTreeMap<String, ObjectPrompt>;

/// Reasons an annotation map is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectsError {
    #[error("at least one annotated object is required")]
    Empty,

    #[error("too many objects: {0} (max {MAX_OBJECTS})")]
    TooMany(usize),

    #[error("object label must not be blank")]
    BlankLabel,

    #[error("prompt for {0} exceeds {MAX_PROMPT_LENGTH} characters")]
    PromptTooLong(String),

    #[error("bounding box for {0} has inverted corners")]
    InvertedBox(String),

    #[error("invalid objects JSON: {0}")]
    Malformed(String),
}

/// Parse and validate an annotation map from its JSON text.
pub fn parse_objects(json: &str) -> Result<ObjectMap, ObjectsError> {
    let objects: ObjectMap =
        serde_json::from_str(json).map_err(|e| ObjectsError::Malformed(e.to_string()))?;
    validate_objects(&objects)?;
    Ok(objects)
}

/// Validate an annotation map.
pub fn validate_objects(objects: &ObjectMap) -> Result<(), ObjectsError> {
    if objects.is_empty() {
        return Err(ObjectsError::Empty);
    }
    if objects.len() > MAX_OBJECTS {
        return Err(ObjectsError::TooMany(objects.len()));
    }
    for (label, object) in objects {
        if label.trim().is_empty() {
            return Err(ObjectsError::BlankLabel);
        }
        if object.prompt.chars().count() > MAX_PROMPT_LENGTH {
            return Err(ObjectsError::PromptTooLong(label.clone()));
        }
        if !object.bbox.is_ordered() {
            return Err(ObjectsError::InvertedBox(label.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_serializes_as_array() {
        let object = ObjectPrompt::new("a cat", BBox::new(0, 0, 10, 10));
        let json = serde_json::to_value(&object).unwrap();
        assert_eq!(json, serde_json::json!({"prompt": "a cat", "bbox": [0, 0, 10, 10]}));
    }

    #[test]
    fn test_parse_objects_accepts_submission_shape() {
        let objects = parse_objects(
            r#"{"Object_1": {"prompt": "a cat", "bbox": [0, 0, 10, 10]},
                "Object_2": {"prompt": "a dog", "bbox": [5, 5, 20, 30]}}"#,
        )
        .unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects["Object_2"].bbox, BBox::new(5, 5, 20, 30));
    }

    #[test]
    fn test_parse_objects_rejects_bad_input() {
        assert_eq!(parse_objects("{}"), Err(ObjectsError::Empty));
        assert!(matches!(parse_objects("not json"), Err(ObjectsError::Malformed(_))));
        assert!(matches!(
            parse_objects(r#"{"Object_1": {"prompt": "x", "bbox": [10, 0, 0, 10]}}"#),
            Err(ObjectsError::InvertedBox(label)) if label == "Object_1"
        ));
        assert!(matches!(
            parse_objects(r#"{"Object_1": {"prompt": "x", "bbox": [0, 0, 10]}}"#),
            Err(ObjectsError::Malformed(_))
        ));
    }
}
