//! Meal records and their wire shapes.

use crate::error::{ProtocolError, ProtocolResult};
use crate::identity::RecordIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a meal's photo lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaRef {
    /// A file on this device, not yet uploaded.
    Local(String),
    /// A URL served by the backend.
    Remote(String),
}

impl MediaRef {
    /// Returns the path or URL.
    pub fn uri(&self) -> &str {
        match self {
            MediaRef::Local(uri) | MediaRef::Remote(uri) => uri,
        }
    }

    /// Returns true if the media still lives only on this device.
    pub fn is_local(&self) -> bool {
        matches!(self, MediaRef::Local(_))
    }
}

/// A cached meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    /// Server id once confirmed, placeholder id until then.
    pub identity: RecordIdentity,
    /// Short description.
    pub title: String,
    /// Meal category (breakfast, lunch, ...).
    pub category: String,
    /// When the meal was eaten.
    pub date: DateTime<Utc>,
    /// Energy in kilocalories.
    pub calories: f64,
    /// Photo, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaRef>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Meal {
    /// Builds a placeholder record for a meal created while offline.
    pub fn pending(local_id: impl Into<String>, draft: &MealDraft, now: DateTime<Utc>) -> Self {
        Self {
            identity: RecordIdentity::Pending(local_id.into()),
            title: draft.title.clone(),
            category: draft.category.clone(),
            date: draft.date,
            calories: draft.calories,
            image: draft.image_path.clone().map(MediaRef::Local),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true until the server has confirmed this record.
    pub fn is_local(&self) -> bool {
        self.identity.is_pending()
    }

    /// Returns true if `identifier` is this meal's server id or local id.
    pub fn matches(&self, identifier: &str) -> bool {
        self.identity.matches(identifier)
    }

    /// Applies the set fields of a patch and bumps `updated_at`.
    pub fn apply_patch(&mut self, patch: &MealPatch, now: DateTime<Utc>) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(category) = &patch.category {
            self.category = category.clone();
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(calories) = patch.calories {
            self.calories = calories;
        }
        self.updated_at = now;
    }
}

impl From<RemoteMeal> for Meal {
    fn from(remote: RemoteMeal) -> Self {
        Self {
            identity: RecordIdentity::Confirmed(remote.id),
            title: remote.title,
            category: remote.category,
            date: remote.date,
            calories: remote.calories,
            image: remote.image_url.map(MediaRef::Remote),
            created_at: remote.created_at,
            updated_at: remote.updated_at,
        }
    }
}

/// A meal as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMeal {
    /// Server-issued identifier.
    #[serde(alias = "_id")]
    pub id: String,
    /// Short description.
    pub title: String,
    /// Meal category.
    #[serde(alias = "mealType")]
    pub category: String,
    /// When the meal was eaten.
    pub date: DateTime<Utc>,
    /// Energy in kilocalories.
    #[serde(default)]
    pub calories: f64,
    /// Uploaded photo URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealDraft {
    /// Short description.
    pub title: String,
    /// Meal category.
    pub category: String,
    /// When the meal was eaten.
    pub date: DateTime<Utc>,
    /// Energy in kilocalories.
    pub calories: f64,
    /// Path of a photo on this device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

impl MealDraft {
    /// Creates a draft without a photo.
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        date: DateTime<Utc>,
        calories: f64,
    ) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            date,
            calories,
            image_path: None,
        }
    }

    /// Attaches a local photo.
    pub fn with_image(mut self, path: impl Into<String>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    /// Encodes the draft as a queue payload tagged with its placeholder id.
    pub fn to_payload(&self, local_id: &str) -> Value {
        let mut map = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        map.insert("localId".into(), Value::String(local_id.to_string()));
        Value::Object(map)
    }
}

/// Payload keys a patch can change.
const PATCH_FIELDS: [&str; 4] = ["title", "category", "date", "calories"];

/// A partial update of a meal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// New date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    /// New calorie count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
}

impl MealPatch {
    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.category.is_none()
            && self.date.is_none()
            && self.calories.is_none()
    }

    /// Encodes the set fields as a JSON object.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Builds the patch that turns payload `before` into payload `after`.
    ///
    /// Only patchable fields are compared; keys such as `localId` are
    /// ignored. The result is empty if nothing changed.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidStructure`] if either payload is not
    /// a JSON object, or [`ProtocolError::Json`] if a changed field has the
    /// wrong type.
    pub fn changes(before: &Value, after: &Value) -> ProtocolResult<Self> {
        let (Value::Object(before), Value::Object(after)) = (before, after) else {
            return Err(ProtocolError::invalid_structure("payload is not an object"));
        };
        let changed: Map<String, Value> = PATCH_FIELDS
            .iter()
            .filter_map(|&key| {
                let value = after.get(key)?;
                (before.get(key) != Some(value)).then(|| (key.to_string(), value.clone()))
            })
            .collect();
        Ok(serde_json::from_value(Value::Object(changed))?)
    }

    /// Overwrites the matching keys of a JSON object payload.
    ///
    /// Non-object payloads are left untouched.
    pub fn merge_into(&self, payload: &mut Value) {
        if let (Value::Object(target), Value::Object(fields)) = (payload, self.to_value()) {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap()
    }

    #[test]
    fn pending_meal_from_draft() {
        let draft = MealDraft::new("Oatmeal", "breakfast", at(8), 350.0).with_image("/tmp/oat.jpg");
        let meal = Meal::pending("local_1_abc", &draft, at(9));

        assert!(meal.is_local());
        assert!(meal.matches("local_1_abc"));
        assert_eq!(meal.image, Some(MediaRef::Local("/tmp/oat.jpg".into())));
        assert_eq!(meal.created_at, at(9));
    }

    #[test]
    fn remote_meal_accepts_mongo_id() {
        let json = r#"{
            "_id": "65f0c1",
            "title": "Salad",
            "mealType": "lunch",
            "date": "2026-03-14T12:00:00Z",
            "calories": 420,
            "imageUrl": "https://cdn.example.com/salad.jpg",
            "createdAt": "2026-03-14T12:01:00Z",
            "updatedAt": "2026-03-14T12:01:00Z"
        }"#;
        let remote: RemoteMeal = serde_json::from_str(json).unwrap();
        let meal = Meal::from(remote);

        assert_eq!(meal.identity, RecordIdentity::Confirmed("65f0c1".into()));
        assert!(!meal.is_local());
        assert_eq!(meal.category, "lunch");
        assert_eq!(
            meal.image,
            Some(MediaRef::Remote("https://cdn.example.com/salad.jpg".into()))
        );
    }

    #[test]
    fn draft_payload_carries_local_id() {
        let draft = MealDraft::new("Soup", "dinner", at(19), 300.0);
        let payload = draft.to_payload("local_42_x");

        assert_eq!(payload["localId"], "local_42_x");
        assert_eq!(payload["title"], "Soup");
        assert!(payload.get("imagePath").is_none());
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let draft = MealDraft::new("Soup", "dinner", at(19), 300.0);
        let mut meal = Meal::pending("local_1", &draft, at(19));

        let patch = MealPatch {
            calories: Some(280.0),
            ..MealPatch::default()
        };
        meal.apply_patch(&patch, at(20));

        assert_eq!(meal.title, "Soup");
        assert_eq!(meal.calories, 280.0);
        assert_eq!(meal.updated_at, at(20));
    }

    #[test]
    fn changes_between_payloads() {
        let before = MealDraft::new("Toast", "breakfast", at(8), 250.0).to_payload("local_1");
        let mut after = before.clone();
        MealPatch {
            title: Some("French toast".into()),
            ..MealPatch::default()
        }
        .merge_into(&mut after);

        let patch = MealPatch::changes(&before, &after).unwrap();
        assert_eq!(patch.title.as_deref(), Some("French toast"));
        assert!(patch.calories.is_none());
        assert!(MealPatch::changes(&before, &before).unwrap().is_empty());
    }

    #[test]
    fn changes_reject_non_objects() {
        let err = MealPatch::changes(&Value::Null, &Value::Null).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStructure(_)));

        let before = serde_json::json!({ "calories": 100 });
        let after = serde_json::json!({ "calories": "lots" });
        assert!(matches!(
            MealPatch::changes(&before, &after),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn patch_merges_into_payload() {
        let mut payload = MealDraft::new("Soup", "dinner", at(19), 300.0).to_payload("local_1");
        let patch = MealPatch {
            title: Some("Tomato soup".into()),
            ..MealPatch::default()
        };
        patch.merge_into(&mut payload);

        assert_eq!(payload["title"], "Tomato soup");
        assert_eq!(payload["localId"], "local_1");
        assert!(!patch.is_empty());
        assert!(MealPatch::default().is_empty());
    }
}
