//! Response envelopes shared by the backend and the client API.

use serde::{Deserialize, Serialize};

/// The `{success, message?, data?}` envelope every endpoint answers with.
///
/// The client returns the same shape from its own operations whether the
/// answer came from the network or from the offline path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable status or error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Payload.
    #[serde(default = "none", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

fn none<T>() -> Option<T> {
    None
}

impl<T> ApiEnvelope<T> {
    /// A successful envelope with data.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    /// A successful envelope with data and a message.
    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    /// A failed envelope.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Maps the payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiEnvelope<U> {
        ApiEnvelope {
            success: self.success,
            message: self.message,
            data: self.data.map(f),
        }
    }
}

/// Pagination metadata, identical for online and offline listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 1-based page number.
    pub current_page: u32,
    /// Number of pages.
    pub total_pages: u32,
    /// Number of meals across all pages.
    pub total_meals: u64,
    /// Whether a later page exists.
    pub has_more: bool,
}

impl Pagination {
    /// Computes pagination for `total` items split into pages of `limit`.
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let limit = u64::from(limit.max(1));
        let total_pages = total.div_ceil(limit) as u32;
        Self {
            current_page: page,
            total_pages,
            total_meals: total,
            has_more: page < total_pages,
        }
    }
}

/// One page of meals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPage<M> {
    /// Meals on this page.
    pub meals: Vec<M>,
    /// Pagination metadata.
    pub pagination: Pagination,
}

impl<M: Clone> MealPage<M> {
    /// Slices a full list into the requested 1-based page.
    pub fn paginate(all: &[M], page: u32, limit: u32) -> Self {
        let page = page.max(1);
        let limit = limit.max(1);
        let start = ((page - 1) as usize).saturating_mul(limit as usize);
        let meals = all
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        Self {
            meals,
            pagination: Pagination::new(page, limit, all.len() as u64),
        }
    }
}

/// An access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Token used to obtain a new pair.
    pub refresh_token: String,
}

/// Body of `POST /auth/refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// The current refresh token.
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let env = ApiEnvelope::ok_with_message(7, "saved");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "saved");
        assert_eq!(json["data"], 7);

        let failed: ApiEnvelope<u32> = ApiEnvelope::failure("nope");
        let json = serde_json::to_value(&failed).unwrap();
        assert!(json.get("data").is_none());
    }

    #[test]
    fn envelope_without_data_decodes() {
        let env: ApiEnvelope<Vec<u32>> =
            serde_json::from_str(r#"{"success":false,"message":"Meal not found"}"#).unwrap();
        assert!(!env.success);
        assert!(env.data.is_none());
    }

    #[test]
    fn pagination_math() {
        let p = Pagination::new(1, 10, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_more);

        let p = Pagination::new(3, 10, 25);
        assert!(!p.has_more);

        let p = Pagination::new(1, 10, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_more);
    }

    #[test]
    fn paginate_slices() {
        let all: Vec<u32> = (1..=7).collect();

        let page = MealPage::paginate(&all, 2, 3);
        assert_eq!(page.meals, vec![4, 5, 6]);
        assert_eq!(page.pagination.current_page, 2);
        assert!(page.pagination.has_more);

        let page = MealPage::paginate(&all, 5, 3);
        assert!(page.meals.is_empty());
    }

    #[test]
    fn pagination_field_names() {
        let json = serde_json::to_value(Pagination::new(1, 20, 3)).unwrap();
        assert!(json.get("currentPage").is_some());
        assert!(json.get("totalPages").is_some());
        assert!(json.get("totalMeals").is_some());
        assert!(json.get("hasMore").is_some());
    }
}
