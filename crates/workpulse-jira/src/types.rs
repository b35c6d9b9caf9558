// Wire types for the Jira REST payloads the pipeline consumes.
// Entity bodies stay as serde_json::Value: extraction persists them raw and
// the transform stage owns their interpretation.

use serde::Deserialize;
use serde_json::Value;

/// One page from POST /rest/api/3/search/jql
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub issues: Vec<Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub is_last: Option<bool>,
}

impl SearchPage {
    /// Token pagination: the page is final when no continuation token came back
    pub fn is_final(&self) -> bool {
        self.is_last.unwrap_or(self.next_page_token.is_none()) || self.next_page_token.is_none()
    }
}

/// Response of POST /rest/api/3/search/approximate-count
#[derive(Debug, Clone, Deserialize)]
pub struct ApproximateCount {
    #[serde(default)]
    pub count: i64,
}

/// One page from the startAt/maxResults reference endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuesPage {
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub is_last: Option<bool>,
    #[serde(default)]
    pub max_results: Option<i64>,
    #[serde(default)]
    pub start_at: Option<i64>,
}

impl ValuesPage {
    pub fn is_final(&self, fetched_so_far: usize, page_size: u32) -> bool {
        if let Some(true) = self.is_last {
            return true;
        }
        if self.values.is_empty() || self.values.len() < page_size as usize {
            return true;
        }
        if let Some(total) = self.total {
            return fetched_so_far as i64 >= total;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_page_finality() {
        let page: SearchPage =
            serde_json::from_value(json!({"issues": [], "nextPageToken": "abc"})).unwrap();
        assert!(!page.is_final());

        let last: SearchPage = serde_json::from_value(json!({"issues": []})).unwrap();
        assert!(last.is_final());
    }

    #[test]
    fn test_values_page_finality() {
        let page: ValuesPage =
            serde_json::from_value(json!({"values": [1, 2], "total": 4, "isLast": false}))
                .unwrap();
        assert!(!page.is_final(2, 2));
        assert!(page.is_final(4, 2));

        let short: ValuesPage = serde_json::from_value(json!({"values": [1]})).unwrap();
        assert!(short.is_final(1, 50));
    }
}
