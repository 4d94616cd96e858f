use serde::{Deserialize, Serialize};

/// Paging information attached to a list. Zero fields are left out of JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMeta {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub count: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub page: i32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub more: bool,
}

impl ListMeta {
    fn is_empty(&self) -> bool {
        *self == ListMeta::default()
    }
}

/// The envelope every list operation returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default, skip_serializing_if = "ListMeta::is_empty")]
    pub meta: ListMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            meta: ListMeta::default(),
            records,
        }
    }
}

impl<T> Default for ListResponse<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fields_are_omitted() {
        let empty: ListResponse<String> = ListResponse::default();
        assert_eq!(serde_json::to_string(&empty).unwrap(), "{}");

        let resp = ListResponse {
            meta: ListMeta {
                count: 1,
                ..ListMeta::default()
            },
            records: vec!["a".to_string()],
        };
        assert_eq!(
            serde_json::to_string(&resp).unwrap(),
            r#"{"meta":{"count":1},"records":["a"]}"#
        );
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let resp: ListResponse<String> = serde_json::from_str("{}").unwrap();
        assert!(resp.records.is_empty());
        assert_eq!(resp.meta, ListMeta::default());
    }
}
