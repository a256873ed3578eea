use std::collections::HashMap;
use std::str::FromStr;

use crate::error::CollectionNotFoundError;

/// Origin system id -> native store collection.
///
/// Built once from configuration and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionMapping {
    by_origin: HashMap<String, String>,
}

impl CollectionMapping {
    pub fn new(by_origin: HashMap<String, String>) -> Self {
        Self { by_origin }
    }

    pub fn resolve(&self, origin_system_id: &str) -> Result<&str, CollectionNotFoundError> {
        self.by_origin
            .get(origin_system_id)
            .map(String::as_str)
            .filter(|collection| !collection.is_empty())
            .ok_or_else(|| CollectionNotFoundError {
                origin_system_id: origin_system_id.to_owned(),
            })
    }

    pub fn len(&self) -> usize {
        self.by_origin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_origin.is_empty()
    }
}

/// Parses a JSON object of origin system ids to collection names, e.g.
/// `{"http://cmdb.ft.com/systems/methode-web-pub": "methode"}`.
impl FromStr for CollectionMapping {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let by_origin: HashMap<String, String> = serde_json::from_str(s)?;
        Ok(Self::new(by_origin))
    }
}
