//! Harvest target model.

use serde::{Deserialize, Serialize};

/// One harvestable municipal portal instance.
///
/// Resolved from the catalog once per session and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Catalog identifier (e.g. the municipality code).
    pub id: String,
    /// Human-readable name used in logs and summaries.
    pub display_name: String,
    /// Portal base address, e.g. `https://portal.example.gov.br:8443`.
    pub base_address: String,
}

impl Target {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        base_address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            base_address: base_address.into(),
        }
    }

    /// Join a path onto the base address without doubling slashes.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_address.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_cleanly() {
        let target = Target::new("3550308", "São Paulo", "https://compras.example.gov.br/");
        assert_eq!(
            target.endpoint("/comprasedital"),
            "https://compras.example.gov.br/comprasedital"
        );
        let bare = Target::new("1", "x", "http://host:8080");
        assert_eq!(bare.endpoint("comprasedital"), "http://host:8080/comprasedital");
    }
}
