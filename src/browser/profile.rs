//! Portal profile: everything that is specific to one family of portal UI.
//!
//! The default profile targets the legacy "Compras Edital" portals. A new
//! UI variant gets a new profile, not new engine code.

use serde::{Deserialize, Serialize};

use super::driver::DetailPanel;
use crate::extract::ColumnStrategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalProfile {
    /// Path of the listing application below the target's base address.
    pub listing_path: String,
    /// Menu links clicked in order to reach the listing.
    pub menu_labels: Vec<String>,
    /// Substrings that must all appear in the listing data response URL.
    pub response_markers: Vec<String>,
    /// CSS selector for rendered listing rows.
    pub row_selector: String,
    /// How a row is activated to open its detail view.
    pub row_activation: RowActivation,
    /// CSS selector for the detail view container.
    pub detail_selector: String,
    /// CSS selector for tab labels inside the detail view.
    pub tab_selector: String,
    /// CSS selector for the visible panel body inside the detail view.
    pub active_panel_selector: String,
    /// CSS selector for the detail view close control.
    pub close_selector: String,
    pub panels: PanelLabels,
    pub columns: ColumnStrategy,
}

impl Default for PortalProfile {
    fn default() -> Self {
        Self {
            listing_path: "/comprasedital".to_string(),
            menu_labels: vec![
                "03. Público".to_string(),
                "03.01. Licitação Eletrônica".to_string(),
            ],
            response_markers: vec![
                "comprasedital.dll/HandleEvent?IsEvent=1".to_string(),
                "Evt=data".to_string(),
            ],
            row_selector: ".x-grid-row, .x-grid3-row".to_string(),
            row_activation: RowActivation::DoubleClick,
            detail_selector: ".x-window".to_string(),
            tab_selector: ".x-tab-strip-text, .x-tab-inner".to_string(),
            active_panel_selector: ".x-tab-panel-body .x-panel:not(.x-hide-display), .x-panel-body"
                .to_string(),
            close_selector: ".x-tool-close".to_string(),
            panels: PanelLabels::default(),
            columns: ColumnStrategy::default(),
        }
    }
}

impl PortalProfile {
    pub fn panel_label(&self, panel: DetailPanel) -> &str {
        match panel {
            DetailPanel::Description => &self.panels.description,
            DetailPanel::Metadata => &self.panels.metadata,
            DetailPanel::Items => &self.panels.items,
        }
    }

    /// True when a response URL matches every marker.
    pub fn is_listing_response(&self, url: &str) -> bool {
        !self.response_markers.is_empty() && self.response_markers.iter().all(|m| url.contains(m))
    }
}

/// Tab labels of the three detail panels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelLabels {
    pub description: String,
    pub metadata: String,
    pub items: String,
}

impl Default for PanelLabels {
    fn default() -> Self {
        Self {
            description: "Objeto".to_string(),
            metadata: "Dados Gerais".to_string(),
            items: "Itens".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowActivation {
    Click,
    #[default]
    DoubleClick,
}

impl RowActivation {
    /// DOM event name dispatched on the row.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::DoubleClick => "dblclick",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_matches_legacy_data_url() {
        let profile = PortalProfile::default();
        assert!(profile.is_listing_response(
            "https://x.gov.br/comprasedital/comprasedital.dll/HandleEvent?IsEvent=1&Obj=GRID&Evt=data&_dc=1"
        ));
        assert!(!profile.is_listing_response(
            "https://x.gov.br/comprasedital/comprasedital.dll/HandleEvent?IsEvent=1&Evt=click"
        ));
    }

    #[test]
    fn profile_overrides_from_yaml() {
        let profile: PortalProfile = serde_yaml::from_str(
            "listing_path: /licitacoes\nrow_activation: click\npanels:\n  items: Lotes\n",
        )
        .unwrap();
        assert_eq!(profile.listing_path, "/licitacoes");
        assert_eq!(profile.row_activation.event_name(), "click");
        assert_eq!(profile.panel_label(DetailPanel::Items), "Lotes");
        assert_eq!(profile.panel_label(DetailPanel::Metadata), "Dados Gerais");
        assert_eq!(profile.menu_labels.len(), 2);
    }
}
