use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Kind of catalog item, controlling how the detail view behaves
///
/// Most items link out to an external resource; `Dashboard` items render
/// charts from uploaded spreadsheet data instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Plain link to an external page or tool
    Link,

    /// Frequently-asked-question entry rendered inline
    Faq,

    /// Chart dashboard fed by uploaded spreadsheet rows
    Dashboard,

    /// Manual or procedure document
    Manual,
}

/// Administrative role attached to a user
///
/// Roles are hierarchical only in the sense that `SuperAdmin` is required
/// for user management; all three roles grant access to the admin panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access, including managing other admin users
    SuperAdmin,

    /// Content management access
    Admin,

    /// Content editing access
    Editor,
}

/// A catalog category grouping related items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier (UUID)
    pub id: String,

    /// Display name
    pub name: String,

    /// Optional longer description
    pub description: Option<String>,

    /// Icon identifier used by the frontend icon picker
    pub icon: String,

    /// Sort position within the sidebar
    pub order: i32,

    /// Inactive categories are hidden from the public portal
    pub active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// A catalog entry: link, FAQ, manual or dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier (UUID)
    pub id: String,

    /// Category this item belongs to
    pub category_id: String,

    /// Display name
    pub name: String,

    /// Optional longer description
    pub description: Option<String>,

    /// Target URL for `Link` and `Manual` items
    pub url: Option<String>,

    /// Item kind, see [`ItemKind`]
    pub kind: ItemKind,

    /// Icon identifier
    pub icon: String,

    /// Sort position within the category
    pub order: i32,

    /// Inactive items are hidden from the public portal
    pub active: bool,

    /// Free-text chart configuration for `Dashboard` items, parsed by
    /// the instruction parser on every dashboard render
    pub instruction_prompt: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// One ingested spreadsheet row belonging to a dashboard item
///
/// The `columns` map holds every cell of the row under two keys: a
/// synthesized positional key (`col_A`, `col_B`, ...) and, when the sheet
/// had a non-empty header for that column, the trimmed header text. Both
/// keys point at the same cell value, so a cell is addressable either
/// positionally or by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedRow {
    /// Unique identifier (UUID)
    pub id: String,

    /// Dashboard item these rows were uploaded for
    pub item_id: String,

    /// Name of the originating worksheet
    pub sheet_name: String,

    /// 1-based position within the sheet (header row excluded)
    pub row_index: i64,

    /// Cell values keyed positionally and by header text
    pub columns: BTreeMap<String, Value>,

    /// Upload timestamp
    pub created_at: DateTime<Utc>,
}

/// Role record linking an authenticated user to an admin role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRole {
    /// Unique identifier (UUID)
    pub id: String,

    /// User this role belongs to
    pub user_id: String,

    /// Granted role
    pub role: Role,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

// Portal display configuration, stored as key/value pairs.

pub const CONFIG_PRIMARY_COLOR: &str = "primary_color";
pub const CONFIG_SECONDARY_COLOR: &str = "secondary_color";
pub const CONFIG_HEADER_TITLE: &str = "header_title";
pub const CONFIG_HEADER_SUBTITLE: &str = "header_subtitle";

/// Grouped portal display configuration
///
/// Assembled from the stored key/value pairs with defaults for any key
/// that has never been written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Primary brand color (hex)
    pub primary_color: String,

    /// Secondary brand color (hex)
    pub secondary_color: String,

    /// Header title text
    pub header_title: String,

    /// Header subtitle text
    pub header_subtitle: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            primary_color: "#1e3a5f".to_string(),
            secondary_color: "#2e7d32".to_string(),
            header_title: "Banco de Conhecimento".to_string(),
            header_subtitle: "Central de Recursos e Procedimentos".to_string(),
        }
    }
}

impl PortalConfig {
    /// Build a config from stored key/value pairs, falling back to the
    /// defaults for missing keys
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut config = Self::default();
        for (key, value) in pairs {
            match key {
                CONFIG_PRIMARY_COLOR => config.primary_color = value.to_string(),
                CONFIG_SECONDARY_COLOR => config.secondary_color = value.to_string(),
                CONFIG_HEADER_TITLE => config.header_title = value.to_string(),
                CONFIG_HEADER_SUBTITLE => config.header_subtitle = value.to_string(),
                _ => {}
            }
        }
        config
    }
}

// Derived chart configuration, produced by the instruction parser and
// consumed by the aggregators. Never persisted.

/// Chart rendering style for a dashboard group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Pie,
    Line,
    Area,
}

/// One parsed sheet group: rows whose sheet name contains any of the
/// listed patterns (case-insensitive substring match) belong to the group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Display name of the group
    pub name: String,

    /// Sheet-name patterns, matched as case-insensitive substrings
    pub sheets: Vec<String>,
}

/// A drill-down column selection: which row field to show and under what
/// label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Field key into [`UploadedRow::columns`], or [`SHEET_FIELD`]
    pub key: String,

    /// Header label shown in the drill-down table
    pub label: String,
}

/// Keyword rules splitting rows into two named cohorts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamComparison {
    /// Lowercased keywords assigning a row to team A
    pub team_a_keywords: Vec<String>,

    /// Lowercased keywords assigning a row to team B
    pub team_b_keywords: Vec<String>,
}

/// Synthetic column key referring to the sheet name rather than a stored
/// cell, usable in drill-down column specs
pub const SHEET_FIELD: &str = "__sheet__";

/// Structured chart configuration derived from an item's instruction
/// prompt
///
/// Produced exclusively by [`crate::instructions::parse`]; every field has
/// a default so that any input text, including none at all, yields a
/// usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Ordered sheet groups; never empty
    pub groups: Vec<GroupSpec>,

    /// Single-letter column whose value buckets the rows
    pub count_column: String,

    /// Human label for the count column
    pub count_column_label: String,

    /// Chart rendering style
    pub chart_type: ChartType,

    /// Drill-down column overrides; empty means derive defaults from the
    /// data
    pub drilldown_columns: Vec<ColumnSpec>,

    /// Whether to annotate per-group totals
    pub show_totals: bool,

    /// Optional two-cohort comparison rules
    pub team_comparison: Option<TeamComparison>,
}

impl ChartConfig {
    /// Default configuration over the given sheet names: a single group
    /// named "Todos", column H ("Estado"), bar chart, no drill-down
    /// override, totals off, no team comparison
    pub fn default_for(known_sheets: &[String]) -> Self {
        Self {
            groups: vec![GroupSpec {
                name: "Todos".to_string(),
                sheets: known_sheets.to_vec(),
            }],
            count_column: "H".to_string(),
            count_column_label: "Estado".to_string(),
            chart_type: ChartType::Bar,
            drilldown_columns: Vec::new(),
            show_totals: false,
            team_comparison: None,
        }
    }
}
