use serde::Deserialize;

/// One row of the search-analytics query response. Numeric fields arrive as
/// JSON numbers (sometimes fractional for clicks/impressions aggregates).
#[derive(Deserialize, Debug)]
pub struct ApiRow {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub clicks: f64,
    #[serde(default)]
    pub impressions: f64,
    #[serde(default)]
    pub ctr: f64,
    #[serde(default)]
    pub position: f64,
}

#[derive(Deserialize, Debug)]
pub struct QueryResponse {
    #[serde(default)]
    pub rows: Vec<ApiRow>,
}
