//! Typed response structures for the Azure DevOps REST API.

use serde::Deserialize;

/// List envelope: every collection endpoint wraps its items in `value`.
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    pub value: Vec<T>,
    #[serde(default)]
    pub count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoRepo {
    pub id: String,
    pub name: String,
    pub remote_url: String,
    #[serde(default)]
    pub is_disabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct AdoProject {
    pub id: String,
    pub name: String,
}
