use serde::Deserialize;

use catbridge_catalog::LocalProduct;
use catbridge_core::RemoteId;

#[derive(Debug, Deserialize)]
pub struct AnalysisRequest {
    pub products: Vec<LocalProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    pub local_uom: String,
    pub unit_id: RemoteId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUnitRequest {
    pub local_uom: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub confirm: bool,
}
