use serde::Serialize;

use super::response::Metadata;

/// JSON body of every error response; filled in by the `JsonErrorResponse`
/// derive from the error's `Display` text.
#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_message: String,
    pub _metadata: Metadata,
}
