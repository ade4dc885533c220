//! Responses for failed dispatches

use crate::error::ResponderError;
use crate::response::DynamicResponse;
use serde_json::json;

/// Renders the response sent when a responder fails before writing
pub trait ErrorResponder: Send + Sync {
    fn render(&self, error: &ResponderError) -> DynamicResponse;
}

/// `{"error":true,"reason":"..."}` with the error's status (500 unless a
/// middleware chose one)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonErrorResponder;

impl ErrorResponder for JsonErrorResponder {
    fn render(&self, error: &ResponderError) -> DynamicResponse {
        DynamicResponse::json(json!({
            "error": true,
            "reason": error.to_string(),
        }))
        .with_status(error.status())
    }
}

impl<F> ErrorResponder for F
where
    F: Fn(&ResponderError) -> DynamicResponse + Send + Sync,
{
    fn render(&self, error: &ResponderError) -> DynamicResponse {
        self(error)
    }
}
