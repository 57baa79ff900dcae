use serde::{Deserialize, Serialize};
use serde_json::Value;

// ------------------------------
// Types received from the server
// ------------------------------

/// Body of a non-success response. Validation failures put a list into
/// `detail`, so it stays untyped.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ErrorBody {
    pub error: Option<String>,
    pub detail: Option<Value>,
}

impl ErrorBody {
    /// Picks the most specific message, `error` first.
    pub fn message(&self) -> Option<String> {
        let error = self.error.as_deref().filter(|s| !s.is_empty());
        let detail = self
            .detail
            .as_ref()
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        error.or(detail).map(ToOwned::to_owned)
    }
}

/// Extracts the server-supplied message from a failed response body.
#[inline]
pub fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.message())
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CreateSessionBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CheckoutBody<'a> {
    pub price_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}
