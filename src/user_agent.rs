//! Default User-Agent string for outgoing requests.

/// Product token describing what the client does.
const UA_COMMENT: &str = "conditional-download";

/// Default User-Agent for download requests (identifies the tool and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("condget/{version} ({UA_COMMENT})")
}
