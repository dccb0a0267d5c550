use tracing::{debug, info};

/// `__VIEWSTATE` captured from a manual browser session, already form-encoded.
pub const DEFAULT_VIEW_STATE: &str = "%2FwEPDwUJLTMyNzkzMTE0D2QWAgIDD2QWAgIFD2QWAmYPZBYCAgcPDxYEHgRUZXh0BRhObyBQYXJjZWwgRGF0YSBBdmFpbGFibGUeB1Zpc2libGVoZGRkNn7OlMLjgMAhB5STrMzLDIhD0wMHb1BWHsglv6MCGvk%3D";

/// `__EVENTVALIDATION` captured alongside [`DEFAULT_VIEW_STATE`].
pub const DEFAULT_EVENT_VALIDATION: &str = "%2FwEdAAN73fmY3iujp1L%2Bi%2FJz5KRpJy3pjLgyNr58jsdLjyzCdY7U3Vc0WZ%2BwxclqyPFfzmOu7oiK%2Bu5WJqrVVV3m1RweabFZAIXlf3TJNEh2crxN%2Fw%3D%3D";

/// Opaque ASP.NET state tokens posted with every property search.
///
/// The server issued them to some earlier session and may stop accepting
/// them at any time. Nothing here refreshes or validates them; a rejected
/// token surfaces as [`super::PropertyLookup::Rejected`]. Values are expected
/// exactly as they appear in a form-encoded request body (copy them from the
/// browser's network tab).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub view_state: String,
    pub event_validation: String,
}

impl Default for SessionTokens {
    fn default() -> Self {
        Self {
            view_state: DEFAULT_VIEW_STATE.to_string(),
            event_validation: DEFAULT_EVENT_VALIDATION.to_string(),
        }
    }
}

impl SessionTokens {
    /// Built-in tokens, with any non-blank override taking precedence.
    pub fn with_overrides(view_state: Option<String>, event_validation: Option<String>) -> Self {
        let mut tokens = Self::default();

        if let Some(value) = view_state.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            info!("Using overridden __VIEWSTATE token");
            tokens.view_state = value;
        }
        if let Some(value) = event_validation
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            info!("Using overridden __EVENTVALIDATION token");
            tokens.event_validation = value;
        }

        if tokens.is_builtin() {
            debug!("Using built-in session tokens, they may have expired");
        }
        tokens
    }

    pub fn is_builtin(&self) -> bool {
        self.view_state == DEFAULT_VIEW_STATE && self.event_validation == DEFAULT_EVENT_VALIDATION
    }
}
