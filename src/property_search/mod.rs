mod session;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::http::{HttpFetch, PageRequest, BROWSER_USER_AGENT};
use crate::markers::MarkerPair;

pub use session::{SessionTokens, DEFAULT_EVENT_VALIDATION, DEFAULT_VIEW_STATE};

pub const PROPERTY_SEARCH_URL: &str = "https://agis.wingis.org/maps/PropertySearch.aspx";
const SITE_ORIGIN: &str = "https://agis.wingis.org";

/// Marker strings used to pull the address out of a search response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMarkers {
    pub table: MarkerPair,
    pub heading: MarkerPair,
    /// Any of these in a 2xx body means the server refused the postback.
    pub rejection: Vec<String>,
}

impl Default for AddressMarkers {
    fn default() -> Self {
        Self {
            table: MarkerPair::new("<table>", "</table>"),
            heading: MarkerPair::new("<h5>", "</h5>"),
            rejection: vec!["|error|".to_string()],
        }
    }
}

impl AddressMarkers {
    /// Address heading inside the first result table, trimmed.
    ///
    /// Both the table and heading openers must appear somewhere in the body,
    /// and the heading must sit inside the table section. Anything else is a
    /// miss. A heading that is present but blank still counts as found and
    /// yields an empty address.
    pub fn extract_address(&self, body: &str) -> Option<String> {
        if !body.contains(&self.table.open) || !body.contains(&self.heading.open) {
            return None;
        }

        let table = self.table.section(body)?;
        let address = self.heading.inner(table)?.trim();
        Some(address.to_string())
    }

    pub fn is_rejection(&self, body: &str) -> bool {
        self.rejection.iter().any(|marker| body.contains(marker.as_str()))
    }
}

/// Outcome of one property search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyLookup {
    Listed(String),
    Unlisted,
    /// Error status or error marker, most likely stale session tokens.
    Rejected { status: u16 },
    /// The request never produced a response (timeout, connect error).
    Failed(String),
}

impl PropertyLookup {
    pub fn address(&self) -> Option<&str> {
        match self {
            PropertyLookup::Listed(address) => Some(address),
            _ => None,
        }
    }

    pub fn is_unlisted(&self) -> bool {
        self.address().is_none()
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, PropertyLookup::Rejected { .. })
    }
}

/// Client for the county property search form.
#[derive(Clone)]
pub struct PropertySearchClient {
    fetcher: Arc<dyn HttpFetch>,
    url: String,
    tokens: SessionTokens,
    markers: AddressMarkers,
}

impl PropertySearchClient {
    pub fn new(fetcher: Arc<dyn HttpFetch>, tokens: SessionTokens) -> Self {
        Self {
            fetcher,
            url: PROPERTY_SEARCH_URL.to_string(),
            tokens,
            markers: AddressMarkers::default(),
        }
    }

    pub fn with_markers(mut self, markers: AddressMarkers) -> Self {
        self.markers = markers;
        self
    }

    pub fn form_body(&self, lookup_id: &str) -> String {
        format!(
            "txtSearch={}&sm1=upSearch%7CbtnSearch&__VIEWSTATE={}&__EVENTVALIDATION={}&__ASYNCPOST=true&btnSearch=Search",
            urlencoding::encode(lookup_id),
            self.tokens.view_state,
            self.tokens.event_validation
        )
    }

    /// The site rejects the async postback unless these headers are present.
    pub fn build_request(&self, lookup_id: &str) -> PageRequest {
        PageRequest::post_form(&self.url, self.form_body(lookup_id))
            .header("pragma", "no-cache")
            .header("cache-control", "no-cache")
            .header("user-agent", BROWSER_USER_AGENT)
            .header(
                "content-type",
                "application/x-www-form-urlencoded; charset=UTF-8",
            )
            .header("accept", "*/*")
            .header("origin", SITE_ORIGIN)
            .header("referer", self.url.as_str())
    }

    pub async fn lookup(&self, lookup_id: &str) -> PropertyLookup {
        let page = match self.fetcher.fetch(self.build_request(lookup_id)).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Property search for {} failed: {}", lookup_id, e);
                return PropertyLookup::Failed(e.to_string());
            }
        };

        if !page.is_success() || self.markers.is_rejection(&page.body) {
            warn!(
                "Property search for {} rejected with status {}, the session tokens may have expired",
                lookup_id, page.status
            );
            return PropertyLookup::Rejected {
                status: page.status,
            };
        }

        match self.markers.extract_address(&page.body) {
            Some(address) => {
                debug!("{} -> {}", lookup_id, address);
                PropertyLookup::Listed(address)
            }
            None => {
                debug!("{} is unlisted", lookup_id);
                PropertyLookup::Unlisted
            }
        }
    }
}
