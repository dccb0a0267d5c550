use std::sync::Arc;

use tracing::{debug, warn};

use crate::http::{HttpFetch, PageRequest, BROWSER_USER_AGENT};
use crate::markers::{last_chars, window_after, MarkerPair};

pub const SEARCH_URL: &str = "https://www.google.com/search?q=";

const ZIP_LEN: usize = 5;

/// Marker strings and constants for reading the map card of a search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeMarkers {
    pub results_heading: String,
    pub label: MarkerPair,
    /// Characters after `label.open` searched for `label.close`.
    pub window_chars: usize,
    /// Every accepted "City, ST 12345" line must contain this.
    pub region: String,
    /// Streets containing this (any case) are never searched.
    pub unassigned: String,
}

impl Default for GeocodeMarkers {
    fn default() -> Self {
        Self {
            results_heading: "Map Results</h2>".to_string(),
            label: MarkerPair::new("<span class=\"desktop-title-subcontent\">", "</span>"),
            window_chars: 100,
            region: ", IL".to_string(),
            unassigned: "NOT ASSIGNED".to_string(),
        }
    }
}

impl GeocodeMarkers {
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn is_unassigned(&self, street: &str) -> bool {
        street
            .to_uppercase()
            .contains(&self.unassigned.to_uppercase())
    }

    /// The "City, ST 12345" line of the map card, if present and in region.
    pub fn extract_locality<'a>(&self, body: &'a str) -> Option<&'a str> {
        if !body.contains(&self.results_heading) || !body.contains(&self.label.open) {
            return None;
        }

        let window = window_after(body, &self.label.open, self.window_chars)?;
        let end = window.find(&self.label.close)?;
        let locality = window[..end].trim();

        if locality.contains(&self.region) {
            Some(locality)
        } else {
            debug!("Locality {:?} is outside region {:?}", locality, self.region);
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geolocation {
    pub city: String,
    pub zip: String,
    /// Search URL the locality was read from.
    pub reference_url: String,
}

impl Geolocation {
    fn from_locality(locality: &str, reference_url: String) -> Self {
        let city = locality
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        let zip = last_chars(locality, ZIP_LEN).to_string();

        Self {
            city,
            zip,
            reference_url,
        }
    }
}

pub fn search_url(street: &str) -> String {
    format!("{}{}", SEARCH_URL, urlencoding::encode(street))
}

/// Second-stage lookup of city and zip through a web search results page.
#[derive(Clone)]
pub struct GeocodeClient {
    fetcher: Arc<dyn HttpFetch>,
    markers: GeocodeMarkers,
}

impl GeocodeClient {
    pub fn new(fetcher: Arc<dyn HttpFetch>, markers: GeocodeMarkers) -> Self {
        Self { fetcher, markers }
    }

    /// Looks up `street`. Empty or unassigned streets return `None` without
    /// touching the network, as does any response that fails to match.
    pub async fn locate(&self, street: &str) -> Option<Geolocation> {
        let street = street.trim();
        if street.is_empty() || self.markers.is_unassigned(street) {
            debug!("Skipping geocode for {:?}", street);
            return None;
        }

        let url = search_url(street);
        let request = PageRequest::get(&url).header("user-agent", BROWSER_USER_AGENT);

        let page = match self.fetcher.fetch(request).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Geocode search for {} failed: {}", street, e);
                return None;
            }
        };

        if !page.is_success() {
            warn!(
                "Geocode search for {} returned status {}",
                street, page.status
            );
            return None;
        }

        let locality = self.markers.extract_locality(&page.body)?;
        let location = Geolocation::from_locality(locality, url);
        debug!("{} -> {}, {}", street, location.city, location.zip);
        Some(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EnrichError, Result};
    use crate::http::{FetchedPage, Method};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct SearchPage {
        status: u16,
        body: String,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl SearchPage {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body: body.to_string(),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpFetch for SearchPage {
        async fn fetch(&self, request: PageRequest) -> Result<FetchedPage> {
            self.requests.lock().unwrap().push(request);
            if self.status == 0 {
                return Err(EnrichError::Io {
                    path: SEARCH_URL.into(),
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"),
                });
            }
            Ok(FetchedPage {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    const ROCKFORD_PAGE: &str = r#"<div><h2 class="bNg8Rb">Map Results</h2>
        <div class="card"><span class="desktop-title-subcontent">Rockford, IL 61101</span>
        </div></div>"#;

    #[tokio::test]
    async fn test_locate_extracts_city_and_zip() {
        let page = SearchPage::new(200, ROCKFORD_PAGE);
        let client = GeocodeClient::new(page.clone(), GeocodeMarkers::default());

        let location = client.locate("1234 N MAIN ST").await.unwrap();
        assert_eq!(location.city, "Rockford");
        assert_eq!(location.zip, "61101");
        assert_eq!(
            location.reference_url,
            "https://www.google.com/search?q=1234%20N%20MAIN%20ST"
        );

        let requests = page.requests.lock().unwrap();
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].url, location.reference_url);
        assert!(requests[0].headers.iter().any(|(name, _)| *name == "user-agent"));
    }

    #[tokio::test]
    async fn test_locate_out_of_region_is_a_miss() {
        let body = ROCKFORD_PAGE.replace("Rockford, IL 61101", "Beloit, WI 53511");
        let client = GeocodeClient::new(SearchPage::new(200, &body), GeocodeMarkers::default());
        assert_eq!(client.locate("1 STATE ST").await, None);
    }

    #[tokio::test]
    async fn test_configured_region() {
        let body = ROCKFORD_PAGE.replace("Rockford, IL 61101", "Beloit, WI 53511");
        let markers = GeocodeMarkers::default().with_region(", WI");
        let client = GeocodeClient::new(SearchPage::new(200, &body), markers);
        let location = client.locate("1 STATE ST").await.unwrap();
        assert_eq!(location.city, "Beloit");
        assert_eq!(location.zip, "53511");
    }

    #[tokio::test]
    async fn test_locate_requires_both_markers() {
        let no_heading = ROCKFORD_PAGE.replace("Map Results</h2>", "Results</h2>");
        let client = GeocodeClient::new(SearchPage::new(200, &no_heading), GeocodeMarkers::default());
        assert_eq!(client.locate("1 MAIN ST").await, None);

        let no_label = ROCKFORD_PAGE.replace("desktop-title-subcontent", "subtitle");
        let client = GeocodeClient::new(SearchPage::new(200, &no_label), GeocodeMarkers::default());
        assert_eq!(client.locate("1 MAIN ST").await, None);
    }

    #[test]
    fn test_close_tag_outside_window_is_a_miss() {
        let markers = GeocodeMarkers::default();
        let body = format!(
            "Map Results</h2><span class=\"desktop-title-subcontent\">Rockford, IL 61101{}</span>",
            " ".repeat(120)
        );
        assert_eq!(markers.extract_locality(&body), None);
    }

    #[tokio::test]
    async fn test_empty_and_unassigned_streets_skip_network() {
        let page = SearchPage::new(200, ROCKFORD_PAGE);
        let client = GeocodeClient::new(page.clone(), GeocodeMarkers::default());

        assert_eq!(client.locate("").await, None);
        assert_eq!(client.locate("   ").await, None);
        assert_eq!(client.locate("0 ADDRESS NOT ASSIGNED").await, None);
        assert_eq!(client.locate("0 address not assigned").await, None);
        assert_eq!(page.calls(), 0);
    }

    #[tokio::test]
    async fn test_error_status_and_transport_failure_are_misses() {
        let client = GeocodeClient::new(SearchPage::new(429, ROCKFORD_PAGE), GeocodeMarkers::default());
        assert_eq!(client.locate("1 MAIN ST").await, None);

        let client = GeocodeClient::new(SearchPage::new(0, ""), GeocodeMarkers::default());
        assert_eq!(client.locate("1 MAIN ST").await, None);
    }
}
