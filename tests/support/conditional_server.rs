//! A wiremock responder that behaves like a static file server with a
//! `Last-Modified` date, optionally honoring `If-Modified-Since`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use condget_core::download::date::{format_http_date, parse_http_date, unix_seconds};
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

#[derive(Debug)]
struct Resource {
    body: Vec<u8>,
    last_modified: SystemTime,
}

/// Behaviour switches for [`ConditionalServer`].
#[derive(Debug, Clone, Copy)]
pub struct Behaviour {
    /// Answer 304 when `Last-Modified <= If-Modified-Since`.
    pub honor_if_modified_since: bool,
    /// Include `Last-Modified` on 304 responses.
    pub last_modified_on_304: bool,
    /// Include `Last-Modified` on HEAD responses.
    pub last_modified_on_head: bool,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            honor_if_modified_since: true,
            last_modified_on_304: true,
            last_modified_on_head: true,
        }
    }
}

/// Serves one resource; clones share state so tests can swap the resource.
#[derive(Debug, Clone)]
pub struct ConditionalServer {
    resource: Arc<Mutex<Resource>>,
    behaviour: Behaviour,
    bodies_served: Arc<AtomicUsize>,
    not_modified_served: Arc<AtomicUsize>,
}

impl ConditionalServer {
    pub fn new(body: &[u8], last_modified: SystemTime, behaviour: Behaviour) -> Self {
        Self {
            resource: Arc::new(Mutex::new(Resource {
                body: body.to_vec(),
                last_modified,
            })),
            behaviour,
            bodies_served: Arc::new(AtomicUsize::new(0)),
            not_modified_served: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mounts the responder for every method on `route`.
    pub async fn mount(&self, mock_server: &MockServer, route: &str) {
        Mock::given(path(route))
            .respond_with(self.clone())
            .mount(mock_server)
            .await;
    }

    /// Replaces the served resource.
    pub fn publish(&self, body: &[u8], last_modified: SystemTime) {
        let mut resource = self.resource.lock().unwrap();
        resource.body = body.to_vec();
        resource.last_modified = last_modified;
    }

    /// Number of GET responses that carried the body.
    pub fn bodies_served(&self) -> usize {
        self.bodies_served.load(Ordering::SeqCst)
    }

    /// Number of 304 responses.
    pub fn not_modified_served(&self) -> usize {
        self.not_modified_served.load(Ordering::SeqCst)
    }
}

impl Respond for ConditionalServer {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let resource = self.resource.lock().unwrap();
        let last_modified = format_http_date(resource.last_modified);

        if request.method.as_str() == "HEAD" {
            let template = ResponseTemplate::new(200);
            return if self.behaviour.last_modified_on_head {
                template.insert_header("Last-Modified", last_modified.as_str())
            } else {
                template
            };
        }

        let since = request
            .headers
            .get("if-modified-since")
            .and_then(|value| value.to_str().ok())
            .and_then(|text| parse_http_date(text).ok());

        if let Some(since) = since
            && self.behaviour.honor_if_modified_since
            && unix_seconds(resource.last_modified) <= unix_seconds(since)
        {
            self.not_modified_served.fetch_add(1, Ordering::SeqCst);
            let template = ResponseTemplate::new(304);
            return if self.behaviour.last_modified_on_304 {
                template.insert_header("Last-Modified", last_modified.as_str())
            } else {
                template
            };
        }

        self.bodies_served.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(200)
            .insert_header("Last-Modified", last_modified.as_str())
            .set_body_bytes(resource.body.clone())
    }
}
