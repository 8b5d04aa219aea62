use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::{
    fs,
    path::{Path, PathBuf},
};

use filingest::IngestConfig;
use tiny_http::{Header, Method, Response, Server};

pub fn fixture_path(relative: impl AsRef<Path>) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn read_fixture(relative: impl AsRef<Path>) -> String {
    fs::read_to_string(fixture_path(relative)).expect("fixture file should be readable")
}

struct Route {
    content_type: &'static str,
    body: Vec<u8>,
}

/// Canned registry responses served from a background thread on an ephemeral
/// port. Routes are exact request paths; anything else returns 404.
#[allow(dead_code)]
pub struct MockRegistry {
    pub endpoint: String,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl MockRegistry {
    pub fn spawn() -> Self {
        let server = Server::http("127.0.0.1:0").expect("mock registry should bind");
        let addr = server.server_addr().to_ip().expect("registry ip address");
        let routes: Arc<Mutex<HashMap<String, Route>>> = Arc::default();
        let requests: Arc<Mutex<Vec<String>>> = Arc::default();

        let table = Arc::clone(&routes);
        let seen = Arc::clone(&requests);
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                seen.lock().unwrap().push(request.url().to_string());

                if *request.method() != Method::Get {
                    let _ = request
                        .respond(Response::from_string("method not allowed").with_status_code(405));
                    continue;
                }

                let url = request.url().to_string();
                match table.lock().unwrap().get(&url) {
                    Some(route) => {
                        let header =
                            Header::from_bytes(&b"Content-Type"[..], route.content_type.as_bytes())
                                .expect("static header");
                        let _ = request
                            .respond(Response::from_data(route.body.clone()).with_header(header));
                    }
                    None => {
                        let _ = request
                            .respond(Response::from_string("not found").with_status_code(404));
                    }
                }
            }
        });

        MockRegistry {
            endpoint: format!("http://{addr}"),
            routes,
            requests,
        }
    }

    pub fn serve(&self, path: &str, content_type: &'static str, body: impl Into<Vec<u8>>) {
        self.routes.lock().unwrap().insert(
            path.to_string(),
            Route {
                content_type,
                body: body.into(),
            },
        );
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Pipeline configuration pointed entirely at this mock, with a short
    /// request interval so tests run quickly.
    pub fn config(&self, root: impl Into<PathBuf>) -> IngestConfig {
        let mut config = IngestConfig::new("filingest-tests test@example.com", root);
        config.base_urls.archives = self.endpoint.clone();
        config.base_urls.data = self.endpoint.clone();
        config.base_urls.files = self.endpoint.clone();
        config.min_request_interval = Duration::from_millis(10);
        config.max_retries = 1;
        config
    }
}

/// Registers the canned ACME fixtures (ticker table, submissions, filing
/// metadata, primary document) under the paths the client derives for
/// CIK 1122334, accession 0001122334-24-000015.
#[allow(dead_code)]
pub fn serve_acme(registry: &MockRegistry) {
    registry.serve(
        "/company_tickers.json",
        "application/json",
        read_fixture("company_tickers.json"),
    );
    registry.serve(
        "/submissions/CIK0001122334.json",
        "application/json",
        read_fixture("submissions/acme_submissions.json"),
    );
    registry.serve(
        "/data/1122334/000112233424000015/index.json",
        "application/json",
        read_fixture("submissions/acme_index.json"),
    );
    registry.serve(
        "/data/1122334/000112233424000015/acme-20231231.htm",
        "text/html",
        read_fixture("documents/acme_10k.htm"),
    );
}
