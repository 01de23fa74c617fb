//! Canned-response HTTP server for integration tests.
//!
//! Routes are matched on the exact request path (query string ignored). A
//! route with several responses serves them in order and then repeats the last.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use tokio::runtime::Runtime;

use podaac::{Client, ClientConfig, DriveCredentials, Endpoints};

#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    /// Drop the connection after sending `body`.
    pub truncated: bool,
}

impl Canned {
    pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            body: body.into(),
            truncated: false,
        }
    }

    pub fn json(body: &str) -> Self {
        Self::new(200, "application/json", body)
    }

    pub fn xml(body: &str) -> Self {
        Self::new(200, "application/atom+xml", body)
    }

    pub fn bytes(content_type: &str, body: Vec<u8>) -> Self {
        Self::new(200, content_type, body)
    }

    pub fn status(status: u16) -> Self {
        Self::new(status, "text/plain", format!("status {}", status))
    }

    /// A 200 whose body stream fails after `body`.
    pub fn truncated(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            truncated: true,
            ..Self::bytes(content_type, body)
        }
    }

    fn respond(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = if self.truncated {
            let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
                Ok(Bytes::from(self.body)),
                Err(std::io::Error::other("connection dropped")),
            ];
            // Pause between chunks so the head and first chunk are flushed.
            let stream = futures::stream::iter(chunks).then(|chunk| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                chunk
            });
            Body::from_stream(stream)
        } else {
            Body::from(self.body)
        };
        (status, [(CONTENT_TYPE, self.content_type)], body).into_response()
    }
}

/// One request as seen by the server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path plus query string.
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or(&self.target)
    }

    pub fn query(&self) -> &str {
        self.target.split_once('?').map(|(_, q)| q).unwrap_or("")
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query().as_bytes())
            .into_owned()
            .collect()
    }

    pub fn param(&self, key: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Default)]
struct Routes {
    canned: HashMap<String, Vec<Canned>>,
    served: HashMap<String, usize>,
    requests: Vec<Recorded>,
}

type SharedRoutes = Arc<Mutex<Routes>>;

pub struct StubServer {
    base: String,
    routes: SharedRoutes,
    // Serves until the server is dropped.
    _runtime: Runtime,
}

impl StubServer {
    pub fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("stub server runtime");
        let routes = SharedRoutes::default();

        let app = Router::new()
            .fallback(serve)
            .with_state(Arc::clone(&routes));
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .expect("bind stub server");
        let port = listener.local_addr().expect("local addr").port();
        runtime.spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base: format!("http://127.0.0.1:{}", port),
            routes,
            _runtime: runtime,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Serves `responses` for `path`, in order.
    pub fn route(&self, path: &str, responses: Vec<Canned>) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .canned
            .insert(path.to_string(), responses);
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.routes.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path() == path)
            .collect()
    }

    /// Every service pointed at this server.
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            podaac: self.url("/ws/"),
            l2ss: self.url("/l2ss/"),
            mcc: self.url("/mcc/check"),
            oceancolor: self.url("/api/file_search"),
            drive: self.url("/drive/files"),
            nexus: self.url("/nexus/"),
        }
    }

    pub fn client(&self) -> Client {
        Client::with_endpoints(self.endpoints()).expect("client")
    }

    pub fn drive_client(&self, username: &str, password: &str) -> Client {
        Client::new(ClientConfig {
            endpoints: self.endpoints(),
            drive: Some(DriveCredentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
            ..ClientConfig::default()
        })
        .expect("client")
    }
}

async fn serve(
    State(routes): State<SharedRoutes>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let recorded = Recorded {
        method: method.as_str().to_string(),
        target: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string()),
        headers: headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
        body: body.to_vec(),
    };

    let canned = {
        let mut routes = routes.lock().unwrap();
        let path = recorded.path().to_string();
        routes.requests.push(recorded);
        let served = routes.served.entry(path.clone()).or_insert(0);
        let index = *served;
        *served += 1;
        routes
            .canned
            .get(&path)
            .and_then(|responses| responses.get(index).or_else(|| responses.last()))
            .cloned()
            .unwrap_or_else(|| Canned::status(404))
    };
    canned.respond()
}

/// Granule search feed for the ASCAT dataset used across the tests.
pub const GRANULE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/" xmlns:podaac="https://podaac.jpl.nasa.gov/opensearch/">
  <title>PO.DAAC Granule Search Results</title>
  <opensearch:totalResults>1</opensearch:totalResults>
  <entry>
    <title>ascat_20140520_005700_metopa_39344_eps_o_250_2300_ovw.l2.nc</title>
    <id>PODAAC-ASOP2-25X01:ascat_20140520_005700_metopa_39344_eps_o_250_2300_ovw.l2.nc</id>
    <updated>2014-05-20T04:12:00Z</updated>
    <podaac:datasetId>PODAAC-ASOP2-25X01</podaac:datasetId>
    <link href="ftp://podaac-ftp.jpl.nasa.gov/allData/ascat/preview/L2/metop_a/25km/2014/140/ascat_20140520_005700_metopa_39344_eps_o_250_2300_ovw.l2.nc.gz" rel="enclosure" title="FTP URL" type="application/x-netcdf"/>
    <link href="https://opendap.jpl.nasa.gov/opendap/allData/ascat/preview/L2/metop_a/25km/2014/140/ascat_20140520_005700_metopa_39344_eps_o_250_2300_ovw.l2.nc.gz.html" rel="enclosure" title="OPeNDAP URL" type="text/html"/>
  </entry>
</feed>"#;

pub const DATASET_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/" xmlns:podaac="https://podaac.jpl.nasa.gov/opensearch/">
  <title>PO.DAAC Dataset Search Results</title>
  <opensearch:totalResults>1</opensearch:totalResults>
  <entry>
    <title>MetOp-A ASCAT Level 2 Ocean Surface Wind Vectors Optimized for Coastal Ocean</title>
    <id>PODAAC-ASOP2-25X01</id>
    <podaac:datasetId>PODAAC-ASOP2-25X01</podaac:datasetId>
    <podaac:shortName>ASCATA-L2-Coastal</podaac:shortName>
  </entry>
</feed>"#;
