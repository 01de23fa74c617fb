mod common;

use std::io::{Cursor, Write};
use std::time::Duration;

use common::{Canned, DATASET_FEED, GRANULE_FEED, StubServer};
use podaac::{
    DatasetSearch, Error, ExtractRequest, GranuleSearch, JobStatus, PollOptions, StatusPolicy,
};
use serde_json::json;

const GRANULE: &str = "ascat_20140520_005700_metopa_39344_eps_o_250_2300_ovw.l2.nc";

fn fast_poll() -> PollOptions {
    PollOptions::default()
        .with_interval(Duration::from_millis(5))
        .with_timeout(Duration::from_secs(10))
}

fn zip_bytes(name: &str, data: &[u8]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    zip.start_file(name, options).unwrap();
    zip.write_all(data).unwrap();
    zip.finish().unwrap().into_inner()
}

#[test]
fn dataset_search_returns_feed() {
    let server = StubServer::start();
    server.route("/ws/search/dataset/", vec![Canned::xml(DATASET_FEED)]);

    let feed = server
        .client()
        .podaac()
        .dataset_search(&DatasetSearch::dataset("PODAAC-ASOP2-25X01"))
        .unwrap();

    let parsed = feed.parse().unwrap();
    assert_eq!(parsed.total_results, Some(1));
    assert_eq!(
        parsed.entries[0].dataset_id.as_deref(),
        Some("PODAAC-ASOP2-25X01")
    );

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(
        requests[0].param("datasetId").as_deref(),
        Some("PODAAC-ASOP2-25X01")
    );
    assert_eq!(requests[0].param("itemsPerPage").as_deref(), Some("7"));
}

#[test]
fn blank_parameters_never_reach_the_wire() {
    let server = StubServer::start();
    server.route("/ws/search/granule/", vec![Canned::xml(GRANULE_FEED)]);

    server
        .client()
        .podaac()
        .granule_search(&GranuleSearch {
            start_time: "2014-05-20T00:00:00Z".into(),
            ..GranuleSearch::dataset("PODAAC-ASOP2-25X01")
        })
        .unwrap();

    let request = &server.requests()[0];
    for (key, value) in request.query_pairs() {
        assert!(!value.is_empty(), "{}= sent empty in {}", key, request.target);
    }
    assert!(request.param("shortName").is_none());
    assert!(request.param("bbox").is_none());
    assert_eq!(
        request.param("startTime").as_deref(),
        Some("2014-05-20T00:00:00Z")
    );
}

#[test]
fn denied_statuses_become_http_errors() {
    for code in [400u16, 404, 408, 503] {
        let server = StubServer::start();
        server.route("/ws/search/dataset/", vec![Canned::status(code)]);

        let err = server
            .client()
            .podaac()
            .dataset_search(&DatasetSearch::dataset("PODAAC-ASOP2-25X01"))
            .unwrap_err();
        assert_eq!(err.status().map(|s| s.as_u16()), Some(code));
        assert!(matches!(err, Error::Http { ref body, .. } if body.contains(&code.to_string())));
    }
}

#[test]
fn other_statuses_pass_through_as_bodies() {
    let server = StubServer::start();
    server.route(
        "/ws/search/dataset/",
        vec![Canned::new(500, "text/html", "<html>server error</html>")],
    );

    let feed = server
        .client()
        .podaac()
        .dataset_search(&DatasetSearch::dataset("PODAAC-ASOP2-25X01"))
        .unwrap();
    assert_eq!(feed.as_str(), "<html>server error</html>");
    assert!(!StatusPolicy::DenyList.is_denied(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
}

#[test]
fn missing_required_parameter_sends_nothing() {
    let server = StubServer::start();
    let client = server.client();

    let err = client
        .podaac()
        .granule_search(&GranuleSearch::default())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let err = client.podaac().dataset_variables("").unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let err = client.podaac().subset_status("").unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    assert!(server.requests().is_empty());
}

#[test]
fn dataset_variables_reads_the_list() {
    let server = StubServer::start();
    server.route(
        "/ws/dataset/variables/",
        vec![Canned::json(
            r#"{"datasetId":"PODAAC-ASOP2-25X01","variables":["wind_speed","wind_dir"]}"#,
        )],
    );
    let vars = server
        .client()
        .podaac()
        .dataset_variables("PODAAC-ASOP2-25X01")
        .unwrap();
    assert_eq!(vars, vec![json!("wind_speed"), json!("wind_dir")]);
}

#[test]
fn dataset_variables_without_key_is_malformed() {
    let server = StubServer::start();
    server.route("/ws/dataset/variables/", vec![Canned::json(r#"{"datasetId":"X"}"#)]);
    let err = server
        .client()
        .podaac()
        .dataset_variables("X")
        .unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { .. }));
}

#[test]
fn unissued_token_reports_unknown() {
    let server = StubServer::start();
    server.route(
        "/ws/subset/status",
        vec![Canned::json(r#"{"status":"unknown","resultURLs":[]}"#)],
    );
    let status = server.client().podaac().subset_status("FakeToken").unwrap();
    assert_eq!(status, JobStatus::Unknown);
    assert_eq!(
        server.requests()[0].param("token").as_deref(),
        Some("FakeToken")
    );
}

#[test]
fn subset_round_trip_extracts_result() {
    let server = StubServer::start();
    let result_url = server.url("/results/a1b2c3.zip");
    let done = json!({"status": "done", "resultURLs": [result_url]}).to_string();

    server
        .route("/ws/subset/granule", vec![Canned::json(r#"{"token":"a1b2c3"}"#)])
        .route(
            "/ws/subset/status",
            vec![
                Canned::json(r#"{"status":"queued"}"#),
                Canned::json(r#"{"status":"processing"}"#),
                Canned::json(&done),
            ],
        )
        .route(
            "/results/a1b2c3.zip",
            vec![Canned::bytes(
                "application/zip",
                zip_bytes(&format!("subsetted-{}", GRANULE), b"CDF\x01"),
            )],
        );

    let dir = tempfile::tempdir().unwrap();
    let query = json!({
        "email": "",
        "query": [{
            "compact": true,
            "datasetId": "PODAAC-ASOP2-25X01",
            "bbox": "-180,-90,180,90",
            "variables": ["lat", "lon", "time", "wind_speed"],
            "granuleIds": [GRANULE]
        }]
    });
    let name = server
        .client()
        .podaac()
        .subset_and_download(&query, Some(dir.path()), &fast_poll())
        .unwrap();

    assert_eq!(name, format!("subsetted-{}", GRANULE));
    assert_eq!(std::fs::read(dir.path().join(&name)).unwrap(), b"CDF\x01");
    assert!(!dir.path().join("a1b2c3.zip").exists());

    let submit = &server.requests_to("/ws/subset/granule")[0];
    assert_eq!(submit.method, "POST");
    assert_eq!(submit.param("request").as_deref(), Some("submit"));
    let form: Vec<(String, String)> = url::form_urlencoded::parse(&submit.body)
        .into_owned()
        .collect();
    let sent: serde_json::Value = serde_json::from_str(&form[0].1).unwrap();
    assert_eq!(form[0].0, "query");
    assert_eq!(sent, query);
    assert_eq!(server.requests_to("/ws/subset/status").len(), 3);
}

#[test]
fn failed_subset_job_is_an_error() {
    let server = StubServer::start();
    server
        .route("/ws/subset/granule", vec![Canned::json(r#"{"token":"t-1"}"#)])
        .route(
            "/ws/subset/status",
            vec![Canned::json(r#"{"status":"error","message":"no granules matched"}"#)],
        );

    let dir = tempfile::tempdir().unwrap();
    let err = server
        .client()
        .podaac()
        .subset_and_download(&json!({"query": []}), Some(dir.path()), &fast_poll())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::JobFailed { ref token, message: Some(ref m) } if token == "t-1" && m.contains("no granules")
    ));
}

#[test]
fn extract_service_plain_text_is_a_failure() {
    let server = StubServer::start();
    server.route(
        "/ws/extract/granule/",
        vec![Canned::new(200, "text/plain", "granule not found")],
    );

    let dir = tempfile::tempdir().unwrap();
    let err = server
        .client()
        .podaac()
        .extract_granule(
            &ExtractRequest {
                dataset_id: "PODAAC-ASOP2-25X01".into(),
                granule_name: GRANULE.into(),
                bbox: "-180,-90,180,90".into(),
                format: "netcdf".into(),
                ..ExtractRequest::default()
            },
            Some(dir.path()),
        )
        .unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { ref reason, .. } if reason.contains("granule not found")));
    assert!(!dir.path().join(GRANULE).exists());
}

#[test]
fn extract_granule_writes_named_file() {
    let server = StubServer::start();
    server.route(
        "/ws/extract/granule/",
        vec![Canned::bytes("application/x-netcdf", b"CDF\x01".to_vec())],
    );

    let dir = tempfile::tempdir().unwrap();
    let path = server
        .client()
        .podaac()
        .extract_granule(
            &ExtractRequest {
                dataset_id: "PODAAC-ASOP2-25X01".into(),
                granule_name: GRANULE.into(),
                ..ExtractRequest::default()
            },
            Some(dir.path()),
        )
        .unwrap();
    assert_eq!(path, dir.path().join(GRANULE));
}

#[test]
fn level2_listing_uses_host_root() {
    let server = StubServer::start();
    server.route(
        "/l2ssIngest/datasets",
        vec![Canned::json(
            r#"{"datasets":[{"persistentId":"PODAAC-ASOP2-25X01","shortName":"ASCATA-L2-Coastal"}]}"#,
        )],
    );
    let podaac = server.client();
    assert_eq!(
        podaac.podaac().list_level2_dataset_ids().unwrap(),
        vec!["PODAAC-ASOP2-25X01".to_string()]
    );
    assert_eq!(
        podaac.podaac().list_level2_dataset_short_names().unwrap(),
        vec!["ASCATA-L2-Coastal".to_string()]
    );
}

#[test]
fn granule_search_catalog_excludes_level2() {
    let server = StubServer::start();
    let catalog = r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:podaac="https://podaac.jpl.nasa.gov/opensearch/">
  <entry><title>a</title><podaac:datasetId>PODAAC-ASOP2-25X01</podaac:datasetId></entry>
  <entry><title>b</title><podaac:datasetId>PODAAC-GHGMR-4FJ04</podaac:datasetId></entry>
</feed>"#;
    server
        .route(
            "/l2ssIngest/datasets",
            vec![Canned::json(
                r#"{"datasets":[{"persistentId":"PODAAC-ASOP2-25X01","shortName":"ASCATA-L2-Coastal"}]}"#,
            )],
        )
        .route("/ws/search/dataset/", vec![Canned::xml(catalog)]);

    let ids = server
        .client()
        .podaac()
        .list_granule_search_dataset_ids()
        .unwrap();
    assert_eq!(ids, vec!["PODAAC-GHGMR-4FJ04".to_string()]);

    let pages = server.requests_to("/ws/search/dataset/");
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].param("startIndex"), None);
    assert_eq!(pages[1].param("startIndex").as_deref(), Some("400"));
}

#[test]
fn extract_listing_reads_the_dataset_table() {
    let server = StubServer::start();
    server.route(
        "/ws/extract/granule/index.html",
        vec![Canned::new(
            200,
            "text/html",
            r#"<html><body><table id="tblDataset">
<tr><th>Dataset ID</th><th>Short Name</th></tr>
<tr><td>PODAAC-ASOP2-25X01</td><td>ASCATA-L2-25km</td></tr>
<tr><td>PODAAC-GHMG2-2PO01</td><td>AVHRR_METOP_A-EUR-L2P-v1.0</td></tr>
</table></body></html>"#,
        )],
    );

    let client = server.client();
    assert_eq!(
        client.podaac().list_extract_granule_dataset_ids().unwrap(),
        vec!["PODAAC-ASOP2-25X01".to_string(), "PODAAC-GHMG2-2PO01".to_string()]
    );
    assert_eq!(
        client
            .podaac()
            .list_extract_granule_dataset_short_names()
            .unwrap(),
        vec![
            "ASCATA-L2-25km".to_string(),
            "AVHRR_METOP_A-EUR-L2P-v1.0".to_string()
        ]
    );
    assert_eq!(server.requests_to("/ws/extract/granule/index.html").len(), 2);
}

#[test]
fn l4_granule_title_cannot_escape_the_directory() {
    let server = StubServer::start();
    let opendap = server.url("/opendap/escaped.nc");
    let feed = format!(
        r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title>../escaped.nc</title>
    <link href="{}.html" rel="enclosure" title="OPeNDAP URL"/>
  </entry>
</feed>"#,
        opendap
    );
    server
        .route("/ws/search/granule/", vec![Canned::xml(&feed)])
        .route(
            "/opendap/escaped.nc",
            vec![Canned::bytes("application/x-netcdf", b"CDF\x01".to_vec())],
        );

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("granules");
    let err = server
        .client()
        .podaac()
        .extract_l4_granule("PODAAC-GHGMR-4FJ04", Some(&dir))
        .unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { .. }), "{:?}", err);
    assert!(!root.path().join("escaped.nc").exists());
    assert!(server.requests_to("/opendap/escaped.nc").is_empty());
}

#[test]
fn path_like_granule_names_are_rejected() {
    let server = StubServer::start();
    let dir = tempfile::tempdir().unwrap();
    let err = server
        .client()
        .podaac()
        .extract_granule(
            &ExtractRequest {
                dataset_id: "PODAAC-ASOP2-25X01".into(),
                granule_name: "../../escaped.nc".into(),
                ..ExtractRequest::default()
            },
            Some(dir.path()),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(server.requests().is_empty());
}

#[test]
fn submission_reply_without_token_is_malformed() {
    let server = StubServer::start();
    server.route("/ws/subset/granule", vec![Canned::json(r#"{"jobId":"x"}"#)]);

    let err = server
        .client()
        .podaac()
        .granule_subset(&json!({"query": []}))
        .unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { .. }), "{:?}", err);
}

#[test]
fn status_reply_without_status_is_malformed() {
    let server = StubServer::start();
    server.route("/ws/subset/status", vec![Canned::json(r#"{"resultURLs":[]}"#)]);

    let err = server.client().podaac().subset_status("t-1").unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { .. }), "{:?}", err);
}

#[test]
fn dataset_search_without_identifier_sends_nothing() {
    let server = StubServer::start();
    let err = server
        .client()
        .podaac()
        .dataset_search(&DatasetSearch::dataset(""))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(server.requests().is_empty());
}

#[test]
fn partially_failed_subset_job_is_an_error() {
    let server = StubServer::start();
    server
        .route("/ws/subset/granule", vec![Canned::json(r#"{"token":"t-2"}"#)])
        .route(
            "/ws/subset/status",
            vec![Canned::json(
                r#"{"status":"partial error","message":"1 of 2 granules failed"}"#,
            )],
        );

    let dir = tempfile::tempdir().unwrap();
    let err = server
        .client()
        .podaac()
        .subset_and_download(&json!({"query": []}), Some(dir.path()), &fast_poll())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::JobPartialFailure { ref token, message: Some(ref m) } if token == "t-2" && m.contains("1 of 2")
    ));
}

#[test]
fn unknown_subset_job_is_an_error() {
    let server = StubServer::start();
    server
        .route("/ws/subset/granule", vec![Canned::json(r#"{"token":"t-3"}"#)])
        .route("/ws/subset/status", vec![Canned::json(r#"{"status":"unknown"}"#)]);

    let dir = tempfile::tempdir().unwrap();
    let err = server
        .client()
        .podaac()
        .subset_and_download(&json!({"query": []}), Some(dir.path()), &fast_poll())
        .unwrap_err();
    assert!(matches!(err, Error::UnknownJob { ref token } if token == "t-3"));
    assert_eq!(server.requests_to("/ws/subset/status").len(), 1);
}
