use httpmock::prelude::*;
use ops_etl::adapters::digicert::DigiCertClient;
use ops_etl::adapters::dns::DohLookup;
use ops_etl::adapters::sectigo::SectigoClient;
use ops_etl::app::pipelines::ca_details::{CaDetailsPipeline, DetailSource};
use ops_etl::app::pipelines::combine::CombinePipeline;
use ops_etl::app::pipelines::domain_lookup::DomainLookupPipeline;
use ops_etl::app::pipelines::gaps::GapsPipeline;
use ops_etl::app::pipelines::{CA_GAPS_CSV, COMBINED_DOMAINS_CSV, DOMAIN_ID_LOOKUP_CSV};
use ops_etl::config::vault::SectigoCredentials;
use ops_etl::{EtlEngine, LocalStorage};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn sectigo_client(server: &MockServer) -> SectigoClient {
    SectigoClient::new(
        &server.url("/sectigo"),
        &SectigoCredentials {
            login: "ops".into(),
            password: "secret".into(),
            customer_uri: "acme".into(),
            org_id: Some("42".into()),
        },
    )
    .unwrap()
}

fn mock_cas(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET)
            .path("/dc/domain")
            .header("X-DC-DEVKEY", "dc-key");
        then.status(200).json_body(json!({
            "domains": [{"id": 11, "name": "a.example"}],
            "page": {"total": 1}
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/dc/domain/11");
        then.status(200).json_body(json!({
            "name": "a.example",
            "is_active": true,
            "dcv_method": "dns-txt-token",
            "dcv_expiration_datetime": "2025-06-01T00:00:00+00:00"
        }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/sectigo")
            .header("login", "ops")
            .header("customerUri", "acme");
        then.status(200).json_body(json!([
            {"id": 21, "name": "a.example"},
            {"id": 22, "name": "b.example"}
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/sectigo/21");
        then.status(200).json_body(json!({
            "name": "a.example",
            "state": "ACTIVE",
            "validationMethod": "CNAME_CSR_HASH",
            "dcvExpiration": "2025-07-01"
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/sectigo/22");
        then.status(200).json_body(json!({"name": "b.example", "state": "PENDING"}));
    });
}

fn mock_dns(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET)
            .path("/resolve")
            .query_param("name", "a.example")
            .query_param("type", "NS");
        then.status(200).json_body(json!({
            "Status": 0,
            "Answer": [
                {"name": "a.example.", "type": 2, "data": "a1-1.akam.net."},
                {"name": "a.example.", "type": 2, "data": "a2-2.akam.net."}
            ]
        }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/resolve")
            .query_param("name", "b.example");
        then.status(200).json_body(json!({"Status": 3}));
    });
}

#[tokio::test]
async fn test_inventory_from_lookup_to_gaps() {
    let server = MockServer::start();
    mock_cas(&server);
    mock_dns(&server);

    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().to_str().unwrap().to_string();
    let storage = || LocalStorage::new(data_dir.clone());

    // domain-ids
    let digicert = DigiCertClient::new(&server.url("/dc"), "dc-key").unwrap();
    EtlEngine::new(DomainLookupPipeline::new(
        storage(),
        Some(digicert),
        Some(sectigo_client(&server)),
    ))
    .run()
    .await
    .unwrap();

    let lookup = std::fs::read_to_string(dir.path().join(DOMAIN_ID_LOOKUP_CSV)).unwrap();
    assert_eq!(
        lookup,
        "id,domain,CA\n11,a.example,DigiCert\n21,a.example,Sectigo\n22,b.example,Sectigo\n"
    );

    // ca-details for both CAs
    let digicert = DigiCertClient::new(&server.url("/dc"), "dc-key").unwrap();
    EtlEngine::new(CaDetailsPipeline::new(storage(), DetailSource::DigiCert(digicert), 2))
        .run()
        .await
        .unwrap();
    EtlEngine::new(CaDetailsPipeline::new(
        storage(),
        DetailSource::Sectigo(sectigo_client(&server)),
        2,
    ))
    .run()
    .await
    .unwrap();

    let digicert_csv = std::fs::read_to_string(dir.path().join("digicert_domains.csv")).unwrap();
    assert_eq!(
        digicert_csv,
        "id,name,active,dcv_method,Expiration\n11,a.example,ACTIVE,TXT,2025-06-01\n"
    );

    // combine
    let dns = Arc::new(DohLookup::new(&server.base_url()).unwrap());
    EtlEngine::new(CombinePipeline::new(storage(), dns, 4))
        .run()
        .await
        .unwrap();

    let combined = std::fs::read_to_string(dir.path().join(COMBINED_DOMAINS_CSV)).unwrap();
    let lines: Vec<&str> = combined.lines().collect();
    assert_eq!(lines[0], "provider,id,name,active,dcv_method,Expiration,ns_provider");
    assert_eq!(lines[1], "Digicert,11,a.example,ACTIVE,TXT,2025-06-01,Akamai");
    assert_eq!(lines[2], "Sectigo,21,a.example,ACTIVE,CNAME,2025-07-01,Akamai");
    assert!(lines[3].starts_with("Sectigo,22,b.example,PENDING,OTHER,"));
    assert!(lines[3].ends_with(",Unknown"));

    // gaps
    let input = dir.path().join(DOMAIN_ID_LOOKUP_CSV);
    EtlEngine::new(GapsPipeline::new(storage(), input))
        .run()
        .await
        .unwrap();

    let gaps = std::fs::read_to_string(dir.path().join(CA_GAPS_CSV)).unwrap();
    assert_eq!(gaps, "ca,missing_from,domain\nSectigo,DigiCert,b.example\n");
}

#[tokio::test]
async fn test_combine_without_detail_files_writes_nothing() {
    let server = MockServer::start();
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path().to_str().unwrap());
    let dns = Arc::new(DohLookup::new(&server.base_url()).unwrap());

    let result = EtlEngine::new(CombinePipeline::new(storage, dns, 2)).run().await;
    assert!(result.is_ok());
    assert!(!dir.path().join(COMBINED_DOMAINS_CSV).exists());
}
