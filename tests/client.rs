use marketdata_admin::api::types::Collection;
use marketdata_admin::api::{ApiClient, CollectionApi, Domain, HttpCollectionApi};
use marketdata_admin::AppError;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn client_unwraps_envelope_and_sends_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/bonds/collections"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [
                {"name": "bond_info_cm", "display_name": "Bond Info"},
                {"name": "yield_curve_daily"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::with_base_url(&server.uri()).expect("client");
    client.set_token(Some("secret".to_string()));

    let collections: Vec<Collection> = client
        .get("/api/bonds/collections", &[])
        .await
        .expect("collections");
    assert_eq!(collections.len(), 2);
    assert_eq!(collections[0].display_name, "Bond Info");
    assert_eq!(collections[1].display_name, "");
}

#[tokio::test]
async fn client_maps_http_status_with_body_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/funds/collections"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "database offline"})))
        .mount(&server)
        .await;

    let api = HttpCollectionApi::new(Domain::Funds, ApiClient::with_base_url(&server.uri()).unwrap());
    let err = api.list_collections().await.unwrap_err();
    match err {
        AppError::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message.as_deref(), Some("database offline"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn client_rejects_unsuccessful_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stocks/collections/daily_quotes/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "collection not found"
        })))
        .mount(&server)
        .await;

    let api = HttpCollectionApi::new(Domain::Stocks, ApiClient::with_base_url(&server.uri()).unwrap());
    let err = api.collection_stats("daily_quotes").await.unwrap_err();
    assert!(matches!(err, AppError::Envelope(ref m) if m == "collection not found"));
    assert_eq!(err.user_message(), "collection not found");
}

#[tokio::test]
async fn refresh_without_task_id_completes_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/futures/collections/futures_daily/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"saved": 12},
            "message": "Saved 12 rows"
        })))
        .mount(&server)
        .await;

    let api = HttpCollectionApi::new(Domain::Futures, ApiClient::with_base_url(&server.uri()).unwrap());
    let request = marketdata_admin::api::types::RefreshRequest {
        update_type: marketdata_admin::api::types::UpdateType::Single,
        update_mode: None,
        params: serde_json::Map::new(),
    };
    let start = api.refresh("futures_daily", &request).await.expect("refresh");
    match start {
        marketdata_admin::api::types::RefreshStart::Completed { message, result } => {
            assert_eq!(message.as_deref(), Some("Saved 12 rows"));
            assert_eq!(result.get("saved"), Some(&json!(12)));
        }
        other => panic!("expected completed refresh, got {other:?}"),
    }
}

#[tokio::test]
async fn fund_companies_and_currency_config_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/funds/companies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": ["Alpha Fund Co", "Beta Asset"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/currencies/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"default_api_key": "fx-demo"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::with_base_url(&server.uri()).unwrap();
    let funds = HttpCollectionApi::new(Domain::Funds, client.clone());
    assert_eq!(funds.fund_companies().await.unwrap(), vec!["Alpha Fund Co", "Beta Asset"]);
    assert!(matches!(funds.domain_config().await, Err(AppError::NotFound(_))));

    let currencies = HttpCollectionApi::new(Domain::Currencies, client);
    assert_eq!(currencies.domain_config().await.unwrap().default_api_key, "fx-demo");
    assert!(matches!(currencies.fund_companies().await, Err(AppError::NotFound(_))));
}
