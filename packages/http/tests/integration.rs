use std::collections::HashMap;
use std::sync::Arc;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use xmlrecord_core::{Error, FieldDecl, QueryManager, Schema, Transport};
use xmlrecord_http::HttpTransport;

fn muppet_schema(base: &str) -> Arc<Schema> {
    Schema::builder("Muppet")
        .field("name", FieldDecl::char("/muppet/name"))
        .field("age", FieldDecl::int("/muppet/age"))
        .finder(&["name"], format!("{}/muppets/%s", base))
        .finder(&[], format!("{}/muppets", base))
        .build()
        .unwrap()
}

#[tokio::test]
async fn fetch_returns_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/muppets/Gonzo"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<muppet><name>Gonzo</name></muppet>"))
        .mount(&server)
        .await;

    let url = format!("{}/muppets/Gonzo", server.uri());
    let response = tokio::task::spawn_blocking(move || {
        HttpTransport::new().fetch(&url, &HashMap::new()).unwrap()
    })
    .await
    .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text().unwrap(), "<muppet><name>Gonzo</name></muppet>");
}

#[tokio::test]
async fn headers_are_sent_with_the_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/muppets"))
        .and(header("accept", "application/xml"))
        .and(header("x-api-key", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<muppets/>"))
        .mount(&server)
        .await;

    let url = format!("{}/muppets", server.uri());
    let response = tokio::task::spawn_blocking(move || {
        let transport = HttpTransport::new().with_default_header("Accept", "application/xml");
        let mut headers = HashMap::new();
        headers.insert("X-Api-Key".to_string(), "s3cret".to_string());
        transport.fetch(&url, &headers).unwrap()
    })
    .await
    .unwrap();

    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn query_get_over_real_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/muppets/Gonzo"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<muppet><name>Gonzo</name><age>3</age></muppet>"),
        )
        .mount(&server)
        .await;

    let uri = server.uri();
    let record = tokio::task::spawn_blocking(move || {
        let manager =
            QueryManager::new(muppet_schema(&uri), Arc::new(HttpTransport::new())).unwrap();
        manager.get(&[("name", "Gonzo")]).unwrap()
    })
    .await
    .unwrap();

    assert_eq!(record.get_str("name").unwrap().as_deref(), Some("Gonzo"));
    assert_eq!(record.get_int("age").unwrap(), Some(3));
}

#[tokio::test]
async fn query_get_maps_404_to_does_not_exist() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/muppets/Waldorf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let uri = server.uri();
    let result = tokio::task::spawn_blocking(move || {
        let manager =
            QueryManager::new(muppet_schema(&uri), Arc::new(HttpTransport::new())).unwrap();
        manager.get(&[("name", "Waldorf")])
    })
    .await
    .unwrap();

    assert!(matches!(result, Err(Error::DoesNotExist { .. })));
}

#[tokio::test]
async fn collection_query_streams_records() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/muppets"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<muppets>\
               <muppet><name>Gonzo</name><age>3</age></muppet>\
               <muppet><name>Rowlf</name><age>7</age></muppet>\
             </muppets>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let names = tokio::task::spawn_blocking(move || {
        let manager =
            QueryManager::new(muppet_schema(&uri), Arc::new(HttpTransport::new())).unwrap();
        let query = manager.all();
        assert_eq!(query.count().unwrap(), 2);
        query
            .records()
            .unwrap()
            .map(|r| r.unwrap().get_str("name").unwrap().unwrap())
            .collect::<Vec<_>>()
    })
    .await
    .unwrap();

    assert_eq!(names, vec!["Gonzo", "Rowlf"]);
}
