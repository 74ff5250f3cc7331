//! Catalog, purchase and order lifecycle.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;

use modernshop_integration_tests::{Flags, Mail, TestApp};

#[tokio::test]
async fn test_catalog_is_public() {
    let app = TestApp::new();
    let lamp = app.seed_product("Lamp", Decimal::new(2_500, 2), 3).await;
    let mut client = app.client();

    let list = client.get("/api/products").await.json();
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["name"], "Lamp");
    assert_eq!(list[0]["price"], "25.00");

    let res = client.get(&format!("/api/products/{}", lamp.id)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["stock"], 3);

    assert_eq!(client.get("/api/products/999").await.status, StatusCode::NOT_FOUND);
    assert_eq!(client.get("/api/products/abc").await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_purchase_flow() {
    let app = TestApp::new();
    let lamp = app.seed_product("Lamp", Decimal::new(2_500, 2), 2).await;
    app.seed_user("kim", "kim@example.com", Flags::VERIFIED).await;
    let mut client = app.signed_in("kim").await;

    let res = client
        .post_json("/api/purchase", &json!({ "username": "kim", "productId": lamp.id }))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let order = res.json()["order"].clone();
    assert_eq!(order["status"], "pending");
    assert_eq!(order["productName"], "Lamp");
    assert_eq!(app.store.stock_of(lamp.id), Some(1));

    // One open order per product.
    let res = client
        .post_json("/api/purchase", &json!({ "productId": lamp.id }))
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(app.store.stock_of(lamp.id), Some(1));

    let orders = client.get("/api/orders").await.json();
    assert_eq!(orders["orders"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_purchase_rules() {
    let app = TestApp::new();
    let gone = app.seed_product("Gone", Decimal::ONE, 0).await;
    let lamp = app.seed_product("Lamp", Decimal::ONE, 5).await;
    app.seed_user("lee", "lee@example.com", Flags::VERIFIED).await;
    app.seed_user("mo", "mo@example.com", Flags::UNVERIFIED).await;

    let res = app
        .client()
        .post_json("/api/purchase", &json!({ "productId": lamp.id }))
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let mut lee = app.signed_in("lee").await;
    let res = lee
        .post_json("/api/purchase", &json!({ "productId": gone.id }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error(), "Product unavailable");

    let res = lee.post_json("/api/purchase", &json!({ "productId": 999 })).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = lee
        .post_json("/api/purchase", &json!({ "username": "mo", "productId": lamp.id }))
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let mut mo = app.signed_in("mo").await;
    let res = mo
        .post_json("/api/purchase", &json!({ "productId": lamp.id }))
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.error(), "Account pending verification");
    assert_eq!(app.store.stock_of(lamp.id), Some(5));
}

#[tokio::test]
async fn test_confirm_sends_email() {
    let app = TestApp::new();
    let lamp = app.seed_product("Lamp", Decimal::TEN, 1).await;
    app.seed_user("nia", "nia@example.com", Flags::VERIFIED).await;
    let mut client = app.signed_in("nia").await;

    let order = client
        .post_json("/api/purchase", &json!({ "productId": lamp.id }))
        .await
        .json()["order"]["id"]
        .clone();

    let res = client
        .post_json(&format!("/api/orders/{order}/confirm"), &json!({}))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["emailSent"], true);
    assert!(
        app.sent_mail()
            .iter()
            .any(|m| m.to.as_str() == "nia@example.com" && m.body.contains("Lamp"))
    );

    let res = client
        .post_json(&format!("/api/orders/{order}/confirm"), &json!({}))
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_confirm_survives_email_failure() {
    let app = TestApp::with_mail(Mail::Failing);
    let lamp = app.seed_product("Lamp", Decimal::TEN, 1).await;
    app.seed_user("oli", "oli@example.com", Flags::VERIFIED).await;
    let mut client = app.signed_in("oli").await;

    let order = client
        .post_json("/api/purchase", &json!({ "productId": lamp.id }))
        .await
        .json()["order"]["id"]
        .clone();
    let res = client
        .post_json(&format!("/api/orders/{order}/confirm"), &json!({}))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["emailSent"], false);
}

#[tokio::test]
async fn test_cancel_restores_stock() {
    let app = TestApp::new();
    let lamp = app.seed_product("Lamp", Decimal::TEN, 1).await;
    app.seed_user("pat", "pat@example.com", Flags::VERIFIED).await;
    app.seed_user("quinn", "quinn@example.com", Flags::VERIFIED).await;
    let mut pat = app.signed_in("pat").await;

    let order = pat
        .post_json("/api/purchase", &json!({ "productId": lamp.id }))
        .await
        .json()["order"]["id"]
        .clone();
    assert_eq!(app.store.stock_of(lamp.id), Some(0));

    let mut quinn = app.signed_in("quinn").await;
    let res = quinn.delete(&format!("/api/orders/{order}")).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = pat.delete(&format!("/api/orders/{order}")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["order"]["status"], "cancelled");
    assert_eq!(app.store.stock_of(lamp.id), Some(1));

    let res = pat.delete(&format!("/api/orders/{order}")).await;
    assert_eq!(res.status, StatusCode::CONFLICT);

    // A confirmed order can still be cancelled; its unit goes back too.
    let order = pat
        .post_json("/api/purchase", &json!({ "productId": lamp.id }))
        .await
        .json()["order"]["id"]
        .clone();
    let res = pat
        .post_json(&format!("/api/orders/{order}/confirm"), &json!({}))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(app.store.stock_of(lamp.id), Some(0));
    let res = pat.delete(&format!("/api/orders/{order}")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["order"]["status"], "cancelled");
    assert_eq!(app.store.stock_of(lamp.id), Some(1));

    // A cancelled order no longer blocks buying again.
    let res = pat
        .post_json("/api/purchase", &json!({ "productId": lamp.id }))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
}
