//! Admin gate, user management, provisioning and reports.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;

use modernshop_integration_tests::{Flags, TestApp};

#[tokio::test]
async fn test_admin_gate() {
    let app = TestApp::new();
    app.seed_user("admin", "admin@example.com", Flags::ADMIN).await;
    app.seed_user("rita", "rita@example.com", Flags::VERIFIED).await;

    let res = app.client().get("/api/admin/users").await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let mut rita = app.signed_in("rita").await;
    let res = rita.get("/api/admin/users").await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.error(), "Admin access required");

    let mut admin = app.signed_in("admin").await;
    let users = admin.get("/api/admin/users").await.json();
    let users = users["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.get("passwordHash").is_none() && u.get("otpCode").is_none()));
}

#[tokio::test]
async fn test_revoked_admin_loses_access_immediately() {
    let app = TestApp::new();
    app.seed_user("admin", "admin@example.com", Flags::ADMIN).await;
    let sam = app.seed_user("sam", "sam@example.com", Flags::ADMIN).await;
    let mut admin = app.signed_in("admin").await;
    let mut sam_client = app.signed_in("sam").await;
    assert_eq!(sam_client.get("/api/admin/orders").await.status, StatusCode::OK);

    let res = admin
        .put_json(&format!("/api/admin/users/{}", sam.id), &json!({ "isAdmin": false }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["user"]["isAdmin"], false);

    assert_eq!(sam_client.get("/api/admin/orders").await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_protected_admin() {
    let app = TestApp::new();
    let root = app.seed_user("admin", "admin@example.com", Flags::ADMIN).await;
    let mut admin = app.signed_in("admin").await;

    let res = admin
        .put_json(&format!("/api/admin/users/{}", root.id), &json!({ "isAdmin": false }))
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = admin
        .post_json("/api/admin/verify-user", &json!({ "userId": root.id, "verify": false }))
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = admin
        .post_json("/api/admin/users/bulk-delete", &json!({ "userIds": [root.id] }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["deletedCount"], 0);
}

#[tokio::test]
async fn test_verify_user_cascades() {
    let app = TestApp::new();
    app.seed_user("admin", "admin@example.com", Flags::ADMIN).await;
    let tia = app.seed_user("tia", "tia@example.com", Flags::UNVERIFIED).await;
    let lamp = app.seed_product("Lamp", Decimal::ONE, 3).await;
    let mut admin = app.signed_in("admin").await;

    let res = admin
        .post_json("/api/admin/verify-user", &json!({ "userId": tia.id, "verify": true }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["isAdminVerified"], true);

    let mut tia_client = app.signed_in("tia").await;
    let status = tia_client.get("/api/auth/status").await.json();
    assert_eq!(status["user"]["isVerified"], true);
    let res = tia_client
        .post_json("/api/purchase", &json!({ "productId": lamp.id }))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);

    let res = admin
        .post_json("/api/admin/verify-user", &json!({ "userId": 999, "verify": true }))
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_delete_restores_stock() {
    let app = TestApp::new();
    app.seed_user("admin", "admin@example.com", Flags::ADMIN).await;
    let uma = app.seed_user("uma", "uma@example.com", Flags::VERIFIED).await;
    let lamp = app.seed_product("Lamp", Decimal::ONE, 1).await;
    let rug = app.seed_product("Rug", Decimal::ONE, 1).await;

    let mut uma_client = app.signed_in("uma").await;
    uma_client
        .post_json("/api/purchase", &json!({ "productId": lamp.id }))
        .await;
    assert_eq!(app.store.stock_of(lamp.id), Some(0));

    // Confirmed orders still hold their unit until the account goes.
    let order = uma_client
        .post_json("/api/purchase", &json!({ "productId": rug.id }))
        .await
        .json()["order"]["id"]
        .clone();
    let res = uma_client
        .post_json(&format!("/api/orders/{order}/confirm"), &json!({}))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(app.store.stock_of(rug.id), Some(0));

    let mut admin = app.signed_in("admin").await;
    let res = admin
        .post_json("/api/admin/users/bulk-delete", &json!({ "userIds": [] }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error(), "No user IDs provided");

    let res = admin
        .post_json("/api/admin/users/bulk-delete", &json!({ "userIds": [uma.id] }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["deletedCount"], 1);
    assert_eq!(app.store.stock_of(lamp.id), Some(1));
    assert_eq!(app.store.stock_of(rug.id), Some(1));
    assert!(admin.get("/api/admin/orders").await.json()["orders"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_bulk_upload() {
    let app = TestApp::new();
    app.seed_user("admin", "admin@example.com", Flags::ADMIN).await;
    app.seed_user("vera", "vera@example.com", Flags::VERIFIED).await;
    let mut admin = app.signed_in("admin").await;

    let res = admin
        .post_json("/api/admin/bulk-upload", &json!({ "emails": [] }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = admin
        .post_json(
            "/api/admin/bulk-upload",
            &json!({ "emails": ["new.hire@example.com", "vera@example.com", "broken", ""] }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["message"], "Bulk upload completed");
    let success = body["results"]["success"].as_array().unwrap();
    let failed = body["results"]["failed"].as_array().unwrap();
    assert_eq!(success.len(), 1);
    assert_eq!(success[0]["username"], "newhire");
    assert_eq!(success[0]["emailSent"], true);
    assert_eq!(failed.len(), 3);
    assert!(failed.iter().any(|f| f["reason"] == "User already exists"));

    let mail = app
        .sent_mail()
        .into_iter()
        .find(|m| m.to.as_str() == "new.hire@example.com")
        .unwrap();
    assert!(mail.body.contains("http://localhost:3000/login.html"));
}

#[tokio::test]
async fn test_product_admin_crud() {
    let app = TestApp::new();
    app.seed_user("admin", "admin@example.com", Flags::ADMIN).await;
    let mut admin = app.signed_in("admin").await;

    let res = admin
        .post_json("/api/admin/products", &json!({ "name": "Desk", "price": 120.5, "stock": 4 }))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let product = res.json()["product"].clone();
    assert_eq!(product["image"], "https://via.placeholder.com/500?text=No+Image");
    let id = product["id"].clone();

    let res = admin
        .post_json("/api/admin/products", &json!({ "price": 1 }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = admin
        .put_json(&format!("/api/admin/products/{id}"), &json!({ "price": "99.99" }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["product"]["price"], "99.99");
    assert_eq!(res.json()["product"]["name"], "Desk");

    let res = admin
        .patch_json(&format!("/api/admin/products/{id}/stock"), &json!({ "stock": -1 }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    let res = admin
        .patch_json(&format!("/api/admin/products/{id}/stock"), &json!({ "stock": 9 }))
        .await;
    assert_eq!(res.json()["product"]["stock"], 9);

    let res = admin.delete(&format!("/api/admin/products/{id}")).await;
    assert_eq!(res.status, StatusCode::OK);
    let res = admin.delete(&format!("/api/admin/products/{id}")).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_orders_report_csv() {
    let app = TestApp::new();
    app.seed_user("admin", "admin@example.com", Flags::ADMIN).await;
    app.seed_user("wes", "wes@example.com", Flags::VERIFIED).await;
    let lamp = app.seed_product("Lamp \"XL\"", Decimal::ONE, 5).await;
    let desk = app.seed_product("Desk", Decimal::ONE, 5).await;

    let mut wes = app.signed_in("wes").await;
    wes.post_json("/api/purchase", &json!({ "productId": lamp.id })).await;
    let desk_order = wes
        .post_json("/api/purchase", &json!({ "productId": desk.id }))
        .await
        .json()["order"]["id"]
        .clone();
    wes.delete(&format!("/api/orders/{desk_order}")).await;

    let mut admin = app.signed_in("admin").await;
    let res = admin.get("/api/admin/report").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.header("content-type").unwrap().starts_with("text/csv"));
    assert!(res.header("content-disposition").unwrap().contains("attachment"));
    assert_eq!(res.text(), "Product Name,Buyer Name\n\"Lamp \"\"XL\"\"\",\"wes\"\n");
}
