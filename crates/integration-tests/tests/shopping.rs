//! Integration tests for the catalog, cart, checkout and reports.
//!
//! These tests require:
//! - The server running (cargo run -p bazaar-server)
//! - Cloudinary credentials (avatars and product images)
//! - `BAZAAR_TEST_ADMIN_EMAIL` / `BAZAAR_TEST_ADMIN_PASSWORD` for an admin
//!
//! Run with: cargo test -p bazaar-integration-tests -- --ignored

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bazaar_integration_tests::{
    TINY_PNG, admin_credentials, api, client, envelope, login, register, unique,
};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

/// Log in as the configured admin.
async fn admin_client() -> Client {
    let (email, password) = admin_credentials().expect("admin credentials not set");
    let client = client();
    let (status, body) = login(&client, &email, &password).await;
    assert_eq!(status, StatusCode::OK, "admin login failed: {body}");
    client
}

/// Create a product with the given stock and return it.
async fn create_product(admin: &Client, quantity: u32) -> Value {
    let image = reqwest::multipart::Part::bytes(TINY_PNG.to_vec())
        .file_name("product.png")
        .mime_str("image/png")
        .unwrap();
    let form = reqwest::multipart::Form::new()
        .text("name", format!("Test mug {}", unique()))
        .text("description", "Integration test product")
        .text("price", "12.50")
        .text("category", "integration")
        .text("quantity", quantity.to_string())
        .part("images", image);

    let (status, body) = envelope(
        admin
            .post(api("/product"))
            .multipart(form)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create product failed: {body}");
    body["data"].clone()
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_product_listing_is_public() {
    let (status, body) = envelope(
        client()
            .get(api("/product?page=1&limit=5&sort=price"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["products"].as_array().unwrap().len() <= 5);
    assert_eq!(body["data"]["page"], 1);
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_reports_need_admin() {
    let client = client();
    let resp = client.get(api("/report/totalRevenue")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running server, Cloudinary and admin credentials"]
async fn test_cart_to_order() {
    let admin = admin_client().await;
    let product = create_product(&admin, 3).await;
    let product_id = product["id"].as_str().unwrap();

    let shopper = client();
    let (email, password) = register(&shopper).await;
    login(&shopper, &email, &password).await;

    // More than the stock is refused.
    let resp = shopper
        .post(api("/cart"))
        .json(&json!({ "productId": product_id, "quantity": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let (status, body) = envelope(
        shopper
            .post(api("/cart"))
            .json(&json!({ "productId": product_id, "quantity": 2 }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["totalPrice"], "25.00");

    let (status, order) = envelope(shopper.post(api("/order")).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["data"]["items"][0]["quantity"], 2);

    // Stock was decremented and the cart is gone.
    let (_, body) = envelope(
        shopper
            .get(api(&format!("/product/{product_id}")))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["data"]["quantity"], 1);

    let (_, body) = envelope(shopper.get(api("/cart")).send().await.unwrap()).await;
    assert!(body["data"].is_null());

    // Empty cart cannot check out.
    let resp = shopper.post(api("/order")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = admin
        .delete(api(&format!("/product/{product_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running server, Cloudinary and admin credentials"]
async fn test_checkout_rolls_back_when_stock_ran_out() {
    let admin = admin_client().await;
    let scarce = create_product(&admin, 2).await;
    let plenty = create_product(&admin, 10).await;
    let scarce_id = scarce["id"].as_str().unwrap();
    let plenty_id = plenty["id"].as_str().unwrap();

    let shopper = client();
    let (email, password) = register(&shopper).await;
    login(&shopper, &email, &password).await;

    for (id, quantity) in [(plenty_id, 3), (scarce_id, 2)] {
        let resp = shopper
            .post(api("/cart"))
            .json(&json!({ "productId": id, "quantity": quantity }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    // Stock drops after the item is already in the cart.
    let resp = admin
        .put(api(&format!("/product/{scarce_id}")))
        .json(&json!({ "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, body) = envelope(shopper.post(api("/order")).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().starts_with("Not enough stock for"));

    // Nothing was taken and the cart is untouched.
    for (id, expected) in [(plenty_id, 10), (scarce_id, 1)] {
        let (_, body) = envelope(
            shopper
                .get(api(&format!("/product/{id}")))
                .send()
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["data"]["quantity"], expected);
    }
    let (_, cart) = envelope(shopper.get(api("/cart")).send().await.unwrap()).await;
    assert_eq!(cart["data"]["items"].as_array().unwrap().len(), 2);

    let (_, orders) = envelope(shopper.get(api("/order")).send().await.unwrap()).await;
    assert!(orders["data"].as_array().unwrap().is_empty());

    for id in [scarce_id, plenty_id] {
        admin
            .delete(api(&format!("/product/{id}")))
            .send()
            .await
            .unwrap();
    }
}

#[tokio::test]
#[ignore = "Requires running server, Cloudinary and admin credentials"]
async fn test_price_beyond_storable_range_is_rejected() {
    let admin = admin_client().await;
    let product = create_product(&admin, 1).await;
    let id = product["id"].as_str().unwrap();

    let (status, body) = envelope(
        admin
            .put(api(&format!("/product/{id}")))
            .json(&json!({ "price": "99999999999" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["statusCode"], 400);

    admin
        .delete(api(&format!("/product/{id}")))
        .send()
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_huge_page_is_empty() {
    let (status, body) = envelope(
        client()
            .get(api("/product?page=9223372036854775807&limit=10"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["products"].as_array().unwrap().is_empty());
}

#[tokio::test]
#[ignore = "Requires running server and admin credentials"]
async fn test_report_endpoints() {
    let admin = admin_client().await;

    let (status, body) = envelope(admin.get(api("/report/totalOrders")).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_object() || body["data"].is_number());

    let resp = admin.get(api("/report/mom/2025/13")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = admin.get(api("/report/export/csv")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
}
