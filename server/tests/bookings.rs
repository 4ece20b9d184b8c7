mod common;

use common::{book, register_artisan, register_client, set_status, spawn_server};
use serde_json::{json, Value};

#[tokio::test]
async fn overlapping_requests_conflict() {
    let (addr, _server, _state, _tmp) = spawn_server().await;
    let http = reqwest::Client::new();
    let ada = register_client(&http, addr, "Ada").await;
    let bola = register_artisan(&http, addr, "Bola").await;

    let resp = book(&http, addr, &ada, &bola, "2030-05-01T10:00:00Z", 2.0).await;
    assert_eq!(resp.status(), 201);
    let booking: Value = resp.json().await.unwrap();
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["payment_status"], "pending");
    let id = booking["id"].as_str().unwrap().to_string();
    assert_eq!(set_status(&http, addr, &bola, &id, "accepted").await.status(), 200);

    let clash = book(&http, addr, &ada, &bola, "2030-05-01T11:00:00Z", 2.0).await;
    assert_eq!(clash.status(), 409);
    let after = book(&http, addr, &ada, &bola, "2030-05-01T12:00:00Z", 1.0).await;
    assert_eq!(after.status(), 201);
    let before = book(&http, addr, &ada, &bola, "2030-05-01T08:00:00Z", 2.0).await;
    assert_eq!(before.status(), 201);

    let probe: Value = http
        .get(format!(
            "http://{}/api/artisans/{}/availability?start=2030-05-01T11:30:00Z&duration_hours=0.5",
            addr, bola.id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(probe["available"], false);
    assert_eq!(probe["conflicting_booking_id"], id);
}

#[tokio::test]
async fn concurrent_requests_for_one_slot() {
    let (addr, _server, _state, _tmp) = spawn_server().await;
    let http = reqwest::Client::new();
    let ada = register_client(&http, addr, "Ada").await;
    let bola = register_artisan(&http, addr, "Bola").await;

    let attempts = (0..6).map(|_| book(&http, addr, &ada, &bola, "2030-07-01T09:00:00Z", 3.0));
    let results = futures::future::join_all(attempts).await;
    let created = results.iter().filter(|r| r.status() == 201).count();
    let conflicts = results.iter().filter(|r| r.status() == 409).count();
    assert_eq!(created, 1);
    assert_eq!(conflicts, 5);
}

#[tokio::test]
async fn lifecycle_rules_hold() {
    let (addr, _server, _state, _tmp) = spawn_server().await;
    let http = reqwest::Client::new();
    let ada = register_client(&http, addr, "Ada").await;
    let bola = register_artisan(&http, addr, "Bola").await;

    let booking: Value = book(&http, addr, &ada, &bola, "2030-05-02T10:00:00Z", 1.0)
        .await
        .json()
        .await
        .unwrap();
    let id = booking["id"].as_str().unwrap().to_string();

    // paying a pending booking fails
    let resp = http
        .post(format!("http://{}/api/payments", addr))
        .bearer_auth(&ada.token)
        .json(&json!({
            "booking_id": id,
            "amount": 60.0,
            "payment_method": "credit_card",
            "payment_token": "tok_visa"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // clients cannot drive artisan transitions
    assert_eq!(set_status(&http, addr, &ada, &id, "accepted").await.status(), 403);
    assert_eq!(set_status(&http, addr, &bola, &id, "completed").await.status(), 400);
    assert_eq!(set_status(&http, addr, &bola, &id, "accepted").await.status(), 200);
    assert_eq!(set_status(&http, addr, &bola, &id, "completed").await.status(), 200);

    // completed bookings cannot be cancelled
    let resp = http
        .post(format!("http://{}/api/bookings/{}/cancel", addr, id))
        .bearer_auth(&ada.token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let fetched: Value = http
        .get(format!("http://{}/api/bookings/{}", addr, id))
        .bearer_auth(&bola.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["status"], "completed");
}

#[tokio::test]
async fn payment_flow() {
    let (addr, _server, _state, _tmp) = spawn_server().await;
    let http = reqwest::Client::new();
    let ada = register_client(&http, addr, "Ada").await;
    let bola = register_artisan(&http, addr, "Bola").await;

    let booking: Value = book(&http, addr, &ada, &bola, "2030-05-03T10:00:00Z", 1.0)
        .await
        .json()
        .await
        .unwrap();
    let id = booking["id"].as_str().unwrap().to_string();
    set_status(&http, addr, &bola, &id, "accepted").await;

    let pay = |token: &'static str| {
        http.post(format!("http://{}/api/payments", addr))
            .bearer_auth(&ada.token)
            .json(&json!({
                "booking_id": id,
                "amount": 60.0,
                "payment_method": "paypal",
                "payment_token": token
            }))
            .send()
    };

    let declined = pay("tok_fail_card_declined").await.unwrap();
    assert_eq!(declined.status(), 402);
    let listed: Value = http
        .get(format!("http://{}/api/payments", addr))
        .bearer_auth(&ada.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.as_array().unwrap().is_empty());

    let ok = pay("tok_visa").await.unwrap();
    assert_eq!(ok.status(), 201);
    let payment: Value = ok.json().await.unwrap();
    assert_eq!(payment["status"], "completed");
    assert_eq!(payment["currency"], "USD");
    assert!(payment["transaction_id"].as_str().unwrap().starts_with("sbx_"));

    let again = pay("tok_visa").await.unwrap();
    assert_eq!(again.status(), 409);

    let fetched: Value = http
        .get(format!("http://{}/api/bookings/{}", addr, id))
        .bearer_auth(&ada.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["payment_status"], "paid");
}

#[tokio::test]
async fn one_review_per_completed_booking() {
    let (addr, _server, _state, _tmp) = spawn_server().await;
    let http = reqwest::Client::new();
    let ada = register_client(&http, addr, "Ada").await;
    let bola = register_artisan(&http, addr, "Bola").await;

    let booking: Value = book(&http, addr, &ada, &bola, "2030-05-04T10:00:00Z", 1.0)
        .await
        .json()
        .await
        .unwrap();
    let id = booking["id"].as_str().unwrap().to_string();

    let review = |rating: u8| {
        http.post(format!("http://{}/api/reviews", addr))
            .bearer_auth(&ada.token)
            .json(&json!({"booking_id": id, "rating": rating, "comment": "Tidy work"}))
            .send()
    };

    assert_eq!(review(5).await.unwrap().status(), 404);
    set_status(&http, addr, &bola, &id, "accepted").await;
    set_status(&http, addr, &bola, &id, "completed").await;
    assert_eq!(review(9).await.unwrap().status(), 400);
    let first = review(4).await.unwrap();
    assert_eq!(first.status(), 201);
    let created: Value = first.json().await.unwrap();
    assert_eq!(review(5).await.unwrap().status(), 409);

    let profile: Value = http
        .get(format!("http://{}/api/artisans/{}", addr, bola.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(profile["review_count"], 1);
    assert_eq!(profile["rating"], 4.0);

    let resp = http
        .put(format!("http://{}/api/reviews/{}", addr, created["id"].as_str().unwrap()))
        .bearer_auth(&ada.token)
        .json(&json!({"rating": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let listed: Value = http
        .get(format!("http://{}/api/artisans/{}/reviews", addr, bola.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed[0]["rating"], 2);

    let resp = http
        .delete(format!("http://{}/api/reviews/{}", addr, created["id"].as_str().unwrap()))
        .bearer_auth(&ada.token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
}
