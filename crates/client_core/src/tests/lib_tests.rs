use super::*;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use shared::protocol::{ActSearchQuery, VenueSearchQuery};
use tokio::{
    net::TcpListener,
    sync::{Mutex, Notify},
};

async fn spawn_server(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn sample_act(id: i64, slug: &str) -> Act {
    Act {
        id: ActId(id),
        slug: slug.into(),
        name: slug.into(),
        act_type: "DJ".into(),
        location: "Leeds".into(),
        price_from: None,
        rating: None,
        genres: None,
        image_url: None,
        video_url: None,
        description: None,
        featured: false,
        premium: false,
    }
}

fn sample_venue(id: i64, slug: &str) -> Venue {
    Venue {
        id: VenueId(id),
        slug: slug.into(),
        name: slug.into(),
        location: "York".into(),
        capacity: Some(120),
        price_from: None,
        style: Some("Rustic".into()),
        image_url: None,
        amenities: None,
        featured: false,
        premium: false,
    }
}

fn sample_review(id: i64, act_id: Option<i64>, venue_id: Option<i64>) -> Review {
    Review {
        id: shared::domain::ReviewId(id),
        author_name: format!("author-{id}"),
        rating: 5,
        comment: "great night".into(),
        act_id: act_id.map(ActId),
        venue_id: venue_id.map(VenueId),
    }
}

#[derive(Clone)]
struct GatedActsState {
    gate: std::sync::Arc<Notify>,
    seen: std::sync::Arc<Mutex<Vec<String>>>,
}

async fn gated_acts(
    State(state): State<GatedActsState>,
    Query(query): Query<ActSearchQuery>,
) -> Json<Vec<Act>> {
    state.seen.lock().await.push(query.q.clone());
    if query.q == "first" {
        state.gate.notified().await;
        return Json(vec![sample_act(1, "stale-act")]);
    }
    Json(vec![sample_act(2, "fresh-act")])
}

#[tokio::test]
async fn late_response_is_stale_and_never_overwrites_newer_results() {
    let gate = std::sync::Arc::new(Notify::new());
    let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
    let state = GatedActsState {
        gate: gate.clone(),
        seen: seen.clone(),
    };
    let app = Router::new()
        .route("/api/acts", get(gated_acts))
        .with_state(state);
    let server_url = spawn_server(app).await;

    let client = MarketplaceClient::new(server_url);
    let browser = std::sync::Arc::new(client.browser(ListingKind::Acts));

    browser
        .set_filter(FilterKey::Text, "first")
        .await
        .expect("set filter");
    let first = {
        let browser = std::sync::Arc::clone(&browser);
        tokio::spawn(async move { browser.refresh().await })
    };

    // Wait for the first request to reach the server and park on the gate.
    for _ in 0..100 {
        if seen.lock().await.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(seen.lock().await.as_slice(), ["first"]);
    assert!(browser.is_loading().await);

    browser
        .set_filter(FilterKey::Text, "second")
        .await
        .expect("set filter");
    let second = browser.refresh().await.expect("second refresh");
    assert_eq!(second, Refresh::Applied);
    assert!(
        !browser.is_loading().await,
        "loading clears once the newest request settles"
    );

    gate.notify_one();
    let first = first.await.expect("join").expect("first refresh");
    assert_eq!(first, Refresh::Stale);

    match browser.results().await {
        Listings::Acts(acts) => {
            assert_eq!(acts.len(), 1);
            assert_eq!(acts[0].slug, "fresh-act");
        }
        other => panic!("unexpected results: {other:?}"),
    }
    // Each refresh carried the filters as they were when it was issued.
    assert_eq!(seen.lock().await.as_slice(), ["first", "second"]);
}

async fn acts_or_boom(
    Query(query): Query<ActSearchQuery>,
) -> Result<Json<Vec<Act>>, (StatusCode, Json<ApiError>)> {
    if query.q == "boom" {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::internal("search backend down")),
        ));
    }
    if query.q == "nothing" {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(vec![sample_act(1, "dj-nova")]))
}

#[tokio::test]
async fn failed_refresh_keeps_previous_results_visible() {
    let app = Router::new().route("/api/acts", get(acts_or_boom));
    let server_url = spawn_server(app).await;
    let client = MarketplaceClient::new(server_url);
    let browser = client.browser(ListingKind::Acts);

    assert_eq!(browser.refresh().await.expect("refresh"), Refresh::Applied);
    assert_eq!(browser.results().await.len(), 1);

    browser
        .set_filter(FilterKey::Text, "boom")
        .await
        .expect("set filter");
    let err = browser.refresh().await.expect_err("server failure");
    assert!(matches!(err, ClientError::Api(_)), "got: {err:?}");

    assert_eq!(browser.results().await.len(), 1);
    assert!(!browser.is_loading().await);
}

#[tokio::test]
async fn empty_result_set_is_applied_not_an_error() {
    let app = Router::new().route("/api/acts", get(acts_or_boom));
    let server_url = spawn_server(app).await;
    let client = MarketplaceClient::new(server_url);
    let browser = client.browser(ListingKind::Acts);

    browser
        .set_filter(FilterKey::Text, "nothing")
        .await
        .expect("set filter");
    assert_eq!(browser.refresh().await.expect("refresh"), Refresh::Applied);
    assert!(browser.results().await.is_empty());
}

async fn venues_echo_style(Query(query): Query<VenueSearchQuery>) -> Json<Vec<Venue>> {
    if query.style == "Rustic" {
        return Json(vec![sample_venue(9, "the-barn")]);
    }
    Json(Vec::new())
}

#[tokio::test]
async fn venue_browser_sends_style_filter() {
    let app = Router::new().route("/api/venues", get(venues_echo_style));
    let server_url = spawn_server(app).await;
    let client = MarketplaceClient::new(server_url);
    let browser = client.browser(ListingKind::Venues);

    browser
        .set_filter(FilterKey::Style, "Rustic")
        .await
        .expect("set filter");
    assert_eq!(browser.refresh().await.expect("refresh"), Refresh::Applied);
    match browser.results().await {
        Listings::Venues(venues) => assert_eq!(venues[0].slug, "the-barn"),
        other => panic!("unexpected results: {other:?}"),
    }
}

#[test]
fn filters_reject_keys_for_the_other_listing_kind() {
    let mut filters = FilterState::new(ListingKind::Venues);
    let err = filters.set(FilterKey::Genre, "House").expect_err("genre");
    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(filters.get(FilterKey::Genre), None);

    filters.set(FilterKey::Style, "Modern").expect("style");
    assert_eq!(filters.get(FilterKey::Style), Some("Modern"));

    let mut act_filters = FilterState::new(ListingKind::Acts);
    let err = act_filters.set(FilterKey::Style, "Modern").expect_err("style");
    assert!(matches!(err, ClientError::Validation(_)));
}

async fn act_by_slug_handler(
    Path(slug): Path<String>,
) -> Result<Json<Act>, (StatusCode, Json<ApiError>)> {
    if slug == "neon-nights" {
        return Ok(Json(sample_act(42, "neon-nights")));
    }
    Err((
        StatusCode::NOT_FOUND,
        Json(ApiError::not_found("act not found")),
    ))
}

async fn mixed_reviews() -> Json<Vec<Review>> {
    Json(vec![
        sample_review(1, Some(42), None),
        sample_review(2, Some(7), None),
        sample_review(3, None, Some(3)),
    ])
}

#[tokio::test]
async fn act_detail_joins_only_reviews_for_that_act() {
    let app = Router::new()
        .route("/api/acts/:slug", get(act_by_slug_handler))
        .route("/api/reviews", get(mixed_reviews));
    let server_url = spawn_server(app).await;
    let client = MarketplaceClient::new(server_url);

    let detail = client.load_act_detail("neon-nights").await.expect("detail");
    assert_eq!(detail.act.id, ActId(42));
    assert_eq!(detail.reviews.len(), 1);
    assert_eq!(detail.reviews[0].author_name, "author-1");
}

async fn broken_reviews() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::internal("reviews offline")),
    )
}

#[tokio::test]
async fn act_detail_degrades_to_no_reviews_when_feed_fails() {
    let app = Router::new()
        .route("/api/acts/:slug", get(act_by_slug_handler))
        .route("/api/reviews", get(broken_reviews));
    let server_url = spawn_server(app).await;
    let client = MarketplaceClient::new(server_url);

    let detail = client.load_act_detail("neon-nights").await.expect("detail");
    assert!(detail.reviews.is_empty());
}

#[tokio::test]
async fn unknown_slug_maps_to_not_found() {
    let app = Router::new()
        .route("/api/acts/:slug", get(act_by_slug_handler))
        .route("/api/reviews", get(mixed_reviews));
    let server_url = spawn_server(app).await;
    let client = MarketplaceClient::new(server_url);

    let err = client
        .load_act_detail("unknown-slug")
        .await
        .expect_err("missing act");
    assert!(err.is_not_found(), "got: {err:?}");
}

async fn venue_by_slug_handler(
    Path(slug): Path<String>,
) -> Result<Json<Venue>, (StatusCode, Json<ApiError>)> {
    if slug == "the-barn" {
        return Ok(Json(sample_venue(3, "the-barn")));
    }
    Err((
        StatusCode::NOT_FOUND,
        Json(ApiError::not_found("venue not found")),
    ))
}

#[tokio::test]
async fn venue_detail_joins_only_reviews_for_that_venue() {
    let app = Router::new()
        .route("/api/venues/:slug", get(venue_by_slug_handler))
        .route("/api/reviews", get(mixed_reviews));
    let server_url = spawn_server(app).await;
    let client = MarketplaceClient::new(server_url);

    let detail = client.load_venue_detail("the-barn").await.expect("detail");
    assert_eq!(detail.venue.id, VenueId(3));
    assert_eq!(detail.reviews.len(), 1);
    assert_eq!(detail.reviews[0].author_name, "author-3");
}

#[derive(Clone)]
struct BookingState {
    posts: std::sync::Arc<AtomicUsize>,
}

async fn record_booking(
    State(state): State<BookingState>,
    Json(request): Json<BookingRequest>,
) -> Result<Json<BookingAck>, (StatusCode, Json<ApiError>)> {
    state.posts.fetch_add(1, Ordering::SeqCst);
    if request.customer_name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::validation("customer_name is required")),
        ));
    }
    Ok(Json(BookingAck {
        id: shared::domain::BookingId(77),
    }))
}

#[tokio::test]
async fn enquiry_posts_exactly_once_and_clears_on_ack() {
    let posts = std::sync::Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/api/bookings", post(record_booking))
        .with_state(BookingState {
            posts: posts.clone(),
        });
    let server_url = spawn_server(app).await;
    let client = MarketplaceClient::new(server_url);

    let mut form = EnquiryForm {
        customer_name: "Jo".into(),
        customer_email: "jo@example.com".into(),
        date: "2026-09-12".into(),
        message: "evening set".into(),
    };
    let ack = client
        .submit_enquiry(&mut form, EnquiryTarget::Act(ActId(1)))
        .await
        .expect("ack");
    assert_eq!(ack.id.0, 77);
    assert_eq!(posts.load(Ordering::SeqCst), 1);
    assert_eq!(form, EnquiryForm::default());
}

#[tokio::test]
async fn invalid_enquiry_never_reaches_the_server_and_keeps_fields() {
    let posts = std::sync::Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/api/bookings", post(record_booking))
        .with_state(BookingState {
            posts: posts.clone(),
        });
    let server_url = spawn_server(app).await;
    let client = MarketplaceClient::new(server_url);

    let mut form = EnquiryForm {
        customer_name: "Jo".into(),
        customer_email: "jo@example.com".into(),
        date: String::new(),
        message: "evening set".into(),
    };
    let err = client
        .submit_enquiry(&mut form, EnquiryTarget::Act(ActId(1)))
        .await
        .expect_err("missing date");
    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(posts.load(Ordering::SeqCst), 0);
    assert_eq!(form.customer_name, "Jo");
    assert_eq!(form.message, "evening set");
}

#[tokio::test]
async fn enquiry_form_survives_server_rejection() {
    let posts = std::sync::Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/api/bookings",
            post(
                |State(state): State<BookingState>, Json(_): Json<BookingRequest>| async move {
                    state.posts.fetch_add(1, Ordering::SeqCst);
                    (
                        StatusCode::BAD_REQUEST,
                        Json(ApiError::validation("date is in the past")),
                    )
                },
            ),
        )
        .with_state(BookingState {
            posts: posts.clone(),
        });
    let server_url = spawn_server(app).await;
    let client = MarketplaceClient::new(server_url);

    let mut form = EnquiryForm {
        customer_name: "Jo".into(),
        customer_email: "jo@example.com".into(),
        date: "2020-01-01".into(),
        message: String::new(),
    };
    let err = client
        .submit_enquiry(&mut form, EnquiryTarget::Venue(VenueId(2)))
        .await
        .expect_err("rejected");
    assert!(matches!(err, ClientError::Api(_)));
    assert_eq!(posts.load(Ordering::SeqCst), 1);
    assert_eq!(form.customer_name, "Jo");
    assert_eq!(form.date, "2020-01-01");
}

async fn register_handler(
    Query(registration): Query<ProviderRegistration>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<ApiError>)> {
    if registration.email.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::validation("a valid email is required")),
        ));
    }
    Ok(Json(TokenResponse::bearer("token-abc")))
}

#[tokio::test]
async fn provider_registration_stores_the_access_token() {
    let app = Router::new().route("/api/auth/register/provider", post(register_handler));
    let server_url = spawn_server(app).await;
    let client = MarketplaceClient::new(server_url);

    assert_eq!(client.token_store().access_token(), None);
    let token = client
        .register_provider(&ProviderRegistration {
            email: "band@example.com".into(),
            password: "longenough".into(),
            display_name: "The Band".into(),
        })
        .await
        .expect("token");
    assert_eq!(token.token_type, "bearer");
    assert_eq!(
        client.token_store().access_token().as_deref(),
        Some("token-abc")
    );

    client.token_store().clear();
    assert_eq!(client.token_store().access_token(), None);
}
