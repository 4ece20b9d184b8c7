use crate::{
    accounts::{self, ArtisanSearch},
    auth::{self, Principal},
    bookings,
    config::Config,
    db::{self, DbPool},
    error::AppError,
    messages,
    model::{
        ArtisanCreate, Booking, BookingCreate, ClientCreate, ClientUpdate, LoginRequest,
        MessageCreate, PaymentCreate, ReportCreate, ReviewCreate, ReviewUpdate, StatusUpdate,
        TokenResponse,
    },
    payments, reviews, ws,
};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use marketcore::{
    services::{self, gateway_for, Email, LogMailer, Mailer, PaymentGateway},
    BookingStatus, ConnectionRegistry, LiveEvent, MarketError, NotificationKind, Role,
};
use rusqlite::Connection;
use serde::Deserialize;
use std::{future::Future, net::SocketAddr, sync::Arc};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Config,
    pub registry: Arc<ConnectionRegistry>,
    pub mailer: Arc<dyn Mailer>,
    pub payments: Arc<dyn PaymentGateway>,
    pub login_limiter: auth::LoginRateLimiter,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let pool = db::open_pool(config.data_dir.join("market.db"))?;
        let payments = gateway_for(&config.payment_processor)?;
        let mailer: Arc<dyn Mailer> = Arc::new(LogMailer::new(config.email.from.clone()));
        Ok(Self {
            pool,
            payments,
            mailer,
            registry: Arc::new(ConnectionRegistry::new()),
            login_limiter: auth::LoginRateLimiter::new(5, std::time::Duration::from_secs(60)),
            config,
        })
    }

    /// Run `f` against a pooled connection on the blocking thread pool.
    pub async fn with_conn<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Connection) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await?
    }

    pub fn secret(&self) -> &[u8] {
        self.config.auth.secret_key.as_bytes()
    }

    fn send_mail(&self, email: Email) {
        let mailer = self.mailer.clone();
        services::dispatch("email", async move { mailer.send(email).await });
    }

    fn notify(&self, user: Uuid, kind: NotificationKind, text: String, related: Uuid) {
        let delivered =
            self.registry
                .send_event(&user, &LiveEvent::notification(kind, text, Some(related)));
        debug!(user = %user, ?kind, delivered, "notification pushed");
    }
}

/// Build the HTTP application router.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/clients/me", get(client_me).put(update_me))
        .route("/api/clients/me/dashboard", get(dashboard))
        .route("/api/bookings", post(create_booking).get(list_bookings))
        .route("/api/bookings/:id", get(get_booking))
        .route("/api/bookings/:id/cancel", post(cancel_booking))
        .route("/api/bookings/:id/status", put(update_booking_status))
        .route("/api/payments", post(create_payment).get(list_payments))
        .route("/api/reviews", post(create_review))
        .route("/api/reviews/:id", put(update_review).delete(delete_review))
        .route("/api/messages", post(send_message).get(list_messages))
        .route("/api/messages/conversations", get(conversations))
        .route("/api/messages/:id/read", put(mark_read))
        .route("/api/messages/:id/report", post(report_message))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));
    Router::new()
        .route("/api/health", get(health))
        .route("/api/clients/register", post(register_client))
        .route("/api/clients/login", post(login_client))
        .route("/api/artisans/register", post(register_artisan))
        .route("/api/artisans/login", post(login_artisan))
        .route("/api/artisans/search", get(search_artisans))
        .route("/api/artisans/:id", get(get_artisan))
        .route("/api/artisans/:id/reviews", get(artisan_reviews))
        .route("/api/artisans/:id/availability", get(availability))
        .route("/api/messages/ws/:user_id", get(ws::ws_handler))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn auth_middleware<B>(
    State(state): State<AppState>,
    mut req: axum::http::Request<B>,
    next: Next<B>,
) -> Result<Response, AppError> {
    let principal = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| auth::principal_from_token(state.secret(), token))
        .ok_or(AppError::Unauthorized)?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

fn require_role(p: &Principal, role: Role) -> Result<(), AppError> {
    if p.role == role {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

// accounts

async fn register_client(
    State(state): State<AppState>,
    Json(req): Json<ClientCreate>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .with_conn(move |conn| accounts::register_client(conn, &req))
        .await?;
    info!(client = %profile.id, "client registered");
    state.send_mail(Email::registration(
        &profile.email,
        &profile.name,
        &state.config.email.frontend_url,
    ));
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn register_artisan(
    State(state): State<AppState>,
    Json(req): Json<ArtisanCreate>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .with_conn(move |conn| accounts::register_artisan(conn, &req))
        .await?;
    info!(artisan = %profile.id, "artisan registered");
    state.send_mail(Email::registration(
        &profile.email,
        &profile.name,
        &state.config.email.frontend_url,
    ));
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn login(state: AppState, role: Role, req: LoginRequest) -> Result<TokenResponse, AppError> {
    if !state.login_limiter.check(&req.email).await {
        warn!(email = %req.email, "login rate limited");
        return Err(AppError::RateLimited);
    }
    let user_id = state
        .with_conn(move |conn| accounts::authenticate(conn, role, &req.email, &req.password))
        .await?
        .ok_or(AppError::Unauthorized)?;
    let ttl = Duration::minutes(state.config.auth.token_ttl_minutes);
    let access_token = auth::issue_jwt(state.secret(), user_id, role, ttl)?;
    Ok(TokenResponse {
        access_token,
        token_type: "bearer".into(),
        user_id,
        role,
    })
}

async fn login_client(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    Ok(Json(login(state, Role::Client, req).await?))
}

async fn login_artisan(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    Ok(Json(login(state, Role::Artisan, req).await?))
}

async fn client_me(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&p, Role::Client)?;
    let profile = state
        .with_conn(move |conn| accounts::get_client(conn, &p.id))
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(profile))
}

async fn update_me(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Json(update): Json<ClientUpdate>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&p, Role::Client)?;
    let profile = state
        .with_conn(move |conn| accounts::update_client(conn, &p.id, &update))
        .await?;
    Ok(Json(profile))
}

async fn dashboard(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&p, Role::Client)?;
    let dash = state
        .with_conn(move |conn| accounts::dashboard(conn, &p.id))
        .await?;
    Ok(Json(dash))
}

async fn search_artisans(
    State(state): State<AppState>,
    Query(search): Query<ArtisanSearch>,
) -> Result<impl IntoResponse, AppError> {
    let found = state
        .with_conn(move |conn| accounts::search_artisans(conn, &search))
        .await?;
    Ok(Json(found))
}

async fn get_artisan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let artisan = state
        .with_conn(move |conn| accounts::get_artisan(conn, &id))
        .await?
        .ok_or_else(|| AppError::not_found("artisan"))?;
    Ok(Json(artisan))
}

async fn artisan_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let list = state
        .with_conn(move |conn| reviews::list_for_artisan(conn, &id))
        .await?;
    Ok(Json(list))
}

#[derive(Deserialize)]
struct AvailabilityQuery {
    start: String,
    duration_hours: f64,
}

async fn availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, AppError> {
    let start = OffsetDateTime::parse(&q.start, &Rfc3339)
        .map_err(|_| AppError::invalid("start must be an RFC 3339 timestamp"))?;
    let report = state
        .with_conn(move |conn| bookings::check_availability(conn, &id, start, q.duration_hours))
        .await?;
    Ok(Json(report))
}

// bookings

async fn create_booking(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Json(req): Json<BookingCreate>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&p, Role::Client)?;
    let (booking, client, artisan) = state
        .with_conn(move |conn| {
            let client = accounts::get_client(conn, &p.id)?.ok_or(AppError::Unauthorized)?;
            let booking = bookings::create_booking(conn, &p.id, &req)?;
            let artisan = accounts::get_artisan(conn, &booking.artisan_id)?;
            Ok((booking, client, artisan))
        })
        .await?;
    info!(booking = %booking.id, artisan = %booking.artisan_id, "booking created");
    let artisan_name = artisan.map(|a| a.name).unwrap_or_default();
    state.send_mail(Email::booking_confirmation(
        &client.email,
        &client.name,
        &booking.service_name,
        &artisan_name,
        booking.booking_date,
        booking.status.as_str(),
    ));
    state.notify(
        booking.artisan_id,
        NotificationKind::BookingRequest,
        format!("New booking request from {}: {}", client.name, booking.service_name),
        booking.id,
    );
    Ok((StatusCode::CREATED, Json(booking)))
}

#[derive(Deserialize)]
struct StatusFilter {
    status: Option<BookingStatus>,
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let list = state
        .with_conn(move |conn| match p.role {
            Role::Client => bookings::list_for_client(conn, &p.id, filter.status),
            Role::Artisan => bookings::list_for_artisan(conn, &p.id, filter.status),
        })
        .await?;
    Ok(Json(list))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .with_conn(move |conn| bookings::get_for_party(conn, &p.id, &id))
        .await?;
    Ok(Json(booking))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    require_role(&p, Role::Client)?;
    let booking = state
        .with_conn(move |conn| bookings::cancel_booking(conn, &p.id, &id))
        .await?;
    state.notify(
        booking.artisan_id,
        NotificationKind::BookingCancelled,
        format!("Booking cancelled: {}", booking.service_name),
        booking.id,
    );
    Ok(Json(booking))
}

async fn update_booking_status(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Booking>, AppError> {
    require_role(&p, Role::Artisan)?;
    let booking = state
        .with_conn(move |conn| bookings::update_status_by_artisan(conn, &p.id, &id, update.status))
        .await?;
    let kind = match booking.status {
        BookingStatus::Accepted => NotificationKind::BookingAccepted,
        BookingStatus::Declined => NotificationKind::BookingDeclined,
        _ => NotificationKind::BookingCompleted,
    };
    state.notify(
        booking.client_id,
        kind,
        format!("Your booking for {} is now {}", booking.service_name, booking.status),
        booking.id,
    );
    Ok(Json(booking))
}

// payments

async fn create_payment(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Json(req): Json<PaymentCreate>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&p, Role::Client)?;
    let check = req.clone();
    let booking = state
        .with_conn(move |conn| payments::payable_booking(conn, &p.id, &check))
        .await?;
    // the gateway is called outside any store transaction
    let outcome = state
        .payments
        .charge(&payments::charge_request(&booking, &req))
        .await?;
    if !outcome.success {
        info!(booking = %booking.id, gateway = state.payments.name(), "payment declined");
        return Err(MarketError::PaymentDeclined(outcome.message).into());
    }
    let payment = state
        .with_conn(move |conn| payments::record_payment(conn, &booking, &req, &outcome))
        .await?;
    info!(payment = %payment.id, booking = %payment.booking_id, "payment recorded");
    state.notify(
        payment.artisan_id,
        NotificationKind::PaymentReceived,
        format!("Payment of {:.2} {} received", payment.amount, payment.currency),
        payment.booking_id,
    );
    Ok((StatusCode::CREATED, Json(payment)))
}

#[derive(Deserialize)]
struct PaymentFilter {
    status: Option<String>,
}

async fn list_payments(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Query(filter): Query<PaymentFilter>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&p, Role::Client)?;
    let list = state
        .with_conn(move |conn| payments::list_payments(conn, &p.id, filter.status.as_deref()))
        .await?;
    Ok(Json(list))
}

// reviews

async fn create_review(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Json(req): Json<ReviewCreate>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&p, Role::Client)?;
    let review = state
        .with_conn(move |conn| reviews::create_review(conn, &p.id, &req))
        .await?;
    state.notify(
        review.artisan_id,
        NotificationKind::ReviewReceived,
        format!("You received a {}-star review", review.rating),
        review.id,
    );
    Ok((StatusCode::CREATED, Json(review)))
}

async fn update_review(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(update): Json<ReviewUpdate>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&p, Role::Client)?;
    let review = state
        .with_conn(move |conn| reviews::update_review(conn, &p.id, &id, &update))
        .await?;
    Ok(Json(review))
}

async fn delete_review(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&p, Role::Client)?;
    state
        .with_conn(move |conn| reviews::delete_review(conn, &p.id, &id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// messages

async fn send_message(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Json(req): Json<MessageCreate>,
) -> Result<impl IntoResponse, AppError> {
    let msg = state
        .with_conn(move |conn| messages::create_message(conn, &p.id, &req))
        .await?;
    let delivered = state
        .registry
        .send_event(&msg.recipient_id, &LiveEvent::new_message(&msg));
    debug!(message = %msg.id, delivered, "message fanned out");
    Ok((StatusCode::CREATED, Json(msg)))
}

#[derive(Deserialize)]
struct ListQuery {
    with: Option<Uuid>,
    skip: Option<usize>,
    limit: Option<usize>,
}

async fn list_messages(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let list = state
        .with_conn(move |conn| {
            messages::list_messages(conn, &p.id, q.with.as_ref(), q.skip.unwrap_or(0), q.limit)
        })
        .await?;
    Ok(Json(list))
}

async fn conversations(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    let rows = state
        .with_conn(move |conn| messages::conversations(conn, &p.id))
        .await?;
    Ok(Json(rows))
}

async fn mark_read(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let msg = state
        .with_conn(move |conn| messages::mark_read(conn, &p.id, &id))
        .await?;
    Ok(Json(msg))
}

async fn report_message(
    State(state): State<AppState>,
    Extension(p): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReportCreate>,
) -> Result<impl IntoResponse, AppError> {
    let report = state
        .with_conn(move |conn| messages::report_message(conn, &p.id, &id, &req.reason))
        .await?;
    warn!(message = %report.message_id, reporter = %report.reporter_id, "message reported");
    Ok((StatusCode::CREATED, Json(report)))
}

/// Run the HTTP server until `shutdown` resolves.
pub async fn run_http_server<F>(config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = config.bind.parse()?;
    let state = AppState::new(config).await?;
    info!(%addr, data_dir = %state.config.data_dir.display(), "listening");
    axum::Server::bind(&addr)
        .serve(build_router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
