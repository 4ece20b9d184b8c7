use marketcore::{
    profile::NotificationPreferences, services::PaymentMethod, BookingStatus,
    ClientProfile, PaymentState, Role,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub client_id: Uuid,
    pub artisan_id: Uuid,
    pub service_name: String,
    pub service_description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub booking_date: OffsetDateTime,
    pub duration_hours: f64,
    pub location: String,
    pub status: BookingStatus,
    pub agreed_price: Option<f64>,
    pub payment_status: PaymentState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub client_id: Uuid,
    pub artisan_id: Uuid,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub currency: String,
    pub status: String,
    pub transaction_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Review {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub client_id: Uuid,
    pub artisan_id: Uuid,
    pub rating: u8,
    pub comment: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Report {
    pub id: Uuid,
    pub message_id: Uuid,
    pub reporter_id: Uuid,
    pub reason: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// request bodies

#[derive(Debug, Deserialize, Clone)]
pub struct ClientCreate {
    pub name: String,
    pub email: String,
    pub password: String,
    pub location: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub notification_preferences: Option<NotificationPreferences>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArtisanCreate {
    pub name: String,
    pub email: String,
    pub password: String,
    pub profession: String,
    #[serde(default)]
    pub skills: Vec<String>,
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub location: Option<String>,
    pub profile_picture: Option<String>,
    pub notification_preferences: Option<NotificationPreferences>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingCreate {
    pub artisan_id: Uuid,
    pub service_name: String,
    #[serde(default)]
    pub service_description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub booking_date: OffsetDateTime,
    pub duration_hours: f64,
    pub location: String,
    #[serde(default)]
    pub agreed_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: BookingStatus,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentCreate {
    pub booking_id: Uuid,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub payment_token: String,
}

fn default_currency() -> String {
    "USD".into()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReviewCreate {
    pub booking_id: Uuid,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReviewUpdate {
    pub rating: Option<u8>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MessageCreate {
    pub recipient_id: Uuid,
    pub content: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportCreate {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub client: ClientProfile,
    pub upcoming_bookings: Vec<Booking>,
    pub past_bookings: Vec<Booking>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub available: bool,
    pub conflicting_booking_id: Option<Uuid>,
}
