use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::MarketError;

/// Which kind of account a principal is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Artisan,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Artisan => "artisan",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "artisan" => Ok(Role::Artisan),
            other => Err(MarketError::invalid(format!("unknown role {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub email: bool,
    pub sms: bool,
    pub push: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            sms: false,
            push: true,
        }
    }
}

/// Public view of a client account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub location: String,
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub notification_preferences: NotificationPreferences,
    pub email_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Public view of an artisan account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtisanProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profession: String,
    pub skills: Vec<String>,
    pub location: String,
    pub description: String,
    pub hourly_rate: Option<f64>,
    pub profile_picture: Option<String>,
    pub rating: f64,
    pub review_count: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A user is either a client or an artisan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Profile {
    Client(ClientProfile),
    Artisan(ArtisanProfile),
}

impl Profile {
    pub fn id(&self) -> Uuid {
        match self {
            Profile::Client(c) => c.id,
            Profile::Artisan(a) => a.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Profile::Client(c) => &c.name,
            Profile::Artisan(a) => &a.name,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Profile::Client(_) => Role::Client,
            Profile::Artisan(_) => Role::Artisan,
        }
    }
}

/// Looks up user profiles by id.
///
/// Implementations try the client accounts first and fall back to artisans.
pub trait ProfileResolver {
    fn find_client(&self, id: &Uuid) -> anyhow::Result<Option<ClientProfile>>;

    fn find_artisan(&self, id: &Uuid) -> anyhow::Result<Option<ArtisanProfile>>;

    fn resolve(&self, id: &Uuid) -> anyhow::Result<Option<Profile>> {
        if let Some(client) = self.find_client(id)? {
            return Ok(Some(Profile::Client(client)));
        }
        Ok(self.find_artisan(id)?.map(Profile::Artisan))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    /// In-memory resolver used by unit tests.
    #[derive(Default)]
    pub struct MemoryProfiles {
        pub clients: HashMap<Uuid, ClientProfile>,
        pub artisans: HashMap<Uuid, ArtisanProfile>,
    }

    impl MemoryProfiles {
        pub fn add_client(&mut self, id: Uuid, name: &str) {
            let now = OffsetDateTime::UNIX_EPOCH;
            self.clients.insert(
                id,
                ClientProfile {
                    id,
                    name: name.into(),
                    email: format!("{}@example.com", name.to_lowercase()),
                    location: "Lagos".into(),
                    profile_picture: None,
                    notification_preferences: NotificationPreferences::default(),
                    email_verified: false,
                    created_at: now,
                    updated_at: now,
                },
            );
        }

        pub fn add_artisan(&mut self, id: Uuid, name: &str) {
            let now = OffsetDateTime::UNIX_EPOCH;
            self.artisans.insert(
                id,
                ArtisanProfile {
                    id,
                    name: name.into(),
                    email: format!("{}@example.com", name.to_lowercase()),
                    profession: "Plumber".into(),
                    skills: vec!["pipes".into()],
                    location: "Lagos".into(),
                    description: String::new(),
                    hourly_rate: Some(20.0),
                    profile_picture: None,
                    rating: 0.0,
                    review_count: 0,
                    created_at: now,
                    updated_at: now,
                },
            );
        }
    }

    impl ProfileResolver for MemoryProfiles {
        fn find_client(&self, id: &Uuid) -> anyhow::Result<Option<ClientProfile>> {
            Ok(self.clients.get(id).cloned())
        }

        fn find_artisan(&self, id: &Uuid) -> anyhow::Result<Option<ArtisanProfile>> {
            Ok(self.artisans.get(id).cloned())
        }
    }
}
