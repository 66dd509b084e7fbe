mod service;

pub use service::*;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::NewAccount;
use crate::store::{Document, Value};

/// Registration data sent by the client.
#[derive(Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreationRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Free-form label, also used as the access role.
    pub category: Option<String>,
    pub phone: Option<String>,
}

impl fmt::Debug for UserCreationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCreationRequest")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("category", &self.category)
            .field("phone", &self.phone)
            .finish_non_exhaustive()
    }
}

impl UserCreationRequest {
    /// First and last name joined by a space, without surrounding
    /// whitespace.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_owned()
    }

    /// Account sent to the identity provider.
    pub fn account(&self) -> NewAccount {
        NewAccount {
            email: self.email.clone(),
            password: self.password.clone(),
            display_name: self.display_name(),
        }
    }

    /// Profile record stored under `uid`.
    ///
    /// `role` always mirrors `category`, and an empty phone number is stored
    /// as null.
    pub fn profile(&self, uid: &str) -> Document {
        let phone = self.phone.clone().filter(|phone| !phone.is_empty());

        Document::new()
            .field(profile::UID, uid)
            .field(profile::EMAIL, self.email.as_str())
            .field(profile::FIRST_NAME, self.first_name.clone())
            .field(profile::LAST_NAME, self.last_name.clone())
            .field(profile::PHONE, phone)
            .field(profile::CATEGORY, self.category.clone())
            .field(profile::ROLE, self.category.clone())
            .field(profile::CREATED_AT, Value::ServerTimestamp)
            .field(profile::UPDATED_AT, Value::ServerTimestamp)
    }
}

/// Field names of a profile record.
pub mod profile {
    pub const UID: &str = "uid";
    pub const EMAIL: &str = "email";
    pub const FIRST_NAME: &str = "firstName";
    pub const LAST_NAME: &str = "lastName";
    pub const PHONE: &str = "phone";
    pub const CATEGORY: &str = "category";
    pub const ROLE: &str = "role";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
}
