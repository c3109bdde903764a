//! Wire types exchanged with the account and catalog services.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// A cataloged device record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub specifications: String,
    pub detected_at: i64,
    #[serde(default)]
    pub needs_update: bool,
}

/// Row in a device listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub detected_at: i64,
    #[serde(default)]
    pub needs_update: bool,
}

/// Response to a lookup by name.
#[derive(Clone, Debug, Deserialize)]
pub struct CreatedDeviceResponse {
    #[serde(default)]
    pub message: String,
    pub device: Device,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Vec<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub profile_photo: String,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub phone_verification: bool,
    #[serde(default)]
    pub phone_code: String,
    #[serde(default)]
    pub phone_code_exp: i64,
    #[serde(default)]
    pub email_verification: bool,
    #[serde(default)]
    pub email_code: String,
    #[serde(default)]
    pub email_code_exp: i64,
    #[serde(default)]
    pub locations: Option<Vec<String>>,
    #[serde(default)]
    pub email_notifications: bool,
    #[serde(default)]
    pub text_notifications: bool,
    #[serde(default)]
    pub push_notifications: bool,
    #[serde(rename = "DTString", default)]
    pub dt_string: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl User {
    pub fn locations(&self) -> &[String] {
        self.locations.as_deref().unwrap_or(&[])
    }
}

/// Access and refresh credentials. Wiped from memory on drop.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl Drop for Tokens {
    fn drop(&mut self) {
        self.access_token.zeroize();
        self.refresh_token.zeroize();
    }
}

impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserTokens {
    pub message: Option<String>,
    pub error: Option<String>,
    pub user: Option<User>,
    pub tokens: Option<Tokens>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct BasicResponse {
    pub message: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationResponse {
    pub locations: Option<Vec<String>>,
    pub message: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppNotification {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    pub message: String,
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_decodes_wire_names() {
        let device: Device = serde_json::from_str(
            r#"{
                "userId": "u1",
                "name": "Microwave",
                "type": "appliance",
                "location": "Kitchen",
                "capabilities": ["defrost", "timer"],
                "specifications": "1100W",
                "detectedAt": 1732400000,
                "needsUpdate": false
            }"#,
        )
        .unwrap();
        assert_eq!(device.kind, "appliance");
        assert_eq!(device.capabilities.len(), 2);
        assert_eq!(device.detected_at, 1_732_400_000);
    }

    #[test]
    fn summaries_and_notifications_read_mongo_ids() {
        let summary: DeviceSummary = serde_json::from_str(
            r#"{"_id": "abc", "name": "Laptop", "type": "computer", "detectedAt": 1, "needsUpdate": true}"#,
        )
        .unwrap();
        assert_eq!(summary.id, "abc");
        assert!(summary.needs_update);

        let note: AppNotification = serde_json::from_str(
            r#"{"_id": "n1", "userId": "u1", "message": "Firmware available", "createdAt": 5}"#,
        )
        .unwrap();
        assert_eq!(note.id, "n1");
        assert!(note.device_id.is_none());
    }

    #[test]
    fn user_tolerates_missing_optional_fields() {
        let user: User = serde_json::from_str(
            r#"{"userId": "u1", "phoneVerification": true, "DTString": "2024-11-22"}"#,
        )
        .unwrap();
        assert!(user.phone_verification);
        assert_eq!(user.dt_string, "2024-11-22");
        assert!(user.locations().is_empty());
    }

    #[test]
    fn token_debug_is_redacted() {
        let tokens = Tokens {
            access_token: "secret-a".to_string(),
            refresh_token: "secret-r".to_string(),
        };
        let rendered = format!("{:?}", tokens);
        assert!(!rendered.contains("secret"));
    }
}
