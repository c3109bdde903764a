//! Catalog, location, notification and settings clients.
//!
//! Thin typed wrappers over `ApiGateway::call`. Clients that change account
//! state (locations, notifications, settings) apply the server's answer to
//! the shared session.

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};

use crate::api::session::{lock, validate_location_name};
use crate::api::{api_error, ApiError, ApiGateway, HttpMethod};
use crate::models::{
    AppNotification, BasicResponse, CreatedDeviceResponse, Device, DeviceSummary,
    LocationResponse,
};
use crate::selection::DeviceLookup;

/// Treat a `{ error }` body as a failure.
fn ensure_ok(response: BasicResponse) -> Result<BasicResponse> {
    match response.error {
        Some(error) => Err(anyhow!(error)),
        None => Ok(response),
    }
}

/// Optional device fields for `DeviceCatalog::update`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceUpdate {
    pub location: Option<String>,
    pub needs_update: Option<bool>,
}

#[derive(Clone)]
pub struct DeviceCatalog {
    gateway: ApiGateway,
}

impl DeviceCatalog {
    pub fn new(gateway: ApiGateway) -> Self {
        Self { gateway }
    }

    /// Resolve a detected device by its display label.
    pub fn lookup(&self, name: &str) -> Result<CreatedDeviceResponse> {
        self.gateway
            .call("/devices", HttpMethod::Post, Some(&json!({ "name": name })))
    }

    /// Devices at `location`; `All` lists every location.
    pub fn list(&self, location: &str) -> Result<Vec<DeviceSummary>> {
        self.gateway.call(
            "/devices",
            HttpMethod::Get,
            Some(&json!({ "filter": location })),
        )
    }

    pub fn get(&self, device_id: &str) -> Result<Device> {
        self.gateway
            .call(&format!("/devices/{}", device_id), HttpMethod::Get, None)
    }

    pub fn save(&self, device: &Device) -> Result<CreatedDeviceResponse> {
        let body = serde_json::to_value(device)?;
        self.gateway
            .call("/devices/save", HttpMethod::Post, Some(&body))
    }

    pub fn update(&self, device_id: &str, update: &DeviceUpdate) -> Result<CreatedDeviceResponse> {
        let mut body = Map::new();
        body.insert("deviceId".to_string(), json!(device_id));
        if let Some(location) = &update.location {
            body.insert("location".to_string(), json!(location));
        }
        if let Some(needs_update) = update.needs_update {
            body.insert("needsUpdate".to_string(), json!(needs_update));
        }
        self.gateway
            .call("/devices/update", HttpMethod::Put, Some(&Value::Object(body)))
    }

    pub fn delete(&self, device_id: &str) -> Result<BasicResponse> {
        let response = self.gateway.call(
            "/devices",
            HttpMethod::Delete,
            Some(&json!({ "deviceId": device_id })),
        )?;
        ensure_ok(response)
    }
}

impl DeviceLookup for DeviceCatalog {
    fn lookup_by_name(&self, name: &str) -> Result<Option<Device>> {
        match self.lookup(name) {
            Ok(response) => Ok(Some(response.device)),
            Err(err) => match api_error(&err) {
                Some(ApiError::Status(404)) | Some(ApiError::NoData) => Ok(None),
                _ => Err(err),
            },
        }
    }
}

#[derive(Clone)]
pub struct LocationClient {
    gateway: ApiGateway,
}

impl LocationClient {
    pub fn new(gateway: ApiGateway) -> Self {
        Self { gateway }
    }

    pub fn rename(&self, old_location: &str, new_location: &str) -> Result<Vec<String>> {
        validate_location_name(new_location)?;
        let response = self.gateway.call(
            "/locations/update",
            HttpMethod::Put,
            Some(&json!({ "oldLocation": old_location, "newLocation": new_location })),
        )?;
        self.apply(response)
    }

    /// Replace the whole list, e.g. after adding or reordering.
    pub fn replace(&self, new_locations: &[String]) -> Result<Vec<String>> {
        for name in new_locations {
            validate_location_name(name)?;
        }
        let response = self.gateway.call(
            "/locations/replace",
            HttpMethod::Put,
            Some(&json!({ "newLocations": new_locations })),
        )?;
        self.apply(response)
    }

    pub fn delete(&self, location: &str) -> Result<Vec<String>> {
        let response = self.gateway.call(
            "/locations/delete",
            HttpMethod::Delete,
            Some(&json!({ "location": location })),
        )?;
        self.apply(response)
    }

    fn apply(&self, response: LocationResponse) -> Result<Vec<String>> {
        if let Some(error) = response.error {
            return Err(anyhow!(error));
        }
        let locations = response.locations.unwrap_or_default();
        lock(self.gateway.session())?.set_locations(locations.clone());
        Ok(locations)
    }
}

#[derive(Clone)]
pub struct NotificationClient {
    gateway: ApiGateway,
}

impl NotificationClient {
    pub fn new(gateway: ApiGateway) -> Self {
        Self { gateway }
    }

    pub fn list(&self) -> Result<Vec<AppNotification>> {
        let notifications: Vec<AppNotification> =
            self.gateway.call("/notifications/", HttpMethod::Get, None)?;
        lock(self.gateway.session())?.set_notifications(notifications.clone());
        Ok(notifications)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let response = self.gateway.call(
            "/notifications",
            HttpMethod::Delete,
            Some(&json!({ "id": id })),
        )?;
        ensure_ok(response)?;
        lock(self.gateway.session())?.remove_notification(id);
        Ok(())
    }

    pub fn clear_all(&self) -> Result<()> {
        let response = self
            .gateway
            .call("/notifications/all", HttpMethod::Delete, None)?;
        ensure_ok(response)?;
        lock(self.gateway.session())?.set_notifications(Vec::new());
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationChannel {
    Text,
    Email,
    Push,
}

impl NotificationChannel {
    fn path(&self) -> &'static str {
        match self {
            NotificationChannel::Text => "/users/text-notifications",
            NotificationChannel::Email => "/users/email-notifications",
            NotificationChannel::Push => "/users/push-notifications",
        }
    }

    fn field(&self) -> &'static str {
        match self {
            NotificationChannel::Text => "textNotifications",
            NotificationChannel::Email => "emailNotifications",
            NotificationChannel::Push => "pushNotifications",
        }
    }
}

#[derive(Clone)]
pub struct SettingsClient {
    gateway: ApiGateway,
}

impl SettingsClient {
    pub fn new(gateway: ApiGateway) -> Self {
        Self { gateway }
    }

    /// Toggle a channel. The session only changes once the server accepts.
    pub fn set_notifications(&self, channel: NotificationChannel, enabled: bool) -> Result<()> {
        let mut body = Map::new();
        body.insert(channel.field().to_string(), json!(enabled));
        let response = self
            .gateway
            .call(channel.path(), HttpMethod::Put, Some(&Value::Object(body)))?;
        ensure_ok(response)?;

        let mut session = lock(self.gateway.session())?;
        if let Some(user) = session.user_mut() {
            match channel {
                NotificationChannel::Text => user.text_notifications = enabled,
                NotificationChannel::Email => user.email_notifications = enabled,
                NotificationChannel::Push => user.push_notifications = enabled,
            }
        }
        Ok(())
    }
}
