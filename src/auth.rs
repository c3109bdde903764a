//! Account sign-in and onboarding.
//!
//! New accounts verify a phone number, then an email address, then provide a
//! name. `OnboardingStep::for_user` reports the first unfinished step.

use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::json;

use crate::api::session::lock;
use crate::api::{ApiGateway, HttpMethod};
use crate::models::{BasicResponse, User, UserTokens};

const PHONE_SEPARATORS: &str = r"[\s().-]";
const US_PHONE_DIGITS: &str = r"^\d{10}$";
const EMAIL_PATTERN: &str = r"^[A-Z0-9a-z._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,64}$";

type CompiledPattern = OnceLock<std::result::Result<Regex, regex::Error>>;

static PHONE_SEPARATORS_RE: CompiledPattern = OnceLock::new();
static US_PHONE_DIGITS_RE: CompiledPattern = OnceLock::new();
static EMAIL_RE: CompiledPattern = OnceLock::new();

/// Compile `pattern` on first use and reuse it afterwards.
fn compiled(cell: &'static CompiledPattern, pattern: &str) -> Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| anyhow!("invalid pattern {}: {}", pattern, e))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnboardingStep {
    Phone,
    Email,
    Name,
    Complete,
}

impl OnboardingStep {
    pub fn for_user(user: &User) -> Self {
        if !user.phone_verification {
            OnboardingStep::Phone
        } else if !user.email_verification {
            OnboardingStep::Email
        } else if user.first_name.is_empty() || user.last_name.is_empty() {
            OnboardingStep::Name
        } else {
            OnboardingStep::Complete
        }
    }
}

/// Normalize a 10-digit US number to `+1XXXXXXXXXX`.
pub fn normalize_phone(input: &str) -> Result<String> {
    let digits = compiled(&PHONE_SEPARATORS_RE, PHONE_SEPARATORS)?.replace_all(input.trim(), "");
    if !compiled(&US_PHONE_DIGITS_RE, US_PHONE_DIGITS)?.is_match(&digits) {
        return Err(anyhow!("Invalid phone number. Please enter a 10-digit number."));
    }
    Ok(format!("+1{}", digits))
}

pub fn is_valid_email(email: &str) -> Result<bool> {
    Ok(compiled(&EMAIL_RE, EMAIL_PATTERN)?.is_match(email))
}

pub struct AuthService {
    gateway: ApiGateway,
    device_token: String,
}

impl AuthService {
    /// `device_token` identifies this install for push delivery.
    pub fn new(gateway: ApiGateway, device_token: impl Into<String>) -> Self {
        Self {
            gateway,
            device_token: device_token.into(),
        }
    }

    /// Resume from a stored refresh credential.
    ///
    /// Returns `None` when nothing is stored or the server does not recognize it.
    pub fn restore(&self) -> Result<Option<OnboardingStep>> {
        if !lock(self.gateway.session())?.restore_stored_credential()? {
            log::info!("no stored credential");
            return Ok(None);
        }
        let response: UserTokens =
            self.gateway
                .call("/users/cred-check", HttpMethod::Post, Some(&json!({})))?;
        match (response.user, response.tokens) {
            (Some(user), Some(tokens)) => {
                let step = OnboardingStep::for_user(&user);
                lock(self.gateway.session())?.begin(Some(user), Some(tokens))?;
                Ok(Some(step))
            }
            _ => Ok(None),
        }
    }

    pub fn enter_phone(&self, phone: &str) -> Result<()> {
        let phone = normalize_phone(phone)?;
        let response = self.post(
            "/users/enter-phone",
            json!({ "phone": phone, "DTString": self.device_token }),
        )?;
        lock(self.gateway.session())?.begin(None, response.tokens)
    }

    pub fn resend_phone_code(&self) -> Result<()> {
        self.post("/users/resend-phone-code", json!({})).map(|_| ())
    }

    pub fn verify_phone_code(&self, code: &str) -> Result<OnboardingStep> {
        let response = self.post("/users/check-phone-code", json!({ "code": code }))?;
        self.complete(response, "There was an error checking the code")
    }

    pub fn enter_email(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if !is_valid_email(email)? {
            return Err(anyhow!("invalid email address '{}'", email));
        }
        self.post("/users/enter-email", json!({ "email": email }))
            .map(|_| ())
    }

    pub fn resend_email_code(&self) -> Result<()> {
        self.post("/users/resend-email-code", json!({})).map(|_| ())
    }

    pub fn verify_email_code(&self, code: &str) -> Result<OnboardingStep> {
        let response = self.post("/users/check-email-code", json!({ "code": code }))?;
        self.complete(response, "There was an error checking the code")
    }

    pub fn save_name(&self, first_name: &str, last_name: &str) -> Result<OnboardingStep> {
        let (first_name, last_name) = (first_name.trim(), last_name.trim());
        if first_name.is_empty() || last_name.is_empty() {
            return Err(anyhow!("Please enter both first and last names."));
        }
        let response = self.post(
            "/users/save-name",
            json!({ "firstName": first_name, "lastName": last_name }),
        )?;
        self.complete(response, "There was an error saving your name")
    }

    pub fn demo_sign_in(&self, password: &str) -> Result<OnboardingStep> {
        let response = self.post("/users/demo-sign-in", json!({ "password": password }))?;
        self.complete(response, "The password is incorrect")
    }

    pub fn delete_account(&self) -> Result<()> {
        let response: BasicResponse = self.gateway.call("/users", HttpMethod::Delete, None)?;
        if let Some(error) = response.error {
            return Err(anyhow!("account deletion failed: {}", error));
        }
        self.sign_out()
    }

    pub fn sign_out(&self) -> Result<()> {
        log::info!("signing out");
        lock(self.gateway.session())?.clear()
    }

    fn post(&self, path: &str, body: serde_json::Value) -> Result<UserTokens> {
        let response: UserTokens = self.gateway.call(path, HttpMethod::Post, Some(&body))?;
        if let Some(error) = &response.error {
            return Err(anyhow!("{}: {}", path, error));
        }
        Ok(response)
    }

    fn complete(&self, response: UserTokens, failure: &str) -> Result<OnboardingStep> {
        match (response.user, response.tokens) {
            (Some(user), Some(tokens)) => {
                let step = OnboardingStep::for_user(&user);
                lock(self.gateway.session())?.begin(Some(user), Some(tokens))?;
                Ok(step)
            }
            _ => Err(anyhow!("{}", failure)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(phone: bool, email: bool, first: &str, last: &str) -> User {
        let mut user: User = serde_json::from_str(r#"{"userId": "u"}"#).unwrap();
        user.phone_verification = phone;
        user.email_verification = email;
        user.first_name = first.to_string();
        user.last_name = last.to_string();
        user
    }

    #[test]
    fn onboarding_resolves_first_missing_step() {
        assert_eq!(OnboardingStep::for_user(&user(false, true, "A", "B")), OnboardingStep::Phone);
        assert_eq!(OnboardingStep::for_user(&user(true, false, "A", "B")), OnboardingStep::Email);
        assert_eq!(OnboardingStep::for_user(&user(true, true, "A", "")), OnboardingStep::Name);
        assert_eq!(OnboardingStep::for_user(&user(true, true, "A", "B")), OnboardingStep::Complete);
    }

    #[test]
    fn phone_numbers_are_sanitized() {
        assert_eq!(normalize_phone("555-123-4567").unwrap(), "+15551234567");
        assert_eq!(normalize_phone("(555) 123 4567").unwrap(), "+15551234567");
        assert!(normalize_phone("555-1234").is_err());
        assert!(normalize_phone("555-123-456a").is_err());
    }

    #[test]
    fn patterns_compile_once() {
        let first = compiled(&EMAIL_RE, EMAIL_PATTERN).unwrap();
        let second = compiled(&EMAIL_RE, EMAIL_PATTERN).unwrap();
        assert!(std::ptr::eq(first, second));
        normalize_phone("555-123-4567").unwrap();
        assert!(PHONE_SEPARATORS_RE.get().is_some());
        assert!(US_PHONE_DIGITS_RE.get().is_some());
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("sam@example.com").unwrap());
        assert!(!is_valid_email("sam@example").unwrap());
        assert!(!is_valid_email("not an email").unwrap());
    }
}
