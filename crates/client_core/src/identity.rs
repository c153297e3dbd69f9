//! Signup gate: validates the student identity that unlocks the thread.

use shared::domain::Identity;
use thiserror::Error;

pub const DEFAULT_EMAIL_DOMAIN: &str = "alustudent.com";
pub const MIN_DISPLAY_NAME_CHARS: usize = 2;

#[derive(Debug, Clone)]
pub struct SignupPolicy {
    pub required_email_domain: String,
}

impl Default for SignupPolicy {
    fn default() -> Self {
        Self {
            required_email_domain: DEFAULT_EMAIL_DOMAIN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignupError {
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Please use your ALU student email (@{domain})")]
    WrongDomain { domain: String },
    #[error("Name must be at least 2 characters")]
    NameTooShort,
}

pub fn sign_up(
    display_name: &str,
    email_address: &str,
    policy: &SignupPolicy,
) -> Result<Identity, SignupError> {
    let email_address = email_address.trim();
    if !looks_like_email(email_address) {
        return Err(SignupError::InvalidEmail);
    }

    let domain = email_address
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .unwrap_or_default();
    let required = policy.required_email_domain.trim_start_matches('@');
    if !domain.eq_ignore_ascii_case(required) {
        return Err(SignupError::WrongDomain {
            domain: required.to_string(),
        });
    }

    let display_name = display_name.trim();
    if display_name.chars().count() < MIN_DISPLAY_NAME_CHARS {
        return Err(SignupError::NameTooShort);
    }

    Ok(Identity {
        display_name: display_name.to_string(),
        email_address: email_address.to_string(),
    })
}

fn looks_like_email(candidate: &str) -> bool {
    if candidate.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

/// Holds the signed-up identity, if any, for one run of the app.
#[derive(Debug, Default, Clone)]
pub struct Session {
    identity: Option<Identity>,
}

impl Session {
    pub fn current_identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn sign_up(
        &mut self,
        display_name: &str,
        email_address: &str,
        policy: &SignupPolicy,
    ) -> Result<&Identity, SignupError> {
        let identity = sign_up(display_name, email_address, policy)?;
        Ok(self.identity.insert(identity))
    }

    pub fn sign_out(&mut self) {
        self.identity = None;
    }
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;
