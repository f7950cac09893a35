//! Credential entry for tool servers that need secrets before they can run.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use crate::api::{BackendError, CredentialRequirement, CredentialRequirements, CredentialSubmission};

#[derive(Debug, Clone, PartialEq)]
pub struct CredentialField {
    pub requirement: CredentialRequirement,
    pub value: String,
    /// Set by validation when a required value is missing.
    pub invalid: bool,
}

impl CredentialField {
    pub fn name(&self) -> &str {
        &self.requirement.name
    }

    pub fn label(&self) -> &str {
        self.requirement
            .label
            .as_deref()
            .unwrap_or(&self.requirement.name)
    }

    fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CredentialForm {
    pub server_id: String,
    pub server_name: Option<String>,
    pub fields: Vec<CredentialField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialFormError {
    pub invalid_fields: Vec<String>,
}

impl fmt::Display for CredentialFormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Missing required credentials: {}", self.invalid_fields.join(", "))
    }
}

impl StdError for CredentialFormError {}

/// Either the form never left the client, or the backend refused it.
#[derive(Debug)]
pub enum CredentialSubmitError {
    Invalid(CredentialFormError),
    Backend(BackendError),
}

impl fmt::Display for CredentialSubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSubmitError::Invalid(err) => err.fmt(f),
            CredentialSubmitError::Backend(err) => err.fmt(f),
        }
    }
}

impl StdError for CredentialSubmitError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CredentialSubmitError::Invalid(err) => Some(err),
            CredentialSubmitError::Backend(err) => Some(err),
        }
    }
}

impl From<BackendError> for CredentialSubmitError {
    fn from(err: BackendError) -> Self {
        CredentialSubmitError::Backend(err)
    }
}

impl CredentialForm {
    pub fn from_requirements(server_id: impl Into<String>, requirements: CredentialRequirements) -> Self {
        Self {
            server_id: server_id.into(),
            server_name: requirements.server_name,
            fields: requirements
                .credentials
                .into_iter()
                .map(|requirement| CredentialField {
                    requirement,
                    value: String::new(),
                    invalid: false,
                })
                .collect(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.server_id)
    }

    /// Set a field's value. Returns `false` if the form has no such field.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.fields.iter_mut().find(|field| field.name() == name) {
            Some(field) => {
                field.value = value.into();
                field.invalid = false;
                true
            }
            None => false,
        }
    }

    /// Check required fields and build the request body.
    ///
    /// Every blank required field is marked invalid. Blank optional fields are
    /// left out of the submission. Values are sent exactly as entered.
    pub fn validate(&mut self) -> Result<CredentialSubmission, CredentialFormError> {
        let mut invalid_fields = Vec::new();
        for field in &mut self.fields {
            field.invalid = field.requirement.required && field.is_blank();
            if field.invalid {
                invalid_fields.push(field.name().to_string());
            }
        }
        if !invalid_fields.is_empty() {
            return Err(CredentialFormError { invalid_fields });
        }

        let credentials: BTreeMap<String, String> = self
            .fields
            .iter()
            .filter(|field| !field.is_blank())
            .map(|field| (field.name().to_string(), field.value.clone()))
            .collect();
        Ok(CredentialSubmission { credentials })
    }
}
