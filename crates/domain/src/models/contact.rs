//! Contact form submissions.
//!
//! The website posts a single payload shape for two different forms. A
//! payload carrying both `suburb` and `vehicleType` is a blue slip quote;
//! anything else is a general inquiry.

use crate::models::lead::{LeadSource, NewLead};
use serde::{Deserialize, Serialize};
use shared::text::non_blank;
use shared::validation::is_valid_email;
use thiserror::Error;

pub const BLUE_SLIP_SERVICE: &str = "Blue Slip Quote";

pub const CONTACT_SUCCESS_MESSAGE: &str =
    "Thank you! Your message has been sent successfully. We'll get back to you soon.";

/// Raw body of `POST /api/send-email`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFormRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub service: Option<String>,
    pub message: Option<String>,
    pub suburb: Option<String>,
    pub vehicle_type: Option<String>,
    pub timing: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContactFormError {
    #[error("Name, phone, suburb, and vehicle type are required")]
    MissingQuoteFields,

    #[error("Name, email, and message are required")]
    MissingInquiryFields,

    #[error("Invalid email format")]
    InvalidEmail,
}

/// Vehicle inspection quote request.
#[derive(Debug, Clone, PartialEq)]
pub struct BlueSlipQuote {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub service: Option<String>,
    pub suburb: String,
    pub vehicle_type: String,
    pub timing: Option<String>,
    pub notes: Option<String>,
}

impl BlueSlipQuote {
    /// Service needed today or tomorrow.
    pub fn is_urgent(&self) -> bool {
        matches!(self.timing.as_deref(), Some("today") | Some("tomorrow"))
    }

    /// Message stored on the lead row.
    pub fn lead_message(&self) -> String {
        let mut message = format!("Blue Slip Quote - {}, {}", self.suburb, self.vehicle_type);
        if let Some(timing) = &self.timing {
            message.push_str(&format!(", Timeframe: {}", timing));
        }
        if let Some(notes) = &self.notes {
            message.push_str(&format!("\n\nNotes: {}", notes));
        }
        message
    }
}

/// General growth-strategy inquiry.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralInquiry {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub service: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContactSubmission {
    BlueSlipQuote(BlueSlipQuote),
    Inquiry(GeneralInquiry),
}

impl ContactSubmission {
    pub fn name(&self) -> &str {
        match self {
            ContactSubmission::BlueSlipQuote(quote) => &quote.name,
            ContactSubmission::Inquiry(inquiry) => &inquiry.name,
        }
    }

    /// Address for the auto-reply, when the visitor left one.
    pub fn email(&self) -> Option<&str> {
        match self {
            ContactSubmission::BlueSlipQuote(quote) => quote.email.as_deref(),
            ContactSubmission::Inquiry(inquiry) => Some(&inquiry.email),
        }
    }

    pub fn to_new_lead(&self) -> NewLead {
        let (phone, email, message, service) = match self {
            ContactSubmission::BlueSlipQuote(quote) => (
                Some(quote.phone.clone()),
                quote.email.clone(),
                quote.lead_message(),
                Some(
                    quote
                        .service
                        .clone()
                        .unwrap_or_else(|| BLUE_SLIP_SERVICE.to_string()),
                ),
            ),
            ContactSubmission::Inquiry(inquiry) => (
                inquiry.phone.clone(),
                Some(inquiry.email.clone()),
                inquiry.message.clone(),
                inquiry.service.clone(),
            ),
        };

        let preferred_contact_method = if email.is_some() { "email" } else { "phone" };

        NewLead {
            name: self.name().to_string(),
            phone,
            email,
            preferred_contact_method: preferred_contact_method.to_string(),
            preferred_time: None,
            message: Some(message),
            conversation_context: None,
            source: LeadSource::ContactForm,
            service,
        }
    }
}

fn field(value: &Option<String>) -> Option<String> {
    non_blank(value.as_deref()).map(str::to_string)
}

impl ContactFormRequest {
    /// Decides which form was submitted and checks its required fields.
    pub fn into_submission(self) -> Result<ContactSubmission, ContactFormError> {
        let name = field(&self.name);
        let email = field(&self.email);
        let phone = field(&self.phone);
        let suburb = field(&self.suburb);
        let vehicle_type = field(&self.vehicle_type);

        if let (Some(suburb), Some(vehicle_type)) = (suburb, vehicle_type) {
            let (Some(name), Some(phone)) = (name, phone) else {
                return Err(ContactFormError::MissingQuoteFields);
            };
            return Ok(ContactSubmission::BlueSlipQuote(BlueSlipQuote {
                name,
                phone,
                email,
                service: field(&self.service),
                suburb,
                vehicle_type,
                timing: field(&self.timing),
                notes: field(&self.notes),
            }));
        }

        let (Some(name), Some(email), Some(message)) = (name, email, field(&self.message)) else {
            return Err(ContactFormError::MissingInquiryFields);
        };
        if !is_valid_email(&email) {
            return Err(ContactFormError::InvalidEmail);
        }

        Ok(ContactSubmission::Inquiry(GeneralInquiry {
            name,
            email,
            phone,
            service: field(&self.service),
            message,
        }))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactFormResponse {
    pub message: String,
    pub success: bool,
}

impl ContactFormResponse {
    pub fn sent() -> Self {
        Self {
            message: CONTACT_SUCCESS_MESSAGE.to_string(),
            success: true,
        }
    }
}
