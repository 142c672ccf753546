//! Emails sent about leads: team notifications, visitor confirmations,
//! transcripts and the search quota warning.
//!
//! Builders are pure and return an [`EmailMessage`]; [`LeadMailer`] pairs
//! them with the configured [`EmailService`]. Visitor-supplied text is
//! HTML-escaped before it is placed in an HTML body.

use chrono::{DateTime, Utc};
use domain::models::chat::HistoryEntry;
use domain::models::contact::{BlueSlipQuote, ContactSubmission, GeneralInquiry};
use domain::models::lead::Lead;
use shared::text::{escape_html, html_paragraph, truncate_with_suffix};

use crate::services::email::{EmailError, EmailMessage, EmailService};

const CALLBACK_CONTEXT_PREVIEW: usize = 500;
const TRANSCRIPT_PREVIEW: usize = 800;
const TRANSCRIPT_PREVIEW_SUFFIX: &str = "...\n\n[View full transcript in dashboard]";
const BOOKING_URL: &str = "https://calendly.com/websited";
const SIGNATURE: &str = "Websited - AI & Digital Marketing Solutions\n2 Martin Place, Sydney, Australia\nhello@websited.org | websited.org";

fn received_at(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn dashboard_link(site_url: &str, lead_id: i32) -> String {
    format!(
        "{}/admin/callbacks.html?id={}",
        site_url.trim_end_matches('/'),
        lead_id
    )
}

fn html_row(label: &str, value: &str) -> String {
    format!(
        r#"<tr><td style="padding: 10px; color: #6b7280; font-weight: 600; width: 40%;">{}</td><td style="padding: 10px;"><strong>{}</strong></td></tr>"#,
        label,
        escape_html(value)
    )
}

fn html_document(heading: &str, accent: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <div style="background: {accent}; color: white; padding: 24px; border-radius: 8px 8px 0 0;">
            <h2 style="margin: 0;">{heading}</h2>
        </div>
        <div style="background: #ffffff; padding: 30px; border: 1px solid #e5e7eb;">
{body}
        </div>
    </div>
</body>
</html>"#,
        accent = accent,
        heading = heading,
        body = body
    )
}

const BLUE_ACCENT: &str = "linear-gradient(135deg, #1E40AF, #8B5CF6)";
const RED_ACCENT: &str = "linear-gradient(135deg, #ef4444, #dc2626)";
const PURPLE_ACCENT: &str = "linear-gradient(135deg, #8B5CF6, #6366f1)";

/// How the confirmation tells the visitor they will be contacted.
pub fn contact_method_phrase(method: &str) -> &'static str {
    match method {
        "phone" => "phone call",
        "email" => "email",
        "sms" => "SMS",
        _ => "your preferred method",
    }
}

pub fn contact_subject(submission: &ContactSubmission) -> String {
    match submission {
        ContactSubmission::BlueSlipQuote(quote) => format!(
            "🚗 Blue Slip Quote: {} - {} ({}){}",
            quote.name,
            quote.suburb,
            quote.vehicle_type,
            if quote.is_urgent() { " - URGENT" } else { "" }
        ),
        ContactSubmission::Inquiry(inquiry) => match &inquiry.service {
            Some(service) => format!("🚀 New Growth Inquiry: {} - {}", inquiry.name, service),
            None => format!("🚀 New Growth Inquiry: {}", inquiry.name),
        },
    }
}

fn quote_bodies(quote: &BlueSlipQuote, received: &str) -> (String, String) {
    let mut text = format!(
        "New Blue Slip Quote Request\n\nName: {}\nPhone: {}\nSuburb: {}\nVehicle Type: {}\n",
        quote.name, quote.phone, quote.suburb, quote.vehicle_type
    );
    let mut rows = vec![
        html_row("Name:", &quote.name),
        html_row("Phone:", &quote.phone),
        html_row("Suburb:", &quote.suburb),
        html_row("Vehicle Type:", &quote.vehicle_type),
    ];
    if let Some(email) = &quote.email {
        text.push_str(&format!("Email: {}\n", email));
        rows.push(html_row("Email:", email));
    }
    if let Some(timing) = &quote.timing {
        text.push_str(&format!("Timeframe: {}\n", timing));
        rows.push(html_row("Timeframe:", timing));
    }

    let mut html = format!(r#"<table style="width: 100%;">{}</table>"#, rows.join(""));
    if let Some(notes) = &quote.notes {
        text.push_str(&format!("Notes: {}\n", notes));
        html.push_str(&format!(
            "<p><strong>Additional Notes:</strong><br>{}</p>",
            html_paragraph(notes)
        ));
    }
    if quote.is_urgent() {
        let timing = quote.timing.as_deref().unwrap_or_default();
        text.push_str(&format!("\n⚡ URGENT: Customer needs service {}!\n", timing));
        html.push_str(&format!(
            r#"<div style="background: #FEF3C7; border: 1px solid #F59E0B; padding: 15px; border-radius: 4px;"><strong>⚡ URGENT:</strong> Customer needs service {}!</div>"#,
            escape_html(timing)
        ));
    }
    text.push_str(&format!("\nReceived on {}", received));
    html.push_str(&format!(
        r#"<p style="color: #6b7280; font-size: 12px;">Sent from the website quote form. Received on {}</p>"#,
        received
    ));

    (text, html_document("🚗 New Blue Slip Quote Request", BLUE_ACCENT, &html))
}

fn inquiry_bodies(inquiry: &GeneralInquiry, received: &str) -> (String, String) {
    let mut text = format!(
        "New Growth Strategy Inquiry from Websited.org\n\nName: {}\nEmail: {}\n",
        inquiry.name, inquiry.email
    );
    let mut rows = vec![
        html_row("Name:", &inquiry.name),
        html_row("Email:", &inquiry.email),
    ];
    if let Some(phone) = &inquiry.phone {
        text.push_str(&format!("Phone: {}\n", phone));
        rows.push(html_row("Phone:", phone));
    }
    if let Some(service) = &inquiry.service {
        text.push_str(&format!("Service Interest: {}\n", service));
        rows.push(html_row("Service Interested In:", service));
    }
    text.push_str(&format!(
        "\nMessage:\n{}\n\nReceived on {}",
        inquiry.message, received
    ));

    let html = format!(
        r#"<table style="width: 100%;">{}</table><p><strong>Message:</strong><br>{}</p><p style="color: #6b7280; font-size: 12px;">Sent from the website contact form. Received on {}</p>"#,
        rows.join(""),
        html_paragraph(&inquiry.message),
        received
    );

    (text, html_document("🚀 New Growth Strategy Inquiry", BLUE_ACCENT, &html))
}

/// Team notification for a contact-form submission. Inquiries are
/// Reply-To the visitor.
pub fn contact_notification(
    submission: &ContactSubmission,
    recipients: Vec<String>,
    now: DateTime<Utc>,
) -> EmailMessage {
    let received = received_at(now);
    let (text, html) = match submission {
        ContactSubmission::BlueSlipQuote(quote) => quote_bodies(quote, &received),
        ContactSubmission::Inquiry(inquiry) => inquiry_bodies(inquiry, &received),
    };

    let message = EmailMessage::new(
        "contact_notification",
        recipients,
        contact_subject(submission),
        text,
    )
    .with_html(html);

    match submission {
        ContactSubmission::Inquiry(inquiry) => message.with_reply_to(inquiry.email.clone()),
        ContactSubmission::BlueSlipQuote(_) => message,
    }
}

pub fn contact_auto_reply(name: &str, email: &str) -> EmailMessage {
    let text = format!(
        "Hi {},\n\nThank you for reaching out to us about growing your business. We've received your inquiry and our growth strategists will get back to you within 24 hours.\n\nBest regards,\nThe Websited Team",
        name
    );
    let html = format!(
        r#"<p>Hi {},</p>
<p>Thank you for reaching out to us about growing your business. We've received your inquiry and our growth strategists will get back to you within 24 hours.</p>
<p>In the meantime, feel free to explore our <a href="https://websited.org">website</a> to learn more about our AI and digital marketing solutions.</p>
<p>Best regards,<br>The Websited Team</p>
<p style="color: #6b7280; font-size: 12px;">This is an automated response. Please do not reply to this email.</p>"#,
        escape_html(name)
    );

    EmailMessage::new(
        "contact_auto_reply",
        vec![email.to_string()],
        "Thank you for contacting Websited",
        text,
    )
    .with_html(html_document("Thank You for Contacting Websited!", BLUE_ACCENT, &html))
}

/// Team notification for a callback scheduled by the assistant.
pub fn callback_admin_notification(
    lead: &Lead,
    reference_id: &str,
    site_url: &str,
    recipients: Vec<String>,
) -> EmailMessage {
    let preferred_time = lead.preferred_time.as_deref().unwrap_or("ASAP");
    let link = dashboard_link(site_url, lead.id);

    let mut text = format!(
        "NEW CALLBACK REQUEST\n\nName: {}\nPhone: {}\nEmail: {}\nPreferred Contact: {}\nPreferred Time: {}\nReference: {}\n\n",
        lead.name,
        lead.phone.as_deref().unwrap_or("N/A"),
        lead.email.as_deref().unwrap_or("N/A"),
        lead.preferred_contact_method,
        preferred_time,
        reference_id
    );

    let mut rows = vec![html_row("Name:", &lead.name)];
    if let Some(phone) = &lead.phone {
        rows.push(html_row("Phone:", phone));
    }
    if let Some(email) = &lead.email {
        rows.push(html_row("Email:", email));
    }
    rows.push(html_row("Preferred Contact:", &lead.preferred_contact_method));
    rows.push(html_row("Preferred Time:", preferred_time));
    rows.push(html_row("Reference ID:", reference_id));

    let mut html = format!(
        r#"<p style="opacity: 0.8;">HIGH PRIORITY - Respond within 24 hours</p><table style="width: 100%;">{}</table>"#,
        rows.join("")
    );

    if let Some(message) = lead.message.as_deref().filter(|m| !m.is_empty()) {
        text.push_str(&format!("Message: {}\n\n", message));
        html.push_str(&format!(
            "<h3>Message:</h3><p>{}</p>",
            html_paragraph(message)
        ));
    }
    if let Some(context) = lead.conversation_context.as_deref().filter(|c| !c.is_empty()) {
        let preview = truncate_with_suffix(context, CALLBACK_CONTEXT_PREVIEW, "...");
        html.push_str(&format!(
            r#"<div style="background: #f9fafb; padding: 15px; border-left: 4px solid #C4EF17;"><h3 style="margin-top: 0;">Conversation Context:</h3><p style="white-space: pre-wrap;">{}</p></div>"#,
            escape_html(&preview)
        ));
    }
    text.push_str(&format!("View in dashboard: {}", link));
    html.push_str(&format!(
        r#"<p style="text-align: center;"><a href="{}" style="background: #C4EF17; color: #0f0f23; padding: 12px 30px; border-radius: 6px; text-decoration: none; font-weight: 600;">View in Dashboard</a></p>"#,
        escape_html(&link)
    ));

    EmailMessage::new(
        "callback_notification",
        recipients,
        "🔥 URGENT: New Callback Request - Websited",
        text,
    )
    .with_html(html_document("🔥 New Callback Request", RED_ACCENT, &html))
}

/// Confirmation to a visitor who left an email address with a callback.
pub fn callback_confirmation(
    lead: &Lead,
    email: &str,
    reference_id: &str,
    reply_to: Option<&str>,
) -> EmailMessage {
    let via = contact_method_phrase(&lead.preferred_contact_method);
    let text = format!(
        "Thank you, {name}!\n\nWe've received your callback request.\n\nYour Reference Number: {reference}\n\nWhat happens next?\n- Our team will review your request immediately\n- You'll hear from us within 24 hours via {via}\n- We'll discuss your specific business needs and goals\n\nWant to get started faster? Book a time: {booking}\n\n{signature}",
        name = lead.name,
        reference = reference_id,
        via = via,
        booking = BOOKING_URL,
        signature = SIGNATURE
    );
    let html = format!(
        r#"<p>Our team at Websited is excited to connect with you and discuss how we can help grow your business with AI-powered marketing solutions.</p>
<div style="background: #f0fdf4; border: 2px solid #C4EF17; padding: 20px; border-radius: 8px; text-align: center;">
    <p style="margin: 0; color: #6b7280; font-size: 14px; text-transform: uppercase;">Your Reference Number</p>
    <p style="margin: 0; font-size: 24px; font-weight: 700;">{reference}</p>
</div>
<h3>What Happens Next?</h3>
<ul>
    <li>Our team will review your request immediately</li>
    <li>You'll hear from us <strong>within 24 hours</strong> via {via}</li>
    <li>We'll discuss your specific business needs and goals</li>
    <li>You'll receive a customized strategy recommendation</li>
</ul>
<p><strong>Want to get started faster?</strong> <a href="{booking}">Book a time now</a></p>"#,
        reference = escape_html(reference_id),
        via = via,
        booking = BOOKING_URL
    );

    let message = EmailMessage::new(
        "callback_confirmation",
        vec![email.to_string()],
        "We've received your request - Websited",
        text,
    )
    .with_html(html_document(
        &format!("Thank You, {}! ✨", escape_html(&lead.name)),
        BLUE_ACCENT,
        &html,
    ));

    match reply_to {
        Some(reply_to) => message.with_reply_to(reply_to),
        None => message,
    }
}

fn transcript_label(entry: &HistoryEntry) -> &'static str {
    if entry.is_user() {
        "You"
    } else {
        "Websited AI"
    }
}

/// Copy of the conversation for the visitor.
pub fn transcript_for_visitor(
    email: &str,
    transcript: &[HistoryEntry],
    reference_id: &str,
    site_url: &str,
    reply_to: Option<&str>,
    now: DateTime<Utc>,
) -> EmailMessage {
    let date = now.format("%-d %B %Y").to_string();
    let contact_url = format!("{}/contact/", site_url.trim_end_matches('/'));

    let text_turns = transcript
        .iter()
        .map(|entry| format!("{}: {}", transcript_label(entry), entry.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    let text = format!(
        "Your Websited Chat Transcript - {date}\n\n{turns}\n\nReady to take the next step?\n\nLet's discuss how we can help grow your business with AI-powered marketing.\nSchedule a free consultation: {contact}\n\n{signature}\n\nReference ID: {reference}",
        date = date,
        turns = text_turns,
        contact = contact_url,
        signature = SIGNATURE,
        reference = reference_id
    );

    let html_turns = transcript
        .iter()
        .map(|entry| {
            let (background, align) = if entry.is_user() {
                ("#f3f4f6", "right")
            } else {
                ("#e0f2fe", "left")
            };
            format!(
                r#"<div style="margin-bottom: 16px; text-align: {align};"><p style="margin: 0; font-size: 12px; font-weight: 600; text-transform: uppercase;">{label}</p><div style="display: inline-block; max-width: 80%; text-align: left; background: {background}; padding: 12px 16px; border-radius: 12px;">{content}</div></div>"#,
                align = align,
                label = transcript_label(entry),
                background = background,
                content = html_paragraph(&entry.content)
            )
        })
        .collect::<String>();

    let html = format!(
        r#"<p>Here's a copy of your conversation with our Websited AI assistant. We've saved this for your records and our team has been notified of your interest.</p>
<div style="background: #f9fafb; padding: 20px; border-radius: 12px; border: 1px solid #e5e7eb;">{turns}</div>
<p style="text-align: center;"><a href="{contact}">📞 Schedule a Free Consultation</a></p>
<p style="color: #9ca3af; font-size: 12px;">Reference ID: {reference}<br>You're receiving this because you requested a copy of your chat transcript.</p>"#,
        turns = html_turns,
        contact = escape_html(&contact_url),
        reference = escape_html(reference_id)
    );

    let message = EmailMessage::new(
        "transcript",
        vec![email.to_string()],
        format!("Your Websited Chat Transcript - {}", date),
        text,
    )
    .with_html(html_document("📧 Your Chat Transcript", BLUE_ACCENT, &html));

    match reply_to {
        Some(reply_to) => message.with_reply_to(reply_to),
        None => message,
    }
}

/// Details of a transcript download for the team notification.
pub struct TranscriptLead<'a> {
    pub lead: &'a Lead,
    pub reference_id: &'a str,
    pub session_id: Option<&'a str>,
    pub detected_service: Option<&'a str>,
}

pub fn transcript_admin_notification(
    details: &TranscriptLead<'_>,
    site_url: &str,
    recipients: Vec<String>,
    now: DateTime<Utc>,
) -> EmailMessage {
    let lead = details.lead;
    let email = lead.email.as_deref().unwrap_or_default();
    let session = details.session_id.unwrap_or("Not provided");
    let service = details.detected_service.unwrap_or("General inquiry");
    let context = lead.conversation_context.as_deref().unwrap_or_default();
    let link = dashboard_link(site_url, lead.id);
    let date = received_at(now);

    let text = format!(
        "New Chat Transcript Download Request\n\nEmail: {}\nSession ID: {}\nDetected Service: {}\nReference ID: {}\nDate: {}\n\nConversation Preview:\n{}\n\nView full details: {}",
        email,
        session,
        service,
        details.reference_id,
        date,
        truncate_with_suffix(context, CALLBACK_CONTEXT_PREVIEW, "..."),
        link
    );

    let rows = [
        html_row("Email:", email),
        html_row("Session ID:", session),
        html_row("Detected Service:", service),
        html_row("Reference ID:", details.reference_id),
        html_row("Date:", &date),
    ]
    .join("");
    let html = format!(
        r#"<table style="width: 100%;">{rows}</table>
<h3>Conversation Preview:</h3>
<p style="background: #f3f4f6; padding: 15px; white-space: pre-wrap; font-size: 14px;">{preview}</p>
<p style="text-align: center;"><a href="{link}">View Full Details in Dashboard</a></p>
<p style="color: #6b7280; font-size: 14px;">This lead has been saved with source type: <strong>Download Chat</strong></p>"#,
        rows = rows,
        preview = escape_html(&truncate_with_suffix(
            context,
            TRANSCRIPT_PREVIEW,
            TRANSCRIPT_PREVIEW_SUFFIX
        )),
        link = escape_html(&link)
    );

    EmailMessage::new(
        "transcript_notification",
        recipients,
        "💬 New Chat Transcript Download Request - Websited",
        text,
    )
    .with_html(html_document("💬 New Chat Download Request", PURPLE_ACCENT, &html))
}

/// Share of the monthly quota used, rounded to a whole percent.
pub fn quota_percentage(current: i64, quota: i64) -> i64 {
    if quota <= 0 {
        return 100;
    }
    ((current as f64 / quota as f64) * 100.0).round() as i64
}

pub fn quota_warning(current: i64, quota: i64, recipients: Vec<String>) -> EmailMessage {
    let percentage = quota_percentage(current, quota);
    let remaining = (quota - current).max(0);

    let text = format!(
        "Search Quota Warning\n\nCurrent Usage: {} / {} searches\nPercentage Used: {}%\nRemaining: {} searches\n\nConsider upgrading at: https://brave.com/search/api/",
        current, quota, percentage, remaining
    );
    let html = format!(
        r#"<p>Your Brave Search API usage is approaching the monthly limit:</p>
<ul>
    <li><strong>Current Usage:</strong> {} / {} searches</li>
    <li><strong>Percentage Used:</strong> {}%</li>
    <li><strong>Remaining:</strong> {} searches</li>
</ul>
<p>Consider upgrading your Brave Search plan at: <a href="https://brave.com/search/api/">https://brave.com/search/api/</a></p>"#,
        current, quota, percentage, remaining
    );

    EmailMessage::new(
        "quota_warning",
        recipients,
        format!("⚠️ Brave Search Quota Warning: {}% Used", percentage),
        text,
    )
    .with_html(html_document("⚠️ Search Quota Warning", RED_ACCENT, &html))
}

/// Sends lead emails through the configured provider.
#[derive(Clone)]
pub struct LeadMailer {
    email: EmailService,
    site_url: String,
}

impl LeadMailer {
    pub fn new(email: EmailService, site_url: impl Into<String>) -> Self {
        Self {
            email,
            site_url: site_url.into(),
        }
    }

    /// First team inbox, used as Reply-To on visitor-facing mail.
    fn team_address(&self) -> Option<String> {
        self.email.recipients().into_iter().next()
    }

    pub async fn notify_contact(&self, submission: &ContactSubmission) -> Result<(), EmailError> {
        self.email
            .send(contact_notification(
                submission,
                self.email.recipients(),
                Utc::now(),
            ))
            .await
    }

    /// Fire-and-forget auto-reply; failures are logged.
    pub fn spawn_contact_auto_reply(&self, name: &str, email: &str) {
        let service = self.email.clone();
        let message = contact_auto_reply(name, email);
        tokio::spawn(async move {
            if let Err(e) = service.send(message).await {
                tracing::error!(error = %e, "Auto-reply email failed");
            }
        });
    }

    /// Team notification plus, when the visitor left an email, a
    /// confirmation. Failures are logged and never returned.
    pub async fn send_callback_emails(&self, lead: &Lead, reference_id: &str) {
        let notification = callback_admin_notification(
            lead,
            reference_id,
            &self.site_url,
            self.email.recipients(),
        );
        if let Err(e) = self.email.send(notification).await {
            tracing::error!(error = %e, lead_id = lead.id, "Callback notification email failed");
            return;
        }

        if let Some(email) = lead.email.as_deref() {
            let team = self.team_address();
            let confirmation = callback_confirmation(lead, email, reference_id, team.as_deref());
            if let Err(e) = self.email.send(confirmation).await {
                tracing::error!(error = %e, lead_id = lead.id, "Callback confirmation email failed");
            }
        }
    }

    pub async fn send_transcript(
        &self,
        email: &str,
        transcript: &[HistoryEntry],
        reference_id: &str,
    ) -> Result<(), EmailError> {
        let team = self.team_address();
        self.email
            .send(transcript_for_visitor(
                email,
                transcript,
                reference_id,
                &self.site_url,
                team.as_deref(),
                Utc::now(),
            ))
            .await
    }

    pub async fn notify_transcript(&self, details: &TranscriptLead<'_>) -> Result<(), EmailError> {
        self.email
            .send(transcript_admin_notification(
                details,
                &self.site_url,
                self.email.recipients(),
                Utc::now(),
            ))
            .await
    }

    /// Fire-and-forget quota warning; failures are logged.
    pub fn spawn_quota_warning(&self, current: i64, quota: i64) {
        let service = self.email.clone();
        let message = quota_warning(current, quota, self.email.recipients());
        tokio::spawn(async move {
            match service.send(message).await {
                Ok(()) => tracing::warn!(
                    percentage = quota_percentage(current, quota),
                    "Search quota warning sent"
                ),
                Err(e) => tracing::error!(error = %e, "Quota warning email failed"),
            }
        });
    }
}
