//! Inbound envelope normalization
//!
//! Callers hand the core a loosely-typed `(to, subject, message, headers,
//! attachments)` bundle. This boundary turns it into a validated
//! [`SendRequest`]: header lines are split into cc / bcc / reply-to /
//! content-type, address lists are parsed, and invalid addresses are rejected
//! here so adapters never see them.

use crate::domain::{AttachmentRef, Recipient, SendRequest};
use crate::error::{DispatchError, Result};
use std::path::PathBuf;
use validator::ValidateEmail;

/// Loosely-typed email envelope as received from the embedding environment
#[derive(Debug, Clone, Default)]
pub struct RawEnvelope {
    pub to: Vec<String>,
    pub subject: String,
    pub message: String,
    /// Raw header lines, e.g. `Cc: Ada <ada@example.com>, bob@example.com`
    pub headers: Vec<String>,
    pub attachments: Vec<PathBuf>,
}

/// Normalize a raw envelope into a [`SendRequest`].
pub fn normalize(envelope: RawEnvelope) -> Result<SendRequest> {
    if envelope.to.is_empty() {
        return Err(DispatchError::Configuration(
            "No recipients specified".to_string(),
        ));
    }

    let to = envelope
        .to
        .iter()
        .map(|raw| parse_address(raw))
        .collect::<Result<Vec<_>>>()?;

    let mut cc = Vec::new();
    let mut bcc = Vec::new();
    let mut reply_to = Vec::new();
    let mut is_html = false;

    for line in &envelope.headers {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "cc" => cc.extend(parse_address_list(value)?),
            "bcc" => bcc.extend(parse_address_list(value)?),
            "reply-to" => reply_to.extend(parse_address_list(value)?),
            "content-type" => {
                is_html = value.to_ascii_lowercase().contains("text/html");
            }
            _ => {}
        }
    }

    Ok(SendRequest {
        to,
        cc,
        bcc,
        reply_to,
        subject: envelope.subject,
        body: envelope.message,
        is_html,
        attachments: envelope
            .attachments
            .into_iter()
            .map(AttachmentRef::Path)
            .collect(),
        from_override: None,
    })
}

/// Parse one address in `Name <email>` or bare `email` form.
pub fn parse_address(raw: &str) -> Result<Recipient> {
    let raw = raw.trim();
    let recipient = match (raw.rfind('<'), raw.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let email = raw[open + 1..close].trim().to_string();
            let name = raw[..open].trim().trim_matches('"').to_string();
            if name.is_empty() {
                Recipient::new(email)
            } else {
                Recipient::with_name(email, name)
            }
        }
        _ => Recipient::new(raw),
    };

    if !recipient.email.validate_email() {
        return Err(DispatchError::Configuration(format!(
            "Invalid email address: {}",
            raw
        )));
    }
    Ok(recipient)
}

fn parse_address_list(value: &str) -> Result<Vec<Recipient>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_address)
        .collect()
}
