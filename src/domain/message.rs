//! Normalized send request, recipients, attachments and send results

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Email address with optional display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
}

impl Recipient {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }

    /// Wire formatting: `Name <email>` when a name is present, bare email
    /// otherwise. A name equal to the address adds nothing and is dropped.
    pub fn format(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() && name != &self.email => {
                format!("{} <{}>", name, self.email)
            }
            _ => self.email.clone(),
        }
    }
}

/// Normalized outbound email envelope.
///
/// Built once by the caller (usually via [`crate::envelope::normalize`]) and
/// consumed by exactly one adapter invocation per attempt.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub to: Vec<Recipient>,
    pub cc: Vec<Recipient>,
    pub bcc: Vec<Recipient>,
    pub reply_to: Vec<Recipient>,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
    pub attachments: Vec<AttachmentRef>,
    pub from_override: Option<Recipient>,
}

impl SendRequest {
    pub fn new(to: Vec<Recipient>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to,
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            subject: subject.into(),
            body: body.into(),
            is_html: false,
            attachments: Vec::new(),
            from_override: None,
        }
    }

    pub fn html(mut self) -> Self {
        self.is_html = true;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentRef>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Reference to an attachment, resolved once per send
#[derive(Debug, Clone)]
pub enum AttachmentRef {
    /// A file on the local filesystem
    Path(PathBuf),
    /// Inline content supplied by the caller
    Inline {
        name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
}

/// Resolved attachment content handed to an adapter
#[derive(Debug, Clone)]
pub struct AttachmentData {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl AttachmentRef {
    /// Resolve the reference into concrete bytes.
    ///
    /// Path attachments are read from disk; the MIME type comes from the file
    /// extension (content sniffing is deliberately out of scope).
    pub async fn resolve(&self) -> std::io::Result<AttachmentData> {
        match self {
            AttachmentRef::Inline {
                name,
                mime_type,
                bytes,
            } => Ok(AttachmentData {
                name: name.clone(),
                mime_type: mime_type.clone(),
                bytes: bytes.clone(),
            }),
            AttachmentRef::Path(path) => {
                let bytes = tokio::fs::read(path).await?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "attachment".to_string());
                let mime_type = mime_from_extension(
                    path.extension().and_then(|e| e.to_str()).unwrap_or(""),
                )
                .to_string();
                Ok(AttachmentData {
                    name,
                    mime_type,
                    bytes,
                })
            }
        }
    }
}

fn mime_from_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "zip" => "application/zip",
        "json" => "application/json",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

/// Terminal value returned per send attempt; never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    pub message: String,
    pub provider_message_id: Option<String>,
    pub error_code: Option<u16>,
    pub retryable: bool,
}

impl SendResult {
    /// Successful delivery to the provider
    pub fn sent(message: impl Into<String>, provider_message_id: Option<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            provider_message_id,
            error_code: None,
            retryable: false,
        }
    }

    /// Missing or invalid configuration; retrying cannot help
    pub fn config_error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            provider_message_id: None,
            error_code: None,
            retryable: false,
        }
    }

    /// Provider or transport failure with explicit retry classification
    pub fn failure(message: impl Into<String>, error_code: Option<u16>, retryable: bool) -> Self {
        Self {
            success: false,
            message: message.into(),
            provider_message_id: None,
            error_code,
            retryable,
        }
    }
}
