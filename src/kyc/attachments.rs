// Validation of the two KYC uploads

use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::models::Attachment;

pub const FIELD_NATIONAL_ID: &str = "nationalId";
pub const FIELD_SELFIE: &str = "selfie";

pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "application/pdf"];

/// Both documents of one submission
#[derive(Debug, Clone)]
pub struct KycSubmission {
    pub national_id: Attachment,
    pub selfie: Attachment,
}

/// Declared MIME type, falling back to the extension when absent or generic
pub fn resolve_content_type(declared: Option<&str>, file_name: &str) -> Option<String> {
    let declared = declared
        .map(|d| d.split(';').next().unwrap_or(d).trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty() && d != "application/octet-stream");

    if let Some(content_type) = declared {
        return Some(content_type);
    }

    let extension = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    let inferred = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(inferred.to_string())
}

/// Non-empty, within `max_bytes`, and of an allowed type
pub fn validate_attachment(field: &str, attachment: &Attachment, max_bytes: usize) -> ServiceResult<()> {
    if attachment.bytes.is_empty() {
        return Err(ServiceError::ValidationError(format!("{} is empty", field)));
    }

    if attachment.bytes.len() > max_bytes {
        return Err(ServiceError::ValidationError(format!(
            "{} exceeds the {} byte limit",
            field, max_bytes
        )));
    }

    if !ALLOWED_CONTENT_TYPES.contains(&attachment.content_type.as_str()) {
        return Err(ServiceError::ValidationError(format!(
            "{} must be a JPEG, PNG or PDF file",
            field
        )));
    }

    Ok(())
}

/// Collects multipart fields into a `KycSubmission`
pub struct SubmissionBuilder {
    max_bytes: usize,
    national_id: Option<Attachment>,
    selfie: Option<Attachment>,
}

impl SubmissionBuilder {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            national_id: None,
            selfie: None,
        }
    }

    /// Validate and slot one field; unknown or repeated fields are rejected
    pub fn add(&mut self, field: &str, attachment: Attachment) -> ServiceResult<()> {
        let slot = match field {
            FIELD_NATIONAL_ID => &mut self.national_id,
            FIELD_SELFIE => &mut self.selfie,
            other => {
                return Err(ServiceError::ValidationError(format!(
                    "Unexpected field '{}'",
                    other
                )))
            }
        };

        if slot.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Only one {} file is allowed",
                field
            )));
        }

        validate_attachment(field, &attachment, self.max_bytes)?;
        *slot = Some(attachment);
        Ok(())
    }

    pub fn finish(self) -> ServiceResult<KycSubmission> {
        match (self.national_id, self.selfie) {
            (Some(national_id), Some(selfie)) => Ok(KycSubmission { national_id, selfie }),
            _ => Err(ServiceError::ValidationError(
                "Both national ID and selfie are required".to_string(),
            )),
        }
    }
}
