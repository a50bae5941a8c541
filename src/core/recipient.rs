//! Contact normalization and self-transfer detection

use crate::types::{LedgerError, PeerRecipient, UserProfile};

/// Digits of a phone number, keeping the last ten so `+234 803 ...` and
/// `0803 ...` compare equal
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let start = digits.len().saturating_sub(10);
    Some(digits[start..].to_string())
}

pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_lowercase();
    (!normalized.is_empty()).then_some(normalized)
}

/// Reject a recipient whose phone or email resolves to the sender
///
/// # Errors
///
/// [`LedgerError::SelfTransferNotAllowed`] on a match.
pub fn ensure_not_self(sender: &UserProfile, recipient: &PeerRecipient) -> Result<(), LedgerError> {
    let same_phone = match (
        sender.phone.as_deref().and_then(normalize_phone),
        recipient.phone.as_deref().and_then(normalize_phone),
    ) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    let same_email = match (
        normalize_email(&sender.email),
        recipient.email.as_deref().and_then(normalize_email),
    ) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };

    if same_phone || same_email {
        Err(LedgerError::SelfTransferNotAllowed)
    } else {
        Ok(())
    }
}
