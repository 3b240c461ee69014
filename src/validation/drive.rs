use crate::error::{AppError, Result};

/// Characters OneDrive refuses in file and folder names.
const FORBIDDEN_NAME_CHARS: &[char] = &['"', '*', ':', '<', '>', '?', '/', '\\', '|'];

/// Validates a drive item id before it is placed in a Graph URL.
///
/// Item ids are opaque, but in practice only use letters, digits and `!_.-`.
/// Anything else is rejected so an id can never alter the request path.
pub fn validate_item_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 256 || is_dot_segment(id) {
        return Err(AppError::Validation("Invalid item id".to_string()));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '!' | '_' | '.' | '-'))
    {
        return Err(AppError::Validation("Invalid item id".to_string()));
    }

    Ok(())
}

/// Validates a slash-separated folder path under the drive root.
///
/// Segments made only of dots are rejected: URL parsing resolves `.` and `..`
/// (encoded or not), which would move the request outside `/me/drive/root:`.
pub fn validate_drive_path(path: &str) -> Result<()> {
    if path.len() > 1024 {
        return Err(AppError::Validation("Invalid path".to_string()));
    }

    if path.chars().any(char::is_control)
        || path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .any(is_dot_segment)
    {
        return Err(AppError::Validation("Invalid path".to_string()));
    }

    Ok(())
}

fn is_dot_segment(segment: &str) -> bool {
    segment.chars().all(|c| c == '.')
}

/// Validates an item name.
///
/// # Arguments
///
/// * `name` - The name to validate, already trimmed.
/// * `missing` - The message returned when the name is empty.
///
/// # Returns
///
/// A `Result<()>` indicating whether the name is valid.
pub fn validate_name(name: &str, missing: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AppError::Validation(missing.to_string()));
    }

    if name.len() > 255 {
        return Err(AppError::Validation(
            "Name must be at most 255 characters".to_string(),
        ));
    }

    if name.contains(FORBIDDEN_NAME_CHARS) || name.chars().any(char::is_control) {
        return Err(AppError::Validation(
            "Name contains characters OneDrive does not allow".to_string(),
        ));
    }

    if name.ends_with('.') || name.ends_with(' ') {
        return Err(AppError::Validation(
            "Name cannot end with a dot or a space".to_string(),
        ));
    }

    Ok(())
}

/// Validates the target and recipients of a share invitation.
pub fn validate_share(item_id: Option<&str>, emails: &[String]) -> Result<()> {
    let item_id = item_id.unwrap_or_default();
    if item_id.is_empty() || emails.iter().all(|e| e.trim().is_empty()) {
        return Err(AppError::Validation(
            "itemId and emails are required".to_string(),
        ));
    }

    validate_item_id(item_id)?;

    if let Some(bad) = emails
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .find(|e| !looks_like_email(e))
    {
        return Err(AppError::Validation(format!("Invalid email address: {}", bad)));
    }

    Ok(())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
