//! Validation helpers for DTOs.

use validator::ValidationError;

/// Length of the client-generated user token.
pub const USER_TOKEN_LEN: usize = 21;

/// Validates that a user id is a 21-character URL-safe token.
///
/// # Examples
///
/// ```ignore
/// validate_user_token("V1StGXR8_Z5jdHi6B-myT") // Ok
/// validate_user_token("too-short")             // Err
/// validate_user_token("V1StGXR8 Z5jdHi6B-myT") // Err - space
/// ```
pub fn validate_user_token(id: &str) -> Result<(), ValidationError> {
    if id.chars().count() != USER_TOKEN_LEN {
        let mut err = ValidationError::new("user_token_length");
        err.message = Some(
            format!(
                "User id must be exactly {USER_TOKEN_LEN} characters (got {})",
                id.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        let mut err = ValidationError::new("user_token_format");
        err.message =
            Some("User id must contain only alphanumeric, `_` or `-` characters".into());
        return Err(err);
    }

    Ok(())
}
