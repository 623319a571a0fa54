//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a room code is exactly 4 ASCII alphanumeric characters.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("AB12") // Ok
/// validate_room_code("AB1")  // Err - too short
/// validate_room_code("AB-2") // Err - not alphanumeric
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.chars().count() != 4 {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be exactly 4 characters (got {})",
                code.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}
