/// Checks the character length of a text field, returning a caller-facing message on failure.
pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min {
        return Err(if min == 1 {
            format!("{} must not be empty", field)
        } else {
            format!("{} must be at least {} characters", field, min)
        });
    }
    if len > max {
        return Err(format!("{} must be at most {} characters", field, max));
    }
    Ok(())
}

/// Same as [`check_length`] for optional fields; `None` always passes.
pub fn check_optional_length(field: &str, value: Option<&str>, max: usize) -> Result<(), String> {
    match value {
        Some(value) => check_length(field, value, 0, max),
        None => Ok(()),
    }
}
