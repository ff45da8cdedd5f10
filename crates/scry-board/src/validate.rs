//! Input validation, applied before any evaluator call or store access.

use scry_common::{LimitsConfig, ScryError};

/// Maximum board name length in bytes.
pub const MAX_NAME_BYTES: usize = 128;

/// Check a board name.
///
/// Names are used as URL path segments and store keys, so they must be
/// non-empty, at most 128 bytes, free of `/`, NUL, CR and LF, and must not
/// start with `.` or start/end with a space.
pub fn validate_name(name: &str) -> Result<(), ScryError> {
    if name.is_empty() {
        return Err(ScryError::validation("Board name cannot be empty"));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(ScryError::validation(format!(
            "Board name too long ({} bytes, max {MAX_NAME_BYTES})",
            name.len()
        )));
    }
    if name.contains(['/', '\0', '\n', '\r']) {
        return Err(ScryError::validation(
            "Board name cannot contain /, null, or newline characters",
        ));
    }
    if name.starts_with('.') || name.starts_with(' ') || name.ends_with(' ') {
        return Err(ScryError::validation(
            "Board name cannot start with '.' or have leading/trailing spaces",
        ));
    }
    Ok(())
}

pub fn validate_dimensions(width: u32, height: u32, max: u32) -> Result<(), ScryError> {
    if width == 0 || height == 0 {
        return Err(ScryError::validation(
            "Width and height must be greater than zero",
        ));
    }
    if width > max || height > max {
        return Err(ScryError::validation(format!(
            "Width and height must be at most {max}"
        )));
    }
    Ok(())
}

pub fn validate_code(code: &str, max_bytes: usize) -> Result<(), ScryError> {
    if code.len() > max_bytes {
        return Err(ScryError::validation(format!(
            "Code too large ({} bytes, max {max_bytes})",
            code.len()
        )));
    }
    Ok(())
}

/// Alt text is bounded in characters, not bytes.
pub fn validate_alt(alt: &str, max_chars: usize) -> Result<(), ScryError> {
    let chars = alt.chars().count();
    if chars > max_chars {
        return Err(ScryError::validation(format!(
            "Alt text too long ({chars} characters, max {max_chars})"
        )));
    }
    Ok(())
}

/// Validate every caller-supplied field of an execution.
pub fn validate_inputs(
    name: &str,
    code: &str,
    width: Option<u32>,
    height: Option<u32>,
    alt: Option<&str>,
    limits: &LimitsConfig,
) -> Result<(), ScryError> {
    validate_name(name)?;
    validate_code(code, limits.max_code_bytes)?;
    validate_dimensions(
        width.unwrap_or(limits.default_width),
        height.unwrap_or(limits.default_height),
        limits.max_canvas_dimension,
    )?;
    if let Some(alt) = alt {
        validate_alt(alt, limits.max_alt_chars)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ordinary_names() {
        for name in ["demo", "my board", "a.b", "日本語", "x-1_2~3", &"n".repeat(128)] {
            assert!(validate_name(name).is_ok(), "{name:?} should be accepted");
        }
    }

    #[test]
    fn test_rejects_bad_names() {
        let long = "n".repeat(129);
        for name in [
            "",
            long.as_str(),
            "a/b",
            "a\0b",
            "a\nb",
            "a\rb",
            ".hidden",
            " leading",
            "trailing ",
        ] {
            assert!(
                matches!(validate_name(name), Err(ScryError::Validation { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_name_limit_is_bytes() {
        // 43 three-byte characters = 129 bytes
        let name = "日".repeat(43);
        assert!(validate_name(&name).is_err());
        assert!(validate_name(&"日".repeat(42)).is_ok());
    }

    #[test]
    fn test_dimensions() {
        assert!(validate_dimensions(1, 1, 8192).is_ok());
        assert!(validate_dimensions(8192, 8192, 8192).is_ok());
        assert!(validate_dimensions(0, 10, 8192).is_err());
        assert!(validate_dimensions(10, 8193, 8192).is_err());
    }

    #[test]
    fn test_code_size() {
        assert!(validate_code(&"x".repeat(1_000_000), 1_000_000).is_ok());
        assert!(validate_code(&"x".repeat(1_000_001), 1_000_000).is_err());
    }

    #[test]
    fn test_alt_counts_characters() {
        assert!(validate_alt(&"é".repeat(1000), 1000).is_ok());
        assert!(validate_alt(&"é".repeat(1001), 1000).is_err());
    }

    #[test]
    fn test_validate_inputs_uses_defaults() {
        let limits = LimitsConfig::default();
        assert!(validate_inputs("demo", "print(1)", None, None, None, &limits).is_ok());
        assert!(validate_inputs("demo", "print(1)", Some(0), None, None, &limits).is_err());
    }
}
