//! Package specifier validation.
//!
//! Requested packages are caller input and flow into code issued to the
//! engine's installer module, so they are validated byte-wise before any
//! install attempt. A specifier is a name with an optional version
//! constraint: `numpy`, `pandas==2.0.0`, `numpy>=1.0,<2.0`.

use crate::config::{MAX_PACKAGE_NAME_LENGTH, MAX_PACKAGES};

/// Validate one package specifier.
///
/// Name: `[a-zA-Z0-9_\-\.]+`. Version (optional): an operator from
/// `[@=<>~]` followed by `[a-zA-Z0-9_\-\.@=<>~\^\*\[\], ]+`. `/` is
/// excluded everywhere — it turns a specifier into a local-path install.
pub fn validate_package_spec(spec: &str) -> Result<(), String> {
    if spec.is_empty() {
        return Err("Package name cannot be empty".into());
    }
    if spec.len() > MAX_PACKAGE_NAME_LENGTH {
        return Err(format!(
            "Package name too long: {} bytes (max {})",
            spec.len(),
            MAX_PACKAGE_NAME_LENGTH
        ));
    }
    if spec.contains("..") || spec.contains('/') || spec.contains('\\') {
        return Err(format!(
            "Invalid package name: '{spec}' (path characters not allowed)"
        ));
    }
    if spec.contains('\0') {
        return Err("Package name contains null byte".into());
    }
    if spec.chars().any(|c| c.is_control()) {
        return Err(format!(
            "Invalid package name: '{spec}' (control characters not allowed)"
        ));
    }

    let (name, version_part) = match spec.find(['@', '=', '<', '>', '~']) {
        Some(0) => {
            return Err(format!(
                "Invalid package name: '{spec}' (missing name before version)"
            ));
        }
        Some(op_start) => (&spec[..op_start], &spec[op_start..]),
        None => (spec, ""),
    };

    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
    {
        return Err(format!(
            "Invalid package name: '{spec}' (contains invalid characters)"
        ));
    }

    if !version_part.is_empty() {
        // Reject a bare operator with nothing after it ("numpy=", "a==").
        if version_part
            .bytes()
            .all(|b| matches!(b, b'@' | b'=' | b'<' | b'>' | b'~'))
        {
            return Err(format!(
                "Invalid package specifier: '{spec}' (empty version after operator)"
            ));
        }
        if !version_part.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'_' | b'-'
                        | b'.'
                        | b'@'
                        | b'='
                        | b'<'
                        | b'>'
                        | b'~'
                        | b'^'
                        | b'*'
                        | b'['
                        | b']'
                        | b','
                        | b' '
                )
        }) {
            return Err(format!(
                "Invalid package name: '{spec}' (contains invalid characters)"
            ));
        }
    }

    Ok(())
}

/// Validate a whole install request.
pub fn validate_package_list(packages: &[String]) -> Result<(), String> {
    if packages.len() > MAX_PACKAGES {
        return Err(format!(
            "Too many packages: {} (max {})",
            packages.len(),
            MAX_PACKAGES
        ));
    }
    for spec in packages {
        validate_package_spec(spec)?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
