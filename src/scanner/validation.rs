use std::fmt;

/// Why an extracted value was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotFound,
    TooShort,
    TooLong,
    InvalidCharacters,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Rejection::NotFound => "No identifier found in QR code",
            Rejection::TooShort => "Identifier too short",
            Rejection::TooLong => "Identifier too long",
            Rejection::InvalidCharacters => "Identifier contains unsupported characters",
        };
        f.write_str(message)
    }
}

/// Inclusive length bounds, in characters.
#[derive(Debug, Clone, Copy)]
pub struct IdentifierRules {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for IdentifierRules {
    fn default() -> Self {
        Self {
            min_len: 2,
            max_len: 100,
        }
    }
}

impl IdentifierRules {
    /// Accept `value` if it is within bounds and uses only alphanumerics,
    /// `-`, `_`, `.` and spaces.
    pub fn validate<'a>(&self, value: Option<&'a str>) -> Result<&'a str, Rejection> {
        let value = value.ok_or(Rejection::NotFound)?;
        let len = value.chars().count();

        if len < self.min_len {
            return Err(Rejection::TooShort);
        }
        if len > self.max_len {
            return Err(Rejection::TooLong);
        }

        let charset_ok = value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '));
        if !charset_ok {
            return Err(Rejection::InvalidCharacters);
        }

        Ok(value)
    }
}
