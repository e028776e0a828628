use std::error::Error;
use std::fmt::Display;

#[derive(Clone, Debug, PartialEq)]
pub enum InvalidApiKeyReason {
    Missing,
    Empty,
    TooLong,
    NotAscii,
    NullByte,
}

impl InvalidApiKeyReason {
    pub fn reason(&self) -> &str {
        match *self {
            Self::Missing => "missing",
            Self::Empty => "empty",
            Self::TooLong => "too_long",
            Self::NotAscii => "not_ascii",
            Self::NullByte => "null_byte",
        }
    }
}

impl Display for InvalidApiKeyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

impl Error for InvalidApiKeyReason {}

/// Checks that an API key has a plausible shape before it is looked up.
/// A well-formed key can still be unknown to the store.
pub fn validate_api_key(api_key: Option<&str>) -> Result<&str, InvalidApiKeyReason> {
    let api_key = api_key.ok_or(InvalidApiKeyReason::Missing)?;

    if api_key.is_empty() {
        return Err(InvalidApiKeyReason::Empty);
    }

    if api_key.len() > 64 {
        return Err(InvalidApiKeyReason::TooLong);
    }

    if !api_key.is_ascii() {
        return Err(InvalidApiKeyReason::NotAscii);
    }

    if api_key.contains('\0') {
        return Err(InvalidApiKeyReason::NullByte);
    }

    Ok(api_key)
}
