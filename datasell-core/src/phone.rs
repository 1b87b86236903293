/// International dialling prefix rewritten to the local trunk digit.
const COUNTRY_PREFIX: &str = "+233";
const TRUNK_PREFIX: char = '0';
const LOCAL_LENGTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhoneError {
    #[error("Please enter a valid 10-digit MTN number starting with 0")]
    InvalidFormat(String),
}

/// Normalize a destination number to the 10-digit local format.
///
/// Whitespace is stripped and a leading `+233` becomes `0`. The result must
/// be `0` followed by nine digits.
pub fn normalize_phone(raw: &str) -> Result<String, PhoneError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    let local = match compact.strip_prefix(COUNTRY_PREFIX) {
        Some(rest) => format!("{}{}", TRUNK_PREFIX, rest),
        None => compact,
    };

    let well_formed = local.len() == LOCAL_LENGTH
        && local.starts_with(TRUNK_PREFIX)
        && local.chars().all(|c| c.is_ascii_digit());

    if well_formed {
        Ok(local)
    } else {
        Err(PhoneError::InvalidFormat(raw.to_string()))
    }
}
