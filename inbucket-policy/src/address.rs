//! Syntactic validation for SMTP mailbox addresses.
//!
//! Validates the bare `local-part@domain` text extracted from MAIL FROM and
//! RCPT TO arguments, after the envelope parser has stripped the angle
//! bracket path syntax.
//!
//! The accepted grammar follows RFC 5321 section 4.1.2:
//!
//! ```text
//! Mailbox        = Local-part "@" ( Domain / address-literal )
//! Local-part     = Dot-string / Quoted-string
//! Dot-string     = Atom *("." Atom)
//! Quoted-string  = DQUOTE *QcontentSMTP DQUOTE
//! Domain         = sub-domain *("." sub-domain)
//! sub-domain     = Let-dig [Ldh-str]
//! ```
//!
//! # Size Constraints
//!
//! - Maximum mailbox length: 320 octets
//! - Maximum local-part: 64 octets
//! - Maximum domain: 255 octets

use thiserror::Error;

const MAX_MAILBOX_OCTETS: usize = 320;
const MAX_LOCAL_PART_OCTETS: usize = 64;
const MAX_DOMAIN_OCTETS: usize = 255;

/// Errors that can occur during address validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,

    #[error("Mailbox exceeds {MAX_MAILBOX_OCTETS} octets")]
    MailboxTooLong,

    #[error("Local-part exceeds {MAX_LOCAL_PART_OCTETS} octets")]
    LocalPartTooLong,

    #[error("Domain exceeds {MAX_DOMAIN_OCTETS} octets")]
    DomainTooLong,

    #[error("Missing '@' separator in mailbox")]
    MissingAtSign,

    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Unclosed quoted string in local-part")]
    UnclosedQuotedString,
}

/// Result type for address validation
pub type Result<T> = std::result::Result<T, AddressError>;

/// Split and validate a `local-part@domain` mailbox.
///
/// Returns the local part and domain as separate strings. The local part of
/// a quoted-string mailbox is returned with its quotes intact, since they
/// are significant for routing.
///
/// # Errors
///
/// Returns `AddressError` describing the first rule the input breaks.
pub fn parse_email_address(input: &str) -> Result<(String, String)> {
    if input.is_empty() {
        return Err(AddressError::Empty);
    }
    if input.len() > MAX_MAILBOX_OCTETS {
        return Err(AddressError::MailboxTooLong);
    }

    let (local, domain) = split_mailbox(input)?;

    if local.is_empty() {
        return Err(AddressError::InvalidLocalPart("empty".to_string()));
    }
    if local.len() > MAX_LOCAL_PART_OCTETS {
        return Err(AddressError::LocalPartTooLong);
    }
    if domain.is_empty() {
        return Err(AddressError::InvalidDomain("empty".to_string()));
    }
    if domain.len() > MAX_DOMAIN_OCTETS {
        return Err(AddressError::DomainTooLong);
    }

    if local.starts_with('"') {
        validate_quoted_local(local)?;
    } else {
        validate_dot_string(local)?;
    }

    if domain.starts_with('[') {
        validate_address_literal(domain)?;
    } else {
        validate_domain(domain)?;
    }

    Ok((local.to_string(), domain.to_string()))
}

/// Locate the '@' that separates local part from domain.
///
/// For a quoted local part the separator is the first '@' after the closing
/// quote; otherwise it is the last '@' in the input, which keeps a stray
/// quoted '@' out of the domain.
fn split_mailbox(input: &str) -> Result<(&str, &str)> {
    let at = if input.starts_with('"') {
        let close = closing_quote(input)?;
        match input[close + 1..].find('@') {
            Some(idx) => close + 1 + idx,
            None => return Err(AddressError::MissingAtSign),
        }
    } else {
        input.rfind('@').ok_or(AddressError::MissingAtSign)?
    };

    Ok((&input[..at], &input[at + 1..]))
}

/// Index of the closing quote of a quoted string starting at byte 0.
fn closing_quote(input: &str) -> Result<usize> {
    let bytes = input.as_bytes();
    let mut idx = 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            b'"' => return Ok(idx),
            _ => idx += 1,
        }
    }
    Err(AddressError::UnclosedQuotedString)
}

/// RFC 5321 atext: the characters an unquoted atom may contain.
const fn is_atext(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'/'
                | b'='
                | b'?'
                | b'^'
                | b'_'
                | b'`'
                | b'{'
                | b'|'
                | b'}'
                | b'~'
        )
}

fn validate_dot_string(local: &str) -> Result<()> {
    for atom in local.split('.') {
        if atom.is_empty() {
            return Err(AddressError::InvalidLocalPart(format!(
                "empty atom in {local:?}"
            )));
        }
        if !atom.bytes().all(is_atext) {
            return Err(AddressError::InvalidLocalPart(local.to_string()));
        }
    }
    Ok(())
}

fn validate_quoted_local(local: &str) -> Result<()> {
    let close = closing_quote(local)?;
    if close != local.len() - 1 {
        return Err(AddressError::InvalidLocalPart(format!(
            "text after quoted string in {local:?}"
        )));
    }

    let bytes = local.as_bytes();
    let mut idx = 1;
    while idx < close {
        match bytes[idx] {
            // quoted-pairSMTP: backslash followed by any ASCII graphic
            b'\\' => {
                if idx + 1 >= close || !(32..=126).contains(&bytes[idx + 1]) {
                    return Err(AddressError::InvalidLocalPart(local.to_string()));
                }
                idx += 2;
            }
            // qtextSMTP: printable ASCII except '"' and '\'
            32..=33 | 35..=91 | 93..=126 => idx += 1,
            _ => return Err(AddressError::InvalidLocalPart(local.to_string())),
        }
    }
    Ok(())
}

fn validate_domain(domain: &str) -> Result<()> {
    for label in domain.split('.') {
        if label.is_empty() {
            return Err(AddressError::InvalidDomain(format!(
                "empty label in {domain:?}"
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(AddressError::InvalidDomain(domain.to_string()));
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return Err(AddressError::InvalidDomain(domain.to_string()));
        }
    }
    Ok(())
}

/// Bracketed address literals, e.g. `[192.168.0.1]` or `[IPv6:::1]`.
fn validate_address_literal(domain: &str) -> Result<()> {
    let inner = domain
        .strip_prefix('[')
        .and_then(|d| d.strip_suffix(']'))
        .ok_or_else(|| AddressError::InvalidDomain(domain.to_string()))?;

    if inner.is_empty()
        || !inner
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b':'))
    {
        return Err(AddressError::InvalidDomain(domain.to_string()));
    }
    Ok(())
}
