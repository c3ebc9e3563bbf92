//! Envelope argument parsers for HELO/EHLO, MAIL FROM and RCPT TO.

use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;

/// Matches `FROM:<address>[ esmtp-params]`, accepting `>` inside the address
/// as a quoted pair (`\>`) or inside a double-quoted local part.
static MAIL_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^FROM:\s*<((?:\\>|[^>])+|"[^"]+"@[^>]+)>( [\w= ]+)?$"#)
        .expect("hard-coded pattern compiles")
});

/// Matches one `KEY=VALUE` ESMTP parameter; the leading space is mandatory.
static ESMTP_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" (\w+)=(\w+)").expect("hard-coded pattern compiles"));

/// The pieces of a valid MAIL argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MailArgument {
    /// The address text between the angle brackets.
    pub address: String,
    /// The raw parameter tail after the closing bracket, if any.
    pub params: Option<String>,
}

/// Extract the client domain from a HELO/EHLO argument: everything up to the
/// first space, which must be non-empty.
pub(crate) fn parse_helo_argument(arg: &str) -> Option<&str> {
    let domain = arg.split(' ').next().unwrap_or(arg);
    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

/// Split a MAIL argument into address and optional ESMTP parameter tail.
pub(crate) fn parse_mail_argument(arg: &str) -> Option<MailArgument> {
    let captures = MAIL_FROM.captures(arg)?;
    Some(MailArgument {
        address: captures.get(1)?.as_str().to_string(),
        params: captures
            .get(2)
            .map(|m| m.as_str().to_string())
            .filter(|p| !p.is_empty()),
    })
}

/// Parse an ESMTP parameter tail (e.g. `" BODY=8BITMIME SIZE=1024"`) into a
/// map with uppercased keys.
///
/// Fails when no `KEY=VALUE` token matches at all, so a dangling tail with
/// no parameters in it is a syntax error rather than an empty map.
pub(crate) fn parse_esmtp_params(params: &str) -> Option<HashMap<String, String>> {
    let mut args = HashMap::new();
    for captures in ESMTP_PARAM.captures_iter(params) {
        args.insert(
            captures[1].to_ascii_uppercase(),
            captures[2].to_string(),
        );
    }
    if args.is_empty() {
        return None;
    }
    Some(args)
}

/// Extract the address text from a RCPT argument.
///
/// The remainder after `TO:` is trimmed of angle brackets and spaces; the
/// trim is deliberately forgiving about stray brackets.
pub(crate) fn parse_rcpt_argument(arg: &str) -> Option<&str> {
    if arg.len() < 4 {
        return None;
    }
    let prefix = arg.get(..3)?;
    if !prefix.eq_ignore_ascii_case("TO:") {
        return None;
    }
    Some(arg[3..].trim_matches(|c| matches!(c, '<' | '>' | ' ')))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn helo_argument() {
        assert_eq!(parse_helo_argument("client.example.com"), Some("client.example.com"));
        assert_eq!(
            parse_helo_argument("client.example.com ignored tail"),
            Some("client.example.com")
        );
        assert_eq!(parse_helo_argument(""), None);
        assert_eq!(parse_helo_argument(" leading"), None);
    }

    #[test]
    fn mail_argument_plain() {
        let parsed = parse_mail_argument("FROM:<john@gmail.com>").unwrap();
        assert_eq!(parsed.address, "john@gmail.com");
        assert_eq!(parsed.params, None);

        // Case-insensitive, optional space after the colon
        let parsed = parse_mail_argument("from: <john@gmail.com>").unwrap();
        assert_eq!(parsed.address, "john@gmail.com");
    }

    #[test]
    fn mail_argument_quoted_pair_and_quoted_string() {
        let parsed = parse_mail_argument(r"FROM:<odd\>ball@example.com>").unwrap();
        assert_eq!(parsed.address, r"odd\>ball@example.com");

        let parsed = parse_mail_argument(r#"FROM:<"first last"@example.com>"#).unwrap();
        assert_eq!(parsed.address, r#""first last"@example.com"#);
    }

    #[test]
    fn mail_argument_with_params() {
        let parsed = parse_mail_argument("FROM:<a@ex> BODY=8BITMIME SIZE=1024").unwrap();
        assert_eq!(parsed.address, "a@ex");
        assert_eq!(parsed.params.as_deref(), Some(" BODY=8BITMIME SIZE=1024"));
    }

    #[test]
    fn mail_argument_rejects() {
        assert_eq!(parse_mail_argument("TO:<a@ex>"), None);
        assert_eq!(parse_mail_argument("FROM:a@ex"), None);
        assert_eq!(parse_mail_argument("FROM:<>"), None);
        assert_eq!(parse_mail_argument("FROM:<a@ex> SIZE=12;DROP"), None);
    }

    #[test]
    fn esmtp_params_fold_keys() {
        let args = parse_esmtp_params(" body=8bitmime Size=1024").unwrap();
        assert_eq!(args.get("BODY").map(String::as_str), Some("8bitmime"));
        assert_eq!(args.get("SIZE").map(String::as_str), Some("1024"));
    }

    #[test]
    fn esmtp_params_require_a_token() {
        // A bare trailing space matched the params group but holds nothing
        assert_eq!(parse_esmtp_params(" "), None);
        assert_eq!(parse_esmtp_params(""), None);
    }

    #[test]
    fn rcpt_argument() {
        assert_eq!(parse_rcpt_argument("TO:<b@ex>"), Some("b@ex"));
        assert_eq!(parse_rcpt_argument("to:<b@ex>"), Some("b@ex"));
        // Forgiving trim: stray brackets and spaces are shed
        assert_eq!(parse_rcpt_argument("TO: <<b@ex> "), Some("b@ex"));
        assert_eq!(parse_rcpt_argument("TO:b@ex"), Some("b@ex"));

        assert_eq!(parse_rcpt_argument("TO:"), None);
        assert_eq!(parse_rcpt_argument("FOR:<b@ex>"), None);
        assert_eq!(parse_rcpt_argument(""), None);
    }
}
