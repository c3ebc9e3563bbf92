//! Wire-line command splitting.
//!
//! SMTP commands are a four-letter verb, optionally followed by a single
//! space and an argument string. The split is deliberately strict about
//! shape: a line of one to three bytes cannot hold a verb, and a five byte
//! line is too long to be a bare verb but too short to carry an argument.

use phf::phf_set;

/// Every verb the server recognises, implemented or not.
static COMMANDS: phf::Set<&'static str> = phf_set! {
    "HELO", "EHLO", "MAIL", "RCPT", "DATA", "RSET", "SEND", "SOML", "SAML",
    "VRFY", "EXPN", "HELP", "NOOP", "QUIT", "TURN",
};

/// Whether `verb` (already uppercased) is in the recognised set.
pub(crate) fn is_recognized(verb: &str) -> bool {
    COMMANDS.contains(verb)
}

/// A wire line split into its command parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommandLine {
    /// The client sent a blank line.
    Empty,
    /// A verb, uppercased, and its argument with surrounding spaces trimmed.
    Parsed { verb: String, arg: String },
}

/// Split one line (line endings already stripped or not, both accepted)
/// into verb and argument. `None` means the line is garbled.
pub(crate) fn parse_command(line: &str) -> Option<CommandLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    match line.len() {
        0 => Some(CommandLine::Empty),
        1..=3 => None,
        4 => Some(CommandLine::Parsed {
            verb: line.to_ascii_uppercase(),
            arg: String::new(),
        }),
        // Too long to be only a verb, too short to carry an argument
        5 => None,
        _ => {
            if line.as_bytes()[4] != b' ' {
                return None;
            }
            // Byte-indexed splits; a char boundary violation is hostile
            // input, not a panic
            let verb = line.get(..4)?;
            let arg = line.get(5..)?;
            Some(CommandLine::Parsed {
                verb: verb.to_ascii_uppercase(),
                arg: arg.trim_matches(' ').to_string(),
            })
        }
    }
}
