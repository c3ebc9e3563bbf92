//! One SMTP session per accepted connection.
//!
//! The session owns its half of the socket and drives the envelope dialogue
//! as a state machine: GREET until a valid HELO/EHLO, READY until MAIL,
//! MAIL while RCPTs accumulate, then DATA streams the payload, and QUIT
//! ends the loop. Commands with the same meaning in every state (NOOP,
//! RSET, QUIT, VRFY and the unimplemented family) are answered before the
//! per-state handlers see them.

use std::{fmt, net::SocketAddr, sync::Arc};

use inbucket_common::{error::SessionError, incoming, internal, outgoing};
use inbucket_metrics::metrics;
use inbucket_policy::{AddressPolicy, Recipient};
use inbucket_storage::DeliveryManager;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf},
    time::timeout,
};

use crate::{
    command::{self, CommandLine},
    config::SmtpConfig,
    envelope,
};

/// Timestamp layout for the Received trace header, RFC 822 style.
const TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z (%Z)";

/// The mode the session's state machine is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    /// Waiting for HELO
    Greet,
    /// Got HELO, waiting for MAIL
    Ready,
    /// Got MAIL, accepting RCPTs
    Mail,
    /// Got DATA, reading payload until the lone dot
    Data,
    /// Client requested end of session
    Quit,
}

impl fmt::Display for State {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::Greet => "GREET",
            Self::Ready => "READY",
            Self::Mail => "MAIL",
            Self::Data => "DATA",
            Self::Quit => "QUIT",
        })
    }
}

pub(crate) struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    config: Arc<SmtpConfig>,
    policy: Arc<AddressPolicy>,
    manager: Arc<DeliveryManager>,
    id: u64,
    state: State,
    reader: BufReader<ReadHalf<Stream>>,
    writer: WriteHalf<Stream>,
    /// Peer IP literal, port stripped; fixed at construction.
    remote_host: String,
    /// Client-supplied HELO/EHLO name; survives RSET.
    remote_domain: String,
    from: String,
    recipients: Vec<Recipient>,
    /// First write failure; once set, no further sends are attempted and
    /// the command loop exits.
    send_error: Option<SessionError>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub(crate) fn create(
        stream: Stream,
        peer: SocketAddr,
        id: u64,
        config: Arc<SmtpConfig>,
        policy: Arc<AddressPolicy>,
        manager: Arc<DeliveryManager>,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            config,
            policy,
            manager,
            id,
            state: State::Greet,
            reader: BufReader::new(reader),
            writer,
            remote_host: peer.ip().to_string(),
            remote_domain: String::new(),
            from: String::new(),
            recipients: Vec::new(),
            send_error: None,
        }
    }

    /// Session flow:
    ///  1. Send initial greeting
    ///  2. Receive command
    ///  3. If good command, respond, optionally change state
    ///  4. If bad command, respond with an error
    ///  5. Goto 2
    #[tracing::instrument(level = "trace", skip_all, fields(session = self.id, remote = %self.remote_host))]
    pub(crate) async fn run(mut self) {
        self.info(format_args!("Starting session"));
        self.greet().await;

        while self.state != State::Quit && self.send_error.is_none() {
            if self.state == State::Data {
                // Special case, does not use the SMTP command format
                self.data_handler().await;
                continue;
            }

            let line = match self.read_line().await {
                Ok(line) => line,
                Err(SessionError::Closed) => {
                    match self.state {
                        // EOF is common here
                        State::Greet | State::Ready => self.info(format_args!(
                            "Client closed connection (state {})",
                            self.state
                        )),
                        _ => self.warn(format_args!("Got EOF while in state {}", self.state)),
                    }
                    break;
                }
                Err(err) if err.is_timeout() => {
                    self.warn(format_args!("Connection error: {err}"));
                    self.send("221 Idle timeout, bye bye").await;
                    break;
                }
                Err(err) => {
                    self.warn(format_args!("Connection error: {err}"));
                    self.send("221 Connection error, sorry").await;
                    break;
                }
            };

            let Some(parsed) = command::parse_command(&line) else {
                self.send("500 Syntax error, command garbled").await;
                continue;
            };
            let (verb, arg) = match parsed {
                CommandLine::Empty => {
                    self.send("500 Speak up").await;
                    continue;
                }
                CommandLine::Parsed { verb, arg } => (verb, arg),
            };

            if !command::is_recognized(&verb) {
                self.send(&format!("500 Syntax error, {verb} command unrecognized"))
                    .await;
                self.warn(format_args!("Unrecognized command: {verb}"));
                continue;
            }

            // Commands we handle in any state
            match verb.as_str() {
                "SEND" | "SOML" | "SAML" | "EXPN" | "HELP" | "TURN" => {
                    self.send(&format!("502 {verb} command not implemented"))
                        .await;
                    self.warn(format_args!("Command {verb} not implemented"));
                    continue;
                }
                "VRFY" => {
                    self.send("252 Cannot VRFY user, but will accept message")
                        .await;
                    continue;
                }
                "NOOP" => {
                    self.send("250 I have successfully done nothing").await;
                    continue;
                }
                "RSET" => {
                    internal!("Resetting session state on RSET request");
                    self.reset();
                    self.send("250 Session reset").await;
                    continue;
                }
                "QUIT" => {
                    self.send("221 Goodnight and good luck").await;
                    self.enter_state(State::Quit);
                    continue;
                }
                _ => {}
            }

            // Hand the command to the current state's handler
            match self.state {
                State::Greet => self.greet_handler(&verb, &arg).await,
                State::Ready => self.ready_handler(&verb, &arg).await,
                State::Mail => self.mail_handler(&verb, &arg).await,
                State::Data | State::Quit => {
                    self.error(format_args!(
                        "Session entered unexpected state {}",
                        self.state
                    ));
                    break;
                }
            }
        }

        if let Some(err) = self.send_error.take() {
            self.warn(format_args!("Network send error: {err}"));
        }
        self.info(format_args!("Closing connection"));
    }

    // GREET state -> waiting for HELO
    async fn greet_handler(&mut self, verb: &str, arg: &str) {
        match verb {
            "HELO" => {
                let Some(domain) = envelope::parse_helo_argument(arg) else {
                    self.send("501 Domain/address argument required for HELO")
                        .await;
                    return;
                };
                self.remote_domain = domain.to_string();
                self.send("250 Great, let's get this show on the road").await;
                self.enter_state(State::Ready);
            }
            "EHLO" => {
                let Some(domain) = envelope::parse_helo_argument(arg) else {
                    self.send("501 Domain/address argument required for EHLO")
                        .await;
                    return;
                };
                self.remote_domain = domain.to_string();
                self.send("250-Great, let's get this show on the road")
                    .await;
                self.send("250-8BITMIME").await;
                self.send(&format!("250 SIZE {}", self.config.max_message_bytes))
                    .await;
                self.enter_state(State::Ready);
            }
            _ => self.out_of_sequence(verb).await,
        }
    }

    // READY state -> waiting for MAIL
    async fn ready_handler(&mut self, verb: &str, arg: &str) {
        if verb != "MAIL" {
            self.out_of_sequence(verb).await;
            return;
        }

        let Some(mail) = envelope::parse_mail_argument(arg) else {
            self.send("501 Was expecting MAIL arg syntax of FROM:<address>")
                .await;
            self.warn(format_args!("Bad MAIL argument: {arg:?}"));
            return;
        };
        if let Err(err) = inbucket_policy::parse_email_address(&mail.address) {
            self.send("501 Bad sender address syntax").await;
            self.warn(format_args!(
                "Bad address as MAIL arg: {:?}, {err}",
                mail.address
            ));
            return;
        }

        // The client may declare BODY=8BITMIME here, but the data phase
        // reads raw bytes anyway; only SIZE needs a look.
        if let Some(params) = &mail.params {
            let Some(args) = envelope::parse_esmtp_params(params) else {
                self.send("501 Unable to parse MAIL ESMTP parameters").await;
                self.warn(format_args!("Bad MAIL argument: {arg:?}"));
                return;
            };
            if let Some(size) = args.get("SIZE") {
                let Ok(size) = size.parse::<i32>() else {
                    self.send("501 Unable to parse SIZE as an integer").await;
                    self.warn(format_args!("Unable to parse SIZE {size:?} as an integer"));
                    return;
                };
                if i64::from(size) > self.config.max_message_bytes as i64 {
                    self.send("552 Max message size exceeded").await;
                    self.warn(format_args!(
                        "Client wanted to send oversized message: {size}"
                    ));
                    return;
                }
            }
        }

        self.from = mail.address;
        self.info(format_args!("Mail from: {}", self.from));
        self.send(&format!("250 Roger, accepting mail from <{}>", self.from))
            .await;
        self.enter_state(State::Mail);
    }

    // MAIL state -> waiting for RCPTs followed by DATA
    async fn mail_handler(&mut self, verb: &str, arg: &str) {
        match verb {
            "RCPT" => {
                let Some(addr) = envelope::parse_rcpt_argument(arg) else {
                    self.send("501 Was expecting RCPT arg syntax of TO:<address>")
                        .await;
                    self.warn(format_args!("Bad RCPT argument: {arg:?}"));
                    return;
                };
                let addr = addr.to_string();
                let recipient = match self.policy.new_recipient(&addr) {
                    Ok(recipient) => recipient,
                    Err(err) => {
                        self.send("501 Bad recipient address syntax").await;
                        self.warn(format_args!("Bad address as RCPT arg: {addr:?}, {err}"));
                        return;
                    }
                };
                if self.recipients.len() >= self.config.max_recipients {
                    self.warn(format_args!(
                        "Maximum limit of {} recipients reached",
                        self.config.max_recipients
                    ));
                    self.send(&format!(
                        "552 Maximum limit of {} recipients reached",
                        self.config.max_recipients
                    ))
                    .await;
                    return;
                }
                self.recipients.push(recipient);
                self.info(format_args!("Recipient: {addr}"));
                self.send(&format!("250 I'll make sure <{addr}> gets this"))
                    .await;
            }
            "DATA" => {
                if !arg.is_empty() {
                    self.send("501 DATA command should not have any arguments")
                        .await;
                    self.warn(format_args!("Got unexpected args on DATA: {arg:?}"));
                    return;
                }
                if self.recipients.is_empty() {
                    // DATA out of sequence
                    self.out_of_sequence(verb).await;
                    return;
                }
                self.enter_state(State::Data);
            }
            _ => self.out_of_sequence(verb).await,
        }
    }

    // DATA: streams the payload, unstuffing dots, until the lone dot line
    async fn data_handler(&mut self) {
        self.send("354 Start mail input; end with <CRLF>.<CRLF>").await;

        let mut message: Vec<u8> = Vec::new();
        let mut line: Vec<u8> = Vec::new();
        loop {
            if let Err(err) = self.read_byte_line(&mut line).await {
                if err.is_timeout() {
                    self.send("221 Idle timeout, bye bye").await;
                }
                self.warn(format_args!("Error: {err} while reading"));
                self.enter_state(State::Quit);
                return;
            }

            if line == b".\r\n" || line == b".\n" {
                // Mail data complete
                self.deliver(&message).await;
                return;
            }

            // RFC: remove the leading period clients add for dot-stuffing
            let stuffed = line.first() == Some(&b'.');
            message.extend_from_slice(if stuffed { &line[1..] } else { &line });

            if message.len() > self.config.max_message_bytes {
                self.send("552 Maximum message size exceeded").await;
                self.warn(format_args!("Max message size exceeded while in DATA"));
                self.reset();
                return;
            }
        }
    }

    /// Store the completed message for every recipient the policy keeps.
    async fn deliver(&mut self, body: &[u8]) {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let manager = Arc::clone(&self.manager);

        for idx in 0..self.recipients.len() {
            let recipient = self.recipients[idx].clone();
            if !recipient.should_store() {
                continue;
            }
            let prefix = format!(
                "Received: from {} ([{}]) by {}\r\n  for <{}>; {}\r\n",
                self.remote_domain,
                self.remote_host,
                self.config.domain,
                recipient.address(),
                timestamp
            );
            match manager
                .deliver(&recipient, &self.from, &self.recipients, &prefix, body)
                .await
            {
                Ok(_) => metrics().record_message_received(),
                Err(err) => {
                    self.error(format_args!("delivery for {}: {err}", recipient.local_part()));
                    self.send(&format!(
                        "451 Failed to store message for {}",
                        recipient.local_part()
                    ))
                    .await;
                    self.reset();
                    return;
                }
            }
        }

        self.send("250 Mail accepted for delivery").await;
        self.info(format_args!("Message size {} bytes", body.len()));
        self.reset();
    }

    async fn greet(&mut self) {
        self.send(&format!("220 {} Inbucket SMTP ready", self.config.domain))
            .await;
    }

    fn enter_state(&mut self, state: State) {
        self.state = state;
        internal!("Entering state {state}");
    }

    /// Back to READY: clears the envelope but keeps the HELO name.
    fn reset(&mut self) {
        self.enter_state(State::Ready);
        self.from.clear();
        self.recipients.clear();
    }

    async fn out_of_sequence(&mut self, verb: &str) {
        self.send(&format!("503 Command {verb} is out of sequence"))
            .await;
        self.warn(format_args!("Wasn't expecting {verb} here"));
    }

    /// Send one reply line, `<text>\r\n`, under a fresh write deadline.
    /// The first failure is latched and suppresses every later send.
    async fn send(&mut self, reply: &str) {
        if self.send_error.is_some() {
            return;
        }

        let payload = format!("{reply}\r\n");
        let result = timeout(self.config.max_idle(), async {
            self.writer.write_all(payload.as_bytes()).await?;
            self.writer.flush().await
        })
        .await;

        match result {
            Err(_) => {
                self.send_error = Some(SessionError::Timeout(self.config.max_idle_secs));
            }
            Ok(Err(err)) => {
                self.warn(format_args!("Failed to send: {reply:?}"));
                self.send_error = Some(err.into());
            }
            Ok(Ok(())) => outgoing!("{reply}"),
        }
    }

    /// Read raw bytes up to and including `\n` under a fresh read deadline.
    async fn read_byte_line(&mut self, buf: &mut Vec<u8>) -> Result<(), SessionError> {
        buf.clear();
        match timeout(self.config.max_idle(), self.reader.read_until(b'\n', buf)).await {
            Err(_) => Err(SessionError::Timeout(self.config.max_idle_secs)),
            Ok(Err(err)) => Err(err.into()),
            Ok(Ok(0)) => Err(SessionError::Closed),
            Ok(Ok(_)) => Ok(()),
        }
    }

    /// Read one textual line with the line ending stripped.
    async fn read_line(&mut self) -> Result<String, SessionError> {
        let mut buf = Vec::new();
        self.read_byte_line(&mut buf).await?;
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        incoming!("{line}");
        Ok(line)
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(
            target: "inbucket",
            session = self.id,
            remote = %self.remote_host,
            "{args}"
        );
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        metrics().record_warn();
        tracing::warn!(
            target: "inbucket",
            session = self.id,
            remote = %self.remote_host,
            "{args}"
        );
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        metrics().record_error();
        tracing::error!(
            target: "inbucket",
            session = self.id,
            remote = %self.remote_host,
            "{args}"
        );
    }
}
