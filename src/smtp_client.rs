/*
SMTP session used by a mail-merge job.

The session is opened once with `connect`, authenticates with the sender's
credentials, sends every composed message over the same transport and is
dropped by `disconnect`.

Reference : https://datatracker.ietf.org/doc/html/rfc5321
*/
use std::env;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::debug;

use crate::config::JobConfig;
use crate::error::MailError;

pub const DEFAULT_SMTP_PORT: u16 = 587;
const PASSWORD_ENV: &str = "SMTP_PASSWORD";
const PASSWORD_PROMPT: &str = "Enter SMTP password: ";

/// One message as handed to the transport.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMail<'a> {
    /// Rendered as one `To` header, addresses joined with `", "`.
    pub to: &'a [String],
    pub subject: &'a str,
    pub text: Option<&'a str>,
    pub html: Option<&'a str>,
    pub attachments: Vec<(String, Vec<u8>)>,
}

/// Session with the outgoing mail server.
#[async_trait]
pub trait MailTransport: Send {
    /// Opens and authenticates the session.
    async fn connect(&mut self) -> Result<(), MailError>;

    /// Sends one message. Never retried.
    async fn send(&mut self, mail: OutgoingMail<'_>) -> Result<(), MailError>;

    /// Closes the session; fails with [`MailError::NotConnected`] if none is open.
    async fn disconnect(&mut self) -> Result<(), MailError>;

    fn host(&self) -> &str;
}

pub struct SmtpClient {
    host: String,
    port: u16,
    sender: String,
    password: String,
    use_tls: bool,
    timeout: Option<Duration>,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpClient {
    /// An empty `password` falls back to `SMTP_PASSWORD`, then to a masked prompt.
    pub fn new(
        host: &str,
        port: u16,
        sender: &str,
        password: &str,
        use_tls: bool,
    ) -> Result<Self, MailError> {
        if !sender.contains('@') {
            return Err(MailError::InvalidSender(sender.to_string()));
        }

        Ok(SmtpClient {
            host: host.to_string(),
            port: if port == 0 { DEFAULT_SMTP_PORT } else { port },
            sender: sender.to_string(),
            password: resolve_password(password)?,
            use_tls,
            timeout: None,
            transport: None,
        })
    }

    pub fn from_config(config: &JobConfig) -> Result<Self, MailError> {
        let client = SmtpClient::new(
            &config.smtp.host,
            config.smtp.port,
            &config.auth.user,
            &config.auth.password,
            config.smtp.use_ssl,
        )?;
        Ok(client.with_timeout(config.smtp.timeout_sec.map(Duration::from_secs)))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn check_settings(&self) -> Result<(), MailError> {
        let settings = [
            ("host", self.host.as_str()),
            ("sender email", self.sender.as_str()),
            ("password", self.password.as_str()),
        ];
        for (name, value) in settings {
            if value.is_empty() {
                return Err(MailError::MissingSettings(name));
            }
        }
        if self.port == 0 {
            return Err(MailError::MissingSettings("port"));
        }
        Ok(())
    }
}

fn resolve_password(given: &str) -> Result<String, MailError> {
    if !given.is_empty() {
        return Ok(given.to_string());
    }
    match env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => Ok(password),
        _ => Ok(rpassword::prompt_password(PASSWORD_PROMPT)?),
    }
}

#[async_trait]
impl MailTransport for SmtpClient {
    async fn connect(&mut self) -> Result<(), MailError> {
        self.check_settings()?;

        let tls_parameters =
            TlsParameters::new(self.host.clone()).map_err(|e| MailError::Smtp(e.to_string()))?;
        // 465-style servers want TLS from the first byte; anything else gets
        // STARTTLS when the server offers it and stays plain otherwise.
        let tls = if self.use_tls {
            Tls::Wrapper(tls_parameters)
        } else {
            Tls::Opportunistic(tls_parameters)
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
            .port(self.port)
            .tls(tls)
            .timeout(self.timeout)
            .credentials(Credentials::new(self.sender.clone(), self.password.clone()))
            .build();

        // Handshake, STARTTLS and AUTH all happen here, so bad credentials
        // fail the job before the first recipient.
        let alive = transport
            .test_connection()
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;
        if !alive {
            return Err(MailError::Smtp(format!("{} did not answer NOOP", self.host)));
        }

        debug!("Authenticated as {} on {}:{}", self.sender, self.host, self.port);
        self.transport = Some(transport);
        Ok(())
    }

    async fn send(&mut self, mail: OutgoingMail<'_>) -> Result<(), MailError> {
        let transport = self.transport.as_ref().ok_or(MailError::NotConnected)?;
        let message = compose(&self.sender, mail)?;
        transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MailError> {
        self.transport.take().map(drop).ok_or(MailError::NotConnected)
    }

    fn host(&self) -> &str {
        &self.host
    }
}

/// Builds a `multipart/mixed` message: the text part, the HTML part, then one
/// base64 `application/octet-stream` part per attachment.
pub fn compose(sender: &str, mail: OutgoingMail<'_>) -> Result<Message, MailError> {
    let from: Mailbox = sender
        .parse()
        .map_err(|_| MailError::InvalidAddress(sender.to_string()))?;

    let mut builder = Message::builder().from(from).subject(mail.subject);
    for address in mail.to {
        let mailbox: Mailbox = address
            .parse()
            .map_err(|_| MailError::InvalidAddress(address.clone()))?;
        builder = builder.to(mailbox);
    }

    let mut parts = Vec::new();
    if let Some(text) = mail.text.filter(|t| !t.is_empty()) {
        parts.push(SinglePart::plain(text.to_string()));
    }
    if let Some(html) = mail.html.filter(|h| !h.is_empty()) {
        parts.push(SinglePart::html(html.to_string()));
    }

    let octet_stream = ContentType::parse("application/octet-stream")
        .map_err(|e| MailError::Build(e.to_string()))?;
    for (name, data) in mail.attachments {
        parts.push(Attachment::new(name).body(data, octet_stream.clone()));
    }

    let mut parts = parts.into_iter();
    let first = parts
        .next()
        .ok_or_else(|| MailError::Build("message has no body and no attachments".to_string()))?;
    let multipart = parts.fold(MultiPart::mixed().singlepart(first), |multipart, part| {
        multipart.singlepart(part)
    });

    builder
        .multipart(multipart)
        .map_err(|e| MailError::Build(e.to_string()))
}
