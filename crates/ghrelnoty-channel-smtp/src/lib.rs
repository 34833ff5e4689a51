// # SMTP Notification Channel
//
// This crate provides an email implementation of `NotificationChannel`.
//
// ## Behavior
//
// - One email per `notify` call, sent through `lettre`'s async SMTP client
// - STARTTLS (default), implicit TLS, or plaintext for local relays
// - Addresses are parsed when the channel is built, so a bad configuration
//   fails at startup instead of at the first release
// - NO retry: a failed delivery is reported to `PollCoordinator` and dropped
//
// ## Security Requirements
//
// - The password NEVER appears in logs or `Debug` output

use async_trait::async_trait;
use ghrelnoty_core::config::{ChannelConfig, ChannelKind, Secret, SmtpSecurity};
use ghrelnoty_core::traits::{NotificationChannel, NotificationChannelFactory, ReleaseObservation};
use ghrelnoty_core::{Error, Registry, Result};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

/// SMTP command timeout
const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Subject and plain text body of a release email
pub fn render_message(release: &ReleaseObservation) -> (String, String) {
    let subject = format!("New release: {} {}", release.repository, release.version);

    let mut body = format!(
        "GHRelNoty\n---------\n\nNew release for {}: {}\n",
        release.repository, release.version
    );
    if !release.description.is_empty() {
        body.push('\n');
        body.push_str(&release.description);
        body.push('\n');
    }
    if !release.url.is_empty() {
        body.push_str(&format!("\nURL: {}\n", release.url));
    }

    (subject, body)
}

/// Email notification channel
pub struct SmtpChannel {
    from: Mailbox,
    to: Mailbox,
    host: String,
    port: u16,
    security: SmtpSecurity,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

// Credentials live inside the transport and are never printed
impl std::fmt::Debug for SmtpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpChannel")
            .field("from", &self.from.to_string())
            .field("to", &self.to.to_string())
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl SmtpChannel {
    /// Create a new SMTP channel
    ///
    /// # Parameters
    ///
    /// - `username`: Login name; `from` is used when empty
    /// - `password`: Login password; no authentication when empty
    ///
    /// The pooled transport spawns onto the current tokio runtime, so this
    /// must be called from within one.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        from: &str,
        to: &str,
        host: &str,
        port: u16,
        username: &str,
        password: &Secret,
        security: SmtpSecurity,
    ) -> Result<Self> {
        let from_mailbox: Mailbox = from
            .parse()
            .map_err(|e| Error::config(format!("Invalid from address '{}': {}", from, e)))?;
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| Error::config(format!("Invalid to address '{}': {}", to, e)))?;

        let builder = match security {
            SmtpSecurity::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| Error::config(format!("Invalid SMTP relay '{}': {}", host, e)))?,
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| Error::config(format!("Invalid SMTP relay '{}': {}", host, e)))?,
            SmtpSecurity::None => {
                tracing::warn!(host, "SMTP channel configured without encryption");
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            }
        };

        let mut builder = builder.port(port).timeout(Some(DEFAULT_SMTP_TIMEOUT));
        if !password.is_empty() {
            let login = if username.is_empty() { from } else { username };
            builder = builder.credentials(Credentials::new(
                login.to_string(),
                password.expose().to_string(),
            ));
        }

        Ok(Self {
            from: from_mailbox,
            to: to_mailbox,
            host: host.to_string(),
            port,
            security,
            transport: builder.build(),
        })
    }

    /// Build the email for a release
    pub fn build_message(&self, release: &ReleaseObservation) -> Result<Message> {
        let (subject, body) = render_message(release);
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| Error::notify("smtp", format!("Cannot build email: {}", e)))
    }
}

#[async_trait]
impl NotificationChannel for SmtpChannel {
    async fn notify(&self, release: &ReleaseObservation) -> Result<()> {
        let message = self.build_message(release)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| {
                Error::notify("smtp", format!("Cannot send email via {}: {}", self.host, e))
            })?;

        tracing::debug!(
            repository = %release.repository,
            version = %release.version,
            to = %self.to,
            "Email sent"
        );
        Ok(())
    }

    fn channel_name(&self) -> &'static str {
        "smtp"
    }
}

/// Factory for creating SMTP channels
pub struct SmtpFactory;

impl NotificationChannelFactory for SmtpFactory {
    fn create(&self, config: &ChannelConfig) -> Result<Box<dyn NotificationChannel>> {
        match config {
            ChannelConfig::Smtp {
                from,
                to,
                host,
                port,
                username,
                password,
                security,
            } => Ok(Box::new(SmtpChannel::new(
                from, to, host, *port, username, password, *security,
            )?)),
        }
    }
}

/// Register the SMTP channel with a registry
///
/// # Example
///
/// ```rust
/// use ghrelnoty_core::{ChannelKind, Registry};
///
/// let mut registry = Registry::new();
/// ghrelnoty_channel_smtp::register(&mut registry);
/// assert!(registry.has_channel(ChannelKind::Smtp));
/// ```
pub fn register(registry: &mut Registry) {
    registry.register_channel(ChannelKind::Smtp, Box::new(SmtpFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    // Channels are built inside a runtime because the SMTP pool spawns onto it

    fn config(security: SmtpSecurity) -> ChannelConfig {
        ChannelConfig::Smtp {
            from: "from@test.test".to_string(),
            to: "to@test.test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 2525,
            username: String::new(),
            password: Secret::new("hunter2"),
            security,
        }
    }

    fn release() -> ReleaseObservation {
        ReleaseObservation::new("dummy-author/dummy-project", "v1.2.3")
            .with_description("This is a dummy release just for testing.")
            .with_url("some-url")
    }

    #[test]
    fn test_render_message() {
        let (subject, body) = render_message(&release());

        assert_eq!(subject, "New release: dummy-author/dummy-project v1.2.3");
        assert_eq!(
            body,
            "GHRelNoty\n---------\n\nNew release for dummy-author/dummy-project: v1.2.3\n\n\
             This is a dummy release just for testing.\n\nURL: some-url\n"
        );
    }

    #[test]
    fn test_render_message_without_metadata() {
        let (_, body) = render_message(&ReleaseObservation::new("a/b", "v1"));
        assert_eq!(body, "GHRelNoty\n---------\n\nNew release for a/b: v1\n");
    }

    #[tokio::test]
    async fn test_factory_creation() {
        let factory = SmtpFactory;

        for security in [SmtpSecurity::Starttls, SmtpSecurity::Tls, SmtpSecurity::None] {
            let channel = factory.create(&config(security));
            assert!(channel.is_ok(), "{:?} should build", security);
        }
    }

    #[tokio::test]
    async fn test_invalid_address_fails_at_construction() {
        let result = SmtpChannel::new(
            "not an address",
            "to@test.test",
            "127.0.0.1",
            25,
            "",
            &Secret::default(),
            SmtpSecurity::None,
        );

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_password_not_exposed_in_debug() {
        let channel = SmtpChannel::new(
            "from@test.test",
            "to@test.test",
            "127.0.0.1",
            25,
            "user",
            &Secret::new("hunter2"),
            SmtpSecurity::None,
        )
        .unwrap();

        let debug_str = format!("{:?}", channel);
        assert!(!debug_str.contains("hunter2"));
        assert!(debug_str.contains("<REDACTED>"));
    }

    #[tokio::test]
    async fn test_build_message_headers() {
        let channel = SmtpChannel::new(
            "from@test.test",
            "to@test.test",
            "127.0.0.1",
            25,
            "",
            &Secret::default(),
            SmtpSecurity::None,
        )
        .unwrap();

        let message = channel.build_message(&release()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("From: from@test.test"));
        assert!(raw.contains("To: to@test.test"));
        assert!(raw.contains("Subject: New release: dummy-author/dummy-project v1.2.3"));
    }

    /// Minimal plaintext SMTP server accepting a single message
    ///
    /// Returns the envelope commands and the DATA payload.
    async fn accept_one_message(listener: tokio::net::TcpListener) -> (Vec<String>, String) {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        write.write_all(b"220 fake.test ESMTP\r\n").await.unwrap();

        let mut commands = Vec::new();
        let mut data = String::new();
        let mut in_data = false;
        while let Some(line) = lines.next_line().await.unwrap() {
            if in_data {
                if line == "." {
                    write.write_all(b"250 2.0.0 queued\r\n").await.unwrap();
                    break;
                }
                data.push_str(&line);
                data.push('\n');
                continue;
            }

            let upper = line.to_ascii_uppercase();
            commands.push(line);
            if upper.starts_with("DATA") {
                in_data = true;
                write.write_all(b"354 end data with <CR><LF>.<CR><LF>\r\n").await.unwrap();
            } else if upper.starts_with("QUIT") {
                write.write_all(b"221 bye\r\n").await.unwrap();
                break;
            } else {
                write.write_all(b"250 fake.test\r\n").await.unwrap();
            }
        }

        (commands, data)
    }

    #[tokio::test]
    async fn test_notify_delivers_message() {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(accept_one_message(listener));

        let channel = SmtpChannel::new(
            "from@test.test",
            "to@test.test",
            "127.0.0.1",
            port,
            "",
            &Secret::default(),
            SmtpSecurity::None,
        )
        .unwrap();

        channel.notify(&release()).await.unwrap();

        let (commands, data) = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();

        assert!(commands.iter().any(|c| c.starts_with("MAIL FROM:<from@test.test>")));
        assert!(commands.iter().any(|c| c.starts_with("RCPT TO:<to@test.test>")));
        assert!(!commands.iter().any(|c| c.starts_with("AUTH")));

        assert!(data.contains("Subject: New release: dummy-author/dummy-project v1.2.3\n"));
        assert!(data.contains(
            "GHRelNoty\n---------\n\nNew release for dummy-author/dummy-project: v1.2.3\n\n\
             This is a dummy release just for testing.\n\nURL: some-url\n"
        ));
    }

    #[tokio::test]
    async fn test_notify_reports_refused_connection() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let channel = SmtpChannel::new(
            "from@test.test",
            "to@test.test",
            "127.0.0.1",
            port,
            "",
            &Secret::default(),
            SmtpSecurity::None,
        )
        .unwrap();

        let result = channel.notify(&release()).await;
        assert!(matches!(result, Err(Error::Notify { .. })));
    }

    #[tokio::test]
    async fn test_register() {
        let mut registry = Registry::new();
        register(&mut registry);
        assert!(registry.has_channel(ChannelKind::Smtp));
        let channel = SmtpFactory.create(&config(SmtpSecurity::None)).unwrap();
        assert_eq!(channel.channel_name(), "smtp");
    }
}
