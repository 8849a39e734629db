//! Email service for account validation and password reset mails.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::path::Path;
use url::Url;

use crate::{
    config::{Config, EmailTransportConfig},
    errors::Error,
    types::UserId,
};

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    reply_to: Option<String>,
    dashboard_url: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self {
            transport,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            reply_to: email_config.reply_to.clone(),
            dashboard_url: config.dashboard_url.clone(),
        })
    }

    /// Mail the one-time link that confirms a new account's address.
    pub async fn send_validation_email(&self, to_email: &str, username: &str, user_id: UserId, token: &str) -> Result<(), Error> {
        let link = self.dashboard_link("validation_token", user_id, token)?;
        let body = self.create_validation_body(username, &link);
        self.send_email(to_email, "Confirm your email address", &body).await
    }

    /// Mail the one-time link that lets the user choose a new password.
    pub async fn send_password_reset_email(&self, to_email: &str, username: &str, user_id: UserId, token: &str) -> Result<(), Error> {
        let link = self.dashboard_link("password_reset_token", user_id, token)?;
        let body = self.create_password_reset_body(username, &link);
        self.send_email(to_email, "Password Reset Request", &body).await
    }

    fn dashboard_link(&self, token_param: &str, user_id: UserId, token: &str) -> Result<String, Error> {
        let mut url = Url::parse(&self.dashboard_url).map_err(|e| Error::Internal {
            operation: format!("parse dashboard url: {e}"),
        })?;
        url.query_pairs_mut()
            .append_pair(token_param, token)
            .append_pair("user", &user_id.to_string());
        Ok(url.to_string())
    }

    async fn send_email(&self, to_email: &str, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = to_email.parse::<Mailbox>().map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let mut builder = Message::builder().from(from).to(to).subject(subject).header(ContentType::TEXT_HTML);
        if let Some(reply_to) = &self.reply_to {
            let reply_to = reply_to.parse::<Mailbox>().map_err(|e| Error::Internal {
                operation: format!("parse reply-to email: {e}"),
            })?;
            builder = builder.reply_to(reply_to);
        }

        let message = builder.body(body.to_string()).map_err(|e| Error::Internal {
            operation: format!("build email message: {e}"),
        })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        Ok(())
    }

    fn create_validation_body(&self, username: &str, link: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Confirm your email address</title>
</head>
<body>
    <p>Hello {username},</p>

    <p>Thank you for signing up to {from_name}. To finish your registration, open the link below:</p>

    <p><a href="{link}">Confirm your email address</a></p>

    <p>Or copy and paste this link into your browser:</p>
    <p>{link}</p>
</body>
</html>"#,
            from_name = self.from_name
        )
    }

    fn create_password_reset_body(&self, username: &str, link: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Password Reset Request</title>
</head>
<body>
    <p>Hello {username},</p>

    <p>We received a request to reset your password. If you didn't make this request, you can safely ignore this email.</p>

    <p><a href="{link}">Reset your password</a></p>

    <p>Or copy and paste this link into your browser:</p>
    <p>{link}</p>
</body>
</html>"#
        )
    }
}
