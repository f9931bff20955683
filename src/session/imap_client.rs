//! [`MailboxSession`] over IMAP with implicit TLS.

use std::net::TcpStream;

use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info, warn};

use super::{Flag, MailboxSession};
use crate::config::LoginConfig;
use crate::error::{ArchiveError, Result};
use crate::model::MessageId;

type TlsSession = imap::Session<TlsStream<TcpStream>>;

/// A single exclusively-owned IMAP connection.
///
/// The connection is opened by [`MailboxSession::login`] and closed by
/// [`MailboxSession::logout`], or on drop if the caller never got there.
/// `CLOSE` is never sent: it would silently expunge `\Deleted` messages.
pub struct ImapSession {
    server: String,
    port: u16,
    username: String,
    password: String,
    session: Option<TlsSession>,
}

impl ImapSession {
    /// Prepare a session; nothing is sent until `login`.
    pub fn new(login: &LoginConfig) -> Self {
        Self {
            server: login.server.clone(),
            port: login.port,
            username: login.email_address.clone(),
            password: login.password.clone(),
            session: None,
        }
    }

    fn session(&mut self) -> Result<&mut TlsSession> {
        self.session
            .as_mut()
            .ok_or_else(|| ArchiveError::Connection("not logged in".into()))
    }
}

impl MailboxSession for ImapSession {
    fn login(&mut self) -> Result<()> {
        let tls = TlsConnector::builder().build()?;
        debug!(server = %self.server, port = self.port, "Connecting");

        let client = imap::connect((self.server.as_str(), self.port), self.server.as_str(), &tls)
            .map_err(|e| {
                ArchiveError::Connection(format!("{}:{}: {e}", self.server, self.port))
            })?;

        let session = client
            .login(&self.username, &self.password)
            .map_err(|(e, _client)| ArchiveError::Auth {
                user: self.username.clone(),
                reason: e.to_string(),
            })?;

        info!(user = %self.username, server = %self.server, "Logged in");
        self.session = Some(session);
        Ok(())
    }

    fn select_mailbox(&mut self, mailbox: &str) -> Result<usize> {
        let selected = self.session()?.select(mailbox)?;
        Ok(selected.exists as usize)
    }

    fn search_all(&mut self, query: &str) -> Result<Vec<MessageId>> {
        let mut ids: Vec<MessageId> = self.session()?.search(query)?.into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch_raw(&mut self, id: MessageId) -> Result<Vec<u8>> {
        // BODY.PEEK keeps \Seen untouched until the attachments are on disk.
        let fetches = self.session()?.fetch(id.to_string(), "BODY.PEEK[]")?;
        let body = fetches
            .iter()
            .find_map(|fetch| fetch.body())
            .map(<[u8]>::to_vec);
        body.ok_or_else(|| ArchiveError::Mime(format!("server returned no body for message {id}")))
    }

    fn set_flag(&mut self, id: MessageId, flag: Flag) -> Result<()> {
        self.session()?
            .store(id.to_string(), format!("+FLAGS ({})", flag.as_imap()))?;
        debug!(id, flag = flag.as_imap(), "Flag set");
        Ok(())
    }

    fn expunge(&mut self) -> Result<usize> {
        Ok(self.session()?.expunge()?.len())
    }

    fn logout(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.logout()?;
            info!(user = %self.username, "Logged out");
        }
        Ok(())
    }
}

impl Drop for ImapSession {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.logout() {
                warn!(error = %e, "Logout on drop failed");
            }
        }
    }
}
