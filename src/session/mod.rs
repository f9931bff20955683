//! Mailbox session contract and scoped lifecycle.
//!
//! The extractor only talks to a [`MailboxSession`]; [`ImapSession`] is the
//! production implementation.

pub mod imap_client;

use tracing::{debug, warn};

use crate::error::Result;
use crate::model::MessageId;

pub use imap_client::ImapSession;

/// Server-side message flags this tool sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    /// The message was archived.
    Seen,
    /// The message should be removed by a later `EXPUNGE`.
    Deleted,
}

impl Flag {
    /// IMAP system flag name.
    pub fn as_imap(&self) -> &'static str {
        match self {
            Self::Seen => "\\Seen",
            Self::Deleted => "\\Deleted",
        }
    }
}

/// Operations the archiver needs from a remote mailbox.
pub trait MailboxSession {
    /// Connect and authenticate.
    fn login(&mut self) -> Result<()>;

    /// Select a mailbox; returns the number of messages it holds.
    fn select_mailbox(&mut self, mailbox: &str) -> Result<usize>;

    /// Run a search and return matching ids in ascending order.
    fn search_all(&mut self, query: &str) -> Result<Vec<MessageId>>;

    /// Fetch the complete raw message without touching its flags.
    fn fetch_raw(&mut self, id: MessageId) -> Result<Vec<u8>>;

    /// Add a flag to a message.
    fn set_flag(&mut self, id: MessageId, flag: Flag) -> Result<()>;

    /// Permanently remove messages flagged `\Deleted`; returns how many went.
    fn expunge(&mut self) -> Result<usize>;

    /// End the session.
    fn logout(&mut self) -> Result<()>;
}

/// Log in, select `mailbox`, run `body`, and log out on every exit path.
///
/// A logout failure never hides the outcome of `body`: it is logged and the
/// body's result (success or error) is returned.
pub fn with_session<S, T, F>(session: &mut S, mailbox: &str, body: F) -> Result<T>
where
    S: MailboxSession + ?Sized,
    F: FnOnce(&mut S) -> Result<T>,
{
    session.login()?;

    let outcome = session.select_mailbox(mailbox).and_then(|exists| {
        debug!(mailbox, exists, "Mailbox selected");
        body(session)
    });

    if let Err(e) = session.logout() {
        warn!(error = %e, "Logout failed");
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiveError;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<&'static str>,
        fail_select: bool,
        fail_logout: bool,
    }

    impl MailboxSession for Recorder {
        fn login(&mut self) -> Result<()> {
            self.calls.push("login");
            Ok(())
        }
        fn select_mailbox(&mut self, _mailbox: &str) -> Result<usize> {
            self.calls.push("select");
            if self.fail_select {
                return Err(ArchiveError::Connection("no such mailbox".into()));
            }
            Ok(0)
        }
        fn search_all(&mut self, _query: &str) -> Result<Vec<MessageId>> {
            Ok(Vec::new())
        }
        fn fetch_raw(&mut self, _id: MessageId) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn set_flag(&mut self, _id: MessageId, _flag: Flag) -> Result<()> {
            Ok(())
        }
        fn expunge(&mut self) -> Result<usize> {
            Ok(0)
        }
        fn logout(&mut self) -> Result<()> {
            self.calls.push("logout");
            if self.fail_logout {
                return Err(ArchiveError::Connection("reset".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_logout_after_success() {
        let mut session = Recorder::default();
        let value = with_session(&mut session, "INBOX", |s| {
            s.calls.push("body");
            Ok(7)
        })
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(session.calls, ["login", "select", "body", "logout"]);
    }

    #[test]
    fn test_logout_after_body_error() {
        let mut session = Recorder::default();
        let result: Result<()> = with_session(&mut session, "INBOX", |_| {
            Err(ArchiveError::MissingSender(4))
        });
        assert!(matches!(result, Err(ArchiveError::MissingSender(4))));
        assert_eq!(session.calls.last(), Some(&"logout"));
    }

    #[test]
    fn test_logout_after_select_error() {
        let mut session = Recorder {
            fail_select: true,
            ..Default::default()
        };
        let result = with_session(&mut session, "Nope", |_| Ok(()));
        assert!(result.is_err());
        assert_eq!(session.calls, ["login", "select", "logout"]);
    }

    #[test]
    fn test_logout_failure_keeps_body_result() {
        let mut session = Recorder {
            fail_logout: true,
            ..Default::default()
        };
        assert_eq!(with_session(&mut session, "INBOX", |_| Ok("done")).unwrap(), "done");
    }

    #[test]
    fn test_flag_names() {
        assert_eq!(Flag::Seen.as_imap(), "\\Seen");
        assert_eq!(Flag::Deleted.as_imap(), "\\Deleted");
    }
}
