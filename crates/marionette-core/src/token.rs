//! Session identity for the signaling relay
//!
//! The relay is a naive fanout channel: every connected peer sees every
//! envelope, including its own. Tokens exist so a peer can discard its own
//! echoes and so glare can be broken deterministically.

use std::fmt;

/// Peer role within a session, assigned during negotiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Initiated the session and created the channel proactively
    Caller,
    /// Accepted an inbound channel created by the remote peer
    Receiver,
}

/// Session token - random identity a peer presents on the signaling relay.
///
/// Formatted as hyphenated hex groups (8-4-4-4-12). Not a real UUID, but
/// collision-free enough for a two-peer negotiation window.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        fn group(len: usize) -> String {
            (0..len)
                .map(|_| {
                    let nibble: u8 = rand::random::<u8>() & 0x0F;
                    char::from_digit(nibble as u32, 16).unwrap_or('0')
                })
                .collect()
        }

        SessionToken(format!(
            "{}-{}-{}-{}-{}",
            group(8),
            group(4),
            group(4),
            group(4),
            group(12)
        ))
    }

    /// Wrap an existing token string (e.g. parsed from an envelope)
    pub fn from_string(s: String) -> Self {
        SessionToken(s)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Glare tie-break: the lexicographically lower token keeps the
    /// Caller role when both peers initiate simultaneously.
    pub fn outranks(&self, other: &SessionToken) -> bool {
        self.0 < other.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.0)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_format() {
        let token = SessionToken::generate();
        let groups: Vec<&str> = token.as_str().split('-').collect();

        assert_eq!(groups.len(), 5);
        assert_eq!(groups[0].len(), 8);
        assert_eq!(groups[4].len(), 12);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }

    #[test]
    fn test_token_uniqueness() {
        let a = SessionToken::generate();
        let b = SessionToken::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_outranks_is_total() {
        let a = SessionToken::from_string("aaaa".into());
        let b = SessionToken::from_string("bbbb".into());

        assert!(a.outranks(&b));
        assert!(!b.outranks(&a));
        assert!(!a.outranks(&a));
    }
}
