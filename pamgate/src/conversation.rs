//! Answers to the questions PAM modules ask during a transaction.
//!
//! Nothing here ever reaches a terminal. Secret prompts are answered from a
//! [`TokenSource`], visible prompts get an empty answer, and informational
//! messages go to the log.

use pam_client::{ConversationHandler, ErrorCode};
use std::ffi::{CStr, CString};
use zeroize::Zeroizing;

/// Supplies the next secret a PAM module asks for.
///
/// Implementations are called synchronously from inside the conversation,
/// once per password prompt.
pub trait TokenSource {
    fn next_token(&self) -> Zeroizing<String>;

    /// Answer to a prompt for the credential already in place, as asked by
    /// modules that re-check the current password before changing it
    fn current_token(&self) -> Zeroizing<String> {
        self.next_token()
    }
}

/// Answers every prompt with an empty token
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTokens;

impl TokenSource for NoTokens {
    fn next_token(&self) -> Zeroizing<String> {
        Zeroizing::new(String::new())
    }
}

/// Message styles PAM sends through the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Input that should not be echoed, i.e. a password
    Secret,
    /// A secret prompt asking for the password being replaced
    Current,
    /// Input that may be echoed
    Visible,
    Info,
    Error,
}

impl Prompt {
    /// Classify a no-echo prompt by its text
    pub fn secret(msg: &str) -> Self {
        let msg = msg.to_lowercase();
        let current = msg
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == "current" || word == "old");

        if current { Prompt::Current } else { Prompt::Secret }
    }
}

/// Answer to a single conversation message
pub(crate) fn answer(tokens: &dyn TokenSource, prompt: Prompt, msg: &str) -> Option<Zeroizing<String>> {
    match prompt {
        Prompt::Secret => Some(tokens.next_token()),
        Prompt::Current => Some(tokens.current_token()),
        Prompt::Visible => {
            tracing::debug!("answering visible prompt {:?} with empty input", msg);
            Some(Zeroizing::new(String::new()))
        }
        Prompt::Info => {
            tracing::debug!("pam: {}", msg);
            None
        }
        Prompt::Error => {
            tracing::warn!("pam: {}", msg);
            None
        }
    }
}

/// Conversation handler backed by a [`TokenSource`]
pub struct TokenConversation<'a> {
    tokens: &'a dyn TokenSource,
}

impl<'a> TokenConversation<'a> {
    pub fn new(tokens: &'a dyn TokenSource) -> Self {
        Self { tokens }
    }

    fn reply(&self, prompt: Prompt, msg: &CStr) -> Result<CString, ErrorCode> {
        let token = answer(self.tokens, prompt, &msg.to_string_lossy()).unwrap_or_default();
        CString::new(token.as_str()).map_err(|_| {
            tracing::warn!("token for {:?} contains a nul byte", msg);
            ErrorCode::CONV_ERR
        })
    }
}

impl ConversationHandler for TokenConversation<'_> {
    fn prompt_echo_on(&mut self, msg: &CStr) -> Result<CString, ErrorCode> {
        self.reply(Prompt::Visible, msg)
    }

    fn prompt_echo_off(&mut self, msg: &CStr) -> Result<CString, ErrorCode> {
        self.reply(Prompt::secret(&msg.to_string_lossy()), msg)
    }

    fn text_info(&mut self, msg: &CStr) {
        answer(self.tokens, Prompt::Info, &msg.to_string_lossy());
    }

    fn error_msg(&mut self, msg: &CStr) {
        answer(self.tokens, Prompt::Error, &msg.to_string_lossy());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::CredentialRelay;
    use std::cell::Cell;

    struct Counting(Cell<u32>);

    impl TokenSource for Counting {
        fn next_token(&self) -> Zeroizing<String> {
            self.0.set(self.0.get() + 1);
            Zeroizing::new(format!("token{}", self.0.get()))
        }
    }

    #[test]
    fn no_tokens_is_empty() {
        assert!(NoTokens.next_token().is_empty());
        assert!(NoTokens.current_token().is_empty());
    }

    #[test]
    fn secret_prompts_pull_tokens() {
        let source = Counting(Cell::new(0));
        assert_eq!(answer(&source, Prompt::Secret, "Password: ").unwrap().as_str(), "token1");
        assert_eq!(answer(&source, Prompt::Secret, "Password: ").unwrap().as_str(), "token2");
    }

    #[test]
    fn visible_prompts_do_not_consume_tokens() {
        let source = Counting(Cell::new(0));
        let reply = answer(&source, Prompt::Visible, "login: ").unwrap();
        assert!(reply.is_empty());
        assert_eq!(source.0.get(), 0);
    }

    #[test]
    fn messages_get_no_reply() {
        let source = Counting(Cell::new(0));
        assert!(answer(&source, Prompt::Info, "Last login: never").is_none());
        assert!(answer(&source, Prompt::Error, "Account locked").is_none());
        assert_eq!(source.0.get(), 0);
    }

    #[test]
    fn current_password_prompts_are_recognised() {
        for msg in ["Current password: ", "(current) UNIX password: ", "Old Password: "] {
            assert_eq!(Prompt::secret(msg), Prompt::Current, "{msg}");
        }
        for msg in ["Password: ", "New password: ", "Retype new password: ", "Passcode: "] {
            assert_eq!(Prompt::secret(msg), Prompt::Secret, "{msg}");
        }
    }

    #[test]
    fn handler_answers_each_message_style() {
        let relay = CredentialRelay::new();
        let guard = relay.acquire("s3cret", None);
        let mut conv = TokenConversation::new(&guard);

        assert_eq!(conv.prompt_echo_on(c"login: ").unwrap().as_bytes(), b"");
        conv.text_info(c"Last login: never");
        conv.error_msg(c"something odd");
        assert_eq!(conv.prompt_echo_off(c"Password: ").unwrap().as_bytes(), b"s3cret");
    }

    #[test]
    fn handler_does_not_replay_password() {
        let relay = CredentialRelay::new();
        let guard = relay.acquire("s3cret", None);
        let mut conv = TokenConversation::new(&guard);

        assert_eq!(conv.prompt_echo_off(c"Password: ").unwrap().as_bytes(), b"s3cret");
        assert_eq!(conv.prompt_echo_off(c"Password again: ").unwrap().as_bytes(), b"");
    }

    #[test]
    fn token_with_nul_byte_fails_conversation() {
        let relay = CredentialRelay::new();
        let guard = relay.acquire("bad\0token", None);
        let mut conv = TokenConversation::new(&guard);

        assert!(matches!(conv.prompt_echo_off(c"Password: "), Err(ErrorCode::CONV_ERR)));
    }

    #[test]
    fn handler_answers_current_prompt_with_old_password_after_staging() {
        let relay = CredentialRelay::new();
        let guard = relay.acquire("old-pass", Some("new-pass"));
        let mut conv = TokenConversation::new(&guard);

        assert_eq!(conv.prompt_echo_off(c"Password: ").unwrap().as_bytes(), b"old-pass");
        guard.stage_next();
        assert_eq!(conv.prompt_echo_off(c"Current password: ").unwrap().as_bytes(), b"old-pass");
        assert_eq!(conv.prompt_echo_off(c"New password: ").unwrap().as_bytes(), b"new-pass");
        assert_eq!(
            conv.prompt_echo_off(c"Retype new password: ").unwrap().as_bytes(),
            b"new-pass"
        );
    }
}
