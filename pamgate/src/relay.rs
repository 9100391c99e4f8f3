//! Single-slot hand-off of credentials to the PAM conversation.
//!
//! The conversation callback carries no per-call identity, so only one
//! credential-bearing transaction may run against a relay at a time. Holding
//! a [`RelayGuard`] is that permission; dropping it wipes the slot and lets
//! the next caller in.

use crate::conversation::TokenSource;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use zeroize::{Zeroize, Zeroizing};

#[derive(Default)]
struct Slot {
    to_check: Zeroizing<String>,
    to_set: Zeroizing<String>,
    // primary token, kept for current-password prompts once staged
    current: Zeroizing<String>,
    staged: bool,
}

impl Slot {
    fn clear(&mut self) {
        self.to_check.zeroize();
        self.to_set.zeroize();
        self.current.zeroize();
        self.staged = false;
    }

    fn is_empty(&self) -> bool {
        self.to_check.is_empty() && self.to_set.is_empty() && self.current.is_empty()
    }
}

#[derive(Default)]
pub struct CredentialRelay {
    slot: Mutex<RefCell<Slot>>,
}

impl CredentialRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the slot is free, then publish the tokens.
    ///
    /// `primary` answers the first password prompt; every later prompt gets
    /// `secondary`, or an empty string when there is none. After
    /// [`RelayGuard::stage_next`], prompts for the current password get
    /// `primary` again.
    pub fn acquire(&self, primary: &str, secondary: Option<&str>) -> RelayGuard<'_> {
        // A poisoned lock still holds a wiped slot: the guard clears it on unwind.
        let lock = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let mut guard = RelayGuard { slot: lock };

        let slot = guard.slot.get_mut();
        slot.clear();
        slot.to_check.push_str(primary);
        slot.to_set.push_str(secondary.unwrap_or_default());
        slot.current.push_str(primary);

        guard
    }

    /// True when no transaction holds the slot and it is empty
    pub fn is_idle(&self) -> bool {
        match self.slot.try_lock() {
            Ok(lock) => slot_is_empty(&lock),
            Err(TryLockError::Poisoned(poisoned)) => slot_is_empty(&poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => false,
        }
    }
}

fn slot_is_empty(slot: &RefCell<Slot>) -> bool {
    slot.borrow().is_empty()
}

impl fmt::Debug for CredentialRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRelay")
            .field("idle", &self.is_idle())
            .finish()
    }
}

/// Exclusive access to the relay slot for one transaction
pub struct RelayGuard<'a> {
    slot: MutexGuard<'a, RefCell<Slot>>,
}

impl RelayGuard<'_> {
    /// Make the token-to-set the next answer, whatever was consumed so far
    pub fn stage_next(&self) {
        let mut slot = self.slot.borrow_mut();
        let next = Zeroizing::new(slot.to_set.as_str().to_owned());
        slot.to_check = next;
        slot.staged = true;
    }
}

impl TokenSource for RelayGuard<'_> {
    fn next_token(&self) -> Zeroizing<String> {
        let mut slot = self.slot.borrow_mut();
        let next = Zeroizing::new(slot.to_set.as_str().to_owned());
        std::mem::replace(&mut slot.to_check, next)
    }

    fn current_token(&self) -> Zeroizing<String> {
        let staged = self.slot.borrow().staged;
        if staged {
            Zeroizing::new(self.slot.borrow().current.as_str().to_owned())
        } else {
            self.next_token()
        }
    }
}

impl Drop for RelayGuard<'_> {
    fn drop(&mut self) {
        self.slot.get_mut().clear();
    }
}

impl fmt::Debug for RelayGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn first_prompt_gets_primary_then_empty() {
        let relay = CredentialRelay::new();
        let guard = relay.acquire("hunter2", None);

        assert_eq!(guard.next_token().as_str(), "hunter2");
        assert_eq!(guard.next_token().as_str(), "");
        assert_eq!(guard.next_token().as_str(), "");
    }

    #[test]
    fn change_flow_rotates_to_new_token() {
        let relay = CredentialRelay::new();
        let guard = relay.acquire("old-pass", Some("new-pass"));

        assert_eq!(guard.next_token().as_str(), "old-pass");
        assert_eq!(guard.next_token().as_str(), "new-pass");
        // Retype prompt
        assert_eq!(guard.next_token().as_str(), "new-pass");
    }

    #[test]
    fn stage_next_skips_unconsumed_primary() {
        let relay = CredentialRelay::new();
        let guard = relay.acquire("old-pass", Some("new-pass"));

        guard.stage_next();
        assert_eq!(guard.next_token().as_str(), "new-pass");
    }

    #[test]
    fn current_token_rotates_until_staged() {
        let relay = CredentialRelay::new();
        let guard = relay.acquire("old-pass", Some("new-pass"));

        assert_eq!(guard.current_token().as_str(), "old-pass");
        guard.stage_next();
        assert_eq!(guard.current_token().as_str(), "old-pass");
        assert_eq!(guard.next_token().as_str(), "new-pass");
        assert_eq!(guard.current_token().as_str(), "old-pass");
    }

    #[test]
    fn staged_state_does_not_survive_release() {
        let relay = CredentialRelay::new();
        let guard = relay.acquire("old-pass", Some("new-pass"));
        guard.stage_next();
        drop(guard);
        assert!(relay.is_idle());

        let guard = relay.acquire("fresh", None);
        assert_eq!(guard.current_token().as_str(), "fresh");
        assert_eq!(guard.current_token().as_str(), "");
    }

    #[test]
    fn release_clears_slot() {
        let relay = CredentialRelay::new();
        assert!(relay.is_idle());

        let guard = relay.acquire("secret", Some("other"));
        assert!(!relay.is_idle());
        drop(guard);

        assert!(relay.is_idle());
    }

    #[test]
    fn reacquire_never_sees_previous_tokens() {
        let relay = CredentialRelay::new();
        drop(relay.acquire("first", Some("second")));

        let guard = relay.acquire("third", None);
        assert_eq!(guard.next_token().as_str(), "third");
        assert_eq!(guard.next_token().as_str(), "");
    }

    #[test]
    fn panic_while_held_still_clears() {
        let relay = CredentialRelay::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = relay.acquire("secret", None);
            panic!("module blew up");
        }));

        assert!(result.is_err());
        assert!(relay.is_idle());

        let guard = relay.acquire("next", None);
        assert_eq!(guard.next_token().as_str(), "next");
    }

    #[test]
    fn second_acquire_blocks_until_release() {
        let relay = Arc::new(CredentialRelay::new());
        let acquired = Arc::new(AtomicBool::new(false));

        let guard = relay.acquire("a", None);

        let handle = {
            let relay = Arc::clone(&relay);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let guard = relay.acquire("b", None);
                acquired.store(true, Ordering::SeqCst);
                guard.next_token().to_string()
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(guard);
        assert_eq!(handle.join().unwrap(), "b");
        assert!(acquired.load(Ordering::SeqCst));
        assert!(relay.is_idle());
    }

    #[test]
    fn debug_does_not_leak_tokens() {
        let relay = CredentialRelay::new();
        let guard = relay.acquire("hunter2", None);
        assert!(!format!("{:?}", guard).contains("hunter2"));
        drop(guard);
        assert!(!format!("{:?}", relay).contains("hunter2"));
    }
}
