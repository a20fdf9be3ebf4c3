//! PIN lock and mutation gate for one session.
//!
//! A session is either unlocked (anyone may drive the timer) or locked with
//! a PIN. While locked only the connections in the authorized set may
//! mutate. The claimant is authorized automatically; others join the set by
//! presenting the PIN with "unlock for me", or clear the lock for everyone
//! with "unlock for all".
//!
//! # PIN storage
//!
//! The PIN itself is never kept. On claim a fresh random HMAC-SHA256 key is
//! generated and only the key and `HMAC(key, pin)` are stored. Verification
//! is `ring::hmac::verify`, which compares in constant time. The key dies
//! with the lock, so a tag leaked from one lock says nothing about the next.
//!
//! # Penalties
//!
//! A wrong PIN puts the presenting connection in a penalty window during
//! which all of its events are dropped. This slows down guessing from a
//! single socket.

use crate::errors::LockError;

use common::secret::{ExposeSecret, SecretString};
use common::types::ConnectionId;
use ring::hmac;
use ring::rand::SystemRandom;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum number of digits in a lock PIN.
pub const MIN_PIN_LENGTH: usize = 6;

/// Who a matching PIN unlocks the session for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockScope {
    /// Authorize only the presenting connection; the lock stays on.
    #[default]
    Me,
    /// Release the lock for the whole session.
    All,
}

/// A lock transition that was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTransition {
    Claimed,
    GrantedSelf,
    ReleasedAll,
}

impl LockTransition {
    /// Returns the transition as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LockTransition::Claimed => "claimed",
            LockTransition::GrantedSelf => "granted_self",
            LockTransition::ReleasedAll => "released_all",
        }
    }
}

/// Check that a PIN is at least [`MIN_PIN_LENGTH`] ASCII digits.
pub fn validate_pin(pin: &SecretString) -> Result<(), LockError> {
    let pin = pin.expose_secret();
    if pin.len() >= MIN_PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(LockError::InvalidPin)
    }
}

/// Keyed digest of a PIN.
struct PinDigest {
    key: hmac::Key,
    tag: Vec<u8>,
}

impl PinDigest {
    fn new(pin: &SecretString, rng: &SystemRandom) -> Result<Self, LockError> {
        let key = hmac::Key::generate(hmac::HMAC_SHA256, rng)
            .map_err(|_| LockError::KeyGeneration)?;
        let tag = hmac::sign(&key, pin.expose_secret().as_bytes());
        Ok(Self {
            key,
            tag: tag.as_ref().to_vec(),
        })
    }

    fn matches(&self, pin: &SecretString) -> bool {
        hmac::verify(&self.key, pin.expose_secret().as_bytes(), &self.tag).is_ok()
    }
}

enum LockState {
    Unlocked,
    Locked {
        digest: PinDigest,
        authorized: HashSet<ConnectionId>,
    },
}

/// Lock state and mutation gate for one session.
pub struct LockGate {
    state: LockState,
    penalties: HashMap<ConnectionId, Instant>,
    penalty: Duration,
    rng: SystemRandom,
}

impl fmt::Debug for LockGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGate")
            .field("locked", &self.is_locked())
            .field("authorized", &self.authorized_count())
            .field("penalized", &self.penalties.len())
            .field("penalty", &self.penalty)
            .finish_non_exhaustive()
    }
}

impl LockGate {
    /// Create an unlocked gate. A zero `penalty` disables wrong-PIN penalties.
    #[must_use]
    pub fn new(penalty: Duration) -> Self {
        Self {
            state: LockState::Unlocked,
            penalties: HashMap::new(),
            penalty,
            rng: SystemRandom::new(),
        }
    }

    /// Whether the session is locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self.state, LockState::Locked { .. })
    }

    /// Number of connections currently authorized under the lock.
    #[must_use]
    pub fn authorized_count(&self) -> usize {
        match &self.state {
            LockState::Unlocked => 0,
            LockState::Locked { authorized, .. } => authorized.len(),
        }
    }

    /// Whether `connection_id` may mutate the timer: the session is
    /// unlocked, or the connection is in the authorized set.
    ///
    /// This is also the viewer's `lockedForMe` flag.
    #[must_use]
    pub fn may_mutate(&self, connection_id: &ConnectionId) -> bool {
        match &self.state {
            LockState::Unlocked => true,
            LockState::Locked { authorized, .. } => authorized.contains(connection_id),
        }
    }

    /// Fail with [`LockError::Penalized`] while `connection_id` is inside a
    /// wrong-PIN penalty window. Expired windows are dropped.
    pub fn check_penalty(
        &mut self,
        connection_id: &ConnectionId,
        now: Instant,
    ) -> Result<(), LockError> {
        match self.penalties.get(connection_id) {
            Some(until) if now < *until => Err(LockError::Penalized),
            Some(_) => {
                self.penalties.remove(connection_id);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Lock the session with `pin`, authorizing only the claimant.
    pub fn claim(
        &mut self,
        connection_id: &ConnectionId,
        pin: &SecretString,
    ) -> Result<(), LockError> {
        if self.is_locked() {
            return Err(LockError::AlreadyLocked);
        }
        validate_pin(pin)?;

        let digest = PinDigest::new(pin, &self.rng)?;
        self.state = LockState::Locked {
            digest,
            authorized: HashSet::from([connection_id.clone()]),
        };
        Ok(())
    }

    /// Add `connection_id` to the authorized set if `pin` matches.
    pub fn grant_self(
        &mut self,
        connection_id: &ConnectionId,
        pin: &SecretString,
        now: Instant,
    ) -> Result<(), LockError> {
        self.verify(connection_id, pin, now)?;
        if let LockState::Locked { authorized, .. } = &mut self.state {
            authorized.insert(connection_id.clone());
        }
        Ok(())
    }

    /// Unlock the session for everyone if `pin` matches.
    pub fn release_all(
        &mut self,
        connection_id: &ConnectionId,
        pin: &SecretString,
        now: Instant,
    ) -> Result<(), LockError> {
        self.verify(connection_id, pin, now)?;
        self.state = LockState::Unlocked;
        Ok(())
    }

    /// Handle a `toggle_lock` request: claim when unlocked, otherwise grant
    /// or release depending on `scope`.
    pub fn toggle(
        &mut self,
        connection_id: &ConnectionId,
        pin: &SecretString,
        scope: UnlockScope,
        now: Instant,
    ) -> Result<LockTransition, LockError> {
        if !self.is_locked() {
            return self
                .claim(connection_id, pin)
                .map(|()| LockTransition::Claimed);
        }

        match scope {
            UnlockScope::Me => self
                .grant_self(connection_id, pin, now)
                .map(|()| LockTransition::GrantedSelf),
            UnlockScope::All => self
                .release_all(connection_id, pin, now)
                .map(|()| LockTransition::ReleasedAll),
        }
    }

    /// Drop everything the gate remembers about a departed connection.
    pub fn forget(&mut self, connection_id: &ConnectionId) {
        self.penalties.remove(connection_id);
        if let LockState::Locked { authorized, .. } = &mut self.state {
            authorized.remove(connection_id);
        }
    }

    fn verify(
        &mut self,
        connection_id: &ConnectionId,
        pin: &SecretString,
        now: Instant,
    ) -> Result<(), LockError> {
        let LockState::Locked { digest, .. } = &self.state else {
            return Err(LockError::NotLocked);
        };

        if digest.matches(pin) {
            return Ok(());
        }

        if !self.penalty.is_zero() {
            self.penalties
                .insert(connection_id.clone(), now + self.penalty);
        }
        Err(LockError::PinMismatch)
    }
}
