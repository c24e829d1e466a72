use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::types::SessionToken;

const TOKEN_BYTE_LENGTH: usize = 8;

/// Produces candidate session tokens. Uniqueness against live sessions is
/// checked by the store, which asks for another candidate on collision.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> SessionToken;
}

/// 8 bytes from the OS RNG, URL-safe base64 without padding (11 chars).
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokenGenerator;

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self) -> SessionToken {
        let mut bytes = [0u8; TOKEN_BYTE_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        SessionToken::new(URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Replays a fixed list of tokens, then falls back to random ones.
#[derive(Debug, Default)]
pub struct ScriptedTokenGenerator {
    queue: Mutex<VecDeque<SessionToken>>,
}

impl ScriptedTokenGenerator {
    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SessionToken>,
    {
        Self {
            queue: Mutex::new(tokens.into_iter().map(Into::into).collect()),
        }
    }
}

impl TokenGenerator for ScriptedTokenGenerator {
    fn generate(&self) -> SessionToken {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| RandomTokenGenerator.generate())
    }
}
