//! Chronologically sortable record keys.
//!
//! A key is 8 characters of millisecond timestamp followed by 12 random
//! characters, all drawn from an alphabet whose ASCII order matches its
//! digit order. Keys therefore sort by creation time, and keys generated in
//! the same millisecond by one generator are strictly increasing.

use chrono::Utc;
use rand::Rng;
use std::sync::Mutex;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Length of every generated key.
pub const KEY_LEN: usize = 20;

#[derive(Debug, Default)]
struct KeyState {
    last_millis: i64,
    last_random: [u8; 12],
}

/// Generates push keys. One generator per store handle.
#[derive(Debug, Default)]
pub struct KeyGenerator {
    state: Mutex<KeyState>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_key(&self) -> String {
        self.next_key_at(Utc::now().timestamp_millis())
    }

    fn next_key_at(&self, millis: i64) -> String {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        // A clock that steps backwards must not break ordering.
        let millis = millis.max(state.last_millis);

        if millis == state.last_millis {
            for digit in state.last_random.iter_mut().rev() {
                if *digit == 63 {
                    *digit = 0;
                } else {
                    *digit += 1;
                    break;
                }
            }
        } else {
            let mut rng = rand::rng();
            for digit in state.last_random.iter_mut() {
                *digit = rng.random_range(0..64);
            }
            state.last_millis = millis;
        }

        let mut key = String::with_capacity(KEY_LEN);
        let mut timestamp = [0u8; 8];
        let mut remaining = millis.max(0) as u64;
        for slot in timestamp.iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }
        key.extend(timestamp.iter().map(|&b| b as char));
        key.extend(
            state
                .last_random
                .iter()
                .map(|&d| PUSH_CHARS[d as usize] as char),
        );
        key
    }
}
