//! Per-user invocation rate limiting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// Enforces a minimum interval between successive invocations per user.
///
/// Check and update happen atomically under one lock, so concurrent calls
/// for different users are safe; a single user's calls are already
/// serialized by the caller.
pub struct RateLimiter {
    cooldown: Duration,
    last_invocation: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    /// Create a limiter with the given cooldown.
    pub fn new(cooldown: Duration) -> Self {
        RateLimiter {
            cooldown,
            last_invocation: Mutex::new(HashMap::new()),
        }
    }

    /// Allow or deny an invocation for `user_id` right now.
    ///
    /// On allow, "now" is recorded as the user's last invocation time. On
    /// deny, state is left untouched and the remaining wait is returned.
    pub fn allow(&self, user_id: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut last = self.last_invocation.lock().unwrap();
        if let Some(previous) = last.get(user_id) {
            let elapsed = now.duration_since(*previous);
            if elapsed < self.cooldown {
                let retry_after = self.cooldown - elapsed;
                debug!(user_id, ?retry_after, "invocation rate limited");
                return Err(retry_after);
            }
        }
        last.insert(user_id.to_string(), now);
        Ok(())
    }
}
