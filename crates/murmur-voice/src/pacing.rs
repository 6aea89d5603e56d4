//! Speech duration estimates used to pace tool-call release.
//!
//! The estimate models an average vocalization rate of 2.5 words per second
//! (0.4 s per word) plus a fixed margin for synthesis and network latency.
//! When a turn produced tool calls but no narration at all, a fixed fallback
//! wait is used instead.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for each pacing value.
const MAX_PACING_SECONDS: f64 = 3600.0;

fn default_seconds_per_word() -> f64 {
    0.4
}

fn default_margin_seconds() -> f64 {
    1.0
}

fn default_silent_wait_seconds() -> f64 {
    2.0
}

/// Tunables for the pacing wait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechPacing {
    /// Seconds the synthesizer needs per spoken word.
    #[serde(default = "default_seconds_per_word")]
    pub seconds_per_word: f64,
    /// Added to every estimate that has narration.
    #[serde(default = "default_margin_seconds")]
    pub margin_seconds: f64,
    /// Wait used when tool calls arrive with no narration.
    #[serde(default = "default_silent_wait_seconds")]
    pub silent_wait_seconds: f64,
}

impl Default for SpeechPacing {
    fn default() -> Self {
        Self {
            seconds_per_word: default_seconds_per_word(),
            margin_seconds: default_margin_seconds(),
            silent_wait_seconds: default_silent_wait_seconds(),
        }
    }
}

impl SpeechPacing {
    /// Estimated seconds to vocalize `words` words.
    pub fn narration_seconds(&self, words: usize) -> f64 {
        words as f64 * self.seconds_per_word + self.margin_seconds
    }

    /// How long to hold buffered tool calls at the end of a turn.
    ///
    /// `None` means there were no text fragments and the fixed silent wait
    /// applies; `Some(words)` means narration was forwarded.
    pub fn tool_release_delay(&self, narrated_words: Option<usize>) -> Duration {
        let seconds = match narrated_words {
            Some(words) => self.narration_seconds(words),
            None => self.silent_wait_seconds,
        };
        Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Rejects negative or non-finite values and values above an hour.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("seconds_per_word", self.seconds_per_word),
            ("margin_seconds", self.margin_seconds),
            ("silent_wait_seconds", self.silent_wait_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("pacing.{} must be a non-negative number", name));
            }
            if value > MAX_PACING_SECONDS {
                return Err(format!(
                    "pacing.{} must not exceed {} seconds",
                    name, MAX_PACING_SECONDS
                ));
            }
        }
        Ok(())
    }
}

/// Counts whitespace-separated words in one text delta.
///
/// Counting is per fragment, so a word split across two deltas ("hel" +
/// "lo") counts twice.
pub fn count_words(content: &str) -> usize {
    content.split_whitespace().count()
}
