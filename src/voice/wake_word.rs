//! Wake phrase detection
//!
//! Activation is a case-insensitive substring match against transcript text,
//! so a phrase embedded in a longer interim or final fragment still triggers.

/// Default activation phrases
pub const DEFAULT_WAKE_PHRASES: &[&str] = &["hello friday", "hey friday"];

/// Phrases that close the session from inside a turn
pub const DEFAULT_EXIT_PHRASES: &[&str] = &["goodbye", "stop listening", "go to sleep", "deactivate"];

/// Reply phrases that end the session once playback finishes
pub const DEFAULT_FAREWELL_PHRASES: &[&str] = &["goodbye", "see you", "going to sleep"];

/// A normalized set of phrases matched as case-insensitive substrings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseSet {
    phrases: Vec<String>,
}

impl PhraseSet {
    /// Build a phrase set, trimming and lower-casing each phrase
    ///
    /// Blank phrases are dropped: an empty needle would match every string.
    #[must_use]
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        Self { phrases }
    }

    /// First phrase contained in `text`, if any
    #[must_use]
    pub fn find(&self, text: &str) -> Option<&str> {
        let normalized = text.to_lowercase();
        self.phrases
            .iter()
            .find(|p| normalized.contains(p.as_str()))
            .map(String::as_str)
    }

    /// Whether `text` contains any phrase
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.find(text).is_some()
    }

    /// `text` with its first matched phrase removed and whitespace collapsed
    ///
    /// Returns `None` if no phrase matches.
    #[must_use]
    pub fn strip(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        let (start, phrase) = self
            .phrases
            .iter()
            .find_map(|p| lower.find(p.as_str()).map(|i| (i, p)))?;
        let end = start + phrase.len();

        // Lower-casing can shift byte offsets outside ASCII
        let (head, tail) = match (text.get(..start), text.get(end..)) {
            (Some(head), Some(tail)) if text.len() == lower.len() => (head, tail),
            _ => (&lower[..start], &lower[end..]),
        };

        let rest = head.split_whitespace().chain(tail.split_whitespace());
        Some(rest.collect::<Vec<_>>().join(" "))
    }

    /// The normalized phrases
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Whether the set has no phrases
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

/// Detects wake phrases in transcript fragments
#[derive(Debug, Clone)]
pub struct WakeWordDetector {
    phrases: PhraseSet,
}

impl WakeWordDetector {
    /// Create a new wake word detector
    ///
    /// # Arguments
    ///
    /// * `phrases` - Activation phrases (e.g., "hello friday")
    #[must_use]
    pub fn new(phrases: PhraseSet) -> Self {
        tracing::debug!(wake_phrases = ?phrases.phrases(), "wake word detector initialized");
        Self { phrases }
    }

    /// Check a candidate fragment for a wake phrase
    ///
    /// Returns true only when the session is not active yet and the text
    /// contains one of the phrases.
    #[must_use]
    pub fn detect(&self, transcript: &str, already_active: bool) -> bool {
        if already_active {
            return false;
        }

        match self.phrases.find(transcript) {
            Some(phrase) => {
                tracing::info!(wake_phrase = phrase, transcript, "wake phrase detected");
                true
            }
            None => false,
        }
    }

    /// Remove the wake phrase from a transcript that contains it
    #[must_use]
    pub fn strip(&self, transcript: &str) -> Option<String> {
        self.phrases.strip(transcript)
    }

    /// Get the configured wake phrases
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        self.phrases.phrases()
    }
}

impl Default for WakeWordDetector {
    fn default() -> Self {
        Self::new(PhraseSet::new(DEFAULT_WAKE_PHRASES))
    }
}
