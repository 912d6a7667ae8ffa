//! Transcript merge engine
//!
//! Folds per-chunk transcription results into an ordered transcript,
//! removing the duplication the audio overlap introduces. Only the most
//! recent segment is ever inspected or rewritten; earlier segments are
//! final.

/// Merge engine configuration
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Largest word-boundary overlap considered between the previous
    /// segment's tail and the incoming text's head
    pub max_overlap_words: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_overlap_words: 3,
        }
    }
}

/// What `push` did with the incoming text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Blank after trimming, contributed nothing
    Skipped,
    /// Became a new segment
    Appended,
    /// Full overlap, incoming text was longer and replaced the last segment
    ReplacedLast,
    /// Full overlap, previous segment was longer and the incoming text was discarded
    KeptPrevious,
    /// Partial word overlap, merged into the last segment
    MergedLast,
}

/// Deduplicating transcript accumulator
pub struct TranscriptMerger {
    config: MergeConfig,
    segments: Vec<String>,
}

impl TranscriptMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self {
            config,
            segments: Vec::new(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn joined(&self) -> String {
        self.segments.join("\n")
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// Fold one transcription result into the transcript.
    ///
    /// Full overlap (one text containing the other) keeps the longer of
    /// the two and takes precedence over partial overlap. Partial
    /// overlap matches the previous segment's last k words against the
    /// incoming text's first k words, case-insensitively, for the
    /// largest k within the configured window; the merged segment keeps
    /// the incoming text's original casing for the appended tail.
    pub fn push(&mut self, text: &str) -> MergeOutcome {
        let incoming = text.trim();
        if incoming.is_empty() {
            return MergeOutcome::Skipped;
        }

        let prev = match self.segments.last() {
            Some(prev) => prev,
            None => {
                self.segments.push(incoming.to_string());
                return MergeOutcome::Appended;
            }
        };

        if prev.contains(incoming) {
            return MergeOutcome::KeptPrevious;
        }

        if incoming.contains(prev.as_str()) {
            let last = self.segments.len() - 1;
            self.segments[last] = incoming.to_string();
            return MergeOutcome::ReplacedLast;
        }

        if let Some(merged) = merge_partial_overlap(prev, incoming, self.config.max_overlap_words)
        {
            let last = self.segments.len() - 1;
            self.segments[last] = merged;
            return MergeOutcome::MergedLast;
        }

        self.segments.push(incoming.to_string());
        MergeOutcome::Appended
    }
}

/// Merge `cur` onto `prev` when the last k words of `prev` match the
/// first k words of `cur`, for the largest k up to `max_overlap_words`.
/// Returns `None` when no window matches.
fn merge_partial_overlap(prev: &str, cur: &str, max_overlap_words: usize) -> Option<String> {
    let prev_words: Vec<&str> = prev.split_whitespace().collect();
    let cur_words: Vec<&str> = cur.split_whitespace().collect();

    let max_k = max_overlap_words.min(prev_words.len()).min(cur_words.len());

    for k in (1..=max_k).rev() {
        let tail = &prev_words[prev_words.len() - k..];
        let head = &cur_words[..k];

        let matched = tail
            .iter()
            .zip(head.iter())
            .all(|(a, b)| a.to_lowercase() == b.to_lowercase());
        if !matched {
            continue;
        }

        // Cut prev before the last occurrence of the matched phrase,
        // then append the whole of cur with its original casing.
        let phrase = tail.join(" ");
        let head_text = cut_before_last_occurrence(prev, &phrase)
            .unwrap_or_else(|| prev_words[..prev_words.len() - k].join(" "));
        let head_text = head_text.trim_end();

        return Some(if head_text.is_empty() {
            cur.to_string()
        } else {
            format!("{} {}", head_text, cur)
        });
    }

    None
}

/// Everything in `text` before the last case-insensitive occurrence of
/// `phrase`. Returns `None` when any character changes byte length
/// under lowercasing, since then offsets into the lowercased copy do
/// not map back onto `text`; the caller rebuilds the prefix from words
/// instead.
fn cut_before_last_occurrence(text: &str, phrase: &str) -> Option<String> {
    let offsets_stable = text
        .chars()
        .all(|c| c.to_lowercase().map(char::len_utf8).sum::<usize>() == c.len_utf8());
    if !offsets_stable {
        return None;
    }

    let text_lower = text.to_lowercase();
    let phrase_lower = phrase.to_lowercase();
    text_lower
        .rfind(&phrase_lower)
        .map(|idx| text[..idx].to_string())
}
