// Tests for the transcript merge engine
//
// Each incoming result is evaluated against the last segment only:
// full overlap keeps the longer text, partial word overlap splices the
// two together, anything else appends.

use livescribe::{MergeConfig, MergeOutcome, TranscriptMerger};

fn merger() -> TranscriptMerger {
    TranscriptMerger::new(MergeConfig::default())
}

fn run(texts: &[&str]) -> Vec<String> {
    let mut m = merger();
    for text in texts {
        m.push(text);
    }
    m.segments().to_vec()
}

#[test]
fn first_result_is_appended() {
    let mut m = merger();
    assert_eq!(m.push("hello world"), MergeOutcome::Appended);
    assert_eq!(m.segments(), ["hello world"]);
}

#[test]
fn full_overlap_keeps_longer_incoming() {
    assert_eq!(
        run(&["hello world", "hello world extended"]),
        ["hello world extended"]
    );
}

#[test]
fn full_overlap_keeps_longer_previous() {
    let mut m = merger();
    m.push("hello world extended");
    assert_eq!(m.push("hello world"), MergeOutcome::KeptPrevious);
    assert_eq!(m.segments(), ["hello world extended"]);
}

#[test]
fn partial_overlap_merges_on_largest_matching_window() {
    // "quick brown" vs "brown fox" fail at k=2; k=1 matches on "brown"
    assert_eq!(
        run(&["the quick brown", "brown fox jumps"]),
        ["the quick brown fox jumps"]
    );
}

#[test]
fn partial_overlap_prefers_wider_window() {
    assert_eq!(
        run(&["we should meet next week", "meet next week on tuesday"]),
        ["we should meet next week on tuesday"]
    );
}

#[test]
fn no_overlap_appends_new_segment() {
    assert_eq!(
        run(&["good morning", "completely unrelated text"]),
        ["good morning", "completely unrelated text"]
    );
}

#[test]
fn blank_results_are_skipped() {
    let mut m = merger();
    m.push("hello");
    assert_eq!(m.push("   "), MergeOutcome::Skipped);
    m.push("world");
    assert_eq!(m.segments(), ["hello", "world"]);
}

#[test]
fn merge_is_idempotent_over_merged_output() {
    let merged = run(&["the quick brown", "brown fox jumps"]);

    let mut again = merger();
    for segment in &merged {
        again.push(segment);
    }
    assert_eq!(again.segments(), merged.as_slice());
}

#[test]
fn detection_is_case_insensitive_but_output_keeps_incoming_casing() {
    assert_eq!(
        run(&["we saw the Brown", "brown Fox today"]),
        ["we saw the brown Fox today"]
    );
}

#[test]
fn matched_tail_is_located_at_its_last_occurrence() {
    // "brown" appears twice in the previous segment; the cut happens at
    // the trailing one
    assert_eq!(
        run(&["brown dog and brown", "brown fox"]),
        ["brown dog and brown fox"]
    );
}

#[test]
fn overlap_window_is_configurable() {
    // With a 1-word window, the 2-word overlap is not found at k=2, but
    // k=1 still matches on "week"
    let mut narrow = TranscriptMerger::new(MergeConfig {
        max_overlap_words: 1,
    });
    narrow.push("see you next week");
    assert_eq!(narrow.push("week after next"), MergeOutcome::MergedLast);
    assert_eq!(narrow.segments(), ["see you next week after next"]);
}

#[test]
fn full_overlap_takes_precedence_over_partial() {
    // Incoming is a substring of the previous segment and also shares
    // word boundaries; the substring rule wins and nothing changes
    let mut m = merger();
    m.push("the quick brown fox");
    assert_eq!(m.push("brown fox"), MergeOutcome::KeptPrevious);
    assert_eq!(m.segments(), ["the quick brown fox"]);
}

#[test]
fn whole_previous_segment_can_be_the_overlap() {
    let mut m = merger();
    m.push("hello there");
    assert_eq!(m.push("Hello there friend"), MergeOutcome::MergedLast);
    assert_eq!(m.segments(), ["Hello there friend"]);
}

#[test]
fn lowercasing_that_shifts_byte_offsets_still_merges_cleanly() {
    // 'İ' grows and 'Ω' shrinks under lowercasing, so byte offsets into
    // the lowercased text cannot index the original; the word-rebuild
    // path takes over instead of slicing
    assert_eq!(
        run(&["the İstanbul Ωmega report", "Report is ready"]),
        ["the İstanbul Ωmega Report is ready"]
    );
}

#[test]
fn clear_empties_the_transcript() {
    let mut m = merger();
    m.push("hello");
    m.clear();
    assert!(m.is_empty());
}

#[test]
fn joined_concatenates_segments_with_newlines() {
    let mut m = merger();
    m.push("good morning");
    m.push("unrelated closing words");
    assert_eq!(m.joined(), "good morning\nunrelated closing words");
}
