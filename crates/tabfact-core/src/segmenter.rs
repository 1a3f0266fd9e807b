//! Streaming reasoning/answer segmentation.
//!
//! Tokens arrive one at a time. Each token is classified as reasoning
//! (between the start and end markers) or answer (everything else). A
//! marker may be split across any number of consecutive tokens; the
//! trailing fragment that could still become a marker is held back until
//! the next token decides it.
//!
//! One [`Segmenter`] exists per run. It is created when the stream opens
//! and dropped when the stream ends or is cancelled, so no state can leak
//! from one run into the next.

use crate::markers::MarkerPair;
use crate::types::{Delta, Region};

/// What a single step appended, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentUpdate {
    /// Pieces appended to the accumulators, in arrival order
    pub deltas: Vec<Delta>,

    /// The reasoning accumulator went from empty to non-empty in this step
    pub reasoning_started: bool,

    /// The answer accumulator went from empty to non-empty in this step
    pub answer_started: bool,
}

impl SegmentUpdate {
    /// Whether the step appended nothing.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// Incremental reasoning/answer classifier for one streaming session.
#[derive(Debug, Clone)]
pub struct Segmenter {
    markers: MarkerPair,
    in_reasoning_block: bool,
    reasoning_text: String,
    answer_text: String,
    pending_start_fragment: String,
    pending_end_fragment: String,
}

impl Segmenter {
    /// Create a segmenter for one run.
    pub fn new(markers: MarkerPair) -> Self {
        Self {
            markers,
            in_reasoning_block: false,
            reasoning_text: String::new(),
            answer_text: String::new(),
            pending_start_fragment: String::new(),
            pending_end_fragment: String::new(),
        }
    }

    /// The marker pair this segmenter was created with.
    pub fn markers(&self) -> &MarkerPair {
        &self.markers
    }

    /// Whether the last consumed text left us inside a reasoning block.
    pub fn in_reasoning_block(&self) -> bool {
        self.in_reasoning_block
    }

    /// Reasoning text accumulated so far.
    pub fn reasoning(&self) -> &str {
        &self.reasoning_text
    }

    /// Answer text accumulated so far.
    pub fn answer(&self) -> &str {
        &self.answer_text
    }

    /// Marker fragment currently held back, if any.
    pub fn pending_fragment(&self) -> &str {
        if self.in_reasoning_block {
            &self.pending_end_fragment
        } else {
            &self.pending_start_fragment
        }
    }

    /// Consume one token.
    pub fn push(&mut self, token: &str) -> SegmentUpdate {
        let mut update = SegmentUpdate::default();

        // Prepend whatever fragment the previous token left for the current state.
        let pending = if self.in_reasoning_block {
            std::mem::take(&mut self.pending_end_fragment)
        } else {
            std::mem::take(&mut self.pending_start_fragment)
        };
        let mut text = pending;
        text.push_str(token);

        let mut rest = text.as_str();
        loop {
            let (found, marker_len) = {
                let marker = self.awaited_marker();
                (rest.find(marker), marker.len())
            };

            match found {
                Some(idx) => {
                    self.append(&rest[..idx], &mut update);
                    rest = &rest[idx + marker_len..];
                    self.in_reasoning_block = !self.in_reasoning_block;
                    tracing::trace!(
                        in_reasoning_block = self.in_reasoning_block,
                        "marker boundary"
                    );
                }
                None => {
                    // The tail may end with the beginning of the next marker.
                    let held = trailing_marker_prefix(rest, self.awaited_marker());
                    let cut = rest.len() - held;
                    self.append(&rest[..cut], &mut update);
                    if held > 0 {
                        let fragment = rest[cut..].to_string();
                        if self.in_reasoning_block {
                            self.pending_end_fragment = fragment;
                        } else {
                            self.pending_start_fragment = fragment;
                        }
                    }
                    break;
                }
            }
        }

        update
    }

    /// Flush a held-back fragment at end of stream.
    ///
    /// A fragment that never completed a marker is ordinary text and goes to
    /// the region that was active.
    pub fn finish(&mut self) -> SegmentUpdate {
        let mut update = SegmentUpdate::default();
        let pending = if self.in_reasoning_block {
            std::mem::take(&mut self.pending_end_fragment)
        } else {
            std::mem::take(&mut self.pending_start_fragment)
        };
        self.append(&pending, &mut update);
        update
    }

    /// Consume the segmenter, returning `(reasoning, answer)`.
    pub fn into_parts(self) -> (String, String) {
        (self.reasoning_text, self.answer_text)
    }

    fn awaited_marker(&self) -> &str {
        if self.in_reasoning_block {
            &self.markers.end
        } else {
            &self.markers.start
        }
    }

    fn append(&mut self, text: &str, update: &mut SegmentUpdate) {
        if text.is_empty() {
            return;
        }

        let region = if self.in_reasoning_block {
            Region::Reasoning
        } else {
            Region::Answer
        };

        let (accumulator, started) = match region {
            Region::Reasoning => (&mut self.reasoning_text, &mut update.reasoning_started),
            Region::Answer => (&mut self.answer_text, &mut update.answer_started),
        };
        if accumulator.is_empty() {
            *started = true;
        }
        accumulator.push_str(text);

        update.deltas.push(Delta {
            region,
            text: text.to_string(),
        });
    }
}

/// Length of the longest suffix of `text` that is a strict, non-empty prefix
/// of `marker`. Zero when there is none.
fn trailing_marker_prefix(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .filter(|&len| marker.is_char_boundary(len))
        .find(|&len| text.ends_with(&marker[..len]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn think() -> MarkerPair {
        MarkerPair::default()
    }

    fn run(markers: MarkerPair, tokens: &[&str]) -> (String, String) {
        let mut segmenter = Segmenter::new(markers);
        for token in tokens {
            segmenter.push(token);
        }
        segmenter.finish();
        segmenter.into_parts()
    }

    /// Whole-text split used as the oracle: leftmost marker search, toggling state.
    fn reference(markers: &MarkerPair, input: &str) -> (String, String) {
        let mut reasoning = String::new();
        let mut answer = String::new();
        let mut in_block = false;
        let mut rest = input;
        loop {
            let marker = if in_block { &markers.end } else { &markers.start };
            let target = if in_block { &mut reasoning } else { &mut answer };
            match rest.find(marker.as_str()) {
                Some(idx) => {
                    target.push_str(&rest[..idx]);
                    rest = &rest[idx + marker.len()..];
                    in_block = !in_block;
                }
                None => {
                    target.push_str(rest);
                    break;
                }
            }
        }
        (reasoning, answer)
    }

    #[test]
    fn test_single_token_think_block() {
        let (reasoning, answer) = run(think(), &["<think>reasoning part</think>final answer"]);
        assert_eq!(reasoning, "reasoning part");
        assert_eq!(answer, "final answer");
    }

    #[test]
    fn test_no_markers_all_answer() {
        let (reasoning, answer) = run(think(), &["The claim ", "is ", "true."]);
        assert_eq!(reasoning, "");
        assert_eq!(answer, "The claim is true.");
    }

    #[test]
    fn test_start_marker_split_across_tokens() {
        let split = run(think(), &["<th", "ink>", "step one", "</think>", "done"]);
        let whole = run(think(), &["<think>", "step one", "</think>", "done"]);
        assert_eq!(split, whole);
        assert_eq!(split.0, "step one");
        assert_eq!(split.1, "done");
    }

    #[test]
    fn test_marker_split_into_single_characters() {
        let input = "<think>abc</think>xyz";
        let tokens: Vec<String> = input.chars().map(|c| c.to_string()).collect();
        let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();
        assert_eq!(run(think(), &tokens), ("abc".to_string(), "xyz".to_string()));
    }

    #[test]
    fn test_end_marker_split_after_start_in_same_token() {
        let (reasoning, answer) = run(think(), &["<think>abc</thi", "nk>answer"]);
        assert_eq!(reasoning, "abc");
        assert_eq!(answer, "answer");
    }

    #[test]
    fn test_fragment_that_is_not_a_marker_is_kept() {
        let mut segmenter = Segmenter::new(think());
        let first = segmenter.push("a <");
        assert_eq!(first.deltas, vec![Delta::answer("a ")]);
        assert_eq!(segmenter.pending_fragment(), "<");

        let second = segmenter.push("b");
        assert_eq!(second.deltas, vec![Delta::answer("<b")]);
        assert_eq!(segmenter.answer(), "a <b");
    }

    #[test]
    fn test_finish_flushes_pending_fragment() {
        let mut segmenter = Segmenter::new(think());
        segmenter.push("x < y and y <th");
        assert_eq!(segmenter.answer(), "x < y and y ");

        let update = segmenter.finish();
        assert_eq!(update.deltas, vec![Delta::answer("<th")]);
        assert_eq!(segmenter.answer(), "x < y and y <th");
    }

    #[test]
    fn test_region_started_flags() {
        let mut segmenter = Segmenter::new(think());

        let update = segmenter.push("<think>");
        assert!(!update.reasoning_started);
        assert!(update.is_empty());

        let update = segmenter.push("hmm");
        assert!(update.reasoning_started);
        assert!(!update.answer_started);

        let update = segmenter.push(" more");
        assert!(!update.reasoning_started);

        let update = segmenter.push("</think>{");
        assert!(update.answer_started);
        assert!(!update.reasoning_started);

        let update = segmenter.push("}");
        assert!(!update.answer_started);
    }

    #[test]
    fn test_repeated_pairs_toggle() {
        let (reasoning, answer) = run(think(), &["a<think>b</think>c<think>d</think>e"]);
        assert_eq!(reasoning, "bd");
        assert_eq!(answer, "ace");
    }

    #[test]
    fn test_exaone_markers() {
        let (reasoning, answer) = run(
            MarkerPair::for_model("exaone-deep"),
            &["<thou", "ght>check row 2</tho", "ught>{\"answer\":\"TRUE\"}"],
        );
        assert_eq!(reasoning, "check row 2");
        assert_eq!(answer, "{\"answer\":\"TRUE\"}");
    }

    #[test]
    fn test_unclosed_reasoning_block() {
        let (reasoning, answer) = run(think(), &["<think>never", " closes"]);
        assert_eq!(reasoning, "never closes");
        assert_eq!(answer, "");
    }

    #[test]
    fn test_multibyte_text_around_markers() {
        let (reasoning, answer) = run(think(), &["<think>größer ", "als 5</th", "ink>é✓"]);
        assert_eq!(reasoning, "größer als 5");
        assert_eq!(answer, "é✓");
    }

    #[test]
    fn test_trailing_marker_prefix() {
        assert_eq!(trailing_marker_prefix("abc<thi", "<think>"), 4);
        assert_eq!(trailing_marker_prefix("abc<", "<think>"), 1);
        assert_eq!(trailing_marker_prefix("abc", "<think>"), 0);
        // The full marker is not a strict prefix
        assert_eq!(trailing_marker_prefix("x<think>", "<think>"), 0);
    }

    fn pieces() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(
            prop_oneof![
                Just("<think>".to_string()),
                Just("</think>".to_string()),
                Just("<".to_string()),
                Just("</".to_string()),
                Just("<th".to_string()),
                "[a-z <>/{}\"]{0,6}",
            ],
            0..24,
        )
    }

    proptest! {
        #[test]
        fn prop_split_points_do_not_matter(
            parts in pieces(),
            cuts in prop::collection::vec(0usize..200, 0..12),
        ) {
            let markers = think();
            let input: String = parts.concat();

            let mut points: Vec<usize> = cuts.into_iter().map(|c| c % (input.len() + 1)).collect();
            points.sort_unstable();
            points.dedup();

            let mut tokens = Vec::new();
            let mut last = 0;
            for point in points {
                tokens.push(&input[last..point]);
                last = point;
            }
            tokens.push(&input[last..]);

            prop_assert_eq!(run(markers.clone(), &tokens), reference(&markers, &input));
        }

        #[test]
        fn prop_deltas_reproduce_input_without_markers(
            parts in pieces(),
            token_len in 1usize..9,
        ) {
            let markers = think();
            let input: String = parts.concat();

            let mut segmenter = Segmenter::new(markers.clone());
            let mut deltas = Vec::new();
            let bytes = input.as_bytes();
            for chunk in bytes.chunks(token_len) {
                let token = std::str::from_utf8(chunk).unwrap();
                deltas.extend(segmenter.push(token).deltas);
            }
            deltas.extend(segmenter.finish().deltas);

            let (reasoning, answer) = reference(&markers, &input);
            let joined: String = deltas.iter().map(|d| d.text.as_str()).collect();
            prop_assert_eq!(joined.len(), reasoning.len() + answer.len());

            let by_region = |region: Region| -> String {
                deltas.iter().filter(|d| d.region == region).map(|d| d.text.as_str()).collect()
            };
            prop_assert_eq!(by_region(Region::Reasoning), reasoning);
            prop_assert_eq!(by_region(Region::Answer), answer);
        }

        #[test]
        fn prop_marker_free_input_is_all_answer(input in "[a-z {}\"]{0,80}") {
            let (reasoning, answer) = run(think(), &[input.as_str()]);
            prop_assert_eq!(reasoning, "");
            prop_assert_eq!(answer, input);
        }
    }
}
