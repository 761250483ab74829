use crate::language::LanguageCode;
use crate::transcribe::{ChunkStatus, TranscriptionResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// One chunk's contribution to the transcript.
///
/// Non-success statuses are kept too: the assembled transcript shows exactly
/// which interval is missing and why.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptSegment {
    pub sequence: u64,
    pub status: ChunkStatus,
    pub text: String,
    pub confidence: f32,
    pub language: Option<LanguageCode>,
}

impl TranscriptSegment {
    pub fn from_result(result: &TranscriptionResult) -> Self {
        Self {
            sequence: result.sequence,
            status: result.status,
            text: result.text.clone(),
            confidence: result.confidence,
            language: result.language,
        }
    }
}

/// Sparse, sequence-ordered transcript.
///
/// Results may land in any completion order; reads compact to ascending
/// sequence, so chunk 5 resolving before chunk 4 never shows out of order.
#[derive(Debug, Default)]
pub struct Transcript {
    segments: BTreeMap<u64, TranscriptSegment>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a segment at its sequence position. Each sequence is consumed
    /// exactly once; a duplicate is refused.
    pub fn apply(&mut self, segment: TranscriptSegment) -> bool {
        match self.segments.entry(segment.sequence) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(segment);
                true
            }
        }
    }

    /// All segments in ascending sequence order.
    pub fn segments(&self) -> Vec<TranscriptSegment> {
        self.segments.values().cloned().collect()
    }

    /// Concatenated successful text in sequence order.
    pub fn text(&self) -> String {
        self.segments
            .values()
            .filter(|segment| segment.status == ChunkStatus::Success)
            .map(|segment| segment.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(sequence: u64, status: ChunkStatus, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            sequence,
            status,
            text: text.to_string(),
            confidence: 0.9,
            language: Some(LanguageCode::En),
        }
    }

    #[test]
    fn out_of_order_application_compacts_in_sequence_order() {
        let mut transcript = Transcript::new();
        transcript.apply(segment(5, ChunkStatus::Success, "five"));
        transcript.apply(segment(4, ChunkStatus::Success, "four"));
        transcript.apply(segment(1, ChunkStatus::Success, "one"));

        let sequences: Vec<u64> = transcript.segments().iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![1, 4, 5]);
        assert_eq!(transcript.text(), "one four five");
    }

    #[test]
    fn non_success_segments_leave_gaps_in_text() {
        let mut transcript = Transcript::new();
        transcript.apply(segment(1, ChunkStatus::Success, "first"));
        transcript.apply(segment(2, ChunkStatus::Error, ""));
        transcript.apply(segment(3, ChunkStatus::Success, "third"));

        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.text(), "first third");
    }

    #[test]
    fn duplicate_sequence_is_refused() {
        let mut transcript = Transcript::new();
        assert!(transcript.apply(segment(1, ChunkStatus::Success, "original")));
        assert!(!transcript.apply(segment(1, ChunkStatus::Success, "duplicate")));
        assert_eq!(transcript.text(), "original");
    }
}
