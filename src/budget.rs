use crate::chunk::Chunk;

/// Character budget used when a caller does not pick one.
pub const DEFAULT_MAX_CHARS: usize = 12_000;

/// Greedy, rank-respecting context packer.
///
/// Walks chunks in rank order and keeps each one while the running
/// character total stays within `max_chars`. The first chunk that would
/// overflow ends the walk: later, smaller chunks are never pulled forward,
/// so the result is always a prefix of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudgeter {
    max_chars: usize,
}

impl Default for ContextBudgeter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl ContextBudgeter {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Number of leading chunks that fit the budget.
    pub fn fitting_prefix(&self, chunks: &[Chunk]) -> usize {
        let mut total = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            let len = chunk.char_len();
            if total + len > self.max_chars {
                return i;
            }
            total += len;
        }
        chunks.len()
    }

    /// The longest prefix of `chunks` whose text fits the budget.
    pub fn budget<'a>(&self, chunks: &'a [Chunk]) -> &'a [Chunk] {
        &chunks[..self.fitting_prefix(chunks)]
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::testing::chunk;

    fn sized(lengths: &[usize]) -> Vec<Chunk> {
        lengths
            .iter()
            .enumerate()
            .map(|(i, len)| chunk(&i.to_string(), &"x".repeat(*len)))
            .collect()
    }

    #[test]
    fn stops_at_first_overflow() {
        let chunks = sized(&[5000, 5000, 5000]);

        let kept = ContextBudgeter::new(12_000).budget(&chunks);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept.iter().map(Chunk::char_len).sum::<usize>(), 10_000);
    }

    #[test]
    fn does_not_skip_ahead_to_smaller_chunks() {
        let chunks = sized(&[5000, 8000, 100]);

        let kept = ContextBudgeter::new(12_000).budget(&chunks);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "0");
    }

    #[test]
    fn oversized_first_chunk_yields_empty() {
        let chunks = sized(&[13_000]);
        assert!(ContextBudgeter::new(12_000).budget(&chunks).is_empty());
    }

    #[test]
    fn exact_fit_is_kept() {
        let chunks = sized(&[4000, 8000]);
        assert_eq!(ContextBudgeter::new(12_000).budget(&chunks).len(), 2);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunks = vec![chunk("a", "éééé"), chunk("b", "éééé")];
        assert_eq!(ContextBudgeter::new(8).budget(&chunks).len(), 2);
    }

    #[test]
    fn empty_input_and_zero_budget() {
        assert!(ContextBudgeter::default().budget(&[]).is_empty());
        assert!(ContextBudgeter::new(0).budget(&sized(&[1])).is_empty());
    }

    proptest! {
        #[test]
        fn result_is_maximal_prefix_within_budget(
            lengths in prop::collection::vec(0usize..400, 0..12),
            max_chars in 0usize..2000,
        ) {
            let chunks = sized(&lengths);
            let kept = ContextBudgeter::new(max_chars).budget(&chunks).len();

            let total: usize = lengths[..kept].iter().sum();
            prop_assert!(total <= max_chars);
            if kept < lengths.len() {
                prop_assert!(total + lengths[kept] > max_chars);
            }
        }
    }
}
