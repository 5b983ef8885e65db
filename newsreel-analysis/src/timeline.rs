//! Playback timeline over normalized alignment
//!
//! Maps a playback cursor to the character and word being spoken so the
//! reader can highlight narrated text in sync with audio.

use crate::alignment::NormalizedAlignment;
use std::ops::Range;

/// A whitespace-delimited word and its spoken interval
#[derive(Debug, Clone, PartialEq)]
pub struct WordSpan {
    pub text: String,
    pub start: f64,
    pub end: f64,
    /// Character indices covered by this word
    pub chars: Range<usize>,
}

/// Cursor lookups over a validated alignment
pub struct AlignmentTimeline {
    alignment: NormalizedAlignment,
    /// Whether starts are non-decreasing (enables binary search)
    sorted: bool,
    words: Vec<WordSpan>,
}

impl AlignmentTimeline {
    pub fn new(alignment: NormalizedAlignment) -> Self {
        let sorted = alignment
            .character_start_times_seconds
            .windows(2)
            .all(|w| w[0] <= w[1]);
        let words = group_words(&alignment);
        Self {
            alignment,
            sorted,
            words,
        }
    }

    pub fn alignment(&self) -> &NormalizedAlignment {
        &self.alignment
    }

    pub fn words(&self) -> &[WordSpan] {
        &self.words
    }

    /// End of the last spoken character
    pub fn duration(&self) -> f64 {
        self.alignment
            .character_end_times_seconds
            .iter()
            .copied()
            .fold(0.0, f64::max)
    }

    /// Index of the character spoken at `time` seconds
    ///
    /// Between characters this is the most recently started one; before the
    /// first character it is `None`.
    pub fn char_index_at(&self, time: f64) -> Option<usize> {
        let starts = &self.alignment.character_start_times_seconds;
        let ends = &self.alignment.character_end_times_seconds;

        if self.sorted {
            let started = starts.partition_point(|&s| s <= time);
            return started.checked_sub(1);
        }

        // Unordered starts: prefer a character whose interval contains the
        // cursor, otherwise the latest start not after it
        if let Some(i) = (0..starts.len()).find(|&i| starts[i] <= time && time < ends[i]) {
            return Some(i);
        }
        (0..starts.len())
            .filter(|&i| starts[i] <= time)
            .max_by(|&a, &b| starts[a].total_cmp(&starts[b]))
    }

    /// Index of the word spoken at `time` seconds
    pub fn word_index_at(&self, time: f64) -> Option<usize> {
        let ch = self.char_index_at(time)?;
        self.words
            .iter()
            .position(|w| w.chars.contains(&ch))
            .or_else(|| {
                // Cursor sits on whitespace: stay on the preceding word
                self.words.iter().rposition(|w| w.chars.end <= ch)
            })
    }

    pub fn word_at(&self, time: f64) -> Option<&WordSpan> {
        self.word_index_at(time).map(|i| &self.words[i])
    }
}

fn group_words(alignment: &NormalizedAlignment) -> Vec<WordSpan> {
    let mut words = Vec::new();
    let mut current: Option<WordSpan> = None;

    for (i, character) in alignment.characters.iter().enumerate() {
        let Some((start, end)) = alignment.interval(i) else {
            break;
        };

        if character.trim().is_empty() {
            if let Some(word) = current.take() {
                words.push(word);
            }
            continue;
        }

        match current.as_mut() {
            Some(word) => {
                word.text.push_str(character);
                word.start = word.start.min(start);
                word.end = word.end.max(end);
                word.chars.end = i + 1;
            }
            None => {
                current = Some(WordSpan {
                    text: character.clone(),
                    start,
                    end,
                    chars: i..i + 1,
                });
            }
        }
    }

    if let Some(word) = current {
        words.push(word);
    }
    words
}
