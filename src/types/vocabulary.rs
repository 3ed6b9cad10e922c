//! Vocabulary and token index.
//!
//! The vocabulary keeps distinct events in first-seen order so that index
//! assignment is reproducible across runs. Both types serialize as a plain
//! list of events in index order.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{PipelineError, Result};

use super::event::MusicalEvent;

/// Distinct events of a token stream, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<MusicalEvent>", into = "Vec<MusicalEvent>")]
pub struct Vocabulary {
    events: Vec<MusicalEvent>,
    seen: HashSet<MusicalEvent>,
}

impl Vocabulary {
    /// Creates an empty vocabulary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the vocabulary of a stream.
    pub fn from_stream(stream: &[MusicalEvent]) -> Self {
        let mut vocab = Self::new();
        vocab.extend(stream);
        vocab
    }

    /// Adds an event. Returns true if it was not present yet.
    pub fn insert(&mut self, event: &MusicalEvent) -> bool {
        if self.seen.contains(event) {
            return false;
        }
        self.seen.insert(event.clone());
        self.events.push(event.clone());
        true
    }

    /// Adds every event of a slice.
    pub fn extend<'a>(&mut self, events: impl IntoIterator<Item = &'a MusicalEvent>) {
        for event in events {
            self.insert(event);
        }
    }

    /// Returns true if the event is part of the vocabulary.
    pub fn contains(&self, event: &MusicalEvent) -> bool {
        self.seen.contains(event)
    }

    /// Number of distinct events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no events were observed.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterates in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &MusicalEvent> {
        self.events.iter()
    }
}

impl From<Vec<MusicalEvent>> for Vocabulary {
    fn from(events: Vec<MusicalEvent>) -> Self {
        Self::from_stream(&events)
    }
}

impl From<Vocabulary> for Vec<MusicalEvent> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.events
    }
}

/// Bijection between vocabulary events and dense indices `[0, len)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<MusicalEvent>", into = "Vec<MusicalEvent>")]
pub struct TokenIndex {
    events: Vec<MusicalEvent>,
    indices: HashMap<MusicalEvent, u32>,
}

impl TokenIndex {
    /// Assigns indices in the vocabulary's order.
    pub fn from_vocabulary(vocab: &Vocabulary) -> Self {
        Self::from(vocab.iter().cloned().collect::<Vec<_>>())
    }

    /// Index of an event, if known.
    pub fn index_of(&self, event: &MusicalEvent) -> Option<u32> {
        self.indices.get(event).copied()
    }

    /// Event at an index, if in range.
    pub fn event_at(&self, index: u32) -> Option<&MusicalEvent> {
        self.events.get(index as usize)
    }

    /// Number of indexed events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maps events to indices, rejecting events outside the index.
    pub fn encode(&self, events: &[MusicalEvent]) -> Result<Vec<u32>> {
        events
            .iter()
            .enumerate()
            .map(|(pos, event)| {
                self.index_of(event).ok_or_else(|| {
                    PipelineError::shape_mismatch(format!(
                        "event {} at position {} is not in the vocabulary",
                        event, pos
                    ))
                })
            })
            .collect()
    }

    /// Maps indices back to events.
    ///
    /// # Panics
    ///
    /// Panics if an index is outside `[0, len)`. Indices produced by a model
    /// bound to this index never are.
    pub fn decode(&self, indices: &[u32]) -> Vec<MusicalEvent> {
        indices
            .iter()
            .map(|&i| match self.event_at(i) {
                Some(event) => event.clone(),
                None => panic!(
                    "index {} outside token index of size {}",
                    i,
                    self.events.len()
                ),
            })
            .collect()
    }

    /// Events in index order.
    pub fn events(&self) -> &[MusicalEvent] {
        &self.events
    }
}

impl From<Vec<MusicalEvent>> for TokenIndex {
    fn from(events: Vec<MusicalEvent>) -> Self {
        // Duplicates would break the bijection, keep the first occurrence.
        let mut unique = Vec::with_capacity(events.len());
        let mut indices = HashMap::with_capacity(events.len());
        for event in events {
            if !indices.contains_key(&event) {
                indices.insert(event.clone(), unique.len() as u32);
                unique.push(event);
            }
        }
        Self {
            events: unique,
            indices,
        }
    }
}

impl From<TokenIndex> for Vec<MusicalEvent> {
    fn from(index: TokenIndex) -> Self {
        index.events
    }
}
