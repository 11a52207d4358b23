//! Greedy, budgeted assembly of grouped descriptor strings.
//!
//! Records are consumed in order and merged into one output string per
//! `(category, group)`. Every merge is checked against the character
//! budget for the whole `", "`-joined output before it is committed; a
//! merge that does not fit is dropped and never retried. Earlier records
//! therefore win the available space.
//!
//! Group rules:
//! - a group opens with its own name as seed (`Instruments` opens empty);
//!   if the seed does not fit, the group is closed for the rest of the pass
//! - `Ignore` suppresses the group's remaining tags, and drops the group
//!   entirely when nothing was merged into it yet
//! - `Voice` keeps only the first Male / Female / Duet that fits
//! - `Instruments` tags form a comma-separated list

use crate::catalog::{DescriptorRecord, GroupKind, TagKind, VoiceType};
use std::collections::HashMap;
use tracing::trace;

const SEPARATOR: &str = ", ";
const SEPARATOR_LEN: usize = 2;

/// Length the strings would have once joined with `", "`, in characters.
pub fn joined_len<S: AsRef<str>>(parts: &[S]) -> usize {
    let chars: usize = parts.iter().map(|p| char_len(p.as_ref())).sum();
    chars + SEPARATOR_LEN * parts.len().saturating_sub(1)
}

/// Build the display strings for `records`, best-first, under `budget`.
pub fn assemble<'a, I>(records: I, budget: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a DescriptorRecord>,
{
    let mut pass = Assembly::new(budget);
    for record in records {
        pass.push(record);
    }
    pass.finish()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

struct Slot {
    text: String,
    len: usize,
    removed: bool,
}

/// Output strings in creation order with a running joined length.
///
/// Removed slots stay in place as tombstones and are skipped on finish.
struct Output {
    budget: usize,
    slots: Vec<Slot>,
    live: usize,
    total: usize,
}

impl Output {
    fn new(budget: usize) -> Self {
        Self {
            budget,
            slots: Vec::new(),
            live: 0,
            total: 0,
        }
    }

    fn fits(&self, total: usize) -> bool {
        total <= self.budget
    }

    /// Append a new slot holding `seed` if the joined output still fits.
    fn try_open(&mut self, seed: &str) -> Option<usize> {
        let len = char_len(seed);
        let separator = if self.live > 0 { SEPARATOR_LEN } else { 0 };
        let total = self.total + separator + len;
        if !self.fits(total) {
            return None;
        }
        self.slots.push(Slot {
            text: seed.to_string(),
            len,
            removed: false,
        });
        self.live += 1;
        self.total = total;
        Some(self.slots.len() - 1)
    }

    /// Joined length if slot `id` had `len` characters instead.
    fn total_with(&self, id: usize, len: usize) -> usize {
        self.total - self.slots[id].len + len
    }

    fn text(&self, id: usize) -> &str {
        &self.slots[id].text
    }

    fn len(&self, id: usize) -> usize {
        self.slots[id].len
    }

    fn replace(&mut self, id: usize, text: String, len: usize) {
        self.total = self.total_with(id, len);
        let slot = &mut self.slots[id];
        slot.text = text;
        slot.len = len;
    }

    /// Append `" " + word` to the slot (just `word` when it is empty).
    fn try_append_word(&mut self, id: usize, word: &str) -> bool {
        let current = self.len(id);
        let word_len = char_len(word);
        let len = if current == 0 {
            word_len
        } else {
            current + 1 + word_len
        };
        if !self.fits(self.total_with(id, len)) {
            return false;
        }
        let text = if current == 0 {
            word.to_string()
        } else {
            format!("{} {}", self.text(id), word)
        };
        self.replace(id, text, len);
        true
    }

    fn remove(&mut self, id: usize) {
        let slot = &mut self.slots[id];
        if slot.removed {
            return;
        }
        slot.removed = true;
        let separator = if self.live > 1 { SEPARATOR_LEN } else { 0 };
        self.total -= slot.len + separator;
        self.live -= 1;
    }

    fn finish(self) -> Vec<String> {
        self.slots
            .into_iter()
            .filter(|s| !s.removed && !s.text.trim().is_empty())
            .map(|s| s.text)
            .collect()
    }
}

struct AssemblyGroup<'a> {
    slot: usize,
    tag_count: usize,
    voice: Option<VoiceType>,
    instruments: Vec<&'a str>,
    ignore_seen: bool,
}

impl AssemblyGroup<'_> {
    fn new(slot: usize) -> Self {
        Self {
            slot,
            tag_count: 0,
            voice: None,
            instruments: Vec::new(),
            ignore_seen: false,
        }
    }
}

enum GroupState<'a> {
    /// The seed did not fit; every later record of the group is dropped.
    Closed,
    Open(AssemblyGroup<'a>),
}

struct Assembly<'a> {
    output: Output,
    groups: HashMap<(&'a str, &'a str), GroupState<'a>>,
}

impl<'a> Assembly<'a> {
    fn new(budget: usize) -> Self {
        Self {
            output: Output::new(budget),
            groups: HashMap::new(),
        }
    }

    fn push(&mut self, record: &'a DescriptorRecord) {
        let key = (record.category.as_str(), record.group.as_str());
        let output = &mut self.output;
        let state = self.groups.entry(key).or_insert_with(|| {
            let seed = match record.group_kind {
                GroupKind::Instruments => "",
                _ => record.group.trim(),
            };
            match output.try_open(seed) {
                Some(slot) => GroupState::Open(AssemblyGroup::new(slot)),
                None => {
                    trace!(category = key.0, group = key.1, "group does not fit budget");
                    GroupState::Closed
                }
            }
        });
        let GroupState::Open(group) = state else {
            return;
        };
        if group.ignore_seen {
            return;
        }

        if record.tag_kind == TagKind::Ignore {
            group.ignore_seen = true;
            if group.tag_count == 0 {
                output.remove(group.slot);
            }
            return;
        }
        if record.group_kind != GroupKind::Instruments && record.tag == record.group {
            return;
        }

        let merged = match (record.group_kind, record.tag_kind) {
            (GroupKind::Voice, TagKind::Voice(voice)) => {
                if group.voice.is_some() {
                    return;
                }
                let merged = output.try_append_word(group.slot, voice.as_str());
                if merged {
                    group.voice = Some(voice);
                }
                merged
            }
            (GroupKind::Instruments, _) => {
                let current = output.len(group.slot);
                let separator = if group.instruments.is_empty() {
                    0
                } else {
                    SEPARATOR_LEN
                };
                let len = current + separator + char_len(&record.tag);
                if output.fits(output.total_with(group.slot, len)) {
                    group.instruments.push(&record.tag);
                    output.replace(group.slot, group.instruments.join(SEPARATOR), len);
                    true
                } else {
                    false
                }
            }
            _ => output.try_append_word(group.slot, &record.tag),
        };
        if merged {
            group.tag_count += 1;
        } else {
            trace!(tag = record.tag.as_str(), group = key.1, "tag does not fit budget");
        }
    }

    fn finish(self) -> Vec<String> {
        self.output.finish()
    }
}
