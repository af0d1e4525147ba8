use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Drag delta of a label's top-left corner, in the same 0–1000 space as boxes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

impl Offset {
    pub const ZERO: Offset = Offset { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn add(self, other: Offset) -> Offset {
        Offset {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

/// Offsets keyed by annotation index. Indices only mean something for the
/// annotation list they were recorded against; clear on every replacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OffsetStore {
    offsets: HashMap<usize, Offset>,
}

impl OffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Offset {
        self.offsets.get(&index).copied().unwrap_or_default()
    }

    pub fn set(&mut self, index: usize, offset: Offset) {
        self.offsets.insert(index, offset);
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

impl FromIterator<(usize, Offset)> for OffsetStore {
    fn from_iter<T: IntoIterator<Item = (usize, Offset)>>(iter: T) -> Self {
        Self {
            offsets: iter.into_iter().collect(),
        }
    }
}
