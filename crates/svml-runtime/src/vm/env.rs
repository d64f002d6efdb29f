//! Environment-frame arena
//!
//! Runtime environments form a tree (scope is a tree even though
//! closures fan in), held in an arena with stable indices. Closures
//! store an [`EnvId`] rather than a reference-counted pointer, so the
//! closure-in-environment cycle never becomes an `Rc` cycle. Frames
//! live for the duration of one interpretation, which is fuel-bounded.

use crate::value::{RuntimeError, Value};
use serde::{Deserialize, Serialize};

/// Stable index of an environment frame within one machine's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvId(u32);

/// Fixed-size slot vector plus parent pointer. Never resized.
#[derive(Debug)]
struct EnvFrame {
    slots: Vec<Value>,
    parent: Option<EnvId>,
}

/// Arena of environment frames, owned by one interpretation.
#[derive(Debug, Default)]
pub struct EnvArena {
    frames: Vec<EnvFrame>,
}

impl EnvArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a frame of `size` undefined slots.
    pub fn alloc(&mut self, size: usize, parent: Option<EnvId>) -> EnvId {
        let id = EnvId(self.frames.len() as u32);
        self.frames.push(EnvFrame {
            slots: vec![Value::Undefined; size],
            parent,
        });
        id
    }

    /// Read a slot. Out-of-range slots are a compiler-contract
    /// violation surfaced as a runtime error.
    pub fn get(&self, env: EnvId, slot: usize) -> Result<Value, RuntimeError> {
        let frame = &self.frames[env.0 as usize];
        frame
            .slots
            .get(slot)
            .cloned()
            .ok_or(RuntimeError::SlotOutOfRange {
                slot,
                size: frame.slots.len(),
            })
    }

    /// Write a slot.
    pub fn set(&mut self, env: EnvId, slot: usize, value: Value) -> Result<(), RuntimeError> {
        let frame = &mut self.frames[env.0 as usize];
        let size = frame.slots.len();
        match frame.slots.get_mut(slot) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(RuntimeError::SlotOutOfRange { slot, size }),
        }
    }

    /// Walk `level` parent hops from `env`.
    pub fn ancestor(&self, env: EnvId, level: usize) -> Result<EnvId, RuntimeError> {
        let mut current = env;
        for walked in 0..level {
            current = self.frames[current.0 as usize]
                .parent
                .ok_or(RuntimeError::MissingParentEnv {
                    level: level - walked,
                })?;
        }
        Ok(current)
    }

    /// Number of live frames, for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_start_undefined() {
        let mut arena = EnvArena::new();
        let env = arena.alloc(2, None);
        assert_eq!(arena.get(env, 0).unwrap(), Value::Undefined);
        assert_eq!(arena.get(env, 1).unwrap(), Value::Undefined);
        assert!(matches!(
            arena.get(env, 2),
            Err(RuntimeError::SlotOutOfRange { slot: 2, size: 2 })
        ));
    }

    #[test]
    fn ancestor_walks_the_parent_chain() {
        let mut arena = EnvArena::new();
        let root = arena.alloc(1, None);
        let mid = arena.alloc(1, Some(root));
        let leaf = arena.alloc(1, Some(mid));
        arena.set(root, 0, Value::Int(7)).unwrap();
        let owner = arena.ancestor(leaf, 2).unwrap();
        assert_eq!(arena.get(owner, 0).unwrap(), Value::Int(7));
        assert!(matches!(
            arena.ancestor(leaf, 3),
            Err(RuntimeError::MissingParentEnv { .. })
        ));
    }

    #[test]
    fn level_zero_is_identity() {
        let mut arena = EnvArena::new();
        let env = arena.alloc(1, None);
        assert_eq!(arena.ancestor(env, 0).unwrap(), env);
    }
}
