//! Script-local variable pool.
//!
//! The pool is a fixed array of byte cells. A live variable occupies a
//! contiguous run; only the head cell of a run carries the size, name, and
//! internal flag. Allocation is first-fit with no compaction: the scan
//! skips whole occupied runs, which is what protects the tail cells of a
//! run from being claimed. Only the head cell's size is ever written.

use std::fmt;

use crate::ast::Width;
use crate::error::{CompileError, CompileResult};

/// One byte cell. `size == 0` means free; a non-zero size marks the head
/// of a live run.
#[derive(Debug, Clone, Default)]
pub struct Slot {
    size: usize,
    internal: bool,
    name: String,
}

impl Slot {
    /// Variable name held by this head cell.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the run headed by this cell.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the compiler, not the user, allocated this variable.
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    fn is_live(&self) -> bool {
        self.size > 0
    }
}

/// First-fit allocator over the script's byte pool.
#[derive(Debug, Clone)]
pub struct VarPool {
    slots: Vec<Slot>,
}

impl VarPool {
    /// A pool of `size` free cells.
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![Slot::default(); size],
        }
    }

    fn alloc_inner(&mut self, size: Width, internal: bool, name: Option<&str>) -> CompileResult<usize> {
        let size = size.bytes();
        let mut index = 0;
        'scan: while index + size <= self.slots.len() {
            for cell in index..index + size {
                if self.slots[cell].is_live() {
                    index = cell + self.slots[cell].size;
                    continue 'scan;
                }
            }
            let head = &mut self.slots[index];
            head.size = size;
            head.internal = internal;
            head.name = match name {
                Some(name) => name.to_owned(),
                None => format!("__evstemp{index}"),
            };
            return Ok(index);
        }
        Err(CompileError::OutOfPool(self.dump()))
    }

    /// Claim a run for a user variable and return its cell index.
    pub fn alloc(&mut self, size: Width, name: &str) -> CompileResult<usize> {
        self.alloc_inner(size, false, Some(name))
    }

    /// Claim a run for a compiler temporary and return its generated name.
    pub fn alloc_internal(&mut self, size: Width) -> CompileResult<String> {
        let index = self.alloc_inner(size, true, None)?;
        Ok(self.slots[index].name.clone())
    }

    /// Release the live run named `name`.
    pub fn free(&mut self, name: &str) -> CompileResult<()> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_live() && slot.name == name)
            .ok_or_else(|| CompileError::UnknownVariable(name.to_owned()))?;
        slot.size = 0;
        Ok(())
    }

    /// Release `name` if it is a compiler temporary; user variables are
    /// left alone.
    pub fn auto_free(&mut self, name: &str) -> CompileResult<()> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_live() && slot.name == name)
            .ok_or_else(|| CompileError::UnknownVariable(name.to_owned()))?;
        if slot.internal {
            slot.size = 0;
        }
        Ok(())
    }

    /// Cell index of the live run named `name`.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_live() && slot.name == name)
    }

    /// Head cell of the live run named `name`.
    pub fn get(&self, name: &str) -> Option<&Slot> {
        self.slots
            .iter()
            .find(|slot| slot.is_live() && slot.name == name)
    }

    /// Head cell of `name`, or the undeclared-variable error.
    pub fn required_get(&self, name: &str) -> CompileResult<&Slot> {
        self.get(name)
            .ok_or_else(|| CompileError::UndeclaredVariable(name.to_owned()))
    }

    /// Width of the live run named `name`.
    pub fn width_of(&self, name: &str) -> CompileResult<Width> {
        let slot = self.required_get(name)?;
        Width::try_from(slot.size as u32)
    }

    /// Live head cells with their indices, lowest first.
    pub fn live(&self) -> impl Iterator<Item = (usize, &Slot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_live())
    }

    /// Snapshot of the live allocations for the out-of-pool diagnostic.
    pub fn dump(&self) -> PoolDump {
        PoolDump(
            self.live()
                .map(|(index, slot)| DumpEntry {
                    index,
                    size: slot.size,
                    internal: slot.internal,
                    name: slot.name.clone(),
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone)]
struct DumpEntry {
    index: usize,
    size: usize,
    internal: bool,
    name: String,
}

/// Listing of live pool cells, rendered into the out-of-pool diagnostic.
#[derive(Debug, Clone)]
pub struct PoolDump(Vec<DumpEntry>);

impl fmt::Display for PoolDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "the pool is empty; is `pool` set in the environment?");
        }
        write!(f, "live variables:")?;
        for entry in &self.0 {
            write!(
                f,
                "\n  {} at {}, {} byte{}{}",
                entry.name,
                entry.index,
                entry.size,
                if entry.size == 1 { "" } else { "s" },
                if entry.internal { " (internal)" } else { "" },
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn alloc_is_first_fit() {
        let mut pool = VarPool::new(8);
        assert_eq!(pool.alloc(Width::Word, "a").unwrap(), 0);
        assert_eq!(pool.alloc(Width::Byte, "b").unwrap(), 2);
        assert_eq!(pool.alloc(Width::Word, "c").unwrap(), 3);
        pool.free("a").unwrap();
        // The freed two-byte hole at 0 is the lowest fit.
        assert_eq!(pool.alloc(Width::Byte, "d").unwrap(), 0);
        assert_eq!(pool.alloc(Width::Byte, "e").unwrap(), 1);
    }

    #[test]
    fn alloc_skips_over_live_runs() {
        let mut pool = VarPool::new(8);
        pool.alloc(Width::Byte, "a").unwrap();
        pool.alloc(Width::Long, "b").unwrap();
        pool.free("a").unwrap();
        // A word does not fit in the one-byte hole and must not overlap
        // the tail cells of `b`.
        assert_eq!(pool.alloc(Width::Word, "c").unwrap(), 5);
    }

    #[test]
    fn internal_names_carry_the_cell_index() {
        let mut pool = VarPool::new(8);
        pool.alloc(Width::Short, "user").unwrap();
        let temp = pool.alloc_internal(Width::Word).unwrap();
        assert_eq!(temp, "__evstemp3");
        assert_eq!(pool.lookup(&temp), Some(3));
    }

    #[test]
    fn auto_free_spares_user_variables() {
        let mut pool = VarPool::new(4);
        pool.alloc(Width::Byte, "user").unwrap();
        let temp = pool.alloc_internal(Width::Byte).unwrap();
        pool.auto_free("user").unwrap();
        pool.auto_free(&temp).unwrap();
        assert!(pool.get("user").is_some());
        assert!(pool.get(&temp).is_none());
    }

    #[test]
    fn free_of_unknown_name_fails() {
        let mut pool = VarPool::new(4);
        pool.alloc(Width::Byte, "x").unwrap();
        pool.free("x").unwrap();
        assert!(matches!(
            pool.free("x"),
            Err(CompileError::UnknownVariable(_))
        ));
    }

    #[test]
    fn exhaustion_reports_live_cells() {
        let mut pool = VarPool::new(4);
        pool.alloc(Width::Word, "first").unwrap();
        pool.alloc_internal(Width::Byte).unwrap();
        let error = pool.alloc(Width::Word, "second").unwrap_err();
        let message = error.to_string();
        assert!(message.contains("out of pool space"));
        assert!(message.contains("first at 0, 2 bytes"));
        assert!(message.contains("__evstemp2 at 2, 1 byte (internal)"));
    }

    #[test]
    fn zero_pool_rejects_everything() {
        let mut pool = VarPool::new(0);
        let error = pool.alloc(Width::Byte, "x").unwrap_err();
        assert!(error.to_string().contains("pool is empty"));
    }

    #[quickcheck]
    fn freeing_every_alloc_empties_the_pool(sizes: Vec<u8>) -> bool {
        let mut pool = VarPool::new(64);
        let mut names = Vec::new();
        for (i, size) in sizes.iter().take(8).enumerate() {
            let width = match size % 4 {
                0 => Width::Byte,
                1 => Width::Word,
                2 => Width::Short,
                _ => Width::Long,
            };
            let name = format!("var{i}");
            if pool.alloc(width, &name).is_ok() {
                names.push(name);
            }
        }
        for name in &names {
            if pool.free(name).is_err() {
                return false;
            }
        }
        pool.live().count() == 0
    }

    #[quickcheck]
    fn live_runs_never_overlap(sizes: Vec<u8>) -> bool {
        let mut pool = VarPool::new(32);
        for (i, size) in sizes.iter().take(16).enumerate() {
            let width = match size % 4 {
                0 => Width::Byte,
                1 => Width::Word,
                2 => Width::Short,
                _ => Width::Long,
            };
            let _ = pool.alloc(width, &format!("var{i}"));
            // Free every other allocation to fragment the pool.
            if i % 2 == 0 {
                let _ = pool.free(&format!("var{i}"));
            }
        }
        let runs: Vec<(usize, usize)> = pool.live().map(|(i, s)| (i, i + s.size())).collect();
        runs.iter().enumerate().all(|(n, &(start, end))| {
            runs[n + 1..]
                .iter()
                .all(|&(other_start, other_end)| end <= other_start || other_end <= start)
        })
    }
}
