// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{fmt, sync::Arc};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The bytes of a loaded file. Cloning a Content handle shares the same
/// underlying buffer, so a driver and every stream reading from it see the
/// same bytes without copying them.
#[derive(Clone, Default)]
pub struct Content {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl Content {
    /// Wraps the given bytes in a new, unshared content buffer.
    pub fn new(bytes: Vec<u8>) -> Content {
        Content {
            bytes: Arc::new(RwLock::new(bytes)),
        }
    }

    /// Locks the content for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.bytes.read()
    }

    /// Locks the content for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.bytes.write()
    }

    /// Returns the size of the content in bytes.
    pub fn len(&self) -> usize {
        self.bytes.read().len()
    }

    /// Returns true if the content holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if both handles refer to the same buffer.
    pub fn same_buffer(&self, other: &Content) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    /// Returns the number of handles currently sharing this buffer.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.bytes)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::new(bytes)
    }
}

// Skip the bytes.
impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content")
            .field("len", &self.len())
            .field("handles", &self.handle_count())
            .finish()
    }
}
