// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Result, YeeError};

/// Handle of a buffer inside a [`BufferRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(usize);

impl BufferId {
    /// Raw slot index of this id.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Descriptor of a named, strided scalar array.
///
/// `length` counts stored elements. A stride of 0 marks spatially uniform
/// data: every logical sample lives at offset 0. The head address is bound
/// once backing storage exists, which is after runline topology is known.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryBuffer {
    name: String,
    length: usize,
    stride: usize,
    head: Option<usize>,
}

impl MemoryBuffer {
    /// Buffer name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored elements.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Elements between logically adjacent samples.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bound head address, if storage exists.
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    fn contains(&self, address: usize) -> Option<usize> {
        let head = self.head?;
        if address >= head && address < head + self.length {
            Some(address - head)
        } else {
            None
        }
    }
}

/// An offset into a registered buffer. Does not own the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferPointer {
    buffer: BufferId,
    offset: usize,
}

impl BufferPointer {
    /// The buffer this pointer addresses.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Element offset from the buffer head.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Pointer moved forward by `n` logical samples.
    ///
    /// # Errors
    /// Returns an error if the result leaves the buffer.
    pub fn advanced(&self, registry: &BufferRegistry, n: usize) -> Result<BufferPointer> {
        let stride = registry.get(self.buffer)?.stride();
        registry.pointer(self.buffer, self.offset + n * stride)
    }

    /// True if the pointer still satisfies the buffer offset invariant.
    pub fn is_valid(&self, registry: &BufferRegistry) -> bool {
        match registry.get(self.buffer) {
            Ok(buf) => check_offset(buf, self.offset).is_ok(),
            Err(_) => false,
        }
    }
}

fn check_offset(buf: &MemoryBuffer, offset: usize) -> Result<()> {
    if offset >= buf.length {
        return Err(YeeError::BufferOutOfRange {
            buffer: buf.name.clone(),
            offset,
            length: buf.length,
        });
    }
    let aligned = if buf.stride == 0 {
        offset == 0
    } else {
        offset % buf.stride == 0
    };
    if !aligned {
        return Err(YeeError::MisalignedOffset {
            buffer: buf.name.clone(),
            offset,
            stride: buf.stride,
        });
    }
    Ok(())
}

/// Set of live buffers, used to resolve flat addresses back to buffers.
///
/// Addresses live in one flat space handed out by [`BufferRegistry::reserve`].
/// Lookups by address scan every live buffer and are meant for diagnostics only.
#[derive(Debug, Default)]
pub struct BufferRegistry {
    buffers: Vec<Option<MemoryBuffer>>,
    next_address: usize,
}

impl BufferRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a buffer descriptor. Its head stays unbound.
    pub fn register(&mut self, name: impl Into<String>, length: usize, stride: usize) -> BufferId {
        let id = BufferId(self.buffers.len());
        self.buffers.push(Some(MemoryBuffer {
            name: name.into(),
            length,
            stride,
            head: None,
        }));
        id
    }

    /// Remove a buffer; its addresses become unmapped.
    ///
    /// # Errors
    /// Returns an error if the id is not registered.
    pub fn unregister(&mut self, id: BufferId) -> Result<MemoryBuffer> {
        self.buffers
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(YeeError::UnknownBuffer(id.0))
    }

    /// Look up a live buffer.
    ///
    /// # Errors
    /// Returns an error if the id is not registered.
    pub fn get(&self, id: BufferId) -> Result<&MemoryBuffer> {
        self.buffers
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(YeeError::UnknownBuffer(id.0))
    }

    /// Bind the head address of a buffer.
    ///
    /// # Errors
    /// Returns an error if the id is not registered.
    pub fn bind_head(&mut self, id: BufferId, address: usize) -> Result<()> {
        let buf = self
            .buffers
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(YeeError::UnknownBuffer(id.0))?;
        buf.head = Some(address);
        self.next_address = self.next_address.max(address + buf.length);
        Ok(())
    }

    /// Bind the given buffers back to back in a fresh address range.
    /// Returns the base address of the range.
    ///
    /// # Errors
    /// Returns an error if any id is not registered.
    pub fn reserve(&mut self, ids: &[BufferId]) -> Result<usize> {
        let base = self.next_address;
        let mut cursor = base;
        for &id in ids {
            let length = self.get(id)?.length;
            self.bind_head(id, cursor)?;
            cursor += length;
        }
        self.next_address = cursor;
        Ok(base)
    }

    /// Build a pointer after checking the offset invariant.
    ///
    /// # Errors
    /// Returns an error if the offset is out of range or misaligned.
    pub fn pointer(&self, id: BufferId, offset: usize) -> Result<BufferPointer> {
        check_offset(self.get(id)?, offset)?;
        Ok(BufferPointer { buffer: id, offset })
    }

    /// Resolve a pointer to its flat address.
    ///
    /// # Errors
    /// Returns an error if the buffer has no head or the offset is invalid.
    pub fn address(&self, ptr: BufferPointer) -> Result<usize> {
        let buf = self.get(ptr.buffer)?;
        check_offset(buf, ptr.offset)?;
        let head = buf
            .head
            .ok_or_else(|| YeeError::UnboundBuffer(buf.name.clone()))?;
        Ok(head + ptr.offset)
    }

    /// Describe whatever buffer claims `address`, or `"unmapped"`.
    pub fn identify(&self, address: usize) -> String {
        for buf in self.buffers.iter().flatten() {
            if let Some(offset) = buf.contains(address) {
                return format!("{}[{}]", buf.name, offset);
            }
        }
        "unmapped".to_string()
    }

    /// Describe the target of a pointer without requiring a bound head.
    pub fn identify_pointer(&self, ptr: BufferPointer) -> String {
        match self.get(ptr.buffer) {
            Ok(buf) => format!("{}[{}]", buf.name, ptr.offset),
            Err(_) => "unmapped".to_string(),
        }
    }

    /// Iterate over live buffers.
    pub fn live_buffers(&self) -> impl Iterator<Item = (BufferId, &MemoryBuffer)> {
        self.buffers
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.as_ref().map(|b| (BufferId(i), b)))
    }

    /// Number of live buffers.
    pub fn len(&self) -> usize {
        self.buffers.iter().flatten().count()
    }

    /// True if no buffer is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
