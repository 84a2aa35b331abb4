use core::u16;

use as_slice::{AsMutSlice, AsSlice};
use cast::{u16, usize};

use crate::traits::Resize;

/// Buffer that owns a (statically sized) chunk of memory and provides a slice view into it
///
/// The main use case for this `Buffer` abstraction is sending parsed packets from one execution
/// context to another. Due to the layered nature of network packets the CoAP message inside an
/// IPv6 datagram is simply a slice of that datagram; `Buffer` lets you perform the slicing
/// operation without losing ownership of the backing memory.
///
/// A `Buffer` itself is also cheap to send as its size is the size of a pointer (to a fixed size
/// array) plus two `u16` indices. The `Packet` and `Message` abstractions in this crate are
/// newtypes over a buffer so they don't add any runtime metadata; all the metadata needed to
/// differentiate an UDP packet from a CoAP message is stored in the type system.
pub struct Buffer<CHUNK>
where
    CHUNK: AsSlice<Element = u8>,
{
    chunk: CHUNK,
    offset: u16,
    len: u16,
}

impl<C> Buffer<C>
where
    C: AsSlice<Element = u8>,
{
    /// Creates a new buffer from the given chunk of memory
    pub fn new(chunk: C) -> Self {
        let len = u16(chunk.as_slice().len()).unwrap_or(u16::MAX);
        Buffer {
            chunk,
            offset: 0,
            len,
        }
    }

    /// Resets the slice view to span the full length of the chunk
    pub fn reset(&mut self) {
        self.offset = 0;
        self.len = self.chunk.as_slice().len() as u16;
    }

    /// Truncates the buffer to the specified length
    pub fn truncate(&mut self, len: u16) {
        Resize::truncate(self, len)
    }

    /// Frees the chunk of memory
    pub fn free(self) -> C {
        self.chunk
    }
}

impl<C> AsSlice for Buffer<C>
where
    C: AsSlice<Element = u8>,
{
    type Element = u8;
    fn as_slice(&self) -> &[u8] {
        let start = usize(self.offset);
        let end = usize(self.offset + self.len);
        &self.chunk.as_slice()[start..end]
    }
}

impl<C> AsMutSlice for Buffer<C>
where
    C: AsMutSlice<Element = u8>,
{
    fn as_mut_slice(&mut self) -> &mut [u8] {
        let start = usize(self.offset);
        let end = usize(self.offset + self.len);
        &mut self.chunk.as_mut_slice()[start..end]
    }
}

impl<C> Resize for Buffer<C>
where
    C: AsSlice<Element = u8>,
{
    fn slice_from(&mut self, offset: u16) {
        assert!(offset <= self.len);

        self.offset += offset;
        self.len -= offset;
    }

    fn truncate(&mut self, len: u16) {
        if self.len > len {
            self.len = len;
        }
    }
}
