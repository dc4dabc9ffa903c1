//! Transaction slots and transfer reports

use core::ptr;

/// How much of a transfer made it across the bus
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum TransferStatus {
    /// Nothing was transferred
    #[default]
    None,
    /// Some, but not all, bytes were transferred
    Partial,
    /// Every requested byte was transferred
    Full,
}

impl TransferStatus {
    pub const fn classify(transferred: usize, requested: usize) -> Self {
        if transferred == requested {
            TransferStatus::Full
        } else if transferred > 0 && transferred < requested {
            TransferStatus::Partial
        } else {
            TransferStatus::None
        }
    }
}

/// The outcome of a read or write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct Transfer {
    /// Bytes moved across the bus
    pub length: usize,
    pub status: TransferStatus,
}

impl Transfer {
    pub(crate) const fn new(transferred: usize, requested: usize) -> Self {
        Transfer {
            length: transferred,
            status: TransferStatus::classify(transferred, requested),
        }
    }
}

/// The outcome of a write followed by a repeated-start read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct WriteRead {
    /// Bytes written
    pub written: usize,
    /// Bytes read, or `None` if the write phase came up short and the read
    /// never validly started
    pub read: Option<usize>,
    pub status: TransferStatus,
}

/// The transfer did not finish before the deadline
///
/// Carries whatever was transferred before the engine gave up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct TimedOut<T>(pub T);

impl<T> From<TimedOut<T>> for crate::Error {
    fn from(_: TimedOut<T>) -> Self {
        crate::Error::TimedOut
    }
}

/// One direction of transfer on a controller
///
/// The buffer is borrowed from the blocking caller. The caller detaches it
/// before returning, and the interrupt handler only reaches it while it's
/// attached.
pub(crate) struct Transaction {
    read: bool,
    repeated_start: bool,
    done: bool,
    buffer: *mut u8,
    length: usize,
    remaining: usize,
    transferred: usize,
}

// Safety: the buffer pointer is only dereferenced inside critical sections,
// while the owning caller is blocked.
unsafe impl Send for Transaction {}

impl Transaction {
    pub const fn new() -> Self {
        Transaction {
            read: false,
            repeated_start: false,
            done: false,
            buffer: ptr::null_mut(),
            length: 0,
            remaining: 0,
            transferred: 0,
        }
    }

    /// Prepare the slot for a new transfer
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for `length` bytes (and writable, for reads)
    /// until the slot is detached or reset.
    pub unsafe fn arm(&mut self, read: bool, buffer: *mut u8, length: usize, repeated_start: bool) {
        *self = Transaction {
            read,
            repeated_start,
            done: false,
            buffer,
            length,
            remaining: length,
            transferred: 0,
        };
    }

    pub fn reset(&mut self) {
        *self = Transaction::new();
    }

    /// Forget the caller's buffer, keeping the counters
    pub fn detach(&mut self) {
        self.buffer = ptr::null_mut();
        self.remaining = 0;
    }

    pub fn is_read(&self) -> bool {
        self.read
    }

    pub fn repeated_start(&self) -> bool {
        self.repeated_start
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn transferred(&self) -> usize {
        self.transferred
    }

    pub fn complete(&mut self) {
        self.done = true;
    }

    fn can_advance(&self) -> bool {
        !self.buffer.is_null() && self.remaining > 0 && self.transferred < self.length
    }

    /// Take the next byte to send
    pub fn next_byte(&mut self) -> Option<u8> {
        if self.read || !self.can_advance() {
            return None;
        }
        // Safety: in bounds, and valid while attached.
        let byte = unsafe { self.buffer.add(self.transferred).read() };
        self.transferred += 1;
        self.remaining -= 1;
        Some(byte)
    }

    /// Store a received byte
    ///
    /// Returns `false` if the slot can't take another byte.
    pub fn store(&mut self, byte: u8) -> bool {
        if !self.read || !self.can_advance() {
            return false;
        }
        // Safety: in bounds, writable for read transactions, and valid while attached.
        unsafe { self.buffer.add(self.transferred).write(byte) };
        self.transferred += 1;
        self.remaining -= 1;
        true
    }
}
