//! Hex field scanning for command arguments.

use crate::codec::hex_value;

/// Cursor over the argument bytes of a command.
///
/// Numbers are scanned the way the protocol's reference stubs do it: an
/// optional sign, an optional `0x` prefix, then as many hex digits as are
/// present. Nothing is rejected; an empty number is zero and values wider
/// than 64 bits keep their low 64 bits.
#[derive(Clone, Copy, Debug)]
pub struct Scanner<'a> {
    rest: &'a [u8],
}

impl<'a> Scanner<'a> {
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { rest: input }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub const fn rest(&self) -> &'a [u8] {
        self.rest
    }

    /// Scan a hex number, stopping at the first non-digit.
    pub fn hex(&mut self) -> u64 {
        let mut input = self.rest;
        let negative = match input.first() {
            Some(b'-') => {
                input = &input[1..];
                true
            }
            Some(b'+') => {
                input = &input[1..];
                false
            }
            _ => false,
        };
        if let [b'0', b'x' | b'X', next, ..] = input
            && hex_value(*next).is_some()
        {
            input = &input[2..];
        }

        let mut value = 0u64;
        let mut digits = 0;
        for &byte in input {
            let Some(nybble) = hex_value(byte) else { break };
            value = (value << 4) | u64::from(nybble);
            digits += 1;
        }
        self.rest = &input[digits..];

        if negative { value.wrapping_neg() } else { value }
    }

    /// Consume `byte` if it is next.
    pub fn skip(&mut self, byte: u8) -> bool {
        match self.rest.split_first() {
            Some((&first, tail)) if first == byte => {
                self.rest = tail;
                true
            }
            _ => false,
        }
    }

    /// Consume everything up to (not including) `byte`, or to the end.
    pub fn until(&mut self, byte: u8) -> &'a [u8] {
        let end = self
            .rest
            .iter()
            .position(|&b| b == byte)
            .unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        head
    }
}
