//! Reassembly of received Ethernet frames.
//!
//! The coprocessor keeps a received frame in its own memory until we release it. Since the caller
//! may drain it with buffers smaller than the frame, we track where the next byte is and how many
//! are left.

use crate::{Error, WiFiResult};

/// The size of the header, which the coprocessor stages in front of every received frame.
pub const RX_HEADER_LEN: usize = 6;

/// The header of a received frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxHeader {
    /// The length of the frame in bytes.
    pub total_len: u16,
    /// The distance from the start of the header to the first byte of the frame.
    pub offset: u16,
}
impl RxHeader {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let raw: &[u8; RX_HEADER_LEN] = raw.get(..RX_HEADER_LEN)?.try_into().ok()?;
        // Bytes two and three are device framing. The length of the frame only appears in the
        // first two bytes.
        Some(Self {
            total_len: u16::from_le_bytes([raw[0], raw[1]]),
            offset: u16::from_le_bytes([raw[4], raw[5]]),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct RxFrame {
    base: u32,
    cursor: u32,
    total: usize,
    remaining: usize,
}

/// The frame currently being drained, if any.
#[derive(Debug, Default)]
pub(crate) struct RxReassembly {
    frame: Option<RxFrame>,
}
impl RxReassembly {
    /// Start tracking the frame staged at `address`.
    ///
    /// Returns `false`, if the frame is empty and can be released right away. If a frame is
    /// already being drained, both are dropped and [Error::ProtocolDesync] is returned.
    pub fn begin(&mut self, address: u32, header: RxHeader) -> WiFiResult<bool> {
        if let Some(frame) = self.frame.take() {
            warn!(
                "Frame at {:x} announced, while {} bytes of the frame at {:x} were still pending.",
                address, frame.remaining, frame.base
            );
            return Err(Error::ProtocolDesync);
        }
        if header.total_len == 0 {
            return Ok(false);
        }
        self.frame = Some(RxFrame {
            base: address,
            cursor: address.wrapping_add(header.offset as u32),
            total: header.total_len as usize,
            remaining: header.total_len as usize,
        });
        trace!(
            "Frame with {} bytes ready at {:x}.",
            header.total_len,
            address
        );
        Ok(true)
    }
    /// The bytes of the current frame, that weren't delivered yet.
    pub fn pending_len(&self) -> usize {
        self.frame.map(|frame| frame.remaining).unwrap_or(0)
    }
    /// The device address and length of the next copy into a buffer of `capacity` bytes.
    pub fn next_chunk(&self, capacity: usize) -> Option<(u32, usize)> {
        let frame = self.frame?;
        Some((frame.cursor, frame.remaining.min(capacity)))
    }
    /// Record, that `delivered` bytes were copied out.
    ///
    /// Returns `true`, if this completed the frame.
    pub fn advance(&mut self, delivered: usize) -> bool {
        let Some(frame) = self.frame.as_mut() else {
            return false;
        };
        let delivered = delivered.min(frame.remaining);
        frame.cursor = frame.cursor.wrapping_add(delivered as u32);
        frame.remaining -= delivered;
        if frame.remaining != 0 {
            return false;
        }
        debug!("Delivered frame with {} bytes.", frame.total);
        self.frame = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u32 = 0x2000;

    fn header(total_len: u16) -> RxHeader {
        RxHeader {
            total_len,
            offset: 8,
        }
    }

    #[test]
    fn header_skips_framing_bytes() {
        // If the framing bytes were taken as the length, this would be 0xbeef bytes long.
        let raw = [0x58, 0x02, 0xef, 0xbe, 0x08, 0x00];
        assert_eq!(
            RxHeader::parse(&raw),
            Some(RxHeader {
                total_len: 600,
                offset: 8
            })
        );
        assert_eq!(RxHeader::parse(&raw[..5]), None);
    }
    #[test]
    fn fragments_add_up_to_the_frame() {
        let mut rx = RxReassembly::default();
        assert_eq!(rx.begin(BASE, header(600)), Ok(true));
        assert_eq!(rx.next_chunk(256), Some((BASE + 8, 256)));
        assert!(!rx.advance(256));
        assert_eq!(rx.pending_len(), 344);
        assert_eq!(rx.next_chunk(1024), Some((BASE + 8 + 256, 344)));
        assert!(rx.advance(344));
        assert_eq!(rx.pending_len(), 0);
        assert_eq!(rx.next_chunk(1024), None);
        assert!(!rx.advance(1));
    }
    #[test]
    fn fragment_size_does_not_change_the_total() {
        for capacity in [1, 7, 64, 599, 600, 2048] {
            let mut rx = RxReassembly::default();
            rx.begin(BASE, header(600)).unwrap();
            let mut delivered = 0;
            let mut completions = 0;
            while let Some((address, length)) = rx.next_chunk(capacity) {
                assert_eq!(address, BASE + 8 + delivered as u32);
                delivered += length;
                completions += rx.advance(length) as usize;
            }
            assert_eq!(delivered, 600);
            assert_eq!(completions, 1);
        }
    }
    #[test]
    fn empty_frames_are_not_tracked() {
        let mut rx = RxReassembly::default();
        assert_eq!(rx.begin(BASE, header(0)), Ok(false));
        assert_eq!(rx.next_chunk(64), None);
    }
    #[test]
    fn overlapping_frames_desync() {
        let mut rx = RxReassembly::default();
        rx.begin(BASE, header(100)).unwrap();
        rx.advance(10);
        assert_eq!(rx.begin(BASE + 0x800, header(64)), Err(Error::ProtocolDesync));
        assert_eq!(rx.pending_len(), 0);
        assert_eq!(rx.begin(BASE, header(64)), Ok(true));
    }
}
