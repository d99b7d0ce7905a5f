//! Frame recovery from an unbounded byte stream.
//!
//! The transport hands over whatever it happened to read: half a frame,
//! several frames, or line noise. [`Framer::feed`] appends those bytes to a
//! [`FrameBuffer`], scans for the [`HEADER`] sentinel and hands every complete
//! [`FRAME_LENGTH`] frame to the caller before returning. Partial frames are
//! carried over to the next call.
//!
//! Resynchronisation never fails: bytes that cannot start a header are
//! discarded, except for a trailing `0xCA` that may be the first half of a
//! header split across two reads.

use tracing::trace;

use super::{FRAME_LENGTH, HEADER};

/// Initial receive buffer capacity.
pub const INITIAL_CAPACITY: usize = 4096;

/// Growable receive buffer.
///
/// Grows by doubling and never shrinks; [`FrameBuffer::clear`] only resets
/// the fill level.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    data: Vec<u8>,
    len: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }
}

impl FrameBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: vec![0; capacity.max(1)], len: 0 }
    }

    /// Bytes currently held
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append `bytes`, doubling the capacity as often as needed.
    pub fn extend(&mut self, bytes: &[u8]) {
        let required = self.len + bytes.len();
        if required > self.data.len() {
            let mut capacity = self.data.len() * 2;
            while capacity < required {
                capacity *= 2;
            }
            trace!("Growing frame buffer {} -> {} bytes", self.data.len(), capacity);
            self.data.resize(capacity, 0);
        }
        self.data[self.len..required].copy_from_slice(bytes);
        self.len = required;
    }

    /// Position of the first header at or after `start`.
    fn find_header(&self, start: usize) -> Option<usize> {
        let haystack = self.as_slice().get(start..)?;
        haystack.windows(HEADER.len()).position(|pair| pair == HEADER).map(|i| start + i)
    }

    /// Move `from..len` to the front of the buffer.
    fn compact_from(&mut self, from: usize) {
        if from > 0 {
            self.data.copy_within(from..self.len, 0);
            self.len -= from;
        }
    }

    /// Keep only a trailing first header byte, if any.
    fn retain_split_header(&mut self) {
        if self.len > 0 && self.data[self.len - 1] == HEADER[0] {
            self.data[0] = HEADER[0];
            self.len = 1;
        } else {
            self.len = 0;
        }
    }
}

/// Header-synchronised frame extractor.
#[derive(Debug, Default)]
pub struct Framer {
    buffer: FrameBuffer,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and call `on_frame(buffer, payload_offset)` for every
    /// complete frame, in stream order.
    ///
    /// `payload_offset` points just past the header; at least
    /// `FRAME_LENGTH - 2` bytes are readable from it.
    pub fn feed<F>(&mut self, bytes: &[u8], mut on_frame: F) -> usize
    where
        F: FnMut(&[u8], usize),
    {
        self.buffer.extend(bytes);

        let mut frames = 0;
        let mut read_index = 0;
        loop {
            let Some(header_index) = self.buffer.find_header(read_index) else {
                self.buffer.retain_split_header();
                return frames;
            };

            if self.buffer.len() - header_index < FRAME_LENGTH {
                self.buffer.compact_from(header_index);
                return frames;
            }

            on_frame(self.buffer.as_slice(), header_index + HEADER.len());
            frames += 1;
            read_index = header_index + FRAME_LENGTH;

            if read_index >= self.buffer.len() {
                self.buffer.clear();
                return frames;
            }
        }
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Drop any partial frame. Capacity is kept.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PAYLOAD_LENGTH;
    use crate::test_utils::FrameBuilder;
    use proptest::prelude::*;

    /// Feed every chunk and collect each emitted frame (header included).
    fn collect_frames(framer: &mut Framer, chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for chunk in chunks {
            framer.feed(chunk, |buffer, offset| {
                frames.push(buffer[offset - HEADER.len()..offset + PAYLOAD_LENGTH].to_vec());
            });
        }
        frames
    }

    fn frame(sequence: u16) -> Vec<u8> {
        FrameBuilder::new(sequence).build().to_vec()
    }

    #[test]
    fn single_frame_in_one_read() {
        let mut framer = Framer::new();
        let frames = collect_frames(&mut framer, &[&frame(1)]);

        assert_eq!(frames, vec![frame(1)]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let mut framer = Framer::new();
        let mut bytes = frame(1);
        bytes.extend(frame(2));
        bytes.extend(frame(3));

        let frames = collect_frames(&mut framer, &[&bytes]);
        assert_eq!(frames, vec![frame(1), frame(2), frame(3)]);
    }

    #[test]
    fn partial_frame_is_carried_over() {
        let mut framer = Framer::new();
        let bytes = frame(9);

        let frames = collect_frames(&mut framer, &[&bytes[..40]]);
        assert!(frames.is_empty());
        assert_eq!(framer.buffered(), 40);

        let frames = collect_frames(&mut framer, &[&bytes[40..]]);
        assert_eq!(frames, vec![frame(9)]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn leading_noise_is_skipped_and_partial_compacted() {
        let mut framer = Framer::new();
        let mut bytes = vec![0x01, 0x02, 0x03];
        bytes.extend_from_slice(&frame(4)[..10]);

        assert!(collect_frames(&mut framer, &[&bytes]).is_empty());
        assert_eq!(framer.buffered(), 10, "noise before the header is dropped");
    }

    #[test]
    fn noise_without_header_is_discarded() {
        let mut framer = Framer::new();
        assert!(collect_frames(&mut framer, &[&[0x11; 500]]).is_empty());
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn trailing_first_header_byte_is_retained() {
        let mut framer = Framer::new();
        assert!(collect_frames(&mut framer, &[&[0x11, 0x22, HEADER[0]]]).is_empty());
        assert_eq!(framer.buffered(), 1);

        let bytes = frame(5);
        let frames = collect_frames(&mut framer, &[&bytes[1..]]);
        assert_eq!(frames, vec![frame(5)]);
    }

    #[test]
    fn buffer_grows_by_doubling() {
        let mut buffer = FrameBuffer::with_capacity(8);
        buffer.extend(&[0; 5]);
        assert_eq!(buffer.capacity(), 8);
        buffer.extend(&[0; 20]);
        assert_eq!(buffer.capacity(), 32);
        assert_eq!(buffer.len(), 25);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 32, "buffer never shrinks");
    }

    #[test]
    fn large_partial_read_grows_buffer() {
        let mut framer = Framer::new();
        let mut bytes = vec![0u8; INITIAL_CAPACITY * 3];
        bytes.extend_from_slice(&frame(1)[..30]);

        collect_frames(&mut framer, &[&bytes]);
        assert!(framer.capacity() >= INITIAL_CAPACITY * 3);
        assert_eq!(framer.buffered(), 30);
    }

    #[test]
    fn reset_drops_partial_frame() {
        let mut framer = Framer::new();
        collect_frames(&mut framer, &[&frame(1)[..20]]);
        framer.reset();
        assert_eq!(framer.buffered(), 0);

        let frames = collect_frames(&mut framer, &[&frame(1)[20..]]);
        assert!(frames.is_empty(), "tail of a dropped frame must not be emitted");
    }

    fn noise() -> impl Strategy<Value = Vec<u8>> {
        // lone 0xCA bytes are common, a full header never forms
        let byte = prop_oneof![1 => Just(HEADER[0]), 3 => any::<u8>()];
        prop::collection::vec(byte, 0..40)
            .prop_filter("no header pair", |bytes| !bytes.windows(2).any(|pair| pair == HEADER.as_slice()))
    }

    proptest! {
        #[test]
        fn prop_frames_recovered_regardless_of_chunking(
            sequences in prop::collection::vec(any::<u16>(), 1..12),
            gaps in prop::collection::vec(noise(), 12),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..16),
        ) {
            let mut stream = Vec::new();
            let mut expected = Vec::new();
            for (sequence, gap) in sequences.iter().zip(gaps.iter()) {
                stream.extend_from_slice(gap);
                let bytes = frame(*sequence);
                stream.extend_from_slice(&bytes);
                expected.push(bytes);
            }

            let mut points: Vec<usize> = cuts.iter().map(|cut| cut.index(stream.len() + 1)).collect();
            points.sort_unstable();
            points.dedup();

            let mut chunks: Vec<&[u8]> = Vec::new();
            let mut start = 0;
            for point in points {
                chunks.push(&stream[start..point]);
                start = point;
            }
            chunks.push(&stream[start..]);

            let mut framer = Framer::new();
            let frames = collect_frames(&mut framer, &chunks);
            prop_assert_eq!(frames, expected);
        }

        #[test]
        fn prop_split_header_matches_whole_feed(split in 0usize..=FRAME_LENGTH, sequence in any::<u16>()) {
            let bytes = frame(sequence);

            let mut whole = Framer::new();
            let expected = collect_frames(&mut whole, &[&bytes]);

            let mut split_framer = Framer::new();
            let actual = collect_frames(&mut split_framer, &[&bytes[..split], &bytes[split..]]);

            prop_assert_eq!(actual, expected);
        }
    }
}
