use std::io;

use tracing::trace;

use crate::{
    codec::{pack_fixed64_float, pack_fixed64_uint},
    header::{build_header, FieldsMask, Tags},
};

/// Maximum datagram payload: the IPv6 minimum MTU (1280) minus the IPv6 (40) and UDP (8) headers.
pub const MAX_PAYLOAD_SIZE: usize = 1232;

/// Size of the element count that precedes every array chunk.
pub const LEN_FIELD_SIZE: usize = 4;

/// Encoded size of a single array element, for both values and uniques.
const ELEMENT_SIZE: usize = 8;

/// Smallest payload length that can carry one array element of a record with an empty name and no tags.
pub const MIN_PAYLOAD_LEN: usize = 24 + LEN_FIELD_SIZE + ELEMENT_SIZE;

/// Errors produced while packing records.
#[derive(Debug)]
pub enum PackError {
    /// The record header does not fit into an empty payload.
    HeaderTooLarge { header_len: usize },

    /// A flush needed to make room failed.
    Flush(FlushError),
}

impl From<FlushError> for PackError {
    fn from(e: FlushError) -> Self {
        PackError::Flush(e)
    }
}

/// Errors produced while flushing buffered payloads.
#[derive(Debug)]
pub enum FlushError {
    /// The transport could not be established.
    Connect(io::Error),

    /// The payload could not be sent.
    Write(io::Error),
}

/// Destination of packed bytes.
///
/// The sink owns the outgoing buffer. The writer only ever appends whole chunks to it, so the buffer is always a
/// sequence of complete batch envelopes.
pub trait PayloadSink {
    /// Returns the number of buffered, unsent bytes.
    fn buffered_len(&self) -> usize;

    /// Appends a chunk, made of the given parts, to the buffer.
    fn append(&mut self, parts: &[&[u8]]);

    /// Sends the buffered bytes, without closing the transport.
    fn flush(&mut self) -> Result<(), FlushError>;

    /// Sends the buffered bytes if they have been waiting long enough, so that a new record starts a fresh batch.
    ///
    /// Called once per write, after the record has been validated and before its first chunk is appended. A failure
    /// does not stop the write: the record is still appended, and the error is returned once it is.
    fn flush_expired(&mut self) -> Result<(), FlushError> {
        Ok(())
    }
}

trait Element: Copy {
    fn pack(self, buf: &mut Vec<u8>);
}

impl Element for f64 {
    fn pack(self, buf: &mut Vec<u8>) {
        pack_fixed64_float(buf, self);
    }
}

impl Element for u64 {
    fn pack(self, buf: &mut Vec<u8>) {
        pack_fixed64_uint(buf, self);
    }
}

/// Packs metric records into payloads no larger than the configured maximum.
///
/// Counter records are a header alone. Value and unique records carry an array, which is split into as many chunks as
/// needed; every chunk repeats the full header and carries its own element count, so each datagram stays a complete
/// batch on its own.
pub struct PayloadWriter {
    max_payload_len: usize,
    header_buf: Vec<u8>,
    values_buf: Vec<u8>,
}

impl PayloadWriter {
    /// Creates a new `PayloadWriter` with the given maximum payload length.
    pub fn new(max_payload_len: usize) -> Self {
        Self { max_payload_len, header_buf: Vec::new(), values_buf: Vec::new() }
    }

    /// Returns the maximum payload length.
    pub fn max_payload_len(&self) -> usize {
        self.max_payload_len
    }

    /// Writes a counter record.
    pub fn write_count<S>(
        &mut self,
        sink: &mut S,
        metric: &str,
        tags: &Tags<'_>,
        count: f64,
        timestamp: Option<u32>,
    ) -> Result<(), PackError>
    where
        S: PayloadSink,
    {
        build_header(&mut self.header_buf, metric, tags, count, timestamp, FieldsMask::COUNTER);

        let header_len = self.header_buf.len();
        if header_len > self.max_payload_len {
            return Err(PackError::HeaderTooLarge { header_len });
        }

        // A failed timed flush keeps the buffer; the record still joins it and the failure is reported afterwards.
        let expired = sink.flush_expired();
        if sink.buffered_len() + header_len > self.max_payload_len {
            sink.flush()?;
        }

        sink.append(&[&self.header_buf[..]]);
        trace!(metric, header_len, "Appended counter record.");

        expired.map_err(PackError::from)
    }

    /// Writes a value record, splitting `values` across chunks as needed.
    pub fn write_values<S>(
        &mut self,
        sink: &mut S,
        metric: &str,
        tags: &Tags<'_>,
        values: &[f64],
        count: f64,
        timestamp: Option<u32>,
    ) -> Result<(), PackError>
    where
        S: PayloadSink,
    {
        self.write_array(sink, metric, tags, values, count, timestamp, FieldsMask::VALUES)
    }

    /// Writes a unique record, splitting `uniques` across chunks as needed.
    pub fn write_uniques<S>(
        &mut self,
        sink: &mut S,
        metric: &str,
        tags: &Tags<'_>,
        uniques: &[u64],
        count: f64,
        timestamp: Option<u32>,
    ) -> Result<(), PackError>
    where
        S: PayloadSink,
    {
        self.write_array(sink, metric, tags, uniques, count, timestamp, FieldsMask::UNIQUES)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_array<S, E>(
        &mut self,
        sink: &mut S,
        metric: &str,
        tags: &Tags<'_>,
        elements: &[E],
        count: f64,
        timestamp: Option<u32>,
        kind: FieldsMask,
    ) -> Result<(), PackError>
    where
        S: PayloadSink,
        E: Element,
    {
        if elements.is_empty() {
            return Ok(());
        }

        // The count only travels when it says something the array length does not.
        #[allow(clippy::float_cmp)]
        let mask = if count != 0.0 && count != elements.len() as f64 {
            kind | FieldsMask::COUNTER
        } else {
            kind
        };

        // Every chunk of this call shares the same header.
        build_header(&mut self.header_buf, metric, tags, count, timestamp, mask);
        let header_len = self.header_buf.len();

        // Even an empty payload has to fit the header, the length field and one element.
        let empty_room = self.room(0, header_len);
        if empty_room < ELEMENT_SIZE {
            return Err(PackError::HeaderTooLarge { header_len });
        }

        let expired = sink.flush_expired();

        let mut rest = elements;
        while !rest.is_empty() {
            let mut room = self.room(sink.buffered_len(), header_len);
            if room < ELEMENT_SIZE {
                sink.flush()?;
                room = empty_room;
            }

            let (chunk, remaining) = rest.split_at((room / ELEMENT_SIZE).min(rest.len()));

            self.values_buf.clear();
            chunk.iter().for_each(|e| e.pack(&mut self.values_buf));

            let len_buf = (chunk.len() as u32).to_le_bytes();
            sink.append(&[&self.header_buf[..], &len_buf[..], &self.values_buf[..]]);
            trace!(metric, elements = chunk.len(), remaining = remaining.len(), "Appended array chunk.");

            rest = remaining;
        }

        expired.map_err(PackError::from)
    }

    /// Returns how many bytes of array payload fit after `buffered_len` bytes and one header.
    fn room(&self, buffered_len: usize, header_len: usize) -> usize {
        self.max_payload_len.saturating_sub(buffered_len + header_len + LEN_FIELD_SIZE)
    }
}
