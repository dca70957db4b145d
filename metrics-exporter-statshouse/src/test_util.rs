use std::{io, sync::Arc};

use parking_lot::Mutex;

use crate::{header::BATCH_TAG, FieldsMask, Transport};

/// Array payload of a parsed record.
#[derive(Clone, Debug, PartialEq)]
pub enum Array {
    Values(Vec<f64>),
    Uniques(Vec<u64>),
}

/// A metric record parsed back from the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub mask: u32,
    pub name: Vec<u8>,
    pub tags: Vec<(Vec<u8>, Vec<u8>)>,
    pub count: Option<f64>,
    pub timestamp: Option<u32>,
    pub array: Option<Array>,
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> &'a [u8] {
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        head
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take(4).try_into().unwrap())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take(8).try_into().unwrap())
    }

    fn f64(&mut self) -> f64 {
        f64::from_le_bytes(self.take(8).try_into().unwrap())
    }

    fn string(&mut self) -> Vec<u8> {
        let (len, prefix_len) = if self.buf[0] == 0xFE {
            ((self.u32() >> 8) as usize, 4)
        } else {
            (self.take(1)[0] as usize, 1)
        };

        let s = self.take(len).to_vec();
        let padding = (4 - (prefix_len + len) % 4) % 4;
        assert!(self.take(padding).iter().all(|b| *b == 0), "non-zero string padding");
        s
    }

    fn record(&mut self) -> Record {
        assert_eq!(self.u32(), BATCH_TAG, "bad batch tag");
        assert_eq!(self.u32(), 0, "bad reserved mask");
        assert_eq!(self.u32(), 1, "bad batch size");

        let mask = self.u32();
        let name = self.string();
        let tag_count = self.u32();
        let tags = (0..tag_count).map(|_| (self.string(), self.string())).collect();

        let has = |bit: FieldsMask| mask & bit.bits() != 0;
        let count = has(FieldsMask::COUNTER).then(|| self.f64());
        let timestamp = has(FieldsMask::TIMESTAMP).then(|| self.u32());
        let array = if has(FieldsMask::VALUES) {
            let len = self.u32();
            Some(Array::Values((0..len).map(|_| self.f64()).collect()))
        } else if has(FieldsMask::UNIQUES) {
            let len = self.u32();
            Some(Array::Uniques((0..len).map(|_| self.u64()).collect()))
        } else {
            None
        };

        Record { mask, name, tags, count, timestamp, array }
    }
}

/// Parses every record out of a datagram, panicking on malformed input.
pub fn parse_datagram(datagram: &[u8]) -> Vec<Record> {
    let mut reader = Reader { buf: datagram };
    let mut records = Vec::new();
    while !reader.buf.is_empty() {
        records.push(reader.record());
    }
    records
}

#[derive(Default)]
struct MockState {
    datagrams: Vec<Vec<u8>>,
    connects: usize,
    closes: usize,
    fail_connect: bool,
    fail_send: bool,
}

/// In-memory transport that records every datagram sent through it.
///
/// Clones share state, so a test can keep one clone to inspect what the client sent.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Connection handed out by [`MockTransport`].
pub struct MockConnection;

impl MockTransport {
    pub fn datagrams(&self) -> Vec<Vec<u8>> {
        self.state.lock().datagrams.clone()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    pub fn fail_send(&self, fail: bool) {
        self.state.lock().fail_send = fail;
    }
}

impl Transport for MockTransport {
    type Connection = MockConnection;

    fn connect(&mut self) -> io::Result<MockConnection> {
        let mut state = self.state.lock();
        if state.fail_connect {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
        }

        state.connects += 1;
        Ok(MockConnection)
    }

    fn send(&mut self, _: &mut MockConnection, payload: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.fail_send {
            return Err(io::Error::other("send failed"));
        }

        state.datagrams.push(payload.to_vec());
        Ok(payload.len())
    }

    fn close(&mut self, _: MockConnection) {
        self.state.lock().closes += 1;
    }
}
