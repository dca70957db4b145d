use std::sync::Arc;

use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::{client::StatsHouseClient, error::Error, header::Tags, Transport, UdpTransport};

type SharedClient<T> = Arc<Mutex<StatsHouseClient<T>>>;

/// A recorder that forwards metrics to a StatsHouse aggregator.
///
/// Counter increments are sent as counts, and gauge and histogram observations as values. Labels become named tags.
/// Absolute counters and relative gauge updates cannot be expressed on the wire and are dropped.
pub struct StatsHouseRecorder<T: Transport = UdpTransport> {
    client: SharedClient<T>,
}

impl<T: Transport> StatsHouseRecorder<T> {
    pub(crate) fn new(client: SharedClient<T>) -> Self {
        StatsHouseRecorder { client }
    }

    /// Returns a handle to the client behind this recorder.
    ///
    /// The handle stays usable after the recorder has been installed globally.
    pub fn handle(&self) -> StatsHouseHandle<T> {
        StatsHouseHandle { client: Arc::clone(&self.client) }
    }

    /// Sends everything buffered and closes the connection.
    ///
    /// # Errors
    ///
    /// See [`StatsHouseClient::close`].
    pub fn close(&self) -> Result<(), Error> {
        self.client.lock().close()
    }
}

/// Handle to a [`StatsHouseRecorder`].
///
/// An installed recorder is never dropped, so call [`close`](StatsHouseHandle::close) before the process exits to send
/// the last batch.
pub struct StatsHouseHandle<T: Transport = UdpTransport> {
    client: SharedClient<T>,
}

impl<T: Transport> Clone for StatsHouseHandle<T> {
    fn clone(&self) -> Self {
        StatsHouseHandle { client: Arc::clone(&self.client) }
    }
}

impl<T: Transport> StatsHouseHandle<T> {
    /// Sends everything buffered right away, keeping the connection open.
    ///
    /// # Errors
    ///
    /// See [`StatsHouseClient::flush`].
    pub fn flush(&self) -> Result<(), Error> {
        self.client.lock().flush()
    }

    /// Sends everything buffered and closes the connection.
    ///
    /// # Errors
    ///
    /// See [`StatsHouseClient::close`].
    pub fn close(&self) -> Result<(), Error> {
        self.client.lock().close()
    }
}

struct Handle<T: Transport> {
    key: Key,
    client: SharedClient<T>,
}

impl<T: Transport> Handle<T> {
    fn tags(&self) -> Tags<'_> {
        self.key.labels().map(|label| (label.key(), label.value())).collect()
    }

    fn write_count(&self, count: f64) {
        let result = self.client.lock().write_count(self.key.name(), &self.tags(), count, None);
        log_failure(result);
    }

    fn write_value(&self, value: f64) {
        let result = self.client.lock().write_value(self.key.name(), &self.tags(), &[value], 0.0, None);
        log_failure(result);
    }

    fn unsupported(&self, operation: &'static str) {
        debug!(metric_name = self.key.name(), operation, "Dropping update with no wire representation.");
    }
}

fn log_failure(result: Result<(), Error>) {
    if let Err(e) = result {
        error!(metric_name = e.metric(), error = %e, "Failed to write metric.");
    }
}

impl<T: Transport> CounterFn for Handle<T> {
    fn increment(&self, value: u64) {
        self.write_count(value as f64);
    }

    fn absolute(&self, _: u64) {
        self.unsupported("absolute");
    }
}

impl<T: Transport> GaugeFn for Handle<T> {
    fn increment(&self, _: f64) {
        self.unsupported("increment");
    }

    fn decrement(&self, _: f64) {
        self.unsupported("decrement");
    }

    fn set(&self, value: f64) {
        self.write_value(value);
    }
}

impl<T: Transport> HistogramFn for Handle<T> {
    fn record(&self, value: f64) {
        self.write_value(value);
    }
}

impl<T> StatsHouseRecorder<T>
where
    T: Transport + Send + 'static,
    T::Connection: Send,
{
    fn metric_handle(&self, key: &Key) -> Arc<Handle<T>> {
        Arc::new(Handle { key: key.clone(), client: Arc::clone(&self.client) })
    }
}

impl<T> Recorder for StatsHouseRecorder<T>
where
    T: Transport + Send + 'static,
    T::Connection: Send,
{
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        Counter::from_arc(self.metric_handle(key))
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(self.metric_handle(key))
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(self.metric_handle(key))
    }
}

#[cfg(test)]
mod tests {
    use metrics::{Label, Level};
    use quanta::Clock;

    use super::*;
    use crate::{
        test_util::{parse_datagram, Array, MockTransport},
        FieldsMask, StatsHouseBuilder,
    };

    static METADATA: Metadata<'static> = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

    fn recorder() -> (StatsHouseRecorder<MockTransport>, MockTransport) {
        let transport = MockTransport::default();
        let client = StatsHouseBuilder::default()
            .with_clock(Clock::mock().0)
            .build_with_transport(transport.clone())
            .unwrap();
        (StatsHouseRecorder::new(Arc::new(Mutex::new(client))), transport)
    }

    #[test]
    fn counters_become_counts() {
        let (recorder, transport) = recorder();

        let key = Key::from_parts("requests", vec![Label::new("method", "GET"), Label::new("_2", "200")]);
        recorder.register_counter(&key, &METADATA).increment(3);
        recorder.register_counter(&key, &METADATA).absolute(10);
        recorder.close().unwrap();

        let datagrams = transport.datagrams();
        assert_eq!(datagrams.len(), 1);

        let records = parse_datagram(&datagrams[0]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, b"requests");
        assert_eq!(records[0].mask, FieldsMask::COUNTER.bits());
        assert_eq!(records[0].count, Some(3.0));
        assert_eq!(
            records[0].tags,
            vec![(b"method".to_vec(), b"GET".to_vec()), (b"2".to_vec(), b"200".to_vec())]
        );
    }

    #[test]
    fn handle_flushes_and_closes_shared_client() {
        let (recorder, transport) = recorder();
        let handle = recorder.handle();

        recorder.register_counter(&Key::from_name("requests"), &METADATA).increment(1);
        handle.clone().flush().unwrap();
        assert_eq!(transport.datagrams().len(), 1);

        recorder.register_counter(&Key::from_name("requests"), &METADATA).increment(2);
        drop(recorder);
        handle.close().unwrap();

        let datagrams = transport.datagrams();
        assert_eq!(datagrams.len(), 2);
        assert_eq!(parse_datagram(&datagrams[1])[0].count, Some(2.0));
        assert_eq!(transport.closes(), 1);
    }

    #[test]
    fn gauges_and_histograms_become_values() {
        let (recorder, transport) = recorder();

        let gauge = recorder.register_gauge(&Key::from_name("queue_depth"), &METADATA);
        gauge.set(12.0);
        gauge.increment(1.0);
        recorder.register_histogram(&Key::from_name("latency"), &METADATA).record(0.25);
        recorder.close().unwrap();

        let records = parse_datagram(&transport.datagrams()[0]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, b"queue_depth");
        assert_eq!(records[0].array, Some(Array::Values(vec![12.0])));
        assert_eq!(records[1].name, b"latency");
        assert_eq!(records[1].array, Some(Array::Values(vec![0.25])));
    }
}
