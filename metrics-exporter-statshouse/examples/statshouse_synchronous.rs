use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_statshouse::StatsHouseBuilder;
use rand::Rng;

fn main() {
    tracing_subscriber::fmt::init();

    let handle = StatsHouseBuilder::default()
        .with_remote_address("localhost:13337")
        .expect("failed to parse remote address")
        .with_flush_interval(Duration::from_millis(500))
        .install()
        .expect("failed to install StatsHouse recorder");

    gauge!("testing").set(42.0);

    let server_loops = counter!("tcp_server_loops", "system" => "foo");
    let server_loops_delta_secs = histogram!("tcp_server_loop_delta_secs", "system" => "foo");

    let mut rng = rand::rng();

    // Pretend to do some work for a while.
    for _ in 0..1_000 {
        server_loops.increment(1);
        server_loops_delta_secs.record(rng.random_range(0.0..1.0));

        std::thread::sleep(Duration::from_millis(10));
    }

    handle.close().expect("failed to flush");
}
