use metrics_exporter_statshouse::{lex_enc_float, StatsHouseBuilder, Tags};
use rand::Rng;

fn main() {
    tracing_subscriber::fmt::init();

    let mut client = StatsHouseBuilder::default()
        .with_remote_address("localhost:13337")
        .expect("failed to parse remote address")
        .build()
        .expect("failed to build StatsHouse client");

    let mut rng = rand::rng();

    // Positional tags are sent with keys `1`, `2`, and so on.
    let tags = Tags::from(&["production", "GET"][..]);
    for _ in 0..10_000 {
        client.write_count("requests", &tags, 1.0, None).expect("failed to write counter");
    }

    // Far more values than fit into a single datagram; they are split as needed.
    let latencies = (0..2_000).map(|_| rng.random_range(0.0..0.5)).collect::<Vec<f64>>();
    client.write_value("latency", &tags, &latencies, 0.0, None).expect("failed to write values");

    let users = (0..500).map(|_| rng.random::<u64>()).collect::<Vec<_>>();
    client.write_unique("active_users", &tags, &users, 0.0, None).expect("failed to write uniques");

    // A float can be used as a sortable tag value.
    let threshold = lex_enc_float(0.95).expect("not a number").to_string();
    let tags = Tags::new().with("env", "production").with("threshold", &threshold);
    client.write_count("slo_checks", &tags, 1.0, None).expect("failed to write counter");

    client.close().expect("failed to flush");
}
