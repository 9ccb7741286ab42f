//! End-to-end scenarios driven against the in-process fake broker in
//! `tests/common`, covering bootstrap, routing, timeouts, and disconnect
//! handling.

mod common;

use std::time::Duration;

use bytes::Bytes;
use kafka_core::{ApiKeys, Error, KafkaClient, LeaderOutcome, Payload, SendRequest};

/// S1 + S4: one host refuses the connection outright, the other accepts;
/// bootstrap succeeds via the second, and the first request on the wire is
/// `Metadata`, not `ApiVersions`, proving `versions.disabled` actually
/// skipped the negotiation round trip.
#[tokio::test]
async fn bootstrap_succeeds_past_a_refused_host_and_skips_version_negotiation() {
    let (listener, port) = common::listener().await;

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let req = common::read_request(&mut stream).await;
        assert_eq!(req.api_key, ApiKeys::Metadata as i16, "ApiVersions should have been skipped");

        let body = common::encode_metadata_response(&[(1, "127.0.0.1", port)], &[], Some(1));
        common::write_response(&mut stream, req.correlation_id, &body).await;
    });

    let config = common::config(vec!["127.0.0.1:1".to_owned(), format!("127.0.0.1:{port}")]);
    let client = KafkaClient::new(config, common::registry());

    client.connect().await.unwrap();
    assert!(client.is_ready());
    assert_eq!(client.metadata().brokers().len(), 1);

    broker.await.unwrap();
}

/// S2: a fetch against a leader that never replies times out without
/// hanging the whole `send_request` fan-out.
#[tokio::test]
async fn a_request_with_no_reply_times_out() {
    let (listener, port) = common::listener().await;

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let meta_req = common::read_request(&mut stream).await;
        let body = common::encode_metadata_response(
            &[(1, "127.0.0.1", port)],
            &[("topic", vec![(0, 1)])],
            Some(1),
        );
        common::write_response(&mut stream, meta_req.correlation_id, &body).await;

        // the fetch that follows is read off the wire but never answered
        let _fetch_req = common::read_request(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let config = common::config(vec![format!("127.0.0.1:{port}")]);
    let client = KafkaClient::new(config, common::registry());
    client.connect().await.unwrap();

    let results = client
        .send_request(SendRequest {
            api_key: ApiKeys::Fetch,
            api_version: 0,
            longpolling: false,
            payloads: vec![Payload { topic: "topic".to_owned(), partition: 0, data: Bytes::new() }],
            require_acks: None,
            timeout: Duration::from_millis(50),
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(matches!(&results[0].outcome, Err(Error::Timeout(_))));

    broker.abort();
}

/// S3: the broker closes the socket after reading a request instead of
/// answering it; the pending call fails instead of hanging until its
/// timeout.
#[tokio::test]
async fn broker_disconnect_mid_flight_fails_the_pending_request() {
    let (listener, port) = common::listener().await;

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let meta_req = common::read_request(&mut stream).await;
        let body = common::encode_metadata_response(
            &[(1, "127.0.0.1", port)],
            &[("topic", vec![(0, 1)])],
            Some(1),
        );
        common::write_response(&mut stream, meta_req.correlation_id, &body).await;

        let _produce_req = common::read_request(&mut stream).await;
        // dropping `stream` here closes the socket without a response
    });

    let config = common::config(vec![format!("127.0.0.1:{port}")]);
    let client = KafkaClient::new(config, common::registry());
    client.connect().await.unwrap();

    let results = client
        .send_produce_request(
            vec![Payload { topic: "topic".to_owned(), partition: 0, data: Bytes::from_static(b"x") }],
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(matches!(&results[0].outcome, Err(Error::BrokerNotAvailable(_))));

    broker.await.unwrap();
}

/// S6: `requireAcks = 0` takes the fire-and-forget path and resolves
/// without waiting on a response frame at all.
#[tokio::test]
async fn require_acks_zero_completes_without_waiting_for_a_response() {
    let (listener, port) = common::listener().await;

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let meta_req = common::read_request(&mut stream).await;
        let body = common::encode_metadata_response(
            &[(1, "127.0.0.1", port)],
            &[("topic", vec![(0, 1)])],
            Some(1),
        );
        common::write_response(&mut stream, meta_req.correlation_id, &body).await;

        let _produce_req = common::read_request(&mut stream).await;
    });

    let config = common::config(vec![format!("127.0.0.1:{port}")]);
    let client = KafkaClient::new(config, common::registry());
    client.connect().await.unwrap();

    let results = client
        .send_produce_request(
            vec![Payload { topic: "topic".to_owned(), partition: 0, data: Bytes::from_static(b"x") }],
            Some(0),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].outcome, Ok(LeaderOutcome::NoAck)));

    broker.await.unwrap();
}

/// A topic with no known leader is resolved via a scoped metadata refresh
/// before the fetch is attempted at all.
#[tokio::test]
async fn fetch_refreshes_metadata_for_an_unknown_topic_before_sending() {
    let (listener, port) = common::listener().await;

    let broker = tokio::spawn(async move {
        // the bootstrap connect and the scoped refresh both reuse this
        // connection (any-connected routing); the fetch itself opens a
        // second, separate connection since fetches are long-polling and
        // long-polling uses its own pool.
        let (mut bootstrap_conn, _) = listener.accept().await.unwrap();

        let bootstrap_req = common::read_request(&mut bootstrap_conn).await;
        let bootstrap_body = common::encode_metadata_response(&[(1, "127.0.0.1", port)], &[], Some(1));
        common::write_response(&mut bootstrap_conn, bootstrap_req.correlation_id, &bootstrap_body).await;

        let refresh_req = common::read_request(&mut bootstrap_conn).await;
        assert_eq!(refresh_req.api_key, ApiKeys::Metadata as i16);
        let refresh_body = common::encode_metadata_response(
            &[(1, "127.0.0.1", port)],
            &[("topic", vec![(0, 1)])],
            Some(1),
        );
        common::write_response(&mut bootstrap_conn, refresh_req.correlation_id, &refresh_body).await;

        let (mut fetch_conn, _) = listener.accept().await.unwrap();
        let fetch_req = common::read_request(&mut fetch_conn).await;
        assert_eq!(fetch_req.api_key, ApiKeys::Fetch as i16);
        common::write_response(&mut fetch_conn, fetch_req.correlation_id, b"ok").await;
    });

    let config = common::config(vec![format!("127.0.0.1:{port}")]);
    let client = KafkaClient::new(config, common::registry());
    client.connect().await.unwrap();

    let results = client
        .send_fetch_request(
            vec![Payload { topic: "topic".to_owned(), partition: 0, data: Bytes::new() }],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(matches!(&results[0].outcome, Ok(LeaderOutcome::Response(_))));

    broker.await.unwrap();
}

/// `close()` is idempotent: two overlapping calls share one teardown and
/// only one `ClientEvent::Close` is emitted.
#[tokio::test]
async fn close_is_idempotent_and_emits_exactly_one_close_event() {
    let (listener, port) = common::listener().await;

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let req = common::read_request(&mut stream).await;
        let body = common::encode_metadata_response(&[(1, "127.0.0.1", port)], &[], Some(1));
        common::write_response(&mut stream, req.correlation_id, &body).await;
    });

    let config = common::config(vec![format!("127.0.0.1:{port}")]);
    let client = KafkaClient::new(config, common::registry());
    client.connect().await.unwrap();

    let mut events = client.subscribe();

    tokio::join!(client.close(), client.close());

    let mut close_events = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, kafka_core::ClientEvent::Close) {
            close_events += 1;
        }
    }
    assert_eq!(close_events, 1);

    broker.await.unwrap();
}
