//! Integration tests for armature-pipeline

use armature_pipeline::*;
use armature_resp::commands::{BfExists, CuckooInfo, Exists, TopKCount};
use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Wire = Arc<Mutex<Vec<u8>>>;

fn wired(max_length: Option<usize>) -> (CommandsQueue, Wire) {
    let wire: Wire = Arc::default();
    let sink = wire.clone();
    let queue = CommandsQueue::new(max_length, move |chunk: Bytes| {
        sink.lock().extend_from_slice(&chunk);
        true
    });
    (queue, wire)
}

fn opts() -> QueueCommandOptions {
    QueueCommandOptions::new()
}

#[test]
fn test_replies_follow_write_order() {
    let (mut queue, _wire) = wired(None);
    let replies: Vec<_> = (0..5)
        .map(|i| queue.add_command(["GET", format!("k{i}").as_str()], opts()).unwrap())
        .collect();

    queue.transmit_pending();
    queue.feed(b":0\r\n:1\r\n:2\r\n:3\r\n:4\r\n").unwrap();

    for (i, reply) in replies.into_iter().enumerate() {
        assert_eq!(reply.now_or_never(), Some(Ok(Value::Integer(i as i64))));
    }
    assert!(queue.is_empty());
}

#[test]
fn test_bound_counts_both_sequences() {
    let (mut queue, _wire) = wired(Some(3));
    let _a = queue.add_command(["PING"], opts()).unwrap();
    let _b = queue.add_command(["PING"], opts()).unwrap();
    queue.transmit_pending();
    let _c = queue.add_command(["PING"], opts()).unwrap();

    assert_eq!(queue.pending_len(), 1);
    assert_eq!(queue.in_flight_len(), 2);
    assert_eq!(
        queue.add_command(["PING"], opts()).unwrap_err(),
        PipelineError::QueueFull
    );

    queue.feed(b"+PONG\r\n").unwrap();
    assert!(queue.add_command(["PING"], opts()).is_ok());
}

#[test]
fn test_zero_max_length_is_unbounded() {
    let (mut queue, _wire) = wired(Some(0));
    assert_eq!(queue.max_length(), None);
    for _ in 0..1000 {
        let _r = queue.add_command(["PING"], opts()).unwrap();
    }
    assert_eq!(queue.len(), 1000);
}

#[test]
fn test_wire_bytes_are_exact() {
    let (mut queue, wire) = wired(None);
    let _r = queue.add_command(["SET", "clé", "v"], opts()).unwrap();
    queue.transmit_pending();

    assert_eq!(
        &wire.lock()[..],
        "*3\r\n$3\r\nSET\r\n$4\r\nclé\r\n$1\r\nv\r\n".as_bytes()
    );
}

#[test]
fn test_abort_mid_queue_keeps_neighbours() {
    let (mut queue, wire) = wired(None);
    let a = queue.add_command(["GET", "a"], opts()).unwrap();
    let b = queue.add_command(["GET", "b"], opts()).unwrap();
    let c = queue.add_command(["GET", "c"], opts()).unwrap();

    assert!(queue.abort(b.handle().unwrap()));
    queue.transmit_pending();

    let expected = [encode_command(["GET", "a"]), encode_command(["GET", "c"])].concat();
    assert_eq!(&wire.lock()[..], &expected[..]);

    queue.feed(b"$1\r\nA\r\n$1\r\nC\r\n").unwrap();
    assert_eq!(a.now_or_never(), Some(Ok(Value::from("A"))));
    assert_eq!(b.now_or_never(), Some(Err(PipelineError::Aborted)));
    assert_eq!(c.now_or_never(), Some(Ok(Value::from("C"))));
}

#[test]
fn test_interrupted_transaction_is_discarded() {
    let (mut queue, _wire) = wired(None);
    let before = queue.add_command(["PING"], opts()).unwrap();
    let (chain, tx) = queue
        .add_chain([vec!["MULTI"], vec!["INCR", "n"], vec!["EXEC"]], opts())
        .unwrap();
    let after = queue.add_command(["GET", "n"], opts()).unwrap();

    // PING and MULTI fit, INCR does not
    let budget = encode_command(["PING"]).len() + encode_command(["MULTI"]).len();
    let report = queue.transmit_chunk(budget).unwrap();
    assert_eq!(report.commands, 2);
    assert_eq!(queue.chain_in_execution(), Some(chain));

    queue.flush_in_flight(PipelineError::connection_lost("eof"));

    assert!(before.now_or_never().unwrap().is_err());
    for reply in tx {
        assert_eq!(
            reply.now_or_never(),
            Some(Err(PipelineError::connection_lost("eof")))
        );
    }
    assert_eq!(queue.pending_len(), 1);
    assert_eq!(queue.chain_in_execution(), None);

    queue.transmit_pending();
    queue.feed(b"$1\r\n5\r\n").unwrap();
    assert_eq!(after.now_or_never(), Some(Ok(Value::from("5"))));
}

#[test]
fn test_chain_completed_on_wire_leaves_next_command() {
    let (mut queue, _wire) = wired(None);
    let (chain, _tx) = queue.add_chain([["MULTI"], ["EXEC"]], opts()).unwrap();
    queue.transmit_pending();
    let next = queue.add_command(["PING"], opts()).unwrap();

    assert_eq!(queue.chain_in_execution(), Some(chain));
    queue.flush_in_flight(PipelineError::connection_lost("eof"));

    assert_eq!(queue.pending_len(), 1);
    assert!(queue.is_pending(next.handle().unwrap()));
}

#[test]
fn test_reconnect_discards_partial_reply() {
    let (mut queue, _wire) = wired(None);
    let a = queue.add_command(["GET", "a"], opts()).unwrap();
    queue.transmit_pending();
    queue.feed(b"$10\r\nhalf").unwrap();

    queue.flush_in_flight(PipelineError::connection_lost("reset"));
    assert!(a.now_or_never().unwrap().is_err());

    let b = queue.add_command(["GET", "b"], opts()).unwrap();
    queue.transmit_pending();
    queue.feed(b"+fresh\r\n").unwrap();
    assert_eq!(b.now_or_never().unwrap().unwrap().as_str(), Some("fresh"));
}

#[test]
fn test_server_error_settles_only_its_command() {
    let (mut queue, _wire) = wired(None);
    let a = queue.add_command(["INCR", "s"], opts()).unwrap();
    let b = queue.add_command(["GET", "s"], opts()).unwrap();
    queue.transmit_pending();
    queue
        .feed(b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n$1\r\nx\r\n")
        .unwrap();

    match a.now_or_never() {
        Some(Err(PipelineError::Server(err))) => assert_eq!(err.kind(), "WRONGTYPE"),
        other => panic!("expected server error, got {other:?}"),
    }
    assert_eq!(b.now_or_never(), Some(Ok(Value::from("x"))));
}

#[test]
fn test_typed_commands_end_to_end() {
    let (mut queue, _wire) = wired(None);
    let exists = queue
        .add_typed_command(&Exists::keys(["a", "b"]), opts())
        .unwrap();
    let bf = queue
        .add_typed_command(&BfExists::new("filter", "item"), opts())
        .unwrap();
    let topk = queue
        .add_typed_command(&TopKCount::new("top", ["x", "y"]), opts())
        .unwrap();
    queue.transmit_pending();

    queue.feed(b":2\r\n:0\r\n*2\r\n:7\r\n:0\r\n").unwrap();

    assert_eq!(exists.now_or_never(), Some(Ok(false)));
    assert_eq!(bf.now_or_never(), Some(Ok(false)));
    assert_eq!(topk.now_or_never(), Some(Ok(vec![7, 0])));
}

#[test]
fn test_stats_serialize() {
    let (mut queue, _wire) = wired(None);
    let _r = queue.add_command(["PING"], opts()).unwrap();
    queue.transmit_pending();
    queue.feed(b"+PONG\r\n").unwrap();

    let json = serde_json::to_value(queue.stats()).unwrap();
    assert_eq!(json["enqueued"], 1);
    assert_eq!(json["chunks"], 1);
    assert_eq!(json["replies"], 1);
}

#[test]
fn test_cuckoo_info_reply_type() {
    let (mut queue, _wire) = wired(None);
    let info = queue
        .add_typed_command(&armature_resp::commands::CfInfo::new("cf"), opts())
        .unwrap();
    queue.transmit_pending();
    queue
        .feed(
            b"*16\r\n\
              +Size\r\n:1080\r\n\
              +Number of buckets\r\n:512\r\n\
              +Number of filters\r\n:1\r\n\
              +Number of items inserted\r\n:3\r\n\
              +Number of items deleted\r\n:0\r\n\
              +Bucket size\r\n:2\r\n\
              +Expansion rate\r\n:1\r\n\
              +Max iterations\r\n:20\r\n",
        )
        .unwrap();

    let info: CuckooInfo = info.now_or_never().unwrap().unwrap();
    assert_eq!(info.number_of_buckets, 512);
    assert_eq!(info.number_of_inserted_items, 3);
    assert_eq!(info.max_iteration, 20);
}

#[test]
fn test_reply_awaited_after_feed() {
    let (mut queue, _wire) = wired(None);
    let reply = queue.add_command(["ECHO", "hi"], opts()).unwrap();
    queue.transmit_pending();
    queue.feed(b"$2\r\nhi\r\n").unwrap();

    let value = tokio_test::block_on(reply).unwrap();
    assert_eq!(value.as_bytes(), Some(&b"hi"[..]));
}

#[tokio::test]
async fn test_shared_queue_signal_cancellation() {
    let queue = SharedQueue::new(&PipelineConfig::default(), |_| true);
    let signal = CancellationToken::new();

    let keep = queue.add_command(["GET", "keep"], opts()).unwrap();
    let drop_me = queue
        .add_command(["GET", "drop"], opts().with_signal(signal.clone()))
        .unwrap();

    signal.cancel();
    let aborted = tokio::time::timeout(Duration::from_secs(1), drop_me)
        .await
        .unwrap();
    assert_eq!(aborted, Err(PipelineError::Aborted));

    assert_eq!(queue.transmit_pending(), 1);
    queue.feed(b"+kept\r\n").unwrap();
    assert_eq!(keep.await.unwrap().as_str(), Some("kept"));
}

#[tokio::test]
async fn test_shared_queue_across_tasks() {
    let queue = SharedQueue::new(&PipelineConfig::new(Some(64)), |_| true);

    let writer = queue.clone();
    let handle = tokio::spawn(async move {
        let reply = writer.add_command(["INCR", "n"], opts()).unwrap();
        writer.transmit_pending();
        reply.await
    });

    while queue.lock().in_flight_len() == 0 {
        tokio::task::yield_now().await;
    }
    queue.feed(b":1\r\n").unwrap();

    assert_eq!(handle.await.unwrap(), Ok(Value::Integer(1)));
}

#[tokio::test]
async fn test_dropped_queue_closes_replies() {
    let queue = SharedQueue::new(&PipelineConfig::default(), |_| true);
    let reply = queue.add_command(["PING"], opts()).unwrap();
    drop(queue);

    assert_eq!(reply.await, Err(PipelineError::QueueClosed));
}

proptest! {
    #[test]
    fn prop_fifo_under_any_chunking(
        sizes in proptest::collection::vec(1usize..40, 1..30),
        budget in 1usize..200,
    ) {
        let (mut queue, _wire) = wired(None);
        let replies: Vec<_> = sizes
            .iter()
            .map(|&n| queue.add_command(["ECHO", "x".repeat(n).as_str()], opts()).unwrap())
            .collect();

        while queue.transmit_chunk(budget).is_some() {}
        prop_assert_eq!(queue.in_flight_len(), sizes.len());

        let mut wire = Vec::new();
        for i in 0..sizes.len() {
            wire.extend_from_slice(format!(":{i}\r\n").as_bytes());
        }
        queue.feed(&wire).unwrap();

        for (i, reply) in replies.into_iter().enumerate() {
            prop_assert_eq!(reply.now_or_never(), Some(Ok(Value::Integer(i as i64))));
        }
    }
}
