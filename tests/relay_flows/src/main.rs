fn main() {
    println!("Run `cargo test -p relay-flows` to execute end-to-end relay flow tests.");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use courier_lock::{DistributedLock, LockStore, MemoryLockStore};
    use courier_protocol::{FetchJob, SendJob};
    use courier_relay::{
        FetchChunkTask, InboundLocation, OutboundRoute, PollOutcome, PollRequest, PollTask,
        RelayConfig, SendChunkTask, StaticRoutes, prepare_send_job,
    };
    use courier_storage::{MemoryObjectStore, ObjectInfo};
    use courier_transport::{InboundMessage, MemoryTransport, MessageHeaders};

    /// Everything a relay deployment wires together, backed by in-memory
    /// fakes, plus handles for assertions.
    struct Harness {
        store: Arc<MemoryObjectStore>,
        transport: Arc<MemoryTransport>,
        lock_store: Arc<MemoryLockStore>,
        routes: Arc<StaticRoutes>,
        config: RelayConfig,
    }

    impl Harness {
        fn new(config: RelayConfig) -> Self {
            let routes = StaticRoutes::new()
                .route_folder(
                    "outbox",
                    "outbound/",
                    OutboundRoute {
                        sender: "MB-LOCAL".into(),
                        recipient: "MB-REMOTE".into(),
                        workflow_id: Some("WF-100".into()),
                    },
                )
                .route_mailbox("MB-LOCAL", InboundLocation::new("inbox", "received/"));
            Self {
                store: Arc::new(MemoryObjectStore::with_min_part_size(config.min_part_size)),
                transport: Arc::new(MemoryTransport::new()),
                lock_store: Arc::new(MemoryLockStore::new()),
                routes: Arc::new(routes),
                config,
            }
        }

        fn lock(&self) -> DistributedLock {
            DistributedLock::new(self.lock_store.clone())
        }

        fn sender(&self) -> SendChunkTask {
            SendChunkTask::new(
                self.store.clone(),
                self.transport.clone(),
                self.lock(),
                self.config.clone(),
            )
        }

        fn fetcher(&self) -> FetchChunkTask {
            FetchChunkTask::new(
                self.store.clone(),
                self.transport.clone(),
                self.lock(),
                self.routes.clone(),
                self.config.clone(),
            )
        }

        fn poller(&self) -> PollTask {
            PollTask::new(self.transport.clone(), self.lock(), self.config.clone())
        }

        async fn send_job(&self, key: &str, execution_id: &str) -> SendJob {
            prepare_send_job(
                self.store.as_ref(),
                self.routes.as_ref(),
                &self.config,
                "outbox",
                key,
                Some(execution_id.into()),
            )
            .await
            .unwrap()
        }

        async fn lock_owner(&self, lock_name: &str) -> Option<String> {
            self.lock_store
                .get(lock_name)
                .await
                .unwrap()
                .map(|row| row.owner_id)
        }
    }

    /// A 33-byte file with a 10-byte chunk size needs exactly four
    /// invocations; the cursor ends at byte 33 and every byte arrives once.
    #[tokio::test]
    async fn chunked_send_takes_four_invocations() {
        let harness = Harness::new(RelayConfig::default().with_chunk_sizes(10, 4));
        let body: Vec<u8> = (b'a'..b'a' + 33).collect();
        harness
            .store
            .seed("outbox", "outbound/f.dat", Bytes::from(body.clone()), ObjectInfo::default())
            .await;
        let sender = harness.sender();

        let mut job = harness.send_job("outbound/f.dat", "exec-send").await;
        assert_eq!(job.params.total_chunks, 4);
        assert!(job.params.chunked);

        let mut invocations = 0;
        while !job.complete {
            job = sender.run(job).await.unwrap();
            invocations += 1;
            assert!(invocations <= 4, "send chain did not terminate");
        }
        assert_eq!(invocations, 4);
        assert_eq!(job.current_byte_position, 33);
        assert_eq!(job.chunk_number, 4);
        assert!(harness.lock_owner(&job.lock_name).await.is_none());

        let message_id = job.message_id.unwrap();
        assert_eq!(
            harness.transport.outbound_message_bytes(&message_id).await,
            body
        );
        let chunks = harness.transport.outbound_chunks().await;
        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_number, i as u32 + 1);
            assert_eq!(chunk.total_chunks, 4);
            assert_eq!(chunk.message_id.as_deref(), Some(message_id.as_str()));
        }
    }

    /// A single-chunk message lands as one object, acknowledged exactly once,
    /// with the fetch lock released.
    #[tokio::test]
    async fn single_chunk_fetch_is_exactly_once() {
        let harness = Harness::new(RelayConfig::default());
        let payload = b"a 35 byte inbound payload, honest!!";
        assert_eq!(payload.len(), 35);
        harness
            .transport
            .seed_message(
                "MB-LOCAL",
                InboundMessage {
                    id: "M100".into(),
                    chunks: vec![Bytes::from_static(payload)],
                    headers: MessageHeaders {
                        sender: Some("MB-REMOTE".into()),
                        filename: Some("invoice.txt".into()),
                        content_type: Some("text/plain".into()),
                        ..Default::default()
                    },
                },
            )
            .await;

        let jobs = match harness.poller().run(PollRequest::poll("MB-LOCAL")).await.unwrap() {
            PollOutcome::Messages { jobs } => jobs,
            other => panic!("expected Messages, got {other:?}"),
        };
        assert_eq!(jobs.len(), 1);
        // Poller keeps the mailbox lock for the fetch chain.
        assert!(harness.lock_owner("FetchLock_MB-LOCAL").await.is_some());

        let job = harness.fetcher().run(jobs.into_iter().next().unwrap()).await.unwrap();
        assert!(job.complete);
        assert_eq!(job.key, "received/MB-LOCAL/invoice.txt");
        assert_eq!(
            &harness.store.object_bytes("inbox", &job.key).await.unwrap()[..],
            payload
        );
        assert_eq!(harness.transport.ack_count("MB-LOCAL", "M100").await, 1);
        assert!(harness.lock_owner("FetchLock_MB-LOCAL").await.is_none());

        // The mailbox is drained: the next cycle finds nothing.
        let outcome = harness.poller().run(PollRequest::poll("MB-LOCAL")).await.unwrap();
        assert_eq!(outcome, PollOutcome::NoContent);
    }

    /// A two-chunk message whose first chunk is below the minimum part size:
    /// the first invocation returns an open continuation, the second finishes
    /// the upload and acknowledges.
    #[tokio::test]
    async fn multi_chunk_fetch_spans_two_invocations() {
        let mut config = RelayConfig::default();
        config.min_part_size = 8;
        let harness = Harness::new(config);
        harness
            .transport
            .seed_message(
                "MB-LOCAL",
                InboundMessage {
                    id: "M200".into(),
                    chunks: vec![
                        Bytes::from_static(b"AAAAAAAAAA"),
                        Bytes::from_static(b"BBBBB"),
                    ],
                    headers: MessageHeaders {
                        sender: Some("MB-REMOTE".into()),
                        filename: Some("big.bin".into()),
                        ..Default::default()
                    },
                },
            )
            .await;
        let fetcher = harness.fetcher();

        let job = FetchJob::first_chunk("M200", "MB-LOCAL", "exec-fetch");
        let job = fetcher.run(job).await.unwrap();
        assert!(!job.complete);
        assert!(job.upload_id.is_some());
        assert_eq!(job.number_of_chunks, 2);
        assert_eq!(job.next_part_number, 2);
        assert_eq!(
            harness.lock_owner("FetchLock_MB-LOCAL").await.as_deref(),
            Some("exec-fetch")
        );
        assert_eq!(harness.transport.ack_count("MB-LOCAL", "M200").await, 0);

        let job = fetcher.run(job).await.unwrap();
        assert!(job.complete);
        assert_eq!(
            &harness
                .store
                .object_bytes("inbox", "received/MB-LOCAL/big.bin")
                .await
                .unwrap()[..],
            b"AAAAAAAAAABBBBB"
        );
        assert_eq!(harness.store.open_uploads().await, 0);
        assert_eq!(harness.transport.ack_count("MB-LOCAL", "M200").await, 1);
        assert!(harness.lock_owner("FetchLock_MB-LOCAL").await.is_none());
    }

    /// The send lock excludes a second chain while held, tolerates re-acquire
    /// by its own chain, refuses release by a stranger, and frees the
    /// resource for a third chain after release.
    #[tokio::test]
    async fn send_lock_contention_sequence() {
        let harness = Harness::new(RelayConfig::default().with_chunk_sizes(10, 10));
        harness
            .store
            .seed("outbox", "outbound/f.dat", Bytes::from_static(&[0u8; 25]), ObjectInfo::default())
            .await;
        let sender = harness.sender();
        let lock = harness.lock();

        // exec-1 starts the transfer; the lock survives the first step.
        let job1 = harness.send_job("outbound/f.dat", "exec-1").await;
        let lock_name = job1.lock_name.clone();
        let job1 = sender.run(job1).await.unwrap();
        assert!(!job1.complete);
        assert_eq!(harness.lock_owner(&lock_name).await.as_deref(), Some("exec-1"));

        // exec-2 is refused while exec-1's chain is in flight.
        let job2 = harness.send_job("outbound/f.dat", "exec-2").await;
        let err = sender.run(job2).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(harness.lock_owner(&lock_name).await.as_deref(), Some("exec-1"));

        // A stranger cannot release it either.
        assert!(lock.release(&lock_name, "exec-2").await.is_err());
        assert_eq!(harness.lock_owner(&lock_name).await.as_deref(), Some("exec-1"));

        // exec-1 re-acquires idempotently on its next steps and finishes.
        let job1 = sender.run(job1).await.unwrap();
        let job1 = sender.run(job1).await.unwrap();
        assert!(job1.complete);
        assert!(harness.lock_owner(&lock_name).await.is_none());

        // The resource is free for a new chain.
        let job3 = harness.send_job("outbound/f.dat", "exec-3").await;
        let job3 = sender.run(job3).await.unwrap();
        assert!(!job3.complete);
        assert_eq!(harness.lock_owner(&lock_name).await.as_deref(), Some("exec-3"));
    }

    /// Concurrent polls of the same mailbox: one wins, the other observes a
    /// conflict instead of an error.
    #[tokio::test]
    async fn concurrent_polls_yield_one_winner() {
        let harness = Harness::new(RelayConfig::default());
        harness
            .transport
            .seed_message(
                "MB-LOCAL",
                InboundMessage {
                    id: "M300".into(),
                    chunks: vec![Bytes::from_static(b"x")],
                    headers: MessageHeaders::default(),
                },
            )
            .await;
        let poller = harness.poller();

        let mut first = PollRequest::poll("MB-LOCAL");
        first.execution_id = Some("exec-a".into());
        let winner = poller.run(first).await.unwrap();
        assert!(matches!(winner, PollOutcome::Messages { .. }));

        let mut second = PollRequest::poll("MB-LOCAL");
        second.execution_id = Some("exec-b".into());
        let loser = poller.run(second).await.unwrap();
        assert_eq!(
            loser,
            PollOutcome::Conflict {
                lock_name: "FetchLock_MB-LOCAL".into(),
                owner: "exec-a".into(),
            }
        );
    }

    /// Full loop: an object sent through the network arrives byte-identical
    /// when fetched on the other side.
    #[tokio::test]
    async fn outbound_then_inbound_round_trip() {
        let mut config = RelayConfig::default().with_chunk_sizes(16, 16);
        config.min_part_size = 16;
        let harness = Harness::new(config);
        let body: Vec<u8> = (0..=57u8).collect();
        harness
            .store
            .seed("outbox", "outbound/loop.dat", Bytes::from(body.clone()), ObjectInfo::default())
            .await;
        let sender = harness.sender();

        let mut job = harness.send_job("outbound/loop.dat", "exec-out").await;
        while !job.complete {
            job = sender.run(job).await.unwrap();
        }
        let message_id = job.message_id.unwrap();

        // Hand the outbound chunks back as an inbound message for MB-LOCAL.
        let chunks: Vec<Bytes> = harness
            .transport
            .outbound_chunks()
            .await
            .into_iter()
            .map(|c| c.body)
            .collect();
        harness
            .transport
            .seed_message(
                "MB-LOCAL",
                InboundMessage {
                    id: message_id.clone(),
                    chunks,
                    headers: MessageHeaders {
                        sender: Some("MB-REMOTE".into()),
                        filename: Some("loop.dat".into()),
                        ..Default::default()
                    },
                },
            )
            .await;

        let fetcher = harness.fetcher();
        let mut job = FetchJob::first_chunk(message_id, "MB-LOCAL", "exec-in");
        while !job.complete {
            job = fetcher.run(job).await.unwrap();
        }
        assert_eq!(
            &harness
                .store
                .object_bytes("inbox", "received/MB-LOCAL/loop.dat")
                .await
                .unwrap()[..],
            body
        );
    }
}
