//! # Streaming Backpressure
//!
//! One test per policy, plus session framing across a callback subscriber.

#[cfg(test)]
mod tests {
    use crate::support::{eventually, within};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use relay_stream::{
        BackpressurePolicy, StreamError, StreamItem, StreamReceiver, StreamSubscriber,
        StreamingChannel, SubscriberConfig,
    };
    use relay_types::{AudioChunk, BoxError, SampleFormat, StreamMetadata};
    use std::sync::Arc;
    use std::time::Duration;

    fn chunk(sequence: u64, data: &'static [u8]) -> AudioChunk {
        AudioChunk::new(sequence, Bytes::from_static(data))
    }

    fn drain_chunks(receiver: &mut StreamReceiver) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(item) = receiver.try_recv() {
            if let StreamItem::Chunk(chunk) = item {
                out.push(chunk.data);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_newest_window() {
        let channel = StreamingChannel::new();
        let mut receiver = channel
            .subscribe_queue("lagging", SubscriberConfig::new(2, BackpressurePolicy::DropOldest))
            .unwrap();

        for (seq, data) in [(0, b"A"), (1, b"B"), (2, b"C")] {
            assert_eq!(channel.publish(chunk(seq, data)).await.unwrap(), 1);
        }

        assert_eq!(drain_chunks(&mut receiver), vec![&b"B"[..], &b"C"[..]]);
        let stats = channel.stats("lagging").unwrap();
        assert_eq!(stats.dropped, 1);
    }

    #[tokio::test]
    async fn test_drop_newest_keeps_oldest_window() {
        let channel = StreamingChannel::new();
        let mut receiver = channel
            .subscribe_queue("lagging", SubscriberConfig::new(2, BackpressurePolicy::DropNewest))
            .unwrap();

        channel.publish(chunk(0, b"A")).await.unwrap();
        channel.publish(chunk(1, b"B")).await.unwrap();
        assert_eq!(channel.publish(chunk(2, b"C")).await.unwrap(), 0);

        assert_eq!(drain_chunks(&mut receiver), vec![&b"A"[..], &b"B"[..]]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_block_suspends_publisher_until_consumed() {
        let channel = Arc::new(StreamingChannel::new());
        let mut receiver = channel
            .subscribe_queue("player", SubscriberConfig::new(1, BackpressurePolicy::Block))
            .unwrap();

        channel.publish(chunk(0, b"first")).await.unwrap();

        let publisher = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.publish(chunk(1, b"second")).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!publisher.is_finished());

        let first = within(receiver.recv_chunk()).await.unwrap();
        assert_eq!(first.data, Bytes::from_static(b"first"));

        let delivered = within(publisher).await.unwrap().unwrap();
        assert_eq!(delivered, 1);

        let second = within(receiver.recv_chunk()).await.unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(second.data, Bytes::from_static(b"second"));
        assert_eq!(channel.stats("player").unwrap().blocked, 1);
    }

    #[tokio::test]
    async fn test_fail_fast_names_full_subscriber_and_serves_others() {
        let channel = StreamingChannel::new();
        let _strict = channel
            .subscribe_queue("strict", SubscriberConfig::new(1, BackpressurePolicy::FailFast))
            .unwrap();
        let mut relaxed = channel
            .subscribe_queue("relaxed", SubscriberConfig::new(8, BackpressurePolicy::DropNewest))
            .unwrap();

        channel.publish(chunk(0, b"A")).await.unwrap();
        match channel.publish(chunk(1, b"B")).await {
            Err(StreamError::Overflow(err)) => {
                assert_eq!(err.sequence, 1);
                assert_eq!(err.subscribers, vec!["strict".to_string()]);
            }
            other => panic!("expected overflow, got {other:?}"),
        }

        assert_eq!(drain_chunks(&mut relaxed), vec![&b"A"[..], &b"B"[..]]);
        assert_eq!(channel.stats("strict").unwrap().overflowed, 1);
    }

    #[derive(Default)]
    struct Framing {
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StreamSubscriber for Framing {
        async fn on_start(&self, _metadata: &StreamMetadata) -> Result<(), BoxError> {
            self.log.lock().push("start".to_string());
            Ok(())
        }

        async fn on_chunk(&self, chunk: AudioChunk) -> Result<(), BoxError> {
            self.log.lock().push(format!("chunk{}", chunk.sequence));
            Ok(())
        }

        async fn on_end(&self, _metadata: &StreamMetadata) -> Result<(), BoxError> {
            self.log.lock().push("end".to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_callback_subscriber_sees_framed_session() {
        let channel = StreamingChannel::new();
        let framing = Arc::new(Framing::default());
        channel
            .subscribe("framing", framing.clone(), SubscriberConfig::new(4, BackpressurePolicy::Block))
            .unwrap();

        let meta = StreamMetadata::new(16_000, 1, SampleFormat::S16Le);
        channel.notify_start(&meta).unwrap();
        channel.publish(chunk(0, b"\x00\x01")).await.unwrap();
        channel.publish(chunk(1, b"\x02\x03")).await.unwrap();
        channel.notify_end(&meta).unwrap();

        eventually(|| framing.log.lock().len() == 4).await;
        assert_eq!(*framing.log.lock(), vec!["start", "chunk0", "chunk1", "end"]);

        assert!(channel.close(Duration::from_secs(1)).await);
        assert!(matches!(
            channel.publish(chunk(2, b"\x04\x05")).await,
            Err(StreamError::Closed)
        ));
    }
}
