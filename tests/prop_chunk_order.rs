//! Property: a linear query delivers the queried byte range exactly, in
//! offset order, for any chunk size, worker count, and reorder capacity.

mod common;

use common::{mount_range_responder, test_config, RecordingApi};
use proptest::prelude::*;
use remotefile::{FileState, RemoteFile};
use tokio::runtime::Runtime;
use wiremock::MockServer;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    #[test]
    fn prop_ordered_delivery(
        content in prop::collection::vec(any::<u8>(), 1..=1200),
        chunk_size in 1u64..=257,
        worker_count in 1usize..=4,
        max_chunks in 1usize..=3,
    ) {
        let rt = Runtime::new().unwrap();
        let result: Result<(), TestCaseError> = rt.block_on(async {
            let server = MockServer::start().await;
            // Stagger response latency by range so completion order varies
            let delays: Vec<(u64, u64)> = (0..content.len() as u64)
                .step_by(chunk_size as usize)
                .map(|start| (start, (start / chunk_size) % 3 * 3))
                .collect();
            mount_range_responder(&server, content.clone(), delays, None).await;
            let api = RecordingApi::new(&server.uri(), content.len() as i64, FileState::Closed);

            let mut file =
                RemoteFile::open(api, test_config(1 << 20), "file-0001").unwrap();
            file.start_linear_query(None, None, chunk_size, max_chunks, worker_count)
                .await
                .unwrap();

            let mut reassembled = Vec::new();
            while let Some(chunk) = file.next_chunk().await.unwrap() {
                // Every chunk is full-sized except possibly the final one
                let remaining = content.len() - reassembled.len();
                prop_assert_eq!(
                    chunk.len() as u64,
                    chunk_size.min(remaining as u64)
                );
                reassembled.extend_from_slice(&chunk);
            }
            file.stop_linear_query().await;

            prop_assert_eq!(reassembled, content);
            Ok(())
        });
        result?;
    }
}
