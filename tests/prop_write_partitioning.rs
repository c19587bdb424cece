//! Property: the partition of a byte stream into write calls never changes
//! the uploaded parts. For any content and any split points, the parts are
//! numbered 1..=ceil(len / part_size), every part except the last is
//! exactly part_size bytes, and their concatenation is the content.

mod common;

use common::{collect_parts, mount_part_sink, test_config, RecordingApi};
use proptest::prelude::*;
use remotefile::{FileState, RemoteFile};
use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::MockServer;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    #[test]
    fn prop_partition_independence(
        content in prop::collection::vec(any::<u8>(), 0..=600),
        part_size in 1usize..=64,
        mut splits in prop::collection::vec(0usize..=600, 0..5),
    ) {
        let rt = Runtime::new().unwrap();
        let result: Result<(), TestCaseError> = rt.block_on(async {
            let server = MockServer::start().await;
            mount_part_sink(&server).await;
            let api = RecordingApi::new(&server.uri(), -1, FileState::Open);

            let mut file = RemoteFile::create(
                api.clone(),
                test_config(part_size),
                "",
                json!({}),
            )
            .await
            .unwrap();

            // Cut the content at the (clamped, sorted) split points
            splits.iter_mut().for_each(|s| *s = (*s).min(content.len()));
            splits.sort_unstable();
            let mut previous = 0;
            for split in splits.iter().copied().chain(std::iter::once(content.len())) {
                file.write(&content[previous..split]).await.unwrap();
                previous = split;
            }
            file.close(true).await.unwrap();

            let parts = collect_parts(&server, file.id()).await;
            let expected_count = content.len().div_ceil(part_size);
            prop_assert_eq!(parts.len(), expected_count);

            let indices: Vec<u32> = parts.keys().copied().collect();
            prop_assert_eq!(indices, (1..=expected_count as u32).collect::<Vec<_>>());

            let mut reassembled = Vec::new();
            for (index, body) in &parts {
                if (*index as usize) < expected_count {
                    prop_assert_eq!(body.len(), part_size);
                } else {
                    prop_assert!(body.len() <= part_size);
                    prop_assert!(!body.is_empty());
                }
                reassembled.extend_from_slice(body);
            }
            prop_assert_eq!(reassembled, content);
            Ok(())
        });
        result?;
    }
}
