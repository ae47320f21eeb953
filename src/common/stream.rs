//! Streaming message types shared by the three roles

use crate::common::Result;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

/// Ordered blob bytes, one item per chunk.
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// Client upload: blob info first, then the raw chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadMessage {
    Info { size_bytes: u64 },
    Chunk(Bytes),
}

pub type UploadStream = BoxStream<'static, Result<UploadMessage>>;

/// Worker save: the claimed content hash first, then the raw chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveBlobMessage {
    Hash(String),
    Chunk(Bytes),
}

pub type SaveBlobStream = BoxStream<'static, Result<SaveBlobMessage>>;

/// Prefix `chunks` with the leading hash message of a save stream.
pub fn save_blob_stream(hash: String, chunks: ChunkStream) -> SaveBlobStream {
    futures_util::stream::once(async move { Ok(SaveBlobMessage::Hash(hash)) })
        .chain(chunks.map(|chunk| chunk.map(SaveBlobMessage::Chunk)))
        .boxed()
}

/// Prefix `chunks` with the leading info message of an upload stream.
pub fn upload_stream(size_bytes: u64, chunks: ChunkStream) -> UploadStream {
    futures_util::stream::once(async move { Ok(UploadMessage::Info { size_bytes }) })
        .chain(chunks.map(|chunk| chunk.map(UploadMessage::Chunk)))
        .boxed()
}

/// In-memory chunk stream, mostly for callers that already hold the bytes.
pub fn chunks_from_vec(chunks: Vec<Bytes>) -> ChunkStream {
    futures_util::stream::iter(chunks.into_iter().map(Ok)).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_stream_leads_with_hash() {
        let chunks = chunks_from_vec(vec![Bytes::from_static(b"AB"), Bytes::from_static(b"C")]);
        let messages: Vec<_> = save_blob_stream("h".into(), chunks)
            .map(|m| m.unwrap())
            .collect()
            .await;
        assert_eq!(
            messages,
            vec![
                SaveBlobMessage::Hash("h".into()),
                SaveBlobMessage::Chunk(Bytes::from_static(b"AB")),
                SaveBlobMessage::Chunk(Bytes::from_static(b"C")),
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_stream_leads_with_info() {
        let mut messages = upload_stream(0, chunks_from_vec(vec![]));
        assert_eq!(
            messages.next().await.unwrap().unwrap(),
            UploadMessage::Info { size_bytes: 0 }
        );
        assert!(messages.next().await.is_none());
    }
}
