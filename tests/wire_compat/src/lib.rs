//! Wire-format stability tests.
//!
//! The JSON surface (field names, enum strings, envelope shape) and the
//! binary chunk frame are a contract with every deployed client. These
//! tests pin them: a change that breaks one of these assertions breaks
//! live couriers.

#[cfg(test)]
mod tests {
    use chunkferry_protocol::MessageType;
    use chunkferry_protocol::envelope::Message;
    use chunkferry_protocol::messages::{
        ChunkResponse, MergeRequest, MergeResponse, UploadChunkRequest, UploadProgressEvent,
        VerifyRequest, VerifyResponse,
    };
    use chunkferry_protocol::types::{ChunkStatus, ContentHash, MergeStatus};
    use chunkferry_server::{ChunkFrameHeader, encode_chunk_frame, parse_chunk_frame};

    const HASH: &str = "a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3";

    fn hash() -> ContentHash {
        ContentHash::new(HASH).unwrap()
    }

    #[test]
    fn message_type_strings_are_stable() {
        let cases = [
            (MessageType::Ping, "ping"),
            (MessageType::Pong, "pong"),
            (MessageType::Verify, "verify"),
            (MessageType::VerifyResponse, "verify_response"),
            (MessageType::UploadChunk, "upload_chunk"),
            (MessageType::ChunkResponse, "chunk_response"),
            (MessageType::Merge, "merge"),
            (MessageType::MergeResponse, "merge_response"),
            (MessageType::UploadProgress, "upload_progress"),
            (MessageType::Error, "error"),
        ];
        for (msg_type, expected) in cases {
            let json = serde_json::to_string(&msg_type).unwrap();
            assert_eq!(json, format!("\"{expected}\""), "for {msg_type:?}");
        }
    }

    #[test]
    fn envelope_shape_is_stable() {
        let req = VerifyRequest {
            filename: "f.bin".into(),
            content_hash: hash(),
        };
        let msg = Message::new("id-1", MessageType::Verify, Some(&req)).unwrap();
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["id"], "id-1");
        assert_eq!(value["type"], "verify");
        assert_eq!(value["payload"]["filename"], "f.bin");
        assert_eq!(value["payload"]["contentHash"], HASH);
        // Absent error must be omitted entirely, not null.
        assert!(value.get("error").is_none());
    }

    #[test]
    fn error_envelope_shape_is_stable() {
        let msg = Message::error("id-2", 400, "bad request");
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"]["code"], 400);
        assert_eq!(value["error"]["message"], "bad request");
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn verify_response_field_names() {
        let resp = VerifyResponse {
            is_uploaded: false,
            uploaded_list: vec![0, 3, 7],
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["isUploaded"], false);
        assert_eq!(value["uploadedList"], serde_json::json!([0, 3, 7]));
    }

    #[test]
    fn chunk_request_uses_base64_data() {
        let req = UploadChunkRequest {
            content_hash: hash(),
            index: 2,
            filename: "f.bin".into(),
            data: b"\x00\xff".to_vec(),
            checksum: String::new(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["contentHash"], HASH);
        assert_eq!(value["index"], 2);
        assert_eq!(value["data"], "AP8=");
    }

    #[test]
    fn chunk_status_strings() {
        for (status, expected) in [
            (ChunkStatus::Ok, "ok"),
            (ChunkStatus::AlreadyExists, "alreadyExists"),
            (ChunkStatus::FileComplete, "fileComplete"),
        ] {
            let resp = ChunkResponse { status };
            let value = serde_json::to_value(&resp).unwrap();
            assert_eq!(value["status"], expected);
        }
    }

    #[test]
    fn merge_request_and_response_field_names() {
        let req = MergeRequest {
            filename: "f.bin".into(),
            content_hash: hash(),
            chunk_size: 4096,
            total_chunks: 11,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["chunkSize"], 4096);
        assert_eq!(value["totalChunks"], 11);

        let resp = MergeResponse {
            status: MergeStatus::Incomplete,
            message: "3 chunk(s) missing".into(),
            missing: vec![1, 2, 9],
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["status"], "incomplete");
        assert_eq!(value["missing"], serde_json::json!([1, 2, 9]));
    }

    #[test]
    fn progress_event_field_names() {
        let event = UploadProgressEvent {
            content_hash: hash(),
            index: 5,
            stored_count: 6,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["contentHash"], HASH);
        assert_eq!(value["index"], 5);
        assert_eq!(value["storedCount"], 6);
    }

    #[test]
    fn binary_frame_layout_is_stable() {
        let header = ChunkFrameHeader {
            id: "req-9".into(),
            content_hash: hash(),
            index: 4,
            filename: "f.bin".into(),
            checksum: String::new(),
        };
        let payload = b"\x01\x02\x03";
        let frame = encode_chunk_frame(&header, payload).unwrap();

        // 4-byte big-endian header length prefix.
        let header_len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(frame.len(), 4 + header_len + payload.len());

        // Header is camelCase JSON.
        let value: serde_json::Value = serde_json::from_slice(&frame[4..4 + header_len]).unwrap();
        assert_eq!(value["id"], "req-9");
        assert_eq!(value["contentHash"], HASH);
        assert_eq!(value["index"], 4);
        // Empty checksum is omitted.
        assert!(value.get("checksum").is_none());

        // Payload is the raw tail.
        assert_eq!(&frame[4 + header_len..], payload);

        // And the depot-side parser agrees.
        let (parsed, data) = parse_chunk_frame(&frame).unwrap();
        assert_eq!(parsed.index, 4);
        assert_eq!(data, payload);
    }

    #[test]
    fn message_parses_from_node_era_client_json() {
        // A verify request exactly as the original HTTP client would have
        // produced it (camelCase fields, string hash).
        let raw = format!(
            r#"{{"id":"abc","type":"verify","payload":{{"filename":"movie.mp4","contentHash":"{HASH}"}}}}"#
        );
        let msg: Message = serde_json::from_str(&raw).unwrap();
        assert_eq!(msg.msg_type, MessageType::Verify);
        let req: VerifyRequest = msg.parse_payload().unwrap().unwrap();
        assert_eq!(req.filename, "movie.mp4");
        assert_eq!(req.content_hash.as_str(), HASH);
    }
}
