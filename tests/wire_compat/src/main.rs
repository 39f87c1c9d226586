fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use cinevision_protocol::{
        AbortMultipartRequest, CompleteMultipartRequest, CompleteMultipartResponse,
        InitiateMultipartRequest, InitiateMultipartResponse, PresignedUrlRequest,
        PresignedUrlResponse, ProgressSnapshot,
    };
    use cinevision_uploader::ResumeState;

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes numbers so that `65` and `65.0` compare as equal.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent, number-normalized comparison).
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  API:  {fixture}\n  Rust: {reserialized}"
        );
    }

    // --- Control-plane requests ---

    #[test]
    fn fixture_initiate_multipart_request() {
        roundtrip_test::<InitiateMultipartRequest>("initiate_multipart_request.json");
    }

    #[test]
    fn fixture_presigned_url_request() {
        roundtrip_test::<PresignedUrlRequest>("presigned_url_request.json");
    }

    #[test]
    fn fixture_complete_multipart_request() {
        roundtrip_test::<CompleteMultipartRequest>("complete_multipart_request.json");
    }

    #[test]
    fn fixture_abort_multipart_request() {
        roundtrip_test::<AbortMultipartRequest>("abort_multipart_request.json");
    }

    // --- Control-plane responses ---

    #[test]
    fn fixture_initiate_multipart_response() {
        roundtrip_test::<InitiateMultipartResponse>("initiate_multipart_response.json");
    }

    #[test]
    fn fixture_presigned_url_response() {
        roundtrip_test::<PresignedUrlResponse>("presigned_url_response.json");
    }

    #[test]
    fn fixture_complete_multipart_response() {
        roundtrip_test::<CompleteMultipartResponse>("complete_multipart_response.json");
    }

    #[test]
    fn initiate_response_without_urls() {
        let json = load_fixture("initiate_multipart_response_lazy.json");
        let resp: InitiateMultipartResponse = serde_json::from_value(json).unwrap();
        assert_eq!(resp.upload_id, "2~p1XfQ8vYb3");
        assert!(
            resp.presigned_urls.is_empty(),
            "missing URL list should default to empty"
        );
        assert_eq!(resp.total_parts, Some(24));
        assert_eq!(
            resp.object_key(),
            Some("videos/8d1f2c3a/1733412345678-legendado.mkv")
        );
    }

    #[test]
    fn initiate_response_url_per_part() {
        let json = load_fixture("initiate_multipart_response.json");
        let resp: InitiateMultipartResponse = serde_json::from_value(json).unwrap();
        assert_eq!(resp.presigned_urls.len(), 2);
        assert!(resp.presigned_urls[1].contains("partNumber=2"));
        assert!(resp.total_parts.is_none());
    }

    #[test]
    fn legacy_complete_response_without_success_flag() {
        let json = load_fixture("complete_multipart_response_legacy.json");
        let resp: CompleteMultipartResponse = serde_json::from_value(json).unwrap();
        assert!(resp.success, "missing success should default to true");
        assert_eq!(
            resp.object_url(),
            Some("https://cdn.example/videos/8d1f2c3a/1733412345678-A_Hora_do_Mal_2025_Dublado.mp4")
        );
        assert_eq!(
            resp.file_name.as_deref(),
            Some("A Hora do Mal (2025) Dublado.mp4")
        );
    }

    #[test]
    fn complete_request_part_keys() {
        let json = load_fixture("complete_multipart_request.json");
        let req: CompleteMultipartRequest = serde_json::from_value(json).unwrap();
        let numbers: Vec<u32> = req.parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let out = serde_json::to_value(&req).unwrap();
        assert!(out["parts"][0].get("PartNumber").is_some());
        assert!(out["parts"][0].get("ETag").is_some());
    }

    // --- Client-side state ---

    #[test]
    fn fixture_progress_snapshot() {
        roundtrip_test::<ProgressSnapshot>("progress_snapshot.json");
    }

    #[test]
    fn fixture_resume_state() {
        roundtrip_test::<ResumeState>("resume_state.json");
    }
}
