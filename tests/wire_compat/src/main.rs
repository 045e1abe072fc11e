fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use atvlink_device_connection::{DeviceConfig, GENERIC_REJECTION, PairingError};
    use atvlink_protocol::{
        BackendKind, Credential, DeviceSummary, NativeCredential, PairResponse,
        PlaybackQueueRequest,
    };

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

    /// Deserializes a fixture, re-serializes it, and compares the JSON values.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  Rust:    {reserialized}"
        );
        parsed
    }

    // --- Relay shapes ---

    #[test]
    fn fixture_pair_response_token() {
        let response = roundtrip_test::<PairResponse>("pair_response_token.json");
        let PairResponse::Token { token } = response else {
            panic!("expected token variant");
        };
        let credential: NativeCredential = token.parse().unwrap();
        assert_eq!(credential.unique_identifier(), "A1B2-C3D4");
        assert_eq!(credential.to_string(), token);
    }

    #[test]
    fn fixture_pair_response_error() {
        let response = roundtrip_test::<PairResponse>("pair_response_error.json");
        let expected: PairResponse =
            Err::<String, _>(PairingError::Rejected(GENERIC_REJECTION.into())).into();
        assert_eq!(response, expected);
    }

    #[test]
    fn fixture_device_list() {
        let devices = roundtrip_test::<Vec<DeviceSummary>>("device_list.json");
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "Living Room");
        assert_eq!(devices[1].uid, "E5F6-0718");
    }

    #[test]
    fn fixture_playback_queue_request() {
        let request = roundtrip_test::<PlaybackQueueRequest>("playback_queue_request.json");
        assert_eq!(request, PlaybackQueueRequest::default());
    }

    // --- Configuration ---

    #[test]
    fn fixture_device_config_native() {
        let config = roundtrip_test::<DeviceConfig>("device_config_native.json");
        assert_eq!(config.backend, BackendKind::Native);
        assert!(matches!(
            config.credential().unwrap(),
            Some(Credential::Native(_))
        ));
        assert_eq!(config.device_ref().unwrap().label(), "A1B2-C3D4");
    }

    #[test]
    fn fixture_device_config_poll() {
        let config = roundtrip_test::<DeviceConfig>("device_config_poll.json");
        assert_eq!(config.backend, BackendKind::Poll);
        assert_eq!(config.manager_config().reconnect.max_attempts, Some(10));
        assert!(config.manager_config().debug);
        let Some(Credential::Poll(credential)) = config.credential().unwrap() else {
            panic!("expected poll credential");
        };
        assert_eq!(credential.airplay.as_deref(), Some("airplay-credential"));
        assert_eq!(config.device_ref().unwrap().label(), "Bedroom (192.168.1.40)");
    }
}
