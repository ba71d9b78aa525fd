#![allow(missing_docs)]

use snake_es::simulation::brain::{AppleBias, Policy};
use snake_es::simulation::checkpoint::{self, CheckpointError};
use snake_es::simulation::params::MAX_HIDDEN_SIZE;
use snake_es::simulation::rng::RandomStream;
use std::fs;

fn create_test_policy() -> Policy {
    let mut rng = RandomStream::new(2024);
    Policy::new_random(4, 8, AppleBias::Additive, 0.5, &mut rng)
}

fn encode(policy: &Policy) -> Vec<u8> {
    let mut bytes = Vec::new();
    checkpoint::write_policy(policy, &mut bytes).unwrap();
    bytes
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.bin");
    let policy = create_test_policy();

    checkpoint::save(&policy, &path).unwrap();
    let loaded = checkpoint::load(&path, AppleBias::Additive).unwrap();

    assert_eq!(loaded.size(), 4);
    assert_eq!(loaded.hidden_size(), 8);
    let saved_bits: Vec<u32> = policy.weights().iter().map(|w| w.to_bits()).collect();
    let loaded_bits: Vec<u32> = loaded.weights().iter().map(|w| w.to_bits()).collect();
    assert_eq!(saved_bits, loaded_bits);

    // No temporary file is left behind.
    let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_save_replaces_existing_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.bin");

    checkpoint::save(&Policy::new(4, 8, AppleBias::Additive), &path).unwrap();
    let policy = create_test_policy();
    checkpoint::save(&policy, &path).unwrap();

    let loaded = checkpoint::load_expecting(&path, 4, 8, AppleBias::Additive).unwrap();
    assert_eq!(loaded.weights(), policy.weights());
}

#[test]
fn test_layout() {
    let policy = create_test_policy();
    let bytes = encode(&policy);

    assert_eq!(bytes.len(), 8 + 4 * policy.num_params());
    assert_eq!(&bytes[0..4], &4_i32.to_le_bytes());
    assert_eq!(&bytes[4..8], &8_i32.to_le_bytes());

    // First W0 entry follows the header, first W2 entry follows both cells × hidden blocks.
    let w0_first = policy.weights().w0.get(0, 0);
    assert_eq!(&bytes[8..12], &w0_first.to_le_bytes());
    let w2_offset = 8 + 4 * (2 * 16 * 8);
    let w2_first = policy.weights().w2.get(0, 0);
    assert_eq!(&bytes[w2_offset..w2_offset + 4], &w2_first.to_le_bytes());
}

#[test]
fn test_shape_mismatch() {
    let bytes = encode(&create_test_policy());
    let err = checkpoint::read_policy_expecting(&bytes[..], 4, 16, AppleBias::Additive)
        .unwrap_err();
    assert!(matches!(
        err,
        CheckpointError::ShapeMismatch {
            expected_size: 4,
            expected_hidden: 16,
            size: 4,
            hidden_size: 8,
        }
    ));
}

#[test]
fn test_truncated_file_is_io_error() {
    let bytes = encode(&create_test_policy());
    for cut in [0, 3, 8, bytes.len() - 1] {
        let err = checkpoint::read_policy(&bytes[..cut], AppleBias::Additive).unwrap_err();
        assert!(matches!(err, CheckpointError::Io(_)), "cut at {cut}: {err}");
    }
}

#[test]
fn test_trailing_bytes_rejected() {
    let mut bytes = encode(&create_test_policy());
    bytes.push(0);
    let err = checkpoint::read_policy(&bytes[..], AppleBias::Additive).unwrap_err();
    assert!(matches!(err, CheckpointError::TrailingBytes));
}

#[test]
fn test_invalid_header_rejected() {
    let cases = [
        (-1_i32, 8_i32),
        (1, 8),
        (16, 8),
        (4, 0),
        (4, -3),
        (4, 100_000),
        (4, i32::MAX),
        (i32::MAX, i32::MAX),
    ];
    for (size, hidden) in cases {
        let mut bytes = size.to_le_bytes().to_vec();
        bytes.extend_from_slice(&hidden.to_le_bytes());
        let err = checkpoint::read_policy(&bytes[..], AppleBias::Additive).unwrap_err();
        assert!(
            matches!(err, CheckpointError::InvalidHeader { .. }),
            "({size}, {hidden}) gave {err}"
        );
    }
}

#[test]
fn test_large_header_without_body_is_io_error() {
    // A plausible header whose weights never arrive must fail on the first
    // missing value rather than reserve room for the declared shape.
    let mut bytes = 15_i32.to_le_bytes().to_vec();
    bytes.extend_from_slice(&(MAX_HIDDEN_SIZE as i32).to_le_bytes());
    bytes.extend_from_slice(&1.0_f32.to_le_bytes());
    let err = checkpoint::read_policy(&bytes[..], AppleBias::Additive).unwrap_err();
    assert!(matches!(err, CheckpointError::Io(_)), "{err}");
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = checkpoint::load(dir.path().join("missing.bin"), AppleBias::Additive).unwrap_err();
    assert!(matches!(err, CheckpointError::Io(_)));
}
