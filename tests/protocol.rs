//! End-to-end scenarios exercising a `Client`/`Server` pair together,
//! corresponding to the seed scenarios and invariants of spec §8.

use path_oram_store::config::OramConfig;
use path_oram_store::error::OramError;
use path_oram_store::{Client, Server};
use rand::{rngs::StdRng, SeedableRng};

fn fresh(num_leaves: usize, seed: u64) -> (Server, Client, StdRng, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut config = OramConfig::with_num_leaves(num_leaves);
    config.keys_dir = dir.path().to_path_buf();
    let server = Server::construct(&config, &mut rng).unwrap();
    let client = Client::register(&server, &config, &mut rng).unwrap();
    (server, client, rng, dir)
}

#[test]
fn write_read_update_roundtrip() {
    let (mut server, mut client, mut rng, _dir) = fresh(8, 7);

    client.write(&mut server, "report.txt", "v1", &mut rng).unwrap();
    assert_eq!(
        client.read(&mut server, "report.txt", &mut rng).unwrap(),
        Some("v1".to_string())
    );

    client.write(&mut server, "report.txt", "v2", &mut rng).unwrap();
    assert_eq!(
        client.read(&mut server, "report.txt", &mut rng).unwrap(),
        Some("v2".to_string())
    );
}

#[test]
fn many_files_survive_interleaved_access() {
    let (mut server, mut client, mut rng, _dir) = fresh(16, 11);

    let files: Vec<(String, String)> = (0..10)
        .map(|i| (format!("file-{i}"), format!("payload-{i}")))
        .collect();

    for (name, data) in &files {
        client.write(&mut server, name, data, &mut rng).unwrap();
    }

    for _ in 0..3 {
        for (name, data) in &files {
            assert_eq!(
                client.read(&mut server, name, &mut rng).unwrap(),
                Some(data.clone())
            );
        }
    }
}

#[test]
fn delete_then_read_returns_none_then_rewrite_succeeds() {
    let (mut server, mut client, mut rng, _dir) = fresh(4, 3);

    client.write(&mut server, "secret", "classified", &mut rng).unwrap();
    client.delete(&mut server, "secret", &mut rng).unwrap();
    assert_eq!(client.read(&mut server, "secret", &mut rng).unwrap(), None);

    client.write(&mut server, "secret", "new-data", &mut rng).unwrap();
    assert_eq!(
        client.read(&mut server, "secret", &mut rng).unwrap(),
        Some("new-data".to_string())
    );
}

#[test]
fn unknown_filename_on_read_and_delete_is_not_found() {
    let (mut server, mut client, mut rng, _dir) = fresh(4, 9);

    assert!(matches!(
        client.read(&mut server, "ghost", &mut rng),
        Err(OramError::NotFound { .. })
    ));
    assert!(matches!(
        client.delete(&mut server, "ghost", &mut rng),
        Err(OramError::NotFound { .. })
    ));
}

#[test]
fn two_clients_do_not_share_position_maps() {
    let (mut server, mut alice, mut rng, _dir) = fresh(8, 21);

    let bob_dir = tempfile::tempdir().unwrap();
    let mut bob_config = OramConfig::with_num_leaves(8);
    bob_config.keys_dir = bob_dir.path().to_path_buf();
    let mut bob = Client::register(&server, &bob_config, &mut rng).unwrap();

    alice.write(&mut server, "alice-file", "alice-data", &mut rng).unwrap();
    assert!(matches!(
        bob.read(&mut server, "alice-file", &mut rng),
        Err(OramError::NotFound { .. })
    ));
}

#[test]
fn debug_disable_encryption_still_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let mut config = OramConfig::with_num_leaves(4);
    config.keys_dir = dir.path().to_path_buf();
    config.debug_disable_encryption = true;

    let mut server = Server::construct(&config, &mut rng).unwrap();
    let mut client = Client::register(&server, &config, &mut rng).unwrap();

    client.write(&mut server, "plain", "visible", &mut rng).unwrap();
    assert_eq!(
        client.read(&mut server, "plain", &mut rng).unwrap(),
        Some("visible".to_string())
    );
}
