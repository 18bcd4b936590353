mod common;

use rand::SeedableRng;
use rand::rngs::StdRng;

#[test]
fn test_generate_simple_replay() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("simple.csv");
    common::write_commands(
        &output_path,
        &[
            ["register", "bob", "", "", "", "", "", "video", "", ""],
            ["subscribe", "alice", "", "1", "10", "30", "bob", "", "", ""],
        ],
    )
    .expect("Failed to generate CSV");

    let content = std::fs::read_to_string(&output_path).expect("Failed to read file");
    // Header + 2 rows = 3 lines
    assert_eq!(content.lines().count(), 3);
    assert!(content.starts_with("type,caller,at,target"));
}

#[test]
fn test_generate_settlement_replay_shape() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("settlements.csv");
    let mut rng = StdRng::seed_from_u64(7);
    common::generate_settlement_replay(&output_path, 5, 200, &mut rng)
        .expect("Failed to generate CSV");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(&output_path)
        .expect("Failed to open CSV");

    let mut last_at = 0u64;
    let mut settles = 0;
    let mut subscribes = 0;
    for result in reader.records() {
        let record = result.expect("Failed to read record");
        match &record[0] {
            "subscribe" => subscribes += 1,
            "settle" => {
                settles += 1;
                let at: u64 = record[2].parse().expect("Failed to parse tick");
                assert!(at >= last_at, "ticks must never go backwards");
                last_at = at;
                let target: usize = record[3].parse().expect("Failed to parse target");
                assert!((1..=5).contains(&target));
            }
            _ => {}
        }
    }

    assert_eq!(subscribes, 5);
    assert_eq!(settles, 200);
}
