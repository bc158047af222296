// The workspace copy of the sample fixture must stay identical to the embedded one.

use encargo_listings::{default_fixture_path, load_fixture_bundle, sample_bundle};

#[test]
fn workspace_fixture_matches_embedded_sample() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let path = default_fixture_path(&root);
    assert!(path.exists());

    let on_disk = load_fixture_bundle(&path).unwrap();
    let embedded = sample_bundle().unwrap();
    assert_eq!(on_disk.fixture_id, "sample");
    assert_eq!(on_disk.listings, embedded.listings);

    let ids: Vec<u32> = on_disk.listings.iter().map(|l| l.id.0).collect();
    assert_eq!(ids, (1..=10).collect::<Vec<_>>());
}
