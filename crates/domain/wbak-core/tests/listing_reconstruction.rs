use serde_json::json;
use wbak_core::{
    restore_pipeline, ItemStatus, ListingError, PersistedListing, PipelineState, ResourceType,
};

fn listing() -> PersistedListing {
    let value = json!({
        "20190302090000_zz99": {
            "user": "u2",
            "password": "abcdef0",
            "files": []
        },
        "20190301123005_ab12": {
            "user": "u1",
            "password": "5cdc092",
            "files": [
                ["data/20190301123005_ab12/EnMicroMsg.db", 1048576],
                ["data/20190301123005_ab12/DeMicroMsg.db", 2097152]
            ]
        }
    });
    PersistedListing::from_value(value).unwrap()
}

#[test]
fn names_come_back_sorted() {
    assert_eq!(
        listing().names(),
        vec!["20190301123005_ab12", "20190302090000_zz99"]
    );
}

#[test]
fn files_advance_the_pipeline() {
    let listing = listing();
    let entry = &listing.projects["20190301123005_ab12"];
    let p = restore_pipeline("20190301123005_ab12", entry).unwrap();

    assert_eq!(p.state(), PipelineState::Decrypted);
    assert_eq!(p.project().password, "5cdc092");
    assert_eq!(
        p.item(ResourceType::EncryptedDb).byte_total,
        1_048_576
    );
    assert_eq!(p.item(ResourceType::DecryptedDb).file_name, "DeMicroMsg.db");
    assert_eq!(
        p.item(ResourceType::DecryptedDb).status(),
        ItemStatus::Done
    );
    assert_eq!(
        p.item(ResourceType::ResourceArchive).status(),
        ItemStatus::Queued
    );
}

#[test]
fn empty_project_waits() {
    let listing = listing();
    let p = restore_pipeline("20190302090000_zz99", &listing.projects["20190302090000_zz99"])
        .unwrap();
    assert_eq!(p.state(), PipelineState::Waiting);
}

#[test]
fn restore_is_idempotent_and_order_independent() {
    let forward = listing();
    let entry = &forward.projects["20190301123005_ab12"];
    let a = restore_pipeline("20190301123005_ab12", entry).unwrap();
    let b = restore_pipeline("20190301123005_ab12", entry).unwrap();
    assert_eq!(a.state(), b.state());

    let mut reversed = entry.clone();
    reversed.files.reverse();
    let c = restore_pipeline("20190301123005_ab12", &reversed).unwrap();
    // a later DeMicroMsg.db listing must not be undone by EnMicroMsg.db
    assert_eq!(c.state(), PipelineState::Decrypted);
}

#[test]
fn malformed_entries_and_files_are_skipped() {
    let value = json!({
        "20190301123005_ab12": {
            "user": "u1",
            "password": "p",
            "files": [
                ["data/x/EnMicroMsg.db", 10],
                ["data/x/notes.txt", 5],
                ["missing size"],
                42
            ]
        },
        "20190301123006_cd34": "not an object"
    });
    let listing = PersistedListing::from_value(value).unwrap();
    assert_eq!(listing.names(), vec!["20190301123005_ab12"]);
    assert_eq!(listing.skipped, 3);

    let entry = &listing.projects["20190301123005_ab12"];
    assert_eq!(entry.files.len(), 2);
    let p = restore_pipeline("20190301123005_ab12", entry).unwrap();
    // notes.txt has no known prefix and is ignored
    assert_eq!(p.state(), PipelineState::DbPulled);
}

#[test]
fn string_encoded_listing_is_accepted() {
    let encoded = json!("{\"20190301123005_ab12\": {\"user\": \"u\", \"password\": \"p\", \"files\": []}}");
    let listing = PersistedListing::from_value(encoded).unwrap();
    assert_eq!(listing.projects.len(), 1);
}

#[test]
fn non_object_listing_is_an_error() {
    assert!(matches!(
        PersistedListing::from_value(json!([1, 2])),
        Err(ListingError::NotAnObject)
    ));
    assert!(matches!(
        PersistedListing::from_json_str("{"),
        Err(ListingError::Json(_))
    ));
}

#[test]
fn bad_project_names_are_refused() {
    let listing = listing();
    let entry = &listing.projects["20190301123005_ab12"];
    assert!(restore_pipeline("not-a-project", entry).is_err());
}
