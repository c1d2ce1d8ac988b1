use api_lib::adapters::LocalObjectStorage;
use bytes::Bytes;
use learning_space_core::ports::{ObjectStorage, PortError};

#[tokio::test]
async fn put_writes_below_root_and_returns_public_url() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalObjectStorage::new(dir.path(), "http://localhost:3000/files/");

    let stored = storage
        .put("sources/user_1/abc/notes.pdf", "application/pdf", Bytes::from_static(b"%PDF-1.7"))
        .await
        .unwrap();

    assert_eq!(stored.public_url, "http://localhost:3000/files/sources/user_1/abc/notes.pdf");
    let written = std::fs::read(dir.path().join("sources/user_1/abc/notes.pdf")).unwrap();
    assert_eq!(written, b"%PDF-1.7");
}

#[tokio::test]
async fn paths_escaping_the_root_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalObjectStorage::new(dir.path(), "http://localhost:3000/files");

    for path in ["../outside.pdf", "/etc/passwd", ""] {
        let err = storage
            .put(path, "application/pdf", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)), "{}", path);
    }
}
