use super::*;

fn touch(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).expect("write test file");
}

#[test]
fn discovery_finds_a_localhost_pair() {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(dir.path(), "localhost.pem", "cert");
    touch(dir.path(), "localhost-key.pem", "key");

    let pair = find_cert_files(dir.path()).expect("pair should be found");
    assert!(pair.cert.ends_with("localhost.pem"));
    assert!(pair.key.ends_with("localhost-key.pem"));
}

#[test]
fn discovery_ignores_non_localhost_pems() {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(dir.path(), "example.pem", "cert");
    touch(dir.path(), "example-key.pem", "key");

    assert!(find_cert_files(dir.path()).is_none());
}

#[test]
fn discovery_requires_a_complete_pair() {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(dir.path(), "localhost.pem", "cert");

    assert!(find_cert_files(dir.path()).is_none());
}

#[test]
fn discovery_falls_back_to_the_parent_directory() {
    let parent = tempfile::tempdir().expect("tempdir");
    let child = parent.path().join("relay");
    std::fs::create_dir(&child).expect("mkdir");
    touch(parent.path(), "localhost.pem", "cert");
    touch(parent.path(), "localhost-key.pem", "key");

    assert!(find_cert_files(&child).is_some());
}

#[test]
fn config_from_garbage_pem_fails_without_panicking() {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(dir.path(), "localhost.pem", "not a certificate");
    touch(dir.path(), "localhost-key.pem", "not a key");

    let pair = find_cert_files(dir.path()).expect("pair");
    assert!(server_config(&pair).is_err());
}

#[test]
fn config_from_missing_file_is_an_io_error() {
    let pair = CertPair {
        cert: PathBuf::from("/definitely/not/here/localhost.pem"),
        key: PathBuf::from("/definitely/not/here/localhost-key.pem"),
    };
    assert!(matches!(server_config(&pair), Err(TlsError::Io(_))));
}
