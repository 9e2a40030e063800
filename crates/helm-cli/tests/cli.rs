use std::fs::File;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use predicates::prelude::*;

fn write_tar_gz(archive_path: &Path, manifest_json: &serde_json::Value) {
    let tar_gz = File::create(archive_path).unwrap();
    let enc = GzEncoder::new(tar_gz, Compression::default());
    let mut builder = tar::Builder::new(enc);

    let bytes = manifest_json.to_string().into_bytes();
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "manifest.json", bytes.as_slice()).unwrap();
    builder.finish().unwrap();
}

#[test]
fn status_reports_root_and_flags() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("helm").unwrap();
    cmd.arg("--root").arg(dir.path()).arg("status");
    cmd.assert().success().stdout(predicate::str::contains("root:"));
}

#[test]
fn config_show_prints_json() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("helm").unwrap();
    cmd.arg("--root").arg(dir.path()).arg("config");
    cmd.assert().success().stdout(predicate::str::contains("\"ledger\""));
}

#[test]
fn install_missing_archive_fails_with_io_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("helm").unwrap();
    cmd.arg("--root")
        .arg(dir.path())
        .arg("install")
        .arg(dir.path().join("nonexistent-archive.tar.gz"))
        .arg("--dev");
    cmd.assert().failure().code(3);
}

#[test]
fn gate_check_unsigned_package_fails_without_dev() {
    let root = tempfile::tempdir().unwrap();
    let archive_dir = tempfile::tempdir().unwrap();
    let archive_path = archive_dir.path().join("pkg.tar.gz");

    write_tar_gz(
        &archive_path,
        &serde_json::json!({
            "package_id": "pkg-a",
            "spec_id": "spec-1",
            "version": "1.0.0",
            "assets": []
        }),
    );

    let mut cmd = Command::cargo_bin("helm").unwrap();
    cmd.arg("--root")
        .arg(root.path())
        .arg("gate-check")
        .arg(&archive_path)
        .arg("--gate")
        .arg("G5");
    cmd.assert().failure();
}
