//! Tests for update orchestration.

use super::*;
use crate::error::UpdateError;
use crate::extraction::ArchiveExtractor;
use crate::install::{AcceptAll, InstallPaths, MockCommitCheck};
use crate::package::manifest_parser::parse_manifest_auto;
use crate::test_utils::{ManifestBuilder, StubFetcher, VersionEntry, package_url, zip_archive};
use rstest::{fixture, rstest};

const MANIFEST_URL: &str = "http://updates.test/example/manifest.json";
const OLD_BINARY: &[u8] = b"example 1.0";
const NEW_BINARY: &[u8] = b"example 2.0";

struct Site {
    _temp: tempfile::TempDir,
    target: Utf8PathBuf,
    cache_dir: Utf8PathBuf,
    archive: Vec<u8>,
}

impl Site {
    fn request(&self, current: &str) -> UpdateRequest {
        UpdateRequest {
            current: current.parse().expect("valid version"),
            target: self.target.clone(),
            cache_dir: self.cache_dir.clone(),
            deadline: None,
        }
    }

    fn manifest(&self) -> ManifestBuilder {
        ManifestBuilder::new("example")
            .version("1.0", OLD_BINARY)
            .version("2.0", &self.archive)
            .policy(&["[,2.0)"], "2.0")
    }

    fn fetcher(&self, manifest: &ManifestBuilder) -> StubFetcher {
        StubFetcher::new()
            .with_document(MANIFEST_URL, &manifest.to_json())
            .with_package(&package_url("example", "2.0"), &self.archive)
    }

    fn target_contents(&self) -> Vec<u8> {
        std::fs::read(&self.target).expect("target exists")
    }

    fn cache_entries(&self) -> usize {
        std::fs::read_dir(&self.cache_dir).map_or(0, |entries| entries.count())
    }
}

#[fixture]
fn site() -> Site {
    let temp = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
    let target = root.join("example");
    std::fs::write(&target, OLD_BINARY).expect("write target");
    Site {
        _temp: temp,
        target,
        cache_dir: root.join("cache"),
        archive: zip_archive(&[("example", NEW_BINARY)]),
    }
}

fn run(site: &Site, current: &str, source: &dyn UpdateSource, fetcher: &StubFetcher) -> Result<UpdateOutcome> {
    run_update(
        &site.request(current),
        source,
        fetcher,
        &ArchiveExtractor::default(),
        &AcceptAll,
        &mut |_, _| {},
    )
}

#[rstest]
fn installs_the_policy_target(site: Site) {
    let fetcher = site.fetcher(&site.manifest());
    let source = ManifestUpdateSource::new(&fetcher, MANIFEST_URL);

    let outcome = run(&site, "1.0", &source, &fetcher).expect("update succeeds");
    assert_eq!(
        outcome,
        UpdateOutcome::Installed {
            version: "2.0".parse().expect("valid version"),
            force_update: false,
        }
    );
    assert_eq!(site.target_contents(), NEW_BINARY);
    assert_eq!(site.cache_entries(), 0, "download and workdir are cleaned up");
}

#[rstest]
fn reports_up_to_date_without_downloading(site: Site) {
    let fetcher = site.fetcher(&site.manifest());
    let source = ManifestUpdateSource::new(&fetcher, MANIFEST_URL);

    let outcome = run(&site, "2.0", &source, &fetcher).expect("check succeeds");
    assert_eq!(outcome, UpdateOutcome::UpToDate);
    assert_eq!(fetcher.stream_count(), 0);
    assert_eq!(site.target_contents(), OLD_BINARY);
}

#[rstest]
fn truncated_transfer_leaves_target_intact(site: Site) {
    let fetcher = site.fetcher(&site.manifest()).truncate_to(8);
    let source = ManifestUpdateSource::new(&fetcher, MANIFEST_URL);

    let err = run(&site, "1.0", &source, &fetcher).expect_err("update fails");
    assert_eq!(err.kind(), "incomplete-transfer");
    assert_eq!(site.target_contents(), OLD_BINARY);
}

#[rstest]
fn digest_mismatch_leaves_target_intact(site: Site) {
    let entry = VersionEntry::for_payload("example", "2.0", &site.archive)
        .with_hash("md5", &"0".repeat(32));
    let manifest = ManifestBuilder::new("example")
        .entry("2.0", entry)
        .policy(&["[,2.0)"], "2.0");
    let fetcher = site.fetcher(&manifest);
    let source = ManifestUpdateSource::new(&fetcher, MANIFEST_URL);

    let err = run(&site, "1.0", &source, &fetcher).expect_err("update fails");
    assert!(matches!(err, UpdateError::Integrity(_)), "got {err:?}");
    assert_eq!(site.target_contents(), OLD_BINARY);
}

#[rstest]
fn rejected_commit_is_an_install_failure(site: Site) {
    let fetcher = site.fetcher(&site.manifest());
    let source = ManifestUpdateSource::new(&fetcher, MANIFEST_URL);
    let mut check = MockCommitCheck::new();
    check.expect_confirm().returning(|_| Err("does not start".to_owned()));

    let err = run_update(
        &site.request("1.0"),
        &source,
        &fetcher,
        &ArchiveExtractor::default(),
        &check,
        &mut |_, _| {},
    )
    .expect_err("update fails");
    assert_eq!(err.kind(), "install");
    assert_eq!(site.target_contents(), OLD_BINARY);
}

#[rstest]
fn query_source_installs_the_server_plan(site: Site) {
    let manifest = parse_manifest_auto(&site.manifest().to_json()).expect("valid manifest");
    let decision = resolve(&manifest, &"1.0".parse().expect("valid version"));
    let response = QueryResponse::from_decision(&manifest, &decision)
        .to_json()
        .expect("serialise");
    let fetcher = StubFetcher::new()
        .with_document("http://updates.test/example/1.0", &response)
        .with_package(&package_url("example", "2.0"), &site.archive);
    let source = QueryUpdateSource::new(&fetcher, "http://updates.test/", "example");

    let outcome = run(&site, "1.0", &source, &fetcher).expect("update succeeds");
    assert!(matches!(outcome, UpdateOutcome::Installed { .. }));
    assert_eq!(site.target_contents(), NEW_BINARY);
}

#[rstest]
fn query_answer_naming_the_installed_version_is_up_to_date(site: Site) {
    let manifest = parse_manifest_auto(&site.manifest().to_json()).expect("valid manifest");
    let decision = resolve(&manifest, &"1.0".parse().expect("valid version"));
    let response = QueryResponse::from_decision(&manifest, &decision)
        .to_json()
        .expect("serialise");
    let fetcher = StubFetcher::new()
        .with_document("http://updates.test/example/2.0", &response)
        .with_package(&package_url("example", "2.0"), &site.archive);
    let source = QueryUpdateSource::new(&fetcher, "http://updates.test", "example");

    let outcome = run(&site, "2.0", &source, &fetcher).expect("check succeeds");
    assert_eq!(outcome, UpdateOutcome::UpToDate);
    assert_eq!(fetcher.stream_count(), 0);
    assert_eq!(site.target_contents(), OLD_BINARY);
}

#[rstest]
fn verified_package_in_cache_is_installed_without_transfer(site: Site) {
    std::fs::create_dir_all(&site.cache_dir).expect("create cache");
    std::fs::write(site.cache_dir.join("example-2.0.zip"), &site.archive).expect("seed cache");
    let fetcher = StubFetcher::new().with_document(MANIFEST_URL, &site.manifest().to_json());
    let source = ManifestUpdateSource::new(&fetcher, MANIFEST_URL);

    let outcome = run(&site, "1.0", &source, &fetcher).expect("update succeeds");
    assert!(matches!(outcome, UpdateOutcome::Installed { .. }));
    assert_eq!(fetcher.stream_count(), 0);
    assert_eq!(site.target_contents(), NEW_BINARY);
    assert_eq!(site.cache_entries(), 0);
}

#[rstest]
fn failed_install_keeps_package_for_next_attempt(site: Site) {
    let fetcher = site.fetcher(&site.manifest());
    let source = ManifestUpdateSource::new(&fetcher, MANIFEST_URL);
    let mut rejecting = MockCommitCheck::new();
    rejecting.expect_confirm().returning(|_| Err("does not start".to_owned()));
    let err = run_update(
        &site.request("1.0"),
        &source,
        &fetcher,
        &ArchiveExtractor::default(),
        &rejecting,
        &mut |_, _| {},
    )
    .expect_err("update fails");
    assert_eq!(err.kind(), "install");
    assert!(site.cache_dir.join("example-2.0.zip").exists());

    let retry = StubFetcher::new().with_document(MANIFEST_URL, &site.manifest().to_json());
    let source = ManifestUpdateSource::new(&retry, MANIFEST_URL);
    let outcome = run(&site, "1.0", &source, &retry).expect("retry succeeds");
    assert!(matches!(outcome, UpdateOutcome::Installed { .. }));
    assert_eq!(retry.stream_count(), 0);
    assert_eq!(site.target_contents(), NEW_BINARY);
}

#[rstest]
fn query_for_another_package_is_rejected(site: Site) {
    let manifest = parse_manifest_auto(&site.manifest().to_json()).expect("valid manifest");
    let decision = resolve(&manifest, &"1.0".parse().expect("valid version"));
    let response = QueryResponse::from_decision(&manifest, &decision)
        .to_json()
        .expect("serialise");
    let fetcher = StubFetcher::new().with_document("http://updates.test/other/1.0", &response);
    let source = QueryUpdateSource::new(&fetcher, "http://updates.test", "other");

    let err = check(&source, &"1.0".parse().expect("valid version")).expect_err("mismatch");
    assert_eq!(err.kind(), "validation");
}

#[rstest]
fn leftover_backup_is_restored_before_planning(site: Site) {
    let paths = InstallPaths::for_target(&site.target).expect("valid target");
    std::fs::write(&site.target, b"unconfirmed").expect("write target");
    std::fs::write(paths.backup(), OLD_BINARY).expect("write backup");

    let mut source = MockUpdateSource::new();
    source.expect_plan().times(1).returning(|_| Ok(None));
    let fetcher = StubFetcher::new();

    let outcome = run(&site, "2.0", &source, &fetcher).expect("check succeeds");
    assert_eq!(outcome, UpdateOutcome::UpToDate);
    assert_eq!(site.target_contents(), OLD_BINARY);
    assert!(!paths.backup().exists());
}

#[rstest]
fn source_errors_propagate(site: Site) {
    let mut source = MockUpdateSource::new();
    source.expect_plan().returning(|_| {
        Err(ValidationError::Document {
            reason: "truncated".to_owned(),
        }
        .into())
    });
    let fetcher = StubFetcher::new();

    let err = run(&site, "1.0", &source, &fetcher).expect_err("update fails");
    assert_eq!(err.kind(), "validation");
}

#[rstest]
fn missing_manifest_is_not_found(site: Site) {
    let fetcher = StubFetcher::new();
    let source = ManifestUpdateSource::new(&fetcher, MANIFEST_URL);
    let err = run(&site, "1.0", &source, &fetcher).expect_err("update fails");
    assert_eq!(err.kind(), "not-found");
}

#[test]
fn query_location_joins_base_package_and_version() {
    let fetcher = StubFetcher::new();
    let source = QueryUpdateSource::new(&fetcher, "http://updates.test/", "example");
    assert_eq!(
        source.location(&"1.0".parse().expect("valid version")),
        "http://updates.test/example/1.0"
    );
}

#[rstest]
fn yaml_manifest_is_read_by_extension(site: Site) {
    let location = "http://updates.test/example/manifest.yaml?channel=stable";
    let fetcher = StubFetcher::new().with_document(location, &site.manifest().to_yaml());
    let source = ManifestUpdateSource::new(&fetcher, location);

    let manifest = source.manifest().expect("valid manifest");
    assert_eq!(manifest.package_name(), "example");
    assert_eq!(manifest.policies().len(), 1);
}
