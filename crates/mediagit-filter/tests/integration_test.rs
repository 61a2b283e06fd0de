// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! Integration tests for the filter pipeline

use mediagit_filter::mock::{MemoryObjectStore, StaticAttributes};
use mediagit_filter::{
    apply_to_blob, apply_to_buffer, apply_to_file, register_filter, unregister_filter, AttrCheckOptions, AttrValue,
    AttributeResolver, AutoCrlf, Blob, BufferOutcome, CoreConfig, Filter, FilterError, FilterFlags, FilterList,
    FilterMode, FilterOptions, FilterRegistry, FilterResult, FilterSource, IndexEntry, ObjectStore, Oid, PayloadRef,
    RepoConfig, Repository, SafeCrlf, DRIVER_PRIORITY,
};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Appends a marker on every pass, in both directions
struct Marker {
    clean_suffix: &'static [u8],
    smudge_suffix: &'static [u8],
}

impl Filter for Marker {
    fn attributes(&self) -> &str {
        "filter=marker"
    }

    fn apply(&self, _payload: PayloadRef<'_>, source: &FilterSource, input: &[u8]) -> FilterResult<BufferOutcome> {
        let suffix = match source.mode() {
            FilterMode::ToOdb => self.clean_suffix,
            FilterMode::ToWorktree => self.smudge_suffix,
        };
        let mut out = input.to_vec();
        out.extend_from_slice(suffix);
        Ok(BufferOutcome::Converted(out))
    }
}

fn gitattributes() -> StaticAttributes {
    let attrs = StaticAttributes::new();
    let rules = [
        ("*.txt", "text", AttrValue::True),
        ("*.bat", "text", AttrValue::True),
        ("*.bat", "eol", AttrValue::value("crlf")),
        ("*.png", "text", AttrValue::False),
        ("*.md", "text", AttrValue::value("auto")),
        ("*.mk", "filter", AttrValue::value("marker")),
        ("*.mk", "text", AttrValue::True),
        ("*.mk", "eol", AttrValue::value("crlf")),
    ];
    for (pattern, name, value) in rules {
        attrs.add_rule(pattern, name, value).unwrap();
    }
    attrs
}

fn repo(core: CoreConfig) -> Arc<Repository> {
    Repository::builder()
        .core(core)
        .attributes(Arc::new(gitattributes()))
        .filter_registry(Arc::new(FilterRegistry::with_builtins()))
        .build()
}

fn load(repo: &Arc<Repository>, path: &str, mode: FilterMode) -> Option<FilterList> {
    FilterList::load(repo, None, path, mode, &FilterOptions::default()).unwrap()
}

#[test]
fn test_text_attribute_normalizes_and_expands() {
    let repo = repo(CoreConfig::default());

    let clean = load(&repo, "notes.bat", FilterMode::ToOdb).unwrap();
    assert_eq!(apply_to_buffer(Some(&clean), b"echo\r\noff\r\n").unwrap(), b"echo\noff\n");

    let smudge = load(&repo, "notes.bat", FilterMode::ToWorktree).unwrap();
    assert_eq!(apply_to_buffer(Some(&smudge), b"echo\noff\n").unwrap(), b"echo\r\noff\r\n");
}

#[test]
fn test_binary_attribute_yields_no_list() {
    let repo = repo(CoreConfig::default().with_autocrlf(AutoCrlf::True));
    assert!(load(&repo, "logo.png", FilterMode::ToOdb).is_none());
    assert!(load(&repo, "logo.png", FilterMode::ToWorktree).is_none());
}

#[test]
fn test_untracked_path_follows_autocrlf() {
    let plain = repo(CoreConfig::default());
    assert!(load(&plain, "Makefile", FilterMode::ToOdb).is_none());

    let input = repo(CoreConfig::default().with_autocrlf(AutoCrlf::Input));
    let clean = load(&input, "Makefile", FilterMode::ToOdb).unwrap();
    assert_eq!(apply_to_buffer(Some(&clean), b"all:\r\n").unwrap(), b"all:\n");

    let smudge = load(&input, "Makefile", FilterMode::ToWorktree).unwrap();
    assert_eq!(apply_to_buffer(Some(&smudge), b"all:\n").unwrap(), b"all:\n");
}

#[test]
fn test_driver_order_depends_on_direction() {
    let repo = repo(CoreConfig::default());
    repo.filter_registry()
        .register(
            "marker",
            Arc::new(Marker {
                clean_suffix: b"\r\n",
                smudge_suffix: b"\n",
            }),
            DRIVER_PRIORITY,
        )
        .unwrap();

    // clean: the driver runs before crlf, so its CRLF is normalized too
    let clean = load(&repo, "build.mk", FilterMode::ToOdb).unwrap();
    assert_eq!(clean.names(), vec!["crlf", "marker"]);
    assert_eq!(apply_to_buffer(Some(&clean), b"a\r\n").unwrap(), b"a\n\n");

    // smudge: crlf runs first, the driver's LF stays bare
    let smudge = load(&repo, "build.mk", FilterMode::ToWorktree).unwrap();
    assert_eq!(smudge.names(), vec!["marker", "crlf"]);
    assert_eq!(apply_to_buffer(Some(&smudge), b"a\n").unwrap(), b"a\r\n\n");
}

#[test]
fn test_safecrlf_fail_and_allow_unsafe() {
    let core = CoreConfig::default()
        .with_autocrlf(AutoCrlf::True)
        .with_safecrlf(SafeCrlf::Fail);
    let repo = repo(core);
    let mixed = b"a\nb\r\nc\n";

    let list = load(&repo, "Makefile", FilterMode::ToOdb).unwrap();
    let err = apply_to_buffer(Some(&list), mixed).unwrap_err();
    assert_eq!(err.to_string(), "LF would be replaced by CRLF in 'Makefile'");

    let list = FilterList::load_with_flags(&repo, None, "Makefile", FilterMode::ToOdb, FilterFlags::ALLOW_UNSAFE)
        .unwrap()
        .unwrap();
    assert_eq!(apply_to_buffer(Some(&list), mixed).unwrap(), b"a\nb\nc\n");
}

#[test]
fn test_mixed_endings_with_cr_in_index_pass_through() {
    let odb = MemoryObjectStore::new();
    let oid = odb.insert_blob(Blob::new(b"a\r\nb\r\n".to_vec()));
    odb.stage("Makefile", IndexEntry { oid, mode: 0o100644 });

    let repo = Repository::builder()
        .core(CoreConfig::default().with_autocrlf(AutoCrlf::True))
        .odb(Arc::new(odb))
        .filter_registry(Arc::new(FilterRegistry::with_builtins()))
        .build();

    let list = load(&repo, "Makefile", FilterMode::ToOdb).unwrap();
    assert_eq!(apply_to_buffer(Some(&list), b"a\nb\r\nc\n").unwrap(), b"a\nb\r\nc\n");
}

#[derive(Debug)]
struct BrokenIndex;

impl ObjectStore for BrokenIndex {
    fn read_blob(&self, oid: &Oid) -> FilterResult<Blob> {
        Err(FilterError::Object(format!("cannot read {}", oid)))
    }

    fn index_entry(&self, _path: &str) -> FilterResult<Option<IndexEntry>> {
        Err(FilterError::Object("index is locked".into()))
    }
}

/// Index failures are treated as "no CR staged", so auto conversion proceeds
#[test]
fn test_index_failure_fails_open() {
    let repo = Repository::builder()
        .core(CoreConfig::default().with_autocrlf(AutoCrlf::True))
        .odb(Arc::new(BrokenIndex))
        .filter_registry(Arc::new(FilterRegistry::with_builtins()))
        .build();

    let list = load(&repo, "notes", FilterMode::ToOdb).unwrap();
    assert_eq!(apply_to_buffer(Some(&list), b"x\r\n").unwrap(), b"x\n");
}

#[derive(Debug)]
struct FailingResolver;

impl AttributeResolver for FailingResolver {
    fn resolve(&self, _path: &str, _names: &[&str], _options: &AttrCheckOptions) -> FilterResult<Option<Vec<AttrValue>>> {
        Err(FilterError::Attribute("cannot parse .gitattributes".into()))
    }
}

#[test]
fn test_attribute_failure_aborts_load() {
    let repo = Repository::builder()
        .attributes(Arc::new(FailingResolver))
        .filter_registry(Arc::new(FilterRegistry::with_builtins()))
        .build();
    let err = FilterList::load(&repo, None, "a.txt", FilterMode::ToOdb, &FilterOptions::default()).unwrap_err();
    assert!(matches!(err, FilterError::Attribute(_)));
}

#[test]
fn test_apply_to_file_and_blob() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("readme.txt"), b"line one\r\nline two\r\n").unwrap();

    let repo = Repository::builder()
        .workdir(dir.path())
        .core(CoreConfig::default().with_autocrlf(AutoCrlf::True))
        .attributes(Arc::new(gitattributes()))
        .filter_registry(Arc::new(FilterRegistry::with_builtins()))
        .build();

    let mut clean = load(&repo, "readme.txt", FilterMode::ToOdb);
    let stored = apply_to_file(clean.as_mut(), &repo, "readme.txt").unwrap();
    assert_eq!(stored, b"line one\nline two\n");

    let blob = Blob::new(stored);
    let mut smudge = load(&repo, "readme.txt", FilterMode::ToWorktree);
    let checked_out = apply_to_blob(smudge.as_mut(), &blob).unwrap();
    assert_eq!(checked_out, b"line one\r\nline two\r\n");
    assert_eq!(smudge.unwrap().source().id(), Some(blob.id()));
}

#[test]
fn test_config_file_and_cache_invalidation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[core]\nautocrlf = \"input\"\n").unwrap();

    let repo = Repository::builder()
        .config(RepoConfig::load_file(&path).unwrap())
        .filter_registry(Arc::new(FilterRegistry::with_builtins()))
        .build();
    assert!(load(&repo, "main.rs", FilterMode::ToWorktree).is_some());

    repo.set_config(RepoConfig::default());
    assert!(load(&repo, "main.rs", FilterMode::ToWorktree).is_none());
}

struct CountingInit {
    inits: AtomicUsize,
}

impl Filter for CountingInit {
    fn initialize(&self) -> FilterResult<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_concurrent_loads_initialize_once() {
    let filter = Arc::new(CountingInit {
        inits: AtomicUsize::new(0),
    });
    let registry = FilterRegistry::new();
    registry.register("counting", filter.clone(), 10).unwrap();
    let repo = Repository::builder().filter_registry(Arc::new(registry)).build();

    std::thread::scope(|s| {
        for i in 0..8 {
            let repo = &repo;
            s.spawn(move || {
                let path = format!("file{}.txt", i);
                let list = FilterList::load(repo, None, &path, FilterMode::ToOdb, &FilterOptions::default()).unwrap();
                assert!(list.is_some_and(|l| l.contains("counting")));
            });
        }
    });

    assert_eq!(filter.inits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_global_registry_management() {
    let scoped = || -> Arc<dyn Filter> {
        Arc::new(Marker {
            clean_suffix: b"",
            smudge_suffix: b"",
        })
    };

    // requires `filter=marker`, so other users of the global registry are unaffected
    register_filter("integration-x", scoped(), 50).unwrap();
    let err = register_filter("integration-x", scoped(), 50).unwrap_err();
    assert!(matches!(err, FilterError::AlreadyExists(_)));

    assert!(matches!(unregister_filter("crlf"), Err(FilterError::InvalidOperation(_))));
    assert!(FilterRegistry::global().contains("crlf"));

    unregister_filter("integration-x").unwrap();
    assert!(unregister_filter("integration-x").unwrap_err().is_not_found());
}
