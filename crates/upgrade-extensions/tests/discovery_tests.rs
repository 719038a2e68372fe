//! Tests for extension discovery

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use semver::Version;
use serde::Deserialize;
use tempfile::TempDir;
use upgrade_extensions::{
    ExtensionBuilder, ExtensionDiscovery, ExtensionManifest, ExtensionOptions, ExtensionServiceCollection,
    ExtensionSource, ExtensionSourceStore, InMemoryFileProvider, InMemoryLoader, LoaderChain,
    MANIFEST_FILENAME, ModuleHost, OptionBinding, ProviderTable, SharedModuleRegistry,
};
use zip::write::SimpleFileOptions;

fn write_extension(root: &Path, dir: &str, manifest: &str) -> PathBuf {
    let path = root.join(dir);
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join(MANIFEST_FILENAME), manifest).unwrap();
    path
}

fn write_zip_extension(root: &Path, file: &str, entries: &[(&str, &str)]) -> PathBuf {
    let path = root.join(file);
    let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
    for (name, contents) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
    path
}

/// Options that never touch the user's real source list.
fn options(tmp: &TempDir) -> ExtensionOptions {
    ExtensionOptions {
        sources_file: Some(tmp.path().join("sources.json")),
        ..ExtensionOptions::for_host(Version::new(1, 0, 0))
    }
}

fn names(registry: &upgrade_extensions::ExtensionRegistry) -> Vec<String> {
    registry.iter().map(|e| e.name().to_string()).collect()
}

mod version_filtering {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_newer_min_version_is_excluded_when_checking() {
        let tmp = TempDir::new().unwrap();
        let future = write_extension(
            tmp.path(),
            "future",
            r#"{ "ExtensionName": "Future", "MinUpgradeAssistantVersion": "99.0" }"#,
        );
        let current = write_extension(
            tmp.path(),
            "current",
            r#"{ "ExtensionName": "Current", "MinUpgradeAssistantVersion": "1.0" }"#,
        );

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            extension_paths: vec![future, current],
            ..options(&tmp)
        })
        .discover();

        assert_eq!(names(&registry), vec!["Current"]);
    }

    #[test]
    fn test_newer_min_version_is_included_when_not_checking() {
        let tmp = TempDir::new().unwrap();
        let future = write_extension(
            tmp.path(),
            "future",
            r#"{ "ExtensionName": "Future", "MinUpgradeAssistantVersion": "99.0" }"#,
        );

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            extension_paths: vec![future],
            check_min_version: false,
            ..options(&tmp)
        })
        .discover();

        assert_eq!(names(&registry), vec!["Future"]);
    }

    #[test]
    fn test_default_extensions_report_host_version() {
        let tmp = TempDir::new().unwrap();
        let default = write_extension(
            tmp.path(),
            "default",
            r#"{ "ExtensionName": "Builtin", "Version": "0.0.1" }"#,
        );
        let user = write_extension(tmp.path(), "user", r#"{ "ExtensionName": "User", "Version": "0.0.1" }"#);

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            default_paths: vec![default],
            extension_paths: vec![user],
            ..options(&tmp)
        })
        .discover();

        assert_eq!(
            registry.get("builtin").unwrap().version(),
            Some(&Version::new(1, 0, 0))
        );
        assert_eq!(
            registry.get("User").unwrap().version(),
            Some(&Version::new(0, 0, 1))
        );
    }
}

mod ordering {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_discovery_order() {
        let tmp = TempDir::new().unwrap();
        let required = write_extension(tmp.path(), "required", r#"{ "ExtensionName": "Required" }"#);
        let default = write_extension(tmp.path(), "default", r#"{ "ExtensionName": "Default" }"#);
        let user = write_extension(tmp.path(), "user", r#"{ "ExtensionName": "User" }"#);
        let registered = write_extension(tmp.path(), "registered", r#"{ "ExtensionName": "Registered" }"#);

        let mut store = ExtensionSourceStore::load(tmp.path().join("sources.json"));
        store.add(ExtensionSource {
            name: "Registered".to_string(),
            source: registered.display().to_string(),
            version: None,
        });
        store.save().unwrap();

        let code = ExtensionBuilder::new(
            "",
            ExtensionManifest::empty(),
            Arc::new(InMemoryFileProvider::new()),
        )
        .name("InCode")
        .build()
        .unwrap();

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            required_paths: vec![required],
            default_paths: vec![default],
            extension_paths: vec![user],
            additional_options: vec!["Sample:Value=1".to_string()],
            ..options(&tmp)
        })
        .with_extension(code)
        .discover();

        assert_eq!(
            names(&registry),
            vec!["Required", "Default", "User", "Registered", "AdditionalOptions", "InCode"]
        );
    }

    #[test]
    fn test_disabled_loads_required_only() {
        let tmp = TempDir::new().unwrap();
        let required = write_extension(tmp.path(), "required", r#"{ "ExtensionName": "Required" }"#);
        let user = write_extension(tmp.path(), "user", r#"{ "ExtensionName": "User" }"#);

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            enabled: false,
            required_paths: vec![required],
            extension_paths: vec![user],
            additional_options: vec!["A=1".to_string()],
            ..options(&tmp)
        })
        .discover();

        assert_eq!(names(&registry), vec!["Required"]);
    }

    #[test]
    fn test_broken_extension_does_not_abort_discovery() {
        let tmp = TempDir::new().unwrap();
        let broken = write_extension(tmp.path(), "broken", "{ this is not json");
        let empty_dir = tmp.path().join("no-manifest");
        std::fs::create_dir_all(&empty_dir).unwrap();
        let bad_version = write_extension(tmp.path(), "bad-version", r#"{ "Version": "one" }"#);
        let good = write_extension(tmp.path(), "good", r#"{ "ExtensionName": "Good" }"#);

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            extension_paths: vec![
                broken,
                empty_dir,
                bad_version,
                tmp.path().join("does-not-exist"),
                good,
            ],
            ..options(&tmp)
        })
        .discover();

        assert_eq!(names(&registry), vec!["Good"]);
    }
}

mod loaders {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_in_memory_manifest_loads_through_custom_chain() {
        let tmp = TempDir::new().unwrap();
        let on_disk = write_extension(tmp.path(), "disk", r#"{ "ExtensionName": "Disk" }"#);
        let chain = LoaderChain::new(vec![
            Box::new(upgrade_extensions::loader::DirectoryLoader),
            Box::new(InMemoryLoader::new().with_extension(
                "memory/analyzers",
                serde_json::json!({ "ExtensionName": "Analyzers", "Version": "1.0" }),
            )),
        ]);

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            extension_paths: vec![on_disk, PathBuf::from("memory/analyzers")],
            ..options(&tmp)
        })
        .loaders(chain)
        .discover();

        assert_eq!(names(&registry), vec!["Disk", "Analyzers"]);
        assert!(registry.get("Analyzers").unwrap().service_providers().is_empty());
    }

    #[test]
    fn test_manifest_file_path_and_directory_path_load_same_extension() {
        let tmp = TempDir::new().unwrap();
        let dir = write_extension(tmp.path(), "web", "{}");

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            extension_paths: vec![dir.join(MANIFEST_FILENAME), dir.clone()],
            ..options(&tmp)
        })
        .discover();

        assert_eq!(names(&registry), vec!["web", "web"]);
        assert_eq!(registry.extensions()[0].location(), dir.display().to_string());
    }

    #[test]
    fn test_zip_extension_loads_and_reads_files() {
        let tmp = TempDir::new().unwrap();
        let zip = write_zip_extension(
            tmp.path(),
            "wcf.zip",
            &[
                (MANIFEST_FILENAME, r#"{ "PackageMaps": { "Path": "maps/wcf.json" } }"#),
                ("maps/wcf.json", "[]"),
            ],
        );

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            extension_paths: vec![zip],
            ..options(&tmp)
        })
        .discover();

        let wcf = registry.get("wcf").unwrap();
        assert_eq!(
            wcf.files().read_to_string("maps/wcf.json").unwrap().as_deref(),
            Some("[]")
        );
    }

    #[test]
    fn test_registered_source_resolves_through_install_root() {
        let tmp = TempDir::new().unwrap();
        let install_root = tmp.path().join("installed");
        write_extension(&install_root.join("web"), "1.0.0", r#"{ "ExtensionName": "Web", "Version": "1.0.0" }"#);
        write_extension(&install_root.join("web"), "1.2.0", r#"{ "ExtensionName": "Web", "Version": "1.2.0" }"#);

        let mut store = ExtensionSourceStore::load(tmp.path().join("sources.json"));
        store.add(ExtensionSource {
            name: "web".to_string(),
            source: "https://example.com/feed".to_string(),
            version: Some("<1.1".to_string()),
        });
        store.save().unwrap();

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            install_root: Some(install_root),
            ..options(&tmp)
        })
        .discover();

        assert_eq!(
            registry.get("Web").unwrap().version(),
            Some(&Version::new(1, 0, 0))
        );
    }
}

mod options_binding {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default, PartialEq, serde::Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct PackageUpdater {
        retries: Option<u32>,
        source: Option<String>,
    }

    #[test]
    fn test_overrides_win_over_earlier_extensions() {
        let tmp = TempDir::new().unwrap();
        let web = write_extension(
            tmp.path(),
            "web",
            r#"{ "PackageUpdater": { "Retries": 1, "Source": "feed" } }"#,
        );

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            extension_paths: vec![web],
            additional_options: vec!["PackageUpdater:Retries=5".to_string()],
            ..options(&tmp)
        })
        .discover();

        let mut updater = PackageUpdater::default();
        registry
            .options()
            .configure("PackageUpdater", &mut updater)
            .unwrap();
        assert_eq!(
            updater,
            PackageUpdater {
                retries: Some(5),
                source: Some("feed".to_string()),
            }
        );
    }

    #[test]
    fn test_file_scoped_collection_resolves_against_owner() {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "PascalCase")]
        struct PackageMap {
            path: String,
        }

        let tmp = TempDir::new().unwrap();
        let first = write_extension(tmp.path(), "first", r#"{ "PackageMap": { "Path": "map.json" } }"#);
        std::fs::write(first.join("map.json"), "first-map").unwrap();
        let second = write_extension(tmp.path(), "second", r#"{ "PackageMap": { "Path": "map.json" } }"#);
        std::fs::write(second.join("map.json"), "second-map").unwrap();

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            extension_paths: vec![first, second],
            ..options(&tmp)
        })
        .discover();

        let maps: Vec<String> = registry
            .options()
            .collect_file_scoped::<PackageMap>("PackageMap")
            .iter()
            .map(|scoped| scoped.files.read_to_string(&scoped.value.path).unwrap().unwrap())
            .collect();
        assert_eq!(maps, vec!["first-map", "second-map"]);
    }
}

mod services {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct RazorAnalyzer;

    #[derive(Debug)]
    struct HostAnalyzer;

    fn host() -> ModuleHost {
        let mut providers = ProviderTable::new();
        providers.register("Web.Services", |services: &mut ExtensionServiceCollection| {
            services
                .add_singleton(RazorAnalyzer)
                .add_extension_option("PackageMap", OptionBinding::FileScoped);
        });
        ModuleHost::new(Arc::new(SharedModuleRegistry::new()), providers)
    }

    #[test]
    fn test_services_are_attributed_to_their_extension() {
        let tmp = TempDir::new().unwrap();
        let web = write_extension(
            tmp.path(),
            "web",
            r#"{ "ExtensionName": "Web", "ExtensionServiceProviders": ["Web.Services"] }"#,
        );
        std::fs::write(web.join("Web.Services.dll"), "image").unwrap();
        let plain = write_extension(tmp.path(), "plain", r#"{ "ExtensionName": "Plain" }"#);

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            extension_paths: vec![plain, web],
            ..options(&tmp)
        })
        .host(host())
        .discover();

        let analyzers = registry.services::<RazorAnalyzer>();
        assert_eq!(analyzers.len(), 1);
        assert_eq!(registry.owner_of(analyzers[0].as_ref()).unwrap().name(), "Web");
        assert!(registry.owner_of(&HostAnalyzer).is_none());

        let module = registry
            .get("Web")
            .unwrap()
            .existing_isolation_context()
            .unwrap()
            .modules()[0]
            .id();
        assert_eq!(registry.owner_of_module(module).unwrap().name(), "Web");

        let registrations = registry.option_registrations();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].0, "Web");
        assert!(registry.get("Plain").unwrap().existing_isolation_context().is_none());
    }

    #[test]
    fn test_shared_module_suppresses_extension_copy() {
        let tmp = TempDir::new().unwrap();
        let web = write_extension(
            tmp.path(),
            "web",
            r#"{ "ExtensionName": "Web", "ExtensionServiceProviders": ["Web.Services"] }"#,
        );
        std::fs::write(web.join("Web.Services.dll"), "image").unwrap();

        let host = host();
        host.shared().register("Web.Services");

        let registry = ExtensionDiscovery::new(ExtensionOptions {
            extension_paths: vec![web],
            ..options(&tmp)
        })
        .host(host)
        .discover();

        assert!(registry.services::<RazorAnalyzer>().is_empty());
    }
}
