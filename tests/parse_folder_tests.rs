//! Parsing configuration trees from disk
//!
//! Covers the per-manager status sequence, partial ingestion, pruning,
//! lookups and the lazy public-key cache.

mod common;

use std::fs;
use std::sync::Arc;

use common::{credential_xml, issuer_xml, manager_xml, Fixture, SchemeTree};
use irma_scheme::{
    compact_hash, Configuration, ConfigurationError, CredentialTypeId, IssuerId, MockTransport,
    SchemeError, SchemeManagerId, SchemeManagerStatus,
};

fn manager_id(id: &str) -> SchemeManagerId {
    SchemeManagerId::new(id)
}

fn status_of(conf: &Configuration, id: &str) -> SchemeManagerStatus {
    conf.scheme_manager(&manager_id(id)).unwrap().status
}

#[test]
fn test_valid_manager() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");

    let conf = fx.parsed();
    assert!(conf.is_initialized());
    assert!(conf.disabled_scheme_managers().is_empty());

    let manager = conf.scheme_manager(&manager_id("m")).unwrap();
    assert_eq!(manager.status, SchemeManagerStatus::Valid);
    assert!(manager.valid);
    assert_eq!(manager.version, 7);
    assert_eq!(manager.url, "https://example.com/m");
    assert_eq!(manager.name.get("nl"), Some("m schema"));

    let issuer = conf.issuer(&IssuerId::new("m.i")).unwrap();
    assert!(issuer.valid);
    assert_eq!(issuer.contact_email, "i@example.com");

    let cred_id = CredentialTypeId::new("m.i.c");
    let cred = conf.credential_type(&cred_id).unwrap();
    assert!(cred.valid);
    assert_eq!(cred.attributes.len(), 2);
    assert!(conf.contains(&cred_id));
    assert!(!conf.contains(&CredentialTypeId::new("m.i.other")));
}

#[test]
fn test_compact_hash_lookup() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.credential("m", "i", "d");
    fx.local.sign("m");
    let conf = fx.parsed();

    for name in ["m.i.c", "m.i.d"] {
        let id = CredentialTypeId::new(name);
        let hash = conf.credential_type_hash(&id);
        assert_eq!(hash, compact_hash(&id));
        let found = conf.hash_to_credential_type(&hash).unwrap();
        assert_eq!(found.identifier(), id);
    }
    assert!(conf.hash_to_credential_type(&[7u8; 16]).is_none());
}

#[test]
fn test_flipped_signature_is_invalid_signature() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");

    let mut sig = fx.local.read("m/index.sig");
    let last = sig.len() - 1;
    sig[last] ^= 0x01;
    fx.local.write("m/index.sig", sig);

    let mut conf = fx.parsed();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::InvalidSignature);
    assert!(!conf.scheme_manager(&manager_id("m")).unwrap().valid);
    assert_eq!(conf.issuers().count(), 0);

    let err = &conf.disabled_scheme_managers()[&manager_id("m")];
    assert_eq!(err.status, SchemeManagerStatus::InvalidSignature);
    assert!(matches!(err.error, SchemeError::Signature(_)));

    conf.prune();
    assert!(conf.scheme_manager(&manager_id("m")).is_none());
    assert_eq!(conf.scheme_managers().count(), 0);
}

#[test]
fn test_modified_file_is_invalid_signature() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");
    fx.local
        .write("m/i/description.xml", issuer_xml("m", "i", 4).replace("Issuer i", "Evil"));

    let conf = fx.parsed();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::InvalidSignature);
    let err = &conf.disabled_scheme_managers()[&manager_id("m")];
    assert!(matches!(err.error, SchemeError::Integrity(_)));
    assert!(conf.issuer(&IssuerId::new("m.i")).is_none());
}

#[test]
fn test_missing_description_is_parsing_error() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");
    fs::remove_file(fx.local.root.join("m/description.xml")).unwrap();

    let conf = fx.parsed();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::ParsingError);
    let err = &conf.disabled_scheme_managers()[&manager_id("m")];
    assert!(matches!(err.error, SchemeError::Structural { .. }));
}

#[test]
fn test_malformed_index_is_invalid_index() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");
    fx.local.write_signed_index("m", b"not-a-hash\n");

    let conf = fx.parsed();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::InvalidIndex);
    let err = &conf.disabled_scheme_managers()[&manager_id("m")];
    assert!(matches!(err.error, SchemeError::Index(_)));
}

#[test]
fn test_missing_index_is_invalid_index() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");
    fs::remove_file(fx.local.root.join("m/index")).unwrap();

    let conf = fx.parsed();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::InvalidIndex);
}

#[test]
fn test_index_escaping_manager_is_invalid_index() {
    let fx = Fixture::new();
    fx.local.standard("m");
    let mut index = fx.local.build_index("m");
    index.insert("other/description.xml", irma_scheme::FileHash::of(b"x"));
    fx.local
        .write_signed_index("m", index.serialize().as_bytes());

    let conf = fx.parsed();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::InvalidIndex);
    let err = &conf.disabled_scheme_managers()[&manager_id("m")];
    assert!(matches!(err.error, SchemeError::UntrustedPath { .. }));
}

#[test]
fn test_old_manager_version_is_parsing_error() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.write("m/description.xml", manager_xml("m", 6));
    fx.local.sign("m");

    let conf = fx.parsed();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::ParsingError);
    let err = &conf.disabled_scheme_managers()[&manager_id("m")];
    assert!(matches!(
        err.error,
        SchemeError::Version { found: 6, minimum: 7, .. }
    ));
}

#[test]
fn test_manager_id_must_match_folder() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.write("m/description.xml", manager_xml("x", 7));
    fx.local.sign("m");

    let conf = fx.parsed();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::ParsingError);
    let err = &conf.disabled_scheme_managers()[&manager_id("m")];
    assert!(matches!(err.error, SchemeError::Content { .. }));
}

#[test]
fn test_old_issuer_version_keeps_partial_content() {
    let fx = Fixture::new();
    fx.local.manager("m");
    fx.local.issuer("m", "a");
    fx.local.credential("m", "a", "c");
    fx.local
        .write("m/b/description.xml", issuer_xml("m", "b", 3));
    fx.local.sign("m");

    let conf = fx.parsed();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::ContentParsingError);
    assert!(!conf.scheme_manager(&manager_id("m")).unwrap().valid);

    let err = &conf.disabled_scheme_managers()[&manager_id("m")];
    assert!(matches!(
        err.error,
        SchemeError::Version { kind: "issuer", found: 3, .. }
    ));

    // Content registered before the failure stays, but is not valid
    let issuer = conf.issuer(&IssuerId::new("m.a")).unwrap();
    assert!(!issuer.valid);
    let cred = conf.credential_type(&CredentialTypeId::new("m.a.c")).unwrap();
    assert!(!cred.valid);
    assert!(conf.issuer(&IssuerId::new("m.b")).is_none());
}

#[test]
fn test_old_credential_type_version_is_content_error() {
    let fx = Fixture::new();
    fx.local.manager("m");
    fx.local.issuer("m", "i");
    fx.local.write(
        "m/i/Issues/c/description.xml",
        credential_xml("m", "i", "c", 3),
    );
    fx.local.sign("m");

    let conf = fx.parsed();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::ContentParsingError);
    assert!(conf.issuer(&IssuerId::new("m.i")).is_some());
    assert!(conf.credential_type(&CredentialTypeId::new("m.i.c")).is_none());
}

#[test]
fn test_unindexed_issuer_is_skipped() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");
    fx.local.issuer("m", "extra");

    let conf = fx.parsed();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::Valid);
    assert!(conf.issuer(&IssuerId::new("m.i")).is_some());
    assert!(conf.issuer(&IssuerId::new("m.extra")).is_none());
}

#[test]
fn test_failing_manager_does_not_stop_siblings() {
    let fx = Fixture::new();
    for id in ["a", "b", "c"] {
        fx.local.standard(id);
        fx.local.sign(id);
    }
    fx.local.write("b/index", b"garbage\n");

    let conf = fx.parsed();
    assert_eq!(status_of(&conf, "a"), SchemeManagerStatus::Valid);
    assert_eq!(status_of(&conf, "b"), SchemeManagerStatus::InvalidIndex);
    assert_eq!(status_of(&conf, "c"), SchemeManagerStatus::Valid);
    assert_eq!(conf.disabled_scheme_managers().len(), 1);
    assert!(conf.contains(&CredentialTypeId::new("a.i.c")));
    assert!(conf.contains(&CredentialTypeId::new("c.i.c")));
}

#[test]
fn test_version_control_folders_are_ignored() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");
    fx.local.write(".git/HEAD", "ref: refs/heads/master\n");
    fx.local.write(".hg/store", "x");
    fx.local.write("timestamp", "1500000000");

    let conf = fx.parsed();
    let ids: Vec<_> = conf.scheme_managers().map(|m| m.id.to_string()).collect();
    assert_eq!(ids, vec!["m"]);
    assert!(conf.disabled_scheme_managers().is_empty());
}

#[test]
fn test_parse_is_idempotent() {
    let fx = Fixture::new();
    fx.local.standard("a");
    fx.local.sign("a");
    fx.local.standard("b");
    fx.local.sign("b");
    fx.local.write("b/index.sig", b"\x30\x00");

    let mut conf = fx.parsed();
    let snapshot = |conf: &Configuration| {
        let mut managers: Vec<_> = conf
            .scheme_managers()
            .map(|m| (m.id.to_string(), m.status, m.valid))
            .collect();
        managers.sort_by(|a, b| a.0.cmp(&b.0));
        let mut issuers: Vec<_> = conf.issuers().map(|i| (i.identifier(), i.valid)).collect();
        issuers.sort();
        let mut creds: Vec<_> = conf
            .credential_types()
            .map(|c| (c.identifier(), c.valid))
            .collect();
        creds.sort();
        let mut disabled: Vec<_> = conf
            .disabled_scheme_managers()
            .iter()
            .map(|(id, e)| (id.clone(), e.status))
            .collect();
        disabled.sort_by(|a, b| a.0.cmp(&b.0));
        (managers, issuers, creds, disabled)
    };

    let first = snapshot(&conf);
    conf.parse_folder().unwrap();
    assert_eq!(snapshot(&conf), first);
}

#[test]
fn test_unreadable_root_is_error() {
    let fx = Fixture::new();
    let mut conf = fx.configuration();
    fs::remove_dir_all(&fx.local.root).unwrap();

    assert!(matches!(
        conf.parse_folder(),
        Err(ConfigurationError::Io { .. })
    ));
}

#[test]
fn test_public_keys_load_lazily() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.public_key("m", "i", 1);
    fx.local.write("m/i/PublicKeys/notes.xml", "ignored");
    fx.local.sign("m");
    let mut conf = fx.parsed();

    let issuer = IssuerId::new("m.i");
    let pk = conf.public_key(&issuer, 1).unwrap().unwrap();
    assert_eq!(pk.counter, 1);
    assert_eq!(pk.n, "1001");
    assert_eq!(pk.bases, vec!["111", "222"]);
    assert_eq!(pk.issuer.as_ref(), Some(&issuer));

    assert!(conf.public_key(&issuer, 0).unwrap().is_some());
    assert!(conf.public_key(&issuer, 9).unwrap().is_none());
    assert!(conf
        .public_key(&IssuerId::new("unknown.i"), 0)
        .unwrap()
        .is_none());
}

#[test]
fn test_public_key_cache_survives_reparse() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");
    let mut conf = fx.parsed();
    let issuer = IssuerId::new("m.i");

    assert!(conf.public_key(&issuer, 0).unwrap().is_some());

    // Indexed files that are absent on disk do not invalidate a manager
    fs::remove_file(fx.local.root.join("m/i/PublicKeys/0.xml")).unwrap();
    conf.parse_folder().unwrap();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::Valid);
    assert!(conf.public_key(&issuer, 0).unwrap().is_some());
}

#[test]
fn test_unindexed_public_key_is_skipped() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");
    fx.local.public_key("m", "i", 7);
    let mut conf = fx.parsed();

    let issuer = IssuerId::new("m.i");
    assert!(conf.public_key(&issuer, 7).unwrap().is_none());
    assert!(conf.public_key(&issuer, 0).unwrap().is_some());
}

#[test]
fn test_tampered_public_key_is_error() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");
    let mut conf = fx.parsed();
    fx.local
        .write("m/i/PublicKeys/0.xml", common::public_key_xml(5));

    assert!(matches!(
        conf.public_key(&IssuerId::new("m.i"), 0),
        Err(ConfigurationError::Scheme(SchemeError::Integrity(_)))
    ));
}

#[test]
fn test_read_authenticated_file_and_verify() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");
    let conf = fx.parsed();
    let id = manager_id("m");

    let bytes = conf
        .read_authenticated_file(&id, "m/i/description.xml")
        .unwrap()
        .unwrap();
    assert_eq!(bytes, fx.local.read("m/i/description.xml"));
    assert!(conf
        .read_authenticated_file(&id, "m/i/unknown.xml")
        .unwrap()
        .is_none());

    assert!(conf.verify_signature(&id).unwrap());
    conf.verify_scheme_manager(&id).unwrap();

    fx.local.write("m/i/Issues/c/description.xml", "changed");
    assert!(conf.verify_scheme_manager(&id).is_err());
}

#[test]
fn test_remove_scheme_manager() {
    let fx = Fixture::new();
    for id in ["a", "b"] {
        fx.local.standard(id);
        fx.local.sign(id);
    }
    let mut conf = fx.parsed();
    assert!(conf.public_key(&IssuerId::new("a.i"), 0).unwrap().is_some());

    conf.remove_scheme_manager(&manager_id("a"), true).unwrap();
    assert!(conf.scheme_manager(&manager_id("a")).is_none());
    assert!(conf.issuer(&IssuerId::new("a.i")).is_none());
    assert!(!conf.contains(&CredentialTypeId::new("a.i.c")));
    assert!(conf
        .hash_to_credential_type(&compact_hash(&CredentialTypeId::new("a.i.c")))
        .is_none());
    assert!(!fx.local.root.join("a").exists());

    assert!(conf.contains(&CredentialTypeId::new("b.i.c")));

    conf.remove_scheme_manager(&manager_id("b"), false).unwrap();
    assert!(fx.local.root.join("b").exists());
    assert_eq!(conf.scheme_managers().count(), 0);
}

#[test]
fn test_parse_or_restore_from_assets() {
    let fx = Fixture::new();
    let assets = SchemeTree::new(fx.dir.path().join("assets"));
    assets.standard("m");
    assets.sign("m");
    assets.write("timestamp", "1600000000");

    let mut conf = Configuration::with_transport(
        fx.local.root.clone(),
        Some(assets.root.clone()),
        Arc::new(MockTransport::new()),
    )
    .unwrap();
    assert!(conf.is_up_to_date().unwrap());
    assert!(fx.local.root.join("m/index.sig").exists());

    fx.local.write("m/i/description.xml", "corrupted");
    conf.parse_or_restore_folder().unwrap();

    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::Valid);
    assert!(conf.disabled_scheme_managers().is_empty());
    assert_eq!(
        fx.local.read("m/i/description.xml"),
        assets.read("m/i/description.xml")
    );
}

/// Replace key 0 of `m.i` and rewrite the index over it without re-signing
fn forge_public_key(tree: &SchemeTree) {
    tree.write("m/i/PublicKeys/0.xml", common::public_key_xml(5));
    let index = tree.build_index("m").serialize();
    tree.write("m/index", index);
}

#[test]
fn test_unsigned_index_does_not_authenticate_files() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");
    forge_public_key(&fx.local);

    let mut conf = fx.parsed();
    let id = manager_id("m");
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::InvalidSignature);
    assert!(matches!(
        conf.disabled_scheme_managers()[&id].error,
        SchemeError::Signature(_)
    ));
    assert!(!conf.scheme_manager(&id).unwrap().has_verified_index());

    assert!(conf.public_key(&IssuerId::new("m.i"), 0).unwrap().is_none());
    assert!(conf
        .read_authenticated_file(&id, "m/i/PublicKeys/0.xml")
        .unwrap()
        .is_none());
    assert!(conf
        .read_authenticated_file(&id, "m/description.xml")
        .unwrap()
        .is_none());
}

#[test]
fn test_failed_signature_drops_cached_keys() {
    let fx = Fixture::new();
    fx.local.standard("m");
    fx.local.sign("m");
    let mut conf = fx.parsed();
    let issuer = IssuerId::new("m.i");
    assert_eq!(conf.public_key(&issuer, 0).unwrap().unwrap().n, "1000");

    forge_public_key(&fx.local);
    conf.parse_folder().unwrap();

    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::InvalidSignature);
    assert!(conf.public_key(&issuer, 0).unwrap().is_none());
}

#[test]
fn test_prune_removes_content_of_invalid_manager() {
    let fx = Fixture::new();
    fx.local.manager("m");
    fx.local.issuer("m", "a");
    fx.local.credential("m", "a", "c");
    fx.local.public_key("m", "a", 0);
    fx.local.write("m/b/description.xml", issuer_xml("m", "b", 3));
    fx.local.sign("m");
    fx.local.standard("n");
    fx.local.sign("n");

    let mut conf = fx.parsed();
    assert_eq!(status_of(&conf, "m"), SchemeManagerStatus::ContentParsingError);
    let issuer = IssuerId::new("m.a");
    let cred = CredentialTypeId::new("m.a.c");
    assert!(conf.issuer(&issuer).is_some());
    assert!(conf.credential_type(&cred).is_some());
    assert!(conf.hash_to_credential_type(&compact_hash(&cred)).is_some());
    assert!(conf.public_key(&issuer, 0).unwrap().is_some());

    conf.prune();

    assert!(conf.scheme_manager(&manager_id("m")).is_none());
    assert!(conf.issuer(&issuer).is_none());
    assert!(conf.credential_type(&cred).is_none());
    assert!(conf.hash_to_credential_type(&compact_hash(&cred)).is_none());
    assert!(conf.public_key(&issuer, 0).unwrap().is_none());
    assert!(conf.disabled_scheme_managers().contains_key(&manager_id("m")));

    // The valid sibling is untouched
    let other = CredentialTypeId::new("n.i.c");
    assert!(conf.contains(&other));
    assert!(conf.hash_to_credential_type(&compact_hash(&other)).is_some());
    assert!(conf.public_key(&IssuerId::new("n.i"), 0).unwrap().is_some());
}
