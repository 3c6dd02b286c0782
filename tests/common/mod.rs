//! Shared fixtures: signed scheme manager trees on disk
//!
//! A fixture writes description files under `<root>/<manager>/`, then
//! `sign` builds the index over everything in the manager folder, signs it
//! with a fresh P-256 key and writes `index`, `index.sig` and `pk.pem`.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use irma_scheme::{Configuration, FileHash, MockTransport, SchemeManagerIndex};
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::{EncodePublicKey, LineEnding};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use walkdir::WalkDir;

pub const BASE_URL: &str = "https://example.com";

/// Files in the manager folder that are never part of the index
const UNINDEXED: &[&str] = &["index", "index.sig", "pk.pem"];

pub fn manager_url(manager: &str) -> String {
    format!("{}/{}", BASE_URL, manager)
}

pub fn manager_xml(id: &str, version: u32) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<SchemeManager version="{version}">
    <Id>{id}</Id>
    <Url>{url}</Url>
    <Name><en>{id} scheme</en><nl>{id} schema</nl></Name>
    <Description><en>Test scheme {id}</en></Description>
    <Contact>https://example.com/contact</Contact>
</SchemeManager>"#,
        version = version,
        id = id,
        url = manager_url(id),
    )
}

pub fn issuer_xml(manager: &str, issuer: &str, version: u32) -> String {
    format!(
        r#"<Issuer version="{version}">
    <ID>{issuer}</ID>
    <SchemeManager>{manager}</SchemeManager>
    <Name><en>Issuer {issuer}</en></Name>
    <ShortName><en>{issuer}</en></ShortName>
    <ContactEMail>{issuer}@example.com</ContactEMail>
</Issuer>"#,
    )
}

pub fn credential_xml(manager: &str, issuer: &str, cred: &str, version: u32) -> String {
    format!(
        r#"<IssueSpecification version="{version}">
    <Name><en>Credential {cred}</en></Name>
    <ShortName><en>{cred}</en></ShortName>
    <SchemeManager>{manager}</SchemeManager>
    <IssuerID>{issuer}</IssuerID>
    <CredentialID>{cred}</CredentialID>
    <Description><en>Test credential</en></Description>
    <Attributes>
        <Attribute id="name">
            <Name><en>Name</en></Name>
        </Attribute>
        <Attribute id="number">
            <Name><en>Number</en></Name>
        </Attribute>
    </Attributes>
</IssueSpecification>"#,
    )
}

pub fn public_key_xml(counter: u32) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<IssuerPublicKey xmlns="http://www.zurich.ibm.com/security/idemix">
    <Counter>{counter}</Counter>
    <ExpiryDate>1893456000</ExpiryDate>
    <Elements>
        <n>{n}</n>
        <Z>12345</Z>
        <S>67890</S>
        <Bases num="2">
            <Base_0>111</Base_0>
            <Base_1>222</Base_1>
        </Bases>
    </Elements>
    <Features>
        <Epoch length="432000"></Epoch>
    </Features>
</IssuerPublicKey>"#,
        counter = counter,
        n = 1000 + counter,
    )
}

pub fn write(root: &Path, rel: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Builds and signs scheme manager folders under one root
pub struct SchemeTree {
    pub root: PathBuf,
    key: SigningKey,
}

impl SchemeTree {
    pub fn new(root: PathBuf) -> Self {
        fs::create_dir_all(&root).unwrap();
        Self {
            root,
            key: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// A tree sharing this tree's signing key, e.g. for a remote copy
    pub fn with_same_key(&self, root: PathBuf) -> Self {
        fs::create_dir_all(&root).unwrap();
        Self {
            root,
            key: self.key.clone(),
        }
    }

    pub fn write(&self, rel: &str, contents: impl AsRef<[u8]>) {
        write(&self.root, rel, contents);
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        fs::read(self.root.join(rel)).unwrap()
    }

    pub fn manager(&self, id: &str) {
        self.write(&format!("{}/description.xml", id), manager_xml(id, 7));
    }

    pub fn issuer(&self, manager: &str, issuer: &str) {
        self.write(
            &format!("{}/{}/description.xml", manager, issuer),
            issuer_xml(manager, issuer, 4),
        );
    }

    pub fn credential(&self, manager: &str, issuer: &str, cred: &str) {
        self.write(
            &format!("{}/{}/Issues/{}/description.xml", manager, issuer, cred),
            credential_xml(manager, issuer, cred, 4),
        );
    }

    pub fn public_key(&self, manager: &str, issuer: &str, counter: u32) {
        self.write(
            &format!("{}/{}/PublicKeys/{}.xml", manager, issuer, counter),
            public_key_xml(counter),
        );
    }

    /// Manager `m` with issuer `i`, credential type `c` and key 0
    pub fn standard(&self, manager: &str) {
        self.manager(manager);
        self.issuer(manager, "i");
        self.credential(manager, "i", "c");
        self.public_key(manager, "i", 0);
    }

    /// Index of every file in the manager folder
    pub fn build_index(&self, manager: &str) -> SchemeManagerIndex {
        let dir = self.root.join(manager);
        let mut index = SchemeManagerIndex::new();
        for entry in WalkDir::new(&dir).min_depth(1) {
            let entry = entry.unwrap();
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&dir).unwrap();
            let rel: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let name = rel.join("/");
            if UNINDEXED.contains(&name.as_str()) || name.ends_with(".backup") {
                continue;
            }
            let contents = fs::read(entry.path()).unwrap();
            index.insert(format!("{}/{}", manager, name), FileHash::of(&contents));
        }
        index
    }

    pub fn sign_bytes(&self, message: &[u8]) -> Vec<u8> {
        let digest = Sha256::digest(message);
        let sig: Signature = self.key.sign_prehash(&digest).unwrap();
        sig.to_der().as_bytes().to_vec()
    }

    pub fn public_key_pem(&self) -> String {
        self.key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    }

    /// Write `index`, `index.sig` and `pk.pem` for the manager
    pub fn sign(&self, manager: &str) {
        let index = self.build_index(manager).serialize();
        self.write_signed_index(manager, index.as_bytes());
    }

    pub fn write_signed_index(&self, manager: &str, index: &[u8]) {
        self.write(&format!("{}/index", manager), index);
        self.write(&format!("{}/index.sig", manager), self.sign_bytes(index));
        self.write(&format!("{}/pk.pem", manager), self.public_key_pem());
    }

    /// Serve every file of the manager folder at its URL
    pub fn serve(&self, manager: &str, transport: &MockTransport) {
        let dir = self.root.join(manager);
        for entry in WalkDir::new(&dir).min_depth(1) {
            let entry = entry.unwrap();
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&dir).unwrap();
            let rel: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            transport.insert(
                format!("{}/{}", manager_url(manager), rel.join("/")),
                fs::read(entry.path()).unwrap(),
            );
        }
    }
}

/// A temp dir holding a local tree at `local/` and a configuration over it
pub struct Fixture {
    pub dir: TempDir,
    pub local: SchemeTree,
    pub transport: Arc<MockTransport>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let local = SchemeTree::new(dir.path().join("local"));
        Self {
            dir,
            local,
            transport: Arc::new(MockTransport::new()),
        }
    }

    /// A second tree for the remote side, signed with the same key
    pub fn remote(&self) -> SchemeTree {
        self.local.with_same_key(self.dir.path().join("remote"))
    }

    pub fn configuration(&self) -> Configuration {
        Configuration::with_transport(self.local.root.clone(), None, self.transport.clone())
            .unwrap()
    }

    pub fn parsed(&self) -> Configuration {
        let mut conf = self.configuration();
        conf.parse_folder().unwrap();
        conf
    }
}
