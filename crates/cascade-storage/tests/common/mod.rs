//! Synthetic CASC builds for storage tests
//!
//! A [`Build`] encodes a set of files into BLTE blobs, an encoding table, a
//! root table, one archive with its `.index`, and the two config files. It
//! can be written out as a local installation or served from a mock CDN.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use cascade_crypto::{ContentKey, EncodingKey, name_hash};
use cascade_formats::blte::{BlockKind, BlteBuilder, EncryptionSpec};
use cascade_formats::encoding::EncodingBuilder;
use cascade_formats::index::{
    ArchiveIndexRecord, LocalIndexRecord, write_archive_index, write_local_index,
};
use cascade_formats::root::{ContentFlags, LocaleFlags, RootBuilder};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const ENCRYPTION_KEY_NAME: u64 = 0x1122_3344_5566_7788;
pub const ENCRYPTION_KEY: [u8; 16] = [0x5A; 16];
pub const BUILD_NAME: &str = "WOW-12345patch9.9.9";
pub const CDN_PATH: &str = "tpr/wow";
pub const LOCAL_HEADER_SIZE: usize = 30;

#[derive(Debug, Clone)]
pub struct TestFile {
    pub name: &'static str,
    pub fdid: i32,
    pub data: Vec<u8>,
    pub encrypted: bool,
    pub loose: bool,
    pub stale_key: bool,
}

impl TestFile {
    pub fn new(name: &'static str, fdid: i32, data: &[u8]) -> Self {
        Self {
            name,
            fdid,
            data: data.to_vec(),
            encrypted: false,
            loose: false,
            stale_key: false,
        }
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Served from the CDN `data/` directory instead of an archive
    pub fn loose(mut self) -> Self {
        self.loose = true;
        self
    }

    /// Listed in the encoding table behind an extra key whose local index
    /// entry points into a missing archive
    pub fn with_stale_key(mut self) -> Self {
        self.stale_key = true;
        self
    }

    pub fn stale_ekey(&self) -> EncodingKey {
        EncodingKey::from_data(self.name.as_bytes())
    }

    pub fn ckey(&self) -> ContentKey {
        ContentKey::from_data(&self.data)
    }

    fn encode(&self) -> Vec<u8> {
        if self.encrypted {
            let spec = EncryptionSpec::salsa20(ENCRYPTION_KEY_NAME, [0x0B, 0xAD, 0xF0, 0x0D]);
            BlteBuilder::new()
                .add_encrypted(spec, &ENCRYPTION_KEY, BlockKind::Deflate, &self.data)
                .expect("Operation should succeed")
                .build()
        } else if self.data.len() > 64 {
            let (head, tail) = self.data.split_at(self.data.len() / 2);
            BlteBuilder::new()
                .add_stored(head)
                .add_deflate(tail)
                .expect("Operation should succeed")
                .build()
        } else {
            BlteBuilder::new()
                .add_stored(&self.data)
                .build_single()
                .expect("One block was added")
        }
    }
}

pub fn default_files() -> Vec<TestFile> {
    vec![
        TestFile::new("Interface/Icons/Sword.blp", 100, b"sword icon bytes"),
        TestFile::new(
            "World/Maps/Azeroth/Azeroth.wdt",
            200,
            &b"map data ".repeat(500),
        ),
        TestFile::new("DBFilesClient/Secret.db2", 300, b"classified").encrypted(),
        TestFile::new("Sound/Music/Theme.mp3", 400, b"loose music file").loose(),
    ]
}

#[derive(Debug, Clone)]
pub struct Blob {
    pub ekey: EncodingKey,
    pub blte: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Build {
    pub files: Vec<TestFile>,
    pub archived: Vec<Blob>,
    pub loose: Vec<Blob>,
    pub build_config: Vec<u8>,
    pub build_key: String,
    pub cdn_config: Vec<u8>,
    pub cdn_key: String,
    pub archive_name: String,
    pub archive: Vec<u8>,
    pub archive_index: Vec<u8>,
}

fn md5_hex(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

impl Build {
    pub fn new(files: Vec<TestFile>) -> Self {
        let mut archived = Vec::new();
        let mut loose = Vec::new();
        let mut encoding = EncodingBuilder::new();
        let mut root_records = Vec::new();

        for file in &files {
            let blte = file.encode();
            let ekey = EncodingKey::from_data(&blte);
            let ekeys = if file.stale_key {
                vec![file.stale_ekey(), ekey]
            } else {
                vec![ekey]
            };
            encoding = encoding.add(file.ckey(), file.data.len() as u64, ekeys);
            root_records.push((file.fdid, file.ckey(), name_hash(file.name)));

            let blob = Blob { ekey, blte };
            if file.loose {
                loose.push(blob);
            } else {
                archived.push(blob);
            }
        }

        let root = RootBuilder::new()
            .add_block(
                ContentFlags::default(),
                LocaleFlags::new(LocaleFlags::ENUS),
                &root_records,
            )
            .build();
        let root_ckey = ContentKey::from_data(&root);
        let root_blte = BlteBuilder::new()
            .add_deflate(&root)
            .expect("Operation should succeed")
            .build();
        let root_ekey = EncodingKey::from_data(&root_blte);
        encoding = encoding.add(root_ckey, root.len() as u64, vec![root_ekey]);
        archived.push(Blob {
            ekey: root_ekey,
            blte: root_blte,
        });

        let encoding = encoding.build();
        let encoding_ckey = ContentKey::from_data(&encoding);
        let encoding_blte = BlteBuilder::new()
            .add_deflate(&encoding)
            .expect("Operation should succeed")
            .build();
        let encoding_ekey = EncodingKey::from_data(&encoding_blte);
        archived.push(Blob {
            ekey: encoding_ekey,
            blte: encoding_blte,
        });

        let mut archive = Vec::new();
        let mut records = Vec::new();
        for blob in &archived {
            records.push(ArchiveIndexRecord {
                key: *blob.ekey.as_bytes(),
                size: blob.blte.len() as u32,
                offset: archive.len() as u32,
            });
            archive.extend_from_slice(&blob.blte);
        }
        let archive_index = write_archive_index(&records);
        let archive_name = md5_hex(&archive);

        let build_config = format!(
            "# Build Configuration\n\nroot = {root_ckey}\nencoding = {encoding_ckey} {encoding_ekey}\nbuild-name = {BUILD_NAME}\n"
        )
        .into_bytes();
        let cdn_config = format!("# CDN Configuration\n\narchives = {archive_name}\n").into_bytes();

        Self {
            files,
            archived,
            loose,
            build_key: md5_hex(&build_config),
            build_config,
            cdn_key: md5_hex(&cdn_config),
            cdn_config,
            archive_name,
            archive,
            archive_index,
        }
    }

    pub fn file(&self, name: &str) -> &TestFile {
        self.files
            .iter()
            .find(|file| file.name == name)
            .expect("File should be part of the build")
    }

    pub fn build_info(&self, hosts: &str) -> String {
        format!(
            "Branch!STRING:0|Active!DEC:1|Build Key!HEX:16|CDN Key!HEX:16|CDN Path!STRING:0|CDN Hosts!STRING:0|Version!STRING:0|Product!STRING:0\n\
             ## seqn = 1\n\
             us|1|{}|{}|{CDN_PATH}|{hosts}|9.9.9.12345|wow\n",
            self.build_key, self.cdn_key
        )
    }

    /// Write a local installation under `base`
    pub fn install(&self, base: &Path) {
        fs::write(base.join(".build.info"), self.build_info("cdn.invalid"))
            .expect("Operation should succeed");

        for (key, body) in [
            (&self.build_key, &self.build_config),
            (&self.cdn_key, &self.cdn_config),
        ] {
            write_config(base, key, body);
        }

        let indices = base.join("Data").join("indices");
        fs::create_dir_all(&indices).expect("Operation should succeed");
        fs::write(
            indices.join(format!("{}.index", self.archive_name)),
            &self.archive_index,
        )
        .expect("Operation should succeed");

        let data_dir = base.join("Data").join("data");
        fs::create_dir_all(&data_dir).expect("Operation should succeed");

        let mut archive = Vec::new();
        let mut records = Vec::new();
        for blob in &self.archived {
            let entry_size = LOCAL_HEADER_SIZE + blob.blte.len();
            records.push(LocalIndexRecord::new(
                blob.ekey.truncated(),
                0,
                archive.len() as u32,
                entry_size as u32,
            ));
            archive.extend_from_slice(&[0xCC; LOCAL_HEADER_SIZE]);
            archive.extend_from_slice(&blob.blte);
        }
        fs::write(data_dir.join("data.000"), archive).expect("Operation should succeed");

        // data.001 is never written
        for file in self.files.iter().filter(|file| file.stale_key) {
            records.push(LocalIndexRecord::new(file.stale_ekey().truncated(), 1, 0, 64));
        }

        let mut idx = Cursor::new(Vec::new());
        write_local_index(&mut idx, 0, &records).expect("Operation should succeed");
        fs::write(data_dir.join("0000000001.idx"), idx.into_inner())
            .expect("Operation should succeed");
    }

    /// Serve configs, the archive index, the archive and loose files
    pub async fn mount(&self, server: &MockServer) {
        serve(server, "config", &self.build_key, self.build_config.clone()).await;
        serve(server, "config", &self.cdn_key, self.cdn_config.clone()).await;
        serve(
            server,
            "data",
            &format!("{}.index", self.archive_name),
            self.archive_index.clone(),
        )
        .await;

        Mock::given(method("GET"))
            .and(path(cdn_path("data", &self.archive_name)))
            .respond_with(RangeResponder(self.archive.clone()))
            .mount(server)
            .await;

        for blob in &self.loose {
            serve(server, "data", &blob.ekey.to_hex(), blob.blte.clone()).await;
        }
    }
}

pub fn write_config(base: &Path, key: &str, body: &[u8]) {
    let dir = base.join("Data").join("config").join(&key[0..2]).join(&key[2..4]);
    fs::create_dir_all(&dir).expect("Operation should succeed");
    fs::write(dir.join(key), body).expect("Operation should succeed");
}

pub fn cdn_path(kind: &str, name: &str) -> String {
    format!("/{CDN_PATH}/{kind}/{}/{}/{name}", &name[0..2], &name[2..4])
}

pub async fn serve(server: &MockServer, kind: &str, name: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(cdn_path(kind, name)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// Answers `Range: bytes=a-b` with 206, anything else with the whole body
pub struct RangeResponder(pub Vec<u8>);

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let range = request
            .headers
            .get("range")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_range);

        match range {
            Some((start, end)) if start <= end && end < self.0.len() => {
                ResponseTemplate::new(206).set_body_bytes(self.0[start..=end].to_vec())
            }
            _ => ResponseTemplate::new(200).set_body_bytes(self.0.clone()),
        }
    }
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("Operation should succeed")
}

pub fn host(server: &MockServer) -> String {
    server.address().to_string()
}
