//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

pub const MANIFEST: &str = r#"{
  "packId": "starter-vpc-cloudtrail",
  "title": "Starter VPC + CloudTrail",
  "files": [
    {"path": "logs/vpc/flows.csv", "format": "csv", "source": "vpc_flow"},
    {"path": "logs/cloudtrail/events.json", "format": "jsonl", "source": "cloudtrail"}
  ]
}"#;

pub const FLOWS: &str = "srcaddr,dstaddr,bytes,packets,action\n\
10.0.0.1,10.0.0.9,100,1,REJECT\n\
10.0.0.1,10.0.0.9,200,2,REJECT\n\
10.0.0.2,10.0.0.9,300,3,ACCEPT\n";

pub const EVENTS: &str = concat!(
    r#"{"eventTime":"2024-09-01T00:00:00Z","eventName":"CreateUser","sourceIPAddress":"1.2.3.4","awsRegion":"us-east-1","userIdentity":{"userName":"alice"}}"#,
    "\n",
    r#"{"eventTime":"2024-09-01T01:00:00Z","eventName":"ListBuckets","sourceIPAddress":"1.2.3.5","awsRegion":"us-east-1","userIdentity":{"userName":"bob"}}"#,
    "\n",
);

fn gzip(tar: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(tar).unwrap();
    encoder.finish().unwrap()
}

/// Build a gzip-compressed tar holding `members`
pub fn pack(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    gzip(&builder.into_inner().unwrap())
}

/// Like [`pack`], but member names are written verbatim, so `./` survives
pub fn pack_verbatim(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in members {
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..path.len()].copy_from_slice(path.as_bytes());
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, *data).unwrap();
    }
    gzip(&builder.into_inner().unwrap())
}

/// Manifest plus one VPC flow file and one CloudTrail file
pub fn starter_pack() -> Vec<u8> {
    pack(&[
        ("manifest.json", MANIFEST.as_bytes()),
        ("logs/vpc/flows.csv", FLOWS.as_bytes()),
        ("logs/cloudtrail/events.json", EVENTS.as_bytes()),
    ])
}

pub fn cloudtrail_only_pack() -> Vec<u8> {
    pack(&[
        ("manifest.json", MANIFEST.as_bytes()),
        ("logs/cloudtrail/events.json", EVENTS.as_bytes()),
    ])
}
