//! Typed WebHDFS JSON payloads.
//!
//! # Design
//! Field names follow the WebHDFS wire format (camelCase). Fields that older
//! or newer NameNodes may omit carry serde defaults so a response from any
//! Hadoop version decodes; unknown fields are ignored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

/// One entry of `GETFILESTATUS` / `LISTSTATUS`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    /// Empty for `GETFILESTATUS`, the child name for `LISTSTATUS`.
    #[serde(default)]
    pub path_suffix: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub permission: String,
    #[serde(default)]
    pub modification_time: u64,
    #[serde(default)]
    pub access_time: u64,
    #[serde(default)]
    pub replication: u16,
    #[serde(default)]
    pub block_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children_num: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_policy: Option<u8>,
}

impl FileStatus {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContentSummary {
    pub directory_count: u64,
    pub file_count: u64,
    pub length: u64,
    /// `-1` when no quota is set.
    #[serde(default = "no_quota")]
    pub quota: i64,
    #[serde(default)]
    pub space_consumed: u64,
    #[serde(default = "no_quota")]
    pub space_quota: i64,
}

fn no_quota() -> i64 {
    -1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileChecksum {
    pub algorithm: String,
    /// Hex encoded checksum bytes.
    pub bytes: String,
    pub length: u64,
}

// Envelopes the NameNode wraps each payload in.

#[derive(Debug, Deserialize)]
pub(crate) struct FileStatusEnvelope {
    #[serde(rename = "FileStatus")]
    pub file_status: FileStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileStatusesEnvelope {
    #[serde(rename = "FileStatuses")]
    pub file_statuses: FileStatusList,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileStatusList {
    #[serde(rename = "FileStatus", default)]
    pub file_status: Vec<FileStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentSummaryEnvelope {
    #[serde(rename = "ContentSummary")]
    pub content_summary: ContentSummary,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileChecksumEnvelope {
    #[serde(rename = "FileChecksum")]
    pub file_checksum: FileChecksum,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PathEnvelope {
    #[serde(rename = "Path")]
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_status_decodes_namenode_payload() {
        let raw = r#"{"FileStatus":{"accessTime":0,"blockSize":0,"childrenNum":1,
            "fileId":16386,"group":"supergroup","length":0,"modificationTime":1320173277227,
            "owner":"webuser","pathSuffix":"","permission":"777","replication":0,
            "storagePolicy":0,"type":"DIRECTORY"}}"#;
        let status = serde_json::from_str::<FileStatusEnvelope>(raw)
            .unwrap()
            .file_status;
        assert!(status.is_dir());
        assert_eq!(status.children_num, Some(1));
        assert_eq!(status.owner, "webuser");
    }

    #[test]
    fn file_status_tolerates_missing_optional_fields() {
        let status: FileStatus = serde_json::from_str(r#"{"type":"FILE","length":24930}"#).unwrap();
        assert!(status.is_file());
        assert_eq!(status.length, 24930);
        assert_eq!(status.file_id, None);
    }

    #[test]
    fn empty_listing_decodes() {
        let listing: FileStatusesEnvelope =
            serde_json::from_str(r#"{"FileStatuses":{"FileStatus":[]}}"#).unwrap();
        assert!(listing.file_statuses.file_status.is_empty());
    }

    #[test]
    fn content_summary_defaults_quota() {
        let summary: ContentSummary = serde_json::from_str(
            r#"{"directoryCount":2,"fileCount":1,"length":24930}"#,
        )
        .unwrap();
        assert_eq!(summary.quota, -1);
        assert_eq!(summary.space_quota, -1);
    }

    #[test]
    fn unknown_file_type_is_rejected() {
        assert!(serde_json::from_str::<FileStatus>(r#"{"type":"PIPE"}"#).is_err());
    }
}
