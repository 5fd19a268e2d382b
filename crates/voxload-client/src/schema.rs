//! Request and response bodies of the participant API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use voxload_core::UploadTicket;

/// Storage form fields in the order the pre-signed POST expects them.
pub const STORAGE_FIELD_ORDER: [&str; 6] = [
    "acl",
    "Content-Type",
    "key",
    "AWSAccessKeyId",
    "policy",
    "signature",
];

#[derive(Debug, Serialize)]
pub struct InitiateRequest<'a> {
    pub name: &'a str,
    pub pin: &'a str,
    pub tag_id_list: Vec<String>,
    pub user_agent: &'a str,
    pub source: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct InitiateResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl InitiateResponse {
    pub fn into_id(self) -> Option<String> {
        self.id
            .or(self.conversation_id)
            .filter(|id| !id.trim().is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct UploadUrlRequest<'a> {
    pub filename: &'a str,
    pub content_type: &'a str,
    pub conversation_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct UploadUrlResponse {
    pub chunk_id: String,
    pub upload_url: String,
    pub fields: BTreeMap<String, String>,
    pub file_url: String,
}

impl From<UploadUrlResponse> for UploadTicket {
    fn from(r: UploadUrlResponse) -> Self {
        UploadTicket {
            chunk_id: r.chunk_id,
            upload_url: r.upload_url,
            form_fields: r.fields,
            file_url: r.file_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfirmUploadRequest<'a> {
    pub chunk_id: &'a str,
    pub file_url: &'a str,
    pub timestamp: &'a str,
    pub source: &'a str,
}

/// Known storage fields first (those present), then the rest in key order.
pub fn ordered_form_fields(fields: &BTreeMap<String, String>) -> Vec<(&str, &str)> {
    let known = STORAGE_FIELD_ORDER
        .iter()
        .filter_map(|name| fields.get_key_value(*name));
    let extra = fields
        .iter()
        .filter(|(name, _)| !STORAGE_FIELD_ORDER.contains(&name.as_str()));
    known
        .chain(extra)
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}
