//! Per-request parameters derived from the command options

use crate::config::{GrantPermission, RequestOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extra arguments attached to a store request.
///
/// Unset options stay `None` and are omitted when serialized, so a store
/// only ever sees parameters the user actually asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtraArgs {
    #[serde(rename = "ACL", skip_serializing_if = "Option::is_none")]
    pub acl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_full_control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_read: Option<String>,
    #[serde(rename = "GrantReadACP", skip_serializing_if = "Option::is_none")]
    pub grant_read_acp: Option<String>,
    #[serde(rename = "GrantWriteACP", skip_serializing_if = "Option::is_none")]
    pub grant_write_acp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_redirect_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_side_encryption: Option<String>,
    #[serde(rename = "SSEKMSKeyId", skip_serializing_if = "Option::is_none")]
    pub sse_kms_key_id: Option<String>,
    #[serde(rename = "SSECustomerAlgorithm", skip_serializing_if = "Option::is_none")]
    pub sse_customer_algorithm: Option<String>,
    #[serde(rename = "SSECustomerKey", skip_serializing_if = "Option::is_none")]
    pub sse_customer_key: Option<String>,
    #[serde(
        rename = "CopySourceSSECustomerAlgorithm",
        skip_serializing_if = "Option::is_none"
    )]
    pub copy_source_sse_customer_algorithm: Option<String>,
    #[serde(rename = "CopySourceSSECustomerKey", skip_serializing_if = "Option::is_none")]
    pub copy_source_sse_customer_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_directive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_payer: Option<String>,
}

/// Maps command options onto the extra arguments of each request kind.
pub struct RequestParamsMapper;

impl RequestParamsMapper {
    /// Parameters for uploading an object.
    pub fn map_put_object_params(args: &mut ExtraArgs, options: &RequestOptions) {
        Self::set_general_object_params(args, options);
        Self::set_metadata_params(args, options);
        Self::set_sse_request_params(args, options);
        Self::set_sse_c_request_params(args, options);
        Self::set_request_payer_param(args, options);
    }

    /// Parameters for downloading an object.
    pub fn map_get_object_params(args: &mut ExtraArgs, options: &RequestOptions) {
        Self::set_sse_c_request_params(args, options);
        Self::set_request_payer_param(args, options);
    }

    /// Parameters for a server-side copy.
    ///
    /// Supplying metadata without a directive implies `REPLACE`, otherwise
    /// the store would keep the source object's metadata.
    pub fn map_copy_object_params(args: &mut ExtraArgs, options: &RequestOptions) {
        Self::set_general_object_params(args, options);
        Self::set_metadata_directive_param(args, options);
        Self::set_metadata_params(args, options);
        if !args.metadata.is_empty() && args.metadata_directive.is_none() {
            args.metadata_directive = Some("REPLACE".to_string());
        }
        Self::set_sse_request_params(args, options);
        Self::set_sse_c_and_copy_source_request_params(args, options);
        Self::set_request_payer_param(args, options);
    }

    /// Parameters for deleting an object.
    pub fn map_delete_object_params(args: &mut ExtraArgs, options: &RequestOptions) {
        Self::set_request_payer_param(args, options);
    }

    fn set_general_object_params(args: &mut ExtraArgs, options: &RequestOptions) {
        args.acl = options.acl.clone();
        args.storage_class = options.storage_class.clone();
        args.website_redirect_location = options.website_redirect.clone();
        args.content_type = options.content_type.clone();
        args.cache_control = options.cache_control.clone();
        args.content_disposition = options.content_disposition.clone();
        args.content_encoding = options.content_encoding.clone();
        args.content_language = options.content_language.clone();
        args.expires = options.expires.clone();

        for grant in &options.grants {
            let slot = match grant.permission {
                GrantPermission::Read => &mut args.grant_read,
                GrantPermission::ReadAcp => &mut args.grant_read_acp,
                GrantPermission::WriteAcp => &mut args.grant_write_acp,
                GrantPermission::FullControl => &mut args.grant_full_control,
            };
            *slot = Some(grant.grantee.clone());
        }
    }

    fn set_metadata_params(args: &mut ExtraArgs, options: &RequestOptions) {
        if !options.metadata.is_empty() {
            args.metadata = options.metadata.clone();
        }
    }

    fn set_metadata_directive_param(args: &mut ExtraArgs, options: &RequestOptions) {
        if let Some(directive) = &options.metadata_directive {
            args.metadata_directive = Some(directive.clone());
        }
    }

    fn set_sse_request_params(args: &mut ExtraArgs, options: &RequestOptions) {
        if let Some(sse) = &options.sse {
            args.server_side_encryption = Some(sse.clone());
        }
        if let Some(key_id) = &options.sse_kms_key_id {
            args.sse_kms_key_id = Some(key_id.clone());
        }
    }

    fn set_sse_c_request_params(args: &mut ExtraArgs, options: &RequestOptions) {
        if let Some(algorithm) = &options.sse_c {
            args.sse_customer_algorithm = Some(algorithm.clone());
            args.sse_customer_key = options.sse_c_key.clone();
        }
    }

    fn set_sse_c_copy_source_request_params(args: &mut ExtraArgs, options: &RequestOptions) {
        if let Some(algorithm) = &options.sse_c_copy_source {
            args.copy_source_sse_customer_algorithm = Some(algorithm.clone());
            args.copy_source_sse_customer_key = options.sse_c_copy_source_key.clone();
        }
    }

    fn set_sse_c_and_copy_source_request_params(args: &mut ExtraArgs, options: &RequestOptions) {
        Self::set_sse_c_request_params(args, options);
        Self::set_sse_c_copy_source_request_params(args, options);
    }

    fn set_request_payer_param(args: &mut ExtraArgs, options: &RequestOptions) {
        if let Some(payer) = &options.request_payer {
            args.request_payer = Some(payer.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Grant;

    fn options() -> RequestOptions {
        RequestOptions {
            acl: Some("public-read".to_string()),
            storage_class: Some("STANDARD_IA".to_string()),
            sse_c: Some("AES256".to_string()),
            sse_c_key: Some("secret".to_string()),
            request_payer: Some("requester".to_string()),
            ..RequestOptions::default()
        }
    }

    #[test]
    fn test_put_params_include_general_and_sse_c() {
        let mut args = ExtraArgs::default();
        RequestParamsMapper::map_put_object_params(&mut args, &options());

        assert_eq!(args.acl.as_deref(), Some("public-read"));
        assert_eq!(args.storage_class.as_deref(), Some("STANDARD_IA"));
        assert_eq!(args.sse_customer_algorithm.as_deref(), Some("AES256"));
        assert_eq!(args.sse_customer_key.as_deref(), Some("secret"));
        assert_eq!(args.request_payer.as_deref(), Some("requester"));
    }

    #[test]
    fn test_get_params_skip_general_options() {
        let mut args = ExtraArgs::default();
        RequestParamsMapper::map_get_object_params(&mut args, &options());

        assert!(args.acl.is_none());
        assert!(args.storage_class.is_none());
        assert_eq!(args.sse_customer_algorithm.as_deref(), Some("AES256"));
    }

    #[test]
    fn test_delete_params_only_carry_request_payer() {
        let mut args = ExtraArgs::default();
        RequestParamsMapper::map_delete_object_params(&mut args, &options());

        let expected = ExtraArgs {
            request_payer: Some("requester".to_string()),
            ..ExtraArgs::default()
        };
        assert_eq!(args, expected);
    }

    #[test]
    fn test_copy_with_metadata_defaults_directive_to_replace() {
        let mut opts = RequestOptions::default();
        opts.metadata.insert("team".to_string(), "infra".to_string());
        let mut args = ExtraArgs::default();
        RequestParamsMapper::map_copy_object_params(&mut args, &opts);

        assert_eq!(args.metadata_directive.as_deref(), Some("REPLACE"));
        assert_eq!(args.metadata.get("team").map(String::as_str), Some("infra"));
    }

    #[test]
    fn test_copy_keeps_explicit_directive() {
        let mut opts = RequestOptions::default();
        opts.metadata.insert("team".to_string(), "infra".to_string());
        opts.metadata_directive = Some("COPY".to_string());
        let mut args = ExtraArgs::default();
        RequestParamsMapper::map_copy_object_params(&mut args, &opts);

        assert_eq!(args.metadata_directive.as_deref(), Some("COPY"));
    }

    #[test]
    fn test_copy_maps_source_customer_key() {
        let opts = RequestOptions {
            sse_c_copy_source: Some("AES256".to_string()),
            sse_c_copy_source_key: Some("old".to_string()),
            ..RequestOptions::default()
        };
        let mut args = ExtraArgs::default();
        RequestParamsMapper::map_copy_object_params(&mut args, &opts);

        assert_eq!(args.copy_source_sse_customer_algorithm.as_deref(), Some("AES256"));
        assert_eq!(args.copy_source_sse_customer_key.as_deref(), Some("old"));
        assert!(args.sse_customer_algorithm.is_none());
    }

    #[test]
    fn test_grants_map_to_their_slots() {
        let opts = RequestOptions {
            grants: vec![
                "read=uri=http://acs.example/groups/AllUsers"
                    .parse::<Grant>()
                    .expect("read grant parses"),
                "full=id=owner".parse::<Grant>().expect("full grant parses"),
            ],
            ..RequestOptions::default()
        };
        let mut args = ExtraArgs::default();
        RequestParamsMapper::map_put_object_params(&mut args, &opts);

        assert_eq!(
            args.grant_read.as_deref(),
            Some("uri=http://acs.example/groups/AllUsers")
        );
        assert_eq!(args.grant_full_control.as_deref(), Some("id=owner"));
        assert!(args.grant_write_acp.is_none());
    }

    #[test]
    fn test_serialization_omits_unset_options() {
        let args = ExtraArgs {
            sse_kms_key_id: Some("key".to_string()),
            ..ExtraArgs::default()
        };
        let json = serde_json::to_string(&args).expect("serialize args");
        assert_eq!(json, r#"{"SSEKMSKeyId":"key"}"#);
    }
}
