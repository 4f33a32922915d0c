//! Secret carrying the generated document.

use super::child_metadata;
use crate::constants::DOCUMENT_KEY;
use crate::crd::Invoice;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

pub(super) fn data_carrier(invoice: &Invoice, document: &[u8]) -> Secret {
    Secret {
        metadata: child_metadata(invoice),
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::from([(
            DOCUMENT_KEY.to_string(),
            ByteString(document.to_vec()),
        )])),
        ..Secret::default()
    }
}
