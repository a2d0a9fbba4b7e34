// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use mud_forwarder::notification::{decode, MAX_FIELD_LEN};

fuzz_target!(|data: &[u8]| {
    let decoded = decode(data);

    if let Some(url) = decoded.mud_url {
        assert!(url.len() <= MAX_FIELD_LEN);
    }
    if let Some(address) = decoded.device_address {
        assert!(address.len() <= MAX_FIELD_LEN);
    }
    assert_eq!(decoded.is_complete(), decoded.issues.iter().all(|i| !matches!(
        i,
        mud_forwarder::DecodeIssue::UrlMissing
            | mud_forwarder::DecodeIssue::AddressMissing
            | mud_forwarder::DecodeIssue::UrlOversize { .. }
            | mud_forwarder::DecodeIssue::AddressOversize { .. }
    )));
});
