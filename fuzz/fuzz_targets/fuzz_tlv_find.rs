// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use mud_forwarder::tlv::{find, TlvCursor};

fuzz_target!(|data: &[u8]| {
    let Some((&tag, chain)) = data.split_first() else {
        return;
    };

    if let Some(tlv) = find(tag, chain) {
        assert_eq!(tlv.tag, tag);
        let start = tlv.value.as_ptr() as usize - chain.as_ptr() as usize;
        assert!(start + tlv.len() <= chain.len());
    }

    // Walk the whole chain: offsets must be strictly increasing and in bounds.
    let mut cursor = TlvCursor::new(chain);
    let mut last = None;
    while let Some(tlv) = cursor.next() {
        assert!(last.map_or(true, |prev| tlv.offset > prev));
        assert!(tlv.offset < chain.len());
        last = Some(tlv.offset);
    }
    assert_eq!(cursor.remaining(), 0);
});
