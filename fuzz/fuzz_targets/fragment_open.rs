#![no_main]

use heirloom_core::{AesGcmFragmentCipher, Fragment, FragmentCipher, FragmentId, PartyId, VaultId};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary blobs must fail cleanly, never panic.
    let cipher = AesGcmFragmentCipher::new([0x5a; 32]);
    let fragment = Fragment {
        id: FragmentId::new("frag_fuzz"),
        vault_id: VaultId::new("vault_fuzz"),
        holder_party_id: PartyId::new("party_fuzz"),
        share_index: data.first().copied().unwrap_or(1),
        scheme_threshold: 2,
        scheme_total: 3,
        encrypted_share_blob: data.to_vec(),
    };
    let _ = cipher.open(&fragment);
});
