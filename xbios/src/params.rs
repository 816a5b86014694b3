//! Configuration surfaces, with every default value enumerated explicitly
//! rather than left to zero-initialization.

use serde::{Deserialize, Serialize};

/// The MCPX ROM version supplying the secret boot key. v1.0 implies no preldr
/// is expected; v1.1 implies one is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MCPXVersion {
    V1_0,
    V1_1,
}

impl Default for MCPXVersion {
    fn default() -> Self {
        MCPXVersion::V1_1
    }
}

/// Parameters that drive a `load` (parse) pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadParams {
    /// Physical size of the supplied buffer, before logical replication.
    pub romsize: usize,
    /// Explicit bldr key, used when no preldr is present or decoding it failed.
    pub bldr_key: Option<[u8; 20]>,
    /// Explicit kernel key, used when `KD_DELAY_FLAG` is set in boot params.
    pub kernel_key: Option<[u8; 20]>,
    pub mcpx: MCPXVersion,
    /// Whether the 2BL block is currently ciphertext on disk. Set false for
    /// an image that's already been decrypted (e.g. a prior `extract` dump)
    /// to skip re-decrypting it.
    pub enc_bldr: bool,
    /// Whether the compressed kernel and kernel-data regions are currently
    /// ciphertext on disk. Same meaning as `enc_bldr`, for the kernel layer.
    pub enc_kernel: bool,
    /// After decode, restore the boot-params region to its original on-disk bytes.
    pub restore_boot_params: bool,
}

impl Default for LoadParams {
    /// Every field enumerated explicitly rather than relying on
    /// bool-defaults-to-false: a freshly dumped retail image
    /// has its 2BL and kernel layers encrypted, so both flags default to
    /// `true`.
    fn default() -> Self {
        LoadParams {
            romsize: 0,
            bldr_key: None,
            kernel_key: None,
            mcpx: MCPXVersion::default(),
            enc_bldr: true,
            enc_kernel: true,
            restore_boot_params: false,
        }
    }
}

/// Synthesis flags for `build`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildParams {
    /// Embed the boot-from-media key into the 2BL keys struct.
    pub bfm: bool,
    /// Skip init-table checksum fixup.
    pub hackinittbl: bool,
    /// Leave boot-params signature as-is rather than writing the canonical value.
    pub hacksignature: bool,
    /// Do not write the boot-params block at all.
    pub nobootparams: bool,
    /// Zero the in-image kernel key (use external only).
    pub zero_kernel_key: bool,
    /// Recompute and embed the SHA-1 digest of the 2BL into the ROM digest region.
    pub fix2bldigest: bool,
    /// Encrypt the 2BL under `bldr_key` after assembly.
    pub enc_bldr: bool,
    /// Encrypt compressed kernel and kernel data under their keys after assembly.
    pub enc_kernel: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcpx_default_is_v1_1() {
        assert_eq!(MCPXVersion::default(), MCPXVersion::V1_1);
    }

    #[test]
    fn load_params_default_has_no_keys() {
        let p = LoadParams::default();
        assert!(p.bldr_key.is_none());
        assert!(p.kernel_key.is_none());
        assert_eq!(p.romsize, 0);
        assert!(p.enc_bldr);
        assert!(p.enc_kernel);
    }

    #[test]
    fn build_params_round_trip_json() {
        let p = BuildParams { fix2bldigest: true, enc_bldr: true, ..Default::default() };
        let json = serde_json::to_string(&p).unwrap();
        let back: BuildParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back.fix2bldigest, true);
        assert_eq!(back.enc_bldr, true);
        assert_eq!(back.bfm, false);
    }
}
