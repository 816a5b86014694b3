//! Bit-exact constants for the layered BIOS image codec.

/// Boot-params signature, little-endian bytes `0x7854794A` ("JyTx").
pub const BLDR_BOOT_PARAMS_SIGNATURE: u32 = 2_018_801_994;

/// Size of the MCPX block, the final region of the image.
pub const MCPX_BLOCK_SIZE: usize = 0x200;

/// Size of the preldr block.
pub const PRELDR_BLOCK_SIZE: usize = 0x2A00;

/// Size of the 2BL block.
pub const BLDR_BLOCK_SIZE: usize = 0x6000;

/// Size of the ROM digest region at the top of the preldr block.
pub const ROM_DIGEST_SIZE: usize = 0x100;

/// Size of the preldr parameter struct.
pub const PRELDR_PARAMS_SIZE: usize = 0x80;

/// Size of the preldr code region: block minus digest minus params.
pub const PRELDR_SIZE: usize = PRELDR_BLOCK_SIZE - ROM_DIGEST_SIZE - PRELDR_PARAMS_SIZE;

/// Size of the preldr nonce embedded in the parameter struct.
pub const PRELDR_NONCE_SIZE: usize = 0x10;

/// High bit of the boot-params kernel-key word: kernel key supplied externally.
pub const KD_DELAY_FLAG: u32 = 0x8000_0000;

/// Length, in bytes, of the derived bldr/kernel/kernel-data keys (SHA-1 output size).
pub const KEY_SIZE: usize = 20;

/// RSA public key bit length embedded in the preldr.
pub const RSA_KEY_BITS: usize = 2048;

/// RSA public exponent embedded in the preldr.
pub const RSA_EXPONENT: u32 = 0x10001;

/// Fixed mask XORed byte-wise across the obfuscated RSA modulus.
///
/// Mirrors the public-key "unscrambling" constant used by retail preldr images;
/// re-applying it recovers the real modulus bytes.
pub const RSA_KEY_MASK: u8 = 0xAC;

/// Microsoft CAPI `PUBLICKEYSTRUC`/`RSAPUBKEY` magic ("RSA1"), used to sanity
/// check the recovered public-key header before trusting its fields.
pub const RSA_KEY_MAGIC: u32 = 0x3141_5352;

/// Size of the plaintext public-key header: magic, bit length, exponent, reserved.
pub const RSA_KEY_HEADER_SIZE: usize = 16;

/// Size of the (masked) RSA modulus: `RSA_KEY_BITS / 8`.
pub const RSA_MODULUS_SIZE: usize = RSA_KEY_BITS / 8;

/// Total size of the embedded public key blob within the preldr code region.
pub const RSA_KEY_BLOB_SIZE: usize = RSA_KEY_HEADER_SIZE + RSA_MODULUS_SIZE;

/// Offset of the embedded public key blob, relative to the start of the
/// preldr code region: the last `RSA_KEY_BLOB_SIZE` bytes of that region.
/// Fixed here as a trailing data blob, since the region ahead of it is
/// executable code reached only via the jump/function pointers.
pub const PRELDR_PUBKEY_OFFSET: usize = PRELDR_SIZE - RSA_KEY_BLOB_SIZE;

/// Alignment, in bytes, of the function-pointer block relative to the
/// pointer block it follows.
pub const PRELDR_PTR_ALIGN: usize = 16;

/// Entry point for an optional preldr attack-recovery hook. Not exposed by
/// any public header; kept as a named constant and not otherwise consulted.
pub const PRELDR_TEA_ATTACK_ENTRY_POINT: u32 = 0x007f_d588;

/// Default init-table offset, used when load params don't override it.
pub const DEFAULT_INIT_TBL_OFFSET: usize = 0x2000;

// ---- 2BL (second-stage boot loader) internal layout, relative to the start
// ---- of the 2BL block. The header occupies a fixed prefix; the remainder
// ---- of the block is loader code plus the compressed kernel and
// ---- kernel-data section, located via `boot_params.kernel_offset`.

/// Boot-params struct: signature, bldr_size, krnl_size, krnl_data_size,
/// romsize, kernel_offset, kernel_key_flags, reserved -- 8 little-endian u32s.
pub const BLDR_BOOT_PARAMS_OFFSET: usize = 0x00;
pub const BLDR_BOOT_PARAMS_SIZE: usize = 0x20;

/// Entry descriptor: entry_point, stack_top -- 2 little-endian u32s.
pub const BLDR_ENTRY_OFFSET: usize = BLDR_BOOT_PARAMS_OFFSET + BLDR_BOOT_PARAMS_SIZE;
pub const BLDR_ENTRY_SIZE: usize = 0x08;

/// Keys struct: kernel_key[20], kernel_data_key[20], bfm_key[20].
pub const BLDR_KEYS_OFFSET: usize = BLDR_ENTRY_OFFSET + BLDR_ENTRY_SIZE;
pub const BLDR_KEYS_SIZE: usize = KEY_SIZE * 3;

/// Loader params: load_address, entry_flags -- 2 little-endian u32s.
pub const BLDR_LOADER_PARAMS_OFFSET: usize = BLDR_KEYS_OFFSET + BLDR_KEYS_SIZE;
pub const BLDR_LOADER_PARAMS_SIZE: usize = 0x08;

/// Start of 2BL loader code / compressed-kernel region, after the fixed header.
pub const BLDR_HEADER_SIZE: usize = BLDR_LOADER_PARAMS_OFFSET + BLDR_LOADER_PARAMS_SIZE;

/// Bytes reserved at the tail of the 2BL block that `bldr_size +
/// krnl_data_size` must not encroach on.
pub const BLDR_RESERVED_TAIL: usize = 0x100;

/// Allowed physical image sizes.
pub const IMAGE_SIZE_256K: usize = 256 * 1024;
pub const IMAGE_SIZE_512K: usize = 512 * 1024;
pub const IMAGE_SIZE_1M: usize = 1024 * 1024;

pub const ALLOWED_IMAGE_SIZES: [usize; 3] = [IMAGE_SIZE_256K, IMAGE_SIZE_512K, IMAGE_SIZE_1M];

/// Logical image size as seen by the CPU; smaller files are tiled replicas of this window.
pub const LOGICAL_IMAGE_SIZE: usize = IMAGE_SIZE_1M;
