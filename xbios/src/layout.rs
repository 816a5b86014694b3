//! Layout resolver: given image size and load parameters, computes the byte
//! offsets of every nested region. Pure; no mutation.

use crate::consts::*;
use crate::error::{XbiosError, XbiosResult};

/// Absolute byte offsets of every region, measured from the start of the
/// (always 1 MiB logical) image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub image_size: usize,
    pub mcpx_offset: usize,
    pub preldr_offset: usize,
    pub preldr_params_offset: usize,
    pub preldr_digest_offset: usize,
    pub bldr_offset: usize,
    pub init_tbl_offset: usize,
}

impl Layout {
    /// Resolve region offsets for an image of `image_size` bytes. `init_tbl_offset`
    /// is taken from load parameters, or defaults to [`DEFAULT_INIT_TBL_OFFSET`].
    pub fn resolve(image_size: usize, init_tbl_offset: Option<usize>) -> XbiosResult<Layout> {
        if !ALLOWED_IMAGE_SIZES.contains(&image_size) {
            return Err(XbiosError::InvalidSize(image_size));
        }

        let top = image_size;
        let mcpx_offset = top - MCPX_BLOCK_SIZE;
        let preldr_offset = mcpx_offset - PRELDR_BLOCK_SIZE;
        let bldr_offset = preldr_offset - BLDR_BLOCK_SIZE;

        let preldr_params_offset = preldr_offset + PRELDR_SIZE;
        let preldr_digest_offset = preldr_params_offset + PRELDR_PARAMS_SIZE;

        let init_tbl_offset = init_tbl_offset.unwrap_or(DEFAULT_INIT_TBL_OFFSET);
        if init_tbl_offset >= bldr_offset {
            return Err(XbiosError::Fatal(format!(
                "init table offset {init_tbl_offset:#x} does not fit before the 2BL block at {bldr_offset:#x}"
            )));
        }

        Ok(Layout {
            image_size,
            mcpx_offset,
            preldr_offset,
            preldr_params_offset,
            preldr_digest_offset,
            bldr_offset,
            init_tbl_offset,
        })
    }

    /// Layout computed against the logical 1 MiB window, regardless of the
    /// physical buffer size a caller holds (see [`replicate`]).
    pub fn resolve_logical(init_tbl_offset: Option<usize>) -> XbiosResult<Layout> {
        Layout::resolve(LOGICAL_IMAGE_SIZE, init_tbl_offset)
    }
}

/// Tile `buf` so that it fills a logical window of `target_size` bytes.
///
/// `buf.len()` must evenly divide `target_size`; this holds for every allowed
/// image size (256K/512K both divide 1M). Idempotent: `replicate(replicate(b,
/// n), n) == replicate(b, n)`, since replicating a buffer already of length
/// `n` yields the same buffer back.
pub fn replicate(buf: &[u8], target_size: usize) -> XbiosResult<Vec<u8>> {
    if buf.is_empty() || target_size % buf.len() != 0 {
        return Err(XbiosError::Fatal(format!(
            "buffer of length {} cannot be tiled to {}",
            buf.len(),
            target_size
        )));
    }
    let mut out = Vec::with_capacity(target_size);
    while out.len() < target_size {
        out.extend_from_slice(buf);
    }
    out.truncate(target_size);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_sizes() {
        assert_eq!(Layout::resolve(300 * 1024, None), Err(XbiosError::InvalidSize(300 * 1024)));
        assert_eq!(Layout::resolve(0, None), Err(XbiosError::InvalidSize(0)));
    }

    #[test]
    fn accepts_allowed_sizes() {
        for size in ALLOWED_IMAGE_SIZES {
            assert!(Layout::resolve(size, None).is_ok());
        }
    }

    #[test]
    fn regions_nest_in_expected_order() {
        let l = Layout::resolve(IMAGE_SIZE_1M, None).unwrap();
        assert_eq!(l.mcpx_offset, IMAGE_SIZE_1M - MCPX_BLOCK_SIZE);
        assert_eq!(l.preldr_offset, l.mcpx_offset - PRELDR_BLOCK_SIZE);
        assert_eq!(l.bldr_offset, l.preldr_offset - BLDR_BLOCK_SIZE);
        assert!(l.preldr_params_offset > l.preldr_offset);
        assert!(l.preldr_digest_offset > l.preldr_params_offset);
        assert!(l.init_tbl_offset < l.bldr_offset);
    }

    #[test]
    fn replicate_is_idempotent() {
        let small = vec![1u8, 2, 3, 4];
        let once = replicate(&small, 16).unwrap();
        let twice = replicate(&once, 16).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn replicate_rejects_non_dividing_target() {
        let small = vec![1u8, 2, 3];
        assert!(replicate(&small, 16).is_err());
    }
}
