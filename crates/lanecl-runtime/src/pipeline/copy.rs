use lanecl_common::{Element, FloatElement};

use crate::GlobalTensor;

/// Moves `len` elements starting at `offset` into the front of `dst`, one transfer block of
/// `block` elements at a time.
///
/// With `ALIGNED`, `len` must be a whole number of blocks. Otherwise the trailing partial block
/// is moved on its own and `dst` is zero-padded up to the next block boundary.
pub fn copy_in<E: Element, const ALIGNED: bool>(
    src: &GlobalTensor<E>,
    offset: usize,
    len: usize,
    dst: &mut [E],
    block: usize,
) {
    let block = block.max(1);
    let whole = if ALIGNED {
        debug_assert_eq!(len % block, 0, "Aligned copy of a partial block");
        len
    } else {
        len - len % block
    };

    for start in (0..whole).step_by(block) {
        src.read_into(offset + start, &mut dst[start..start + block]);
    }

    if !ALIGNED && whole < len {
        src.read_into(offset + whole, &mut dst[whole..len]);
        let padded = len.next_multiple_of(block).min(dst.len());
        dst[len..padded].fill(E::default());
    }
}

/// Writes the first `len` elements of `src` to global memory at `offset`, one block at a time.
///
/// The padded path never writes past `len`, so it is safe next to rows owned by other lanes.
pub fn copy_out<E: Element, const ALIGNED: bool>(
    src: &[E],
    dst: &GlobalTensor<E>,
    offset: usize,
    len: usize,
    block: usize,
) {
    let block = block.max(1);
    let whole = if ALIGNED {
        debug_assert_eq!(len % block, 0, "Aligned copy of a partial block");
        len
    } else {
        len - len % block
    };

    for start in (0..whole).step_by(block) {
        dst.write_from(offset + start, &src[start..start + block]);
    }

    if !ALIGNED && whole < len {
        dst.write_from(offset + whole, &src[whole..len]);
    }
}

/// Adds the first `len` elements of `src` to global memory at `offset` with atomic adds.
pub fn accumulate_out<F: FloatElement>(
    src: &[F],
    dst: &GlobalTensor<F>,
    offset: usize,
    len: usize,
) {
    dst.accumulate_from(offset, &src[..len]);
}
