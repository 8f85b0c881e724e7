// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

use num_traits::PrimInt;

/// Calculate the amount of padding that needs to be added to align the
/// specified offset to a block boundary.
pub fn calc<N: PrimInt>(offset: N, block_size: N) -> N {
    let r = offset % block_size;
    if r == N::zero() {
        N::zero()
    } else {
        block_size - r
    }
}

/// Round to the next multiple of the block size.
pub fn round<N: PrimInt>(offset: N, block_size: N) -> Option<N> {
    let remain = calc(offset, block_size);
    offset.checked_add(&remain)
}

pub trait ZeroPadding {
    /// Trim trailing zeros. Intermediate zeros before the last non-zero byte
    /// are kept.
    fn trim_end_padding(&self) -> &[u8];

    /// Return the slice as an array padded with zeros at the end.
    fn to_padded_array<const N: usize>(&self) -> Option<[u8; N]>;
}

impl ZeroPadding for [u8] {
    fn trim_end_padding(&self) -> &[u8] {
        let first_ending_zero = self
            .iter()
            .rposition(|b| *b != 0)
            .map(|pos| pos + 1)
            .unwrap_or_default();

        &self[..first_ending_zero]
    }

    fn to_padded_array<const N: usize>(&self) -> Option<[u8; N]> {
        if self.len() > N {
            return None;
        }

        let mut result = [0u8; N];
        result[..self.len()].copy_from_slice(self);

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_block() {
        assert_eq!(round(0u64, 512), Some(0));
        assert_eq!(round(1u64, 512), Some(512));
        assert_eq!(round(512u64, 512), Some(512));
        assert_eq!(round(513u64, 512), Some(1024));
        assert_eq!(round(u64::MAX, 512), None);
    }

    #[test]
    fn zero_padding() {
        assert_eq!(b"foo\0bar\0\0".trim_end_padding(), b"foo\0bar");
        assert_eq!(b"\0\0\0".trim_end_padding(), b"");
        assert_eq!(b"ab".to_padded_array::<4>(), Some(*b"ab\0\0"));
        assert_eq!(b"abcde".to_padded_array::<4>(), None);
    }
}
