// SPDX-License-Identifier: LGPL-3.0-only

pub mod alloc {
    #[must_use]
    pub fn vec_unique<T: Ord>(mut src: Vec<T>) -> Vec<T> {
        src.sort_unstable();
        src.dedup();
        src
    }
}

pub mod bytes {
    #[must_use]
    pub fn all_zero(data: &[u8]) -> bool {
        for b in data {
            if *b != 0 {
                return false;
            }
        }
        true
    }

    /// `drop_by_value` produces a copy of the data with every occurrence of the value left out.
    #[must_use]
    pub fn drop_by_value(data: &[u8], v: u8) -> Vec<u8> {
        let mut result = Vec::new();
        data.iter()
            .filter(|b| **b != v)
            .for_each(|b| result.push(*b));
        result
    }

    #[cfg(test)]
    mod tests {
        use super::{all_zero, drop_by_value};

        #[test]
        fn test_all_zero() {
            assert!(all_zero(&[]));
            assert!(all_zero(&[0, 0, 0]));
            assert!(!all_zero(&[0, 1, 0]));
        }

        #[test]
        fn test_drop_by_value() {
            assert_eq!(vec![1u8, 2, 3], drop_by_value(&[1, 0, 2, 0, 3], 0));
            assert_eq!(Vec::<u8>::new(), drop_by_value(&[0, 0], 0));
        }
    }
}

pub mod u32 {
    /// `nonzero` tests if provided value is a non-zero value. Returns `None` if it was zero or
    /// `Option<value>` if larger.
    #[must_use]
    pub fn nonzero(value: u32) -> Option<u32> {
        if value == 0 {
            None
        } else {
            Some(value)
        }
    }

    /// `verify_nonzero` verifies that `value` is non-zero or returns provided error.
    pub fn verify_nonzero<E>(value: u32, error: E) -> Result<(), E> {
        if value == 0 {
            Err(error)
        } else {
            Ok(())
        }
    }
}

pub mod biguint {
    use num_bigint::BigUint;

    /// `to_bytes_be_into` writes the big-endian representation right-aligned into `dst`.
    ///
    /// # Panics
    ///
    /// Will panic if the value does not fit the destination.
    pub fn to_bytes_be_into(dst: &mut [u8], v: &BigUint) {
        let bytes = v.to_bytes_be();
        assert!(dst.len() >= bytes.len());
        let start = dst.len() - bytes.len();
        dst[start..].copy_from_slice(&bytes);
    }

    #[cfg(test)]
    mod tests {
        use super::to_bytes_be_into;
        use num_bigint::BigUint;

        #[test]
        fn test_fixed_width_padding() {
            let mut buffer = [0xffu8; 4];
            to_bytes_be_into(&mut buffer, &BigUint::from(0x0102u16));
            assert_eq!([0u8, 0, 1, 2], buffer);
        }
    }
}
