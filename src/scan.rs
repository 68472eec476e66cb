/// Counts the bytes equal to zero, reading every byte once.
pub fn count_zeroes(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_view_has_no_zeroes() {
        assert_eq!(count_zeroes(&[]), 0);
    }

    #[test]
    fn counts_exactly() {
        assert_eq!(count_zeroes(&[0, 1, 0, 255, 0]), 3);
        assert_eq!(count_zeroes(&[0; 4096]), 4096);
        assert_eq!(count_zeroes(&[9; 4096]), 0);
    }

    #[test]
    fn order_does_not_matter() {
        let mut bytes: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let expected = count_zeroes(&bytes);
        assert_eq!(expected, 40);

        bytes.sort_unstable();
        assert_eq!(count_zeroes(&bytes), expected);
        bytes.reverse();
        assert_eq!(count_zeroes(&bytes), expected);
    }
}
