//! Combinadic ranking of same-kind piece groups.
//!
//! A group of `n` indistinguishable pieces on squares `p0 < p1 < ... <
//! p(n-1)` ranks as `sum C(pi, i + 1)`; the inverse is the greedy
//! combinadic decomposition.

/// `C(n, k)` for `n <= 64`, `k <= 4`, built at compile time.
const CHOOSE: [[u64; 5]; 65] = {
    let mut table = [[0u64; 5]; 65];
    let mut n = 0;
    while n <= 64 {
        table[n][0] = 1;
        let mut k = 1;
        while k <= 4 {
            table[n][k] = if k > n {
                0
            } else {
                table[n - 1][k - 1] + table[n - 1][k]
            };
            k += 1;
        }
        n += 1;
    }
    table
};

/// Binomial coefficient `C(n, k)` for the supported group sizes.
#[inline]
pub fn choose(n: usize, k: usize) -> u64 {
    CHOOSE[n][k]
}

/// Number of placements of `count` pieces on `squares` squares.
#[inline]
pub fn group_size(squares: usize, count: usize) -> u64 {
    choose(squares, count)
}

/// Rank a sorted ascending square list.
pub fn rank(squares: &[u8]) -> u64 {
    let mut key = 0;
    for (i, &sq) in squares.iter().enumerate() {
        key += choose(sq as usize, i + 1);
    }
    key
}

/// Decode a rank into `count` ascending squares over `0..squares`.
/// `None` when the rank is out of range.
pub fn unrank(mut key: u64, squares: usize, count: usize, out: &mut [u8]) -> Option<()> {
    if key >= group_size(squares, count) {
        return None;
    }
    let mut limit = squares;
    for i in (0..count).rev() {
        // Largest p with C(p, i + 1) <= key.
        let mut p = limit - 1;
        while choose(p, i + 1) > key {
            p -= 1;
        }
        out[i] = p as u8;
        key -= choose(p, i + 1);
        limit = p;
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sizes() {
        assert_eq!(group_size(64, 1), 64);
        assert_eq!(group_size(64, 2), 2016);
        assert_eq!(group_size(64, 3), 41664);
        assert_eq!(group_size(64, 4), 635376);
        assert_eq!(group_size(48, 1), 48);
        assert_eq!(group_size(48, 2), 1128);
        assert_eq!(group_size(48, 3), 17296);
        assert_eq!(group_size(48, 4), 194580);
    }

    #[test]
    fn rank_unrank_round_trip_pairs() {
        let mut buf = [0u8; 2];
        for key in 0..group_size(64, 2) {
            unrank(key, 64, 2, &mut buf).unwrap();
            assert!(buf[0] < buf[1]);
            assert_eq!(rank(&buf), key);
        }
    }

    #[test]
    fn rank_unrank_round_trip_triples() {
        let mut buf = [0u8; 3];
        for key in (0..group_size(48, 3)).step_by(7) {
            unrank(key, 48, 3, &mut buf).unwrap();
            assert!(buf[0] < buf[1] && buf[1] < buf[2]);
            assert_eq!(rank(&buf), key);
        }
    }

    #[test]
    fn out_of_range_rank() {
        let mut buf = [0u8; 2];
        assert!(unrank(2016, 64, 2, &mut buf).is_none());
    }
}
