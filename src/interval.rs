use core::cmp;

use num::bigint::BigUint;
use num::Zero;

use crate::bignat::{ceil_div, floor_div};
use crate::key::Bounds;

/// Inclusive range [a, b] of candidate plaintexts
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval {
    pub(crate) a: BigUint,
    pub(crate) b: BigUint,
}

impl Interval {
    /// Create a new interval, returns None if a > b
    pub fn new(a: BigUint, b: BigUint) -> Option<Self> {
        if a <= b {
            Some(Self { a, b })
        } else {
            None
        }
    }

    /// Lower bound (inclusive)
    pub fn lower(&self) -> &BigUint {
        &self.a
    }

    /// Upper bound (inclusive)
    pub fn upper(&self) -> &BigUint {
        &self.b
    }

    /// Number of integers in the interval
    pub fn width(&self) -> BigUint {
        &self.b - &self.a + 1_u32
    }

    /// Whether the interval holds exactly one value
    pub fn is_point(&self) -> bool {
        self.a == self.b
    }

    pub fn contains(&self, x: &BigUint) -> bool {
        &self.a <= x && x <= &self.b
    }
}

/// Disjoint set of intervals, sorted by lower bound
///
/// Every mutation leaves the set normalized: no two members overlap or touch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set holding a single interval
    pub fn from_interval(interval: Interval) -> Self {
        Self {
            intervals: vec![interval],
        }
    }

    /// Add an interval, merging it with any overlapping or adjacent members
    pub fn insert(&mut self, interval: Interval) {
        self.intervals.push(interval);
        self.normalize();
    }

    /// Sort by lower bound and coalesce overlapping or adjacent intervals
    pub fn normalize(&mut self) {
        self.intervals.sort_unstable();

        let mut merged: Vec<Interval> = Vec::with_capacity(self.intervals.len());

        for interval in self.intervals.drain(..) {
            match merged.last_mut() {
                Some(last) if interval.a <= &last.b + 1_u32 => {
                    if interval.b > last.b {
                        last.b = interval.b;
                    }
                }
                _ => merged.push(interval),
            }
        }

        self.intervals = merged;
    }

    /// True iff the set is exactly one interval holding a single value
    pub fn is_singleton(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].is_point()
    }

    /// The remaining value, if the set is a singleton
    pub fn singleton(&self) -> Option<&BigUint> {
        if self.is_singleton() {
            Some(&self.intervals[0].a)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn first(&self) -> Option<&Interval> {
        self.intervals.first()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    pub fn contains(&self, x: &BigUint) -> bool {
        self.intervals.iter().any(|i| i.contains(x))
    }

    /// Sum of the widths of all member intervals
    pub fn total_width(&self) -> BigUint {
        self.intervals
            .iter()
            .fold(BigUint::zero(), |acc, i| acc + i.width())
    }

    /// Narrow the set with a multiplier `s` the oracle confirmed as conforming
    ///
    /// For each [a, b] and each r with
    ///     (a*s - 3B + 1) / n <= r <= (b*s - 2B) / n
    /// keep [max(a, ceil((2B + rn) / s)), min(b, floor((3B - 1 + rn) / s))]
    ///
    /// The set is replaced by the union of the kept ranges. It may become empty
    /// if the oracle lied.
    pub fn narrow(&mut self, s: &BigUint, n: &BigUint, bounds: &Bounds) {
        let three_b_less_one = &bounds.three_b - 1_u32;
        let mut derived: Vec<Interval> = Vec::new();

        for interval in self.intervals.iter() {
            let a_s = &interval.a * s;
            let b_s = &interval.b * s;

            // no r can satisfy the upper constraint
            if b_s < bounds.two_b {
                continue;
            }

            let r_lo = if a_s >= bounds.three_b {
                ceil_div(&(a_s + 1_u32 - &bounds.three_b), n)
            } else {
                BigUint::zero()
            };
            let r_hi = floor_div(&(b_s - &bounds.two_b), n);

            let mut r = r_lo;
            while r <= r_hi {
                let rn = &r * n;

                let lo = cmp::max(interval.a.clone(), ceil_div(&(&bounds.two_b + &rn), s));
                let hi = cmp::min(interval.b.clone(), floor_div(&(&three_b_less_one + &rn), s));

                if lo <= hi {
                    derived.push(Interval { a: lo, b: hi });
                }

                r += 1_u32;
            }
        }

        self.intervals = derived;
        self.normalize();
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a Interval;
    type IntoIter = core::slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num::One;

    fn iv(a: u32, b: u32) -> Interval {
        Interval::new(BigUint::from(a), BigUint::from(b)).unwrap()
    }

    #[test]
    fn check_interval() {
        assert!(Interval::new(BigUint::from(2_u8), BigUint::one()).is_none());

        let i = iv(5, 9);
        assert_eq!(i.width(), BigUint::from(5_u8));
        assert!(!i.is_point());
        assert!(i.contains(&BigUint::from(9_u8)));
        assert!(!i.contains(&BigUint::from(10_u8)));
        assert!(iv(4, 4).is_point());
    }

    #[test]
    fn check_insert_merges() {
        let mut set = IntervalSet::new();
        set.insert(iv(10, 20));
        set.insert(iv(30, 40));
        set.insert(iv(0, 5));
        assert_eq!(set.len(), 3);
        assert_eq!(set.first(), Some(&iv(0, 5)));

        // adjacent on the left, overlapping on the right
        set.insert(iv(21, 32));
        assert_eq!(set.iter().cloned().collect::<Vec<_>>(), [iv(0, 5), iv(10, 40)].to_vec());

        // contained
        set.insert(iv(12, 13));
        assert_eq!(set.len(), 2);

        set.insert(iv(6, 9));
        assert_eq!(set.iter().cloned().collect::<Vec<_>>(), [iv(0, 40)].to_vec());
        assert_eq!(set.total_width(), BigUint::from(41_u8));
    }

    #[test]
    fn check_normalize_idempotent() {
        let mut set = IntervalSet::new();
        for &(a, b) in [(7, 9), (1, 3), (2, 4), (11, 11), (10, 10)].iter() {
            set.intervals.push(iv(a, b));
        }

        set.normalize();
        let once = set.clone();
        set.normalize();

        assert_eq!(set, once);
        assert_eq!(set.iter().cloned().collect::<Vec<_>>(), [iv(1, 4), iv(7, 11)].to_vec());
    }

    #[test]
    fn check_singleton() {
        let mut set = IntervalSet::from_interval(iv(3, 3));
        assert!(set.is_singleton());
        assert_eq!(set.singleton(), Some(&BigUint::from(3_u8)));

        set.insert(iv(5, 5));
        assert!(!set.is_singleton());
        assert!(set.singleton().is_none());

        assert!(!IntervalSet::new().is_singleton());
        assert!(!IntervalSet::from_interval(iv(3, 4)).is_singleton());
    }

    #[test]
    fn check_narrow_keeps_plaintext() {
        // toy parameters: k = 11, n odd and larger than 3B
        let bounds = Bounds::for_len(11);
        let n = (BigUint::one() << 87_usize) + 12345_u32;
        let m = &bounds.two_b + 0xdead_beef_u32;

        let mut set = IntervalSet::from_interval(bounds.initial_interval());
        let before = set.total_width();

        // find the first s making m * s mod n conforming, as an honest oracle would
        let mut s = crate::bignat::ceil_div(&n, &bounds.three_b);
        loop {
            let ms = (&m * &s) % &n;
            if ms >= bounds.two_b && ms < bounds.three_b {
                break;
            }
            s += 1_u32;
        }

        set.narrow(&s, &n, &bounds);

        assert!(!set.is_empty());
        assert!(set.contains(&m));
        assert!(set.total_width() < before);
        for i in set.iter() {
            assert!(i.lower() >= &bounds.two_b && i.upper() < &bounds.three_b);
        }
    }

    #[test]
    fn check_narrow_rejects_lies() {
        let bounds = Bounds::for_len(11);
        let n = (BigUint::one() << 87_usize) + 12345_u32;

        // a single point that cannot be conforming after multiplication by s
        let m = bounds.two_b.clone();
        let mut set = IntervalSet::from_interval(Interval::new(m.clone(), m.clone()).unwrap());
        let s = BigUint::from(2_u8);

        // 2 * 2B = 4B, which is below n and outside [2B, 3B)
        set.narrow(&s, &n, &bounds);
        assert!(set.is_empty());
    }
}
