//! Lock-free cells for the numeric fields of [`ClientMetrics`](crate::ClientMetrics).
//!
//! Floats are stored as their IEEE-754 bit pattern; optional integers use a
//! reserved sentinel for `None`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

const NONE_U64: u64 = u64::MAX;
const NONE_I64: i64 = i64::MIN;

/// An `f64` readable and writable without locking.
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// An `Option<f64>`; NaN is not representable and reads back as `None`.
#[derive(Debug)]
pub struct AtomicOptionF64(AtomicU64);

impl AtomicOptionF64 {
    pub fn new(value: Option<f64>) -> Self {
        Self(AtomicU64::new(Self::encode(value)))
    }

    fn encode(value: Option<f64>) -> u64 {
        value.unwrap_or(f64::NAN).to_bits()
    }

    pub fn load(&self) -> Option<f64> {
        let v = f64::from_bits(self.0.load(Ordering::Acquire));
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    pub fn store(&self, value: Option<f64>) {
        self.0.store(Self::encode(value), Ordering::Release);
    }
}

/// An `Option<u64>`; `u64::MAX` is reserved for `None`.
#[derive(Debug)]
pub struct AtomicOptionU64(AtomicU64);

impl AtomicOptionU64 {
    pub fn new(value: Option<u64>) -> Self {
        Self(AtomicU64::new(value.unwrap_or(NONE_U64)))
    }

    pub fn load(&self) -> Option<u64> {
        match self.0.load(Ordering::Acquire) {
            NONE_U64 => None,
            v => Some(v),
        }
    }

    pub fn store(&self, value: Option<u64>) {
        self.0.store(value.unwrap_or(NONE_U64), Ordering::Release);
    }
}

/// An `Option<i64>`; `i64::MIN` is reserved for `None`.
#[derive(Debug)]
pub struct AtomicOptionI64(AtomicI64);

impl AtomicOptionI64 {
    pub fn new(value: Option<i64>) -> Self {
        Self(AtomicI64::new(value.unwrap_or(NONE_I64)))
    }

    pub fn load(&self) -> Option<i64> {
        match self.0.load(Ordering::Acquire) {
            NONE_I64 => None,
            v => Some(v),
        }
    }

    pub fn store(&self, value: Option<i64>) {
        self.0.store(value.unwrap_or(NONE_I64), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_cell_stores_bits() {
        let cell = AtomicF64::new(0.75);
        assert_eq!(cell.load(), 0.75);
        cell.store(0.1);
        assert_eq!(cell.load(), 0.1);
    }

    #[test]
    fn optional_cells_round_none() {
        let f = AtomicOptionF64::new(None);
        assert_eq!(f.load(), None);
        f.store(Some(0.5));
        assert_eq!(f.load(), Some(0.5));

        let u = AtomicOptionU64::new(Some(0));
        assert_eq!(u.load(), Some(0));
        u.store(None);
        assert_eq!(u.load(), None);

        let i = AtomicOptionI64::new(Some(-3));
        assert_eq!(i.load(), Some(-3));
        i.store(None);
        assert_eq!(i.load(), None);
    }
}
