//! Gradient/hessian pairs.

use std::ops::{Add, AddAssign, Sub};

/// First and second order gradient of the loss for one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct GradsTuple {
    pub grad: f32,
    pub hess: f32,
}

impl GradsTuple {
    #[inline]
    pub fn new(grad: f32, hess: f32) -> Self {
        Self { grad, hess }
    }
}

/// Summed gradient statistics of a set of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradStats {
    pub sum_grad: f64,
    pub sum_hess: f64,
}

impl GradStats {
    #[inline]
    pub fn new(sum_grad: f64, sum_hess: f64) -> Self {
        Self { sum_grad, sum_hess }
    }

    #[inline]
    pub fn add_pair(&mut self, pair: GradsTuple) {
        self.sum_grad += pair.grad as f64;
        self.sum_hess += pair.hess as f64;
    }
}

impl Add for GradStats {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.sum_grad + rhs.sum_grad, self.sum_hess + rhs.sum_hess)
    }
}

impl Sub for GradStats {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.sum_grad - rhs.sum_grad, self.sum_hess - rhs.sum_hess)
    }
}

impl AddAssign for GradStats {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.sum_grad += rhs.sum_grad;
        self.sum_hess += rhs.sum_hess;
    }
}

impl std::iter::Sum for GradStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
