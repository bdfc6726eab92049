//! Boilerplate arithmetic impls for single-field newtypes.
//!
//! ```rust,ignore
//! op!(binary Money, Add, add);
//! op!(inplace Money, AddAssign, add_assign);
//! op!(unary Money, Neg, neg);
//! ```
#[macro_export]
macro_rules! op {
    (binary $unit:ty, $trait:ident, $fn:ident) => {
        impl std::ops::$trait for $unit {
            type Output = Self;

            fn $fn(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$fn(self.0, rhs.0))
            }
        }
    };
    (inplace $unit:ty, $trait:ident, $fn:ident) => {
        impl std::ops::$trait for $unit {
            fn $fn(&mut self, rhs: Self) {
                std::ops::$trait::$fn(&mut self.0, rhs.0)
            }
        }
    };
    (unary $unit:ty, $trait:ident, $fn:ident) => {
        impl std::ops::$trait for $unit {
            type Output = Self;

            fn $fn(self) -> Self::Output {
                Self(std::ops::$trait::$fn(self.0))
            }
        }
    };
}
