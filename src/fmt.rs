//! Formatting helpers

use core::fmt;

pub struct Display<T>(pub T);

impl<T> fmt::Debug for Display<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
