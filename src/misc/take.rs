use std::ops::{Deref, DerefMut};

/// A value that is taken out exactly once, at the end of its owners life.
///
/// Accessing it after [`Take::take`] panics.
pub struct Take<T>(Option<T>);

impl<T> Take<T> {
    pub fn new(val: T) -> Self {
        Self(Some(val))
    }

    pub fn take(&mut self) -> T {
        self.0.take().expect("Take::take called twice")
    }
}

impl<T> Deref for Take<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref().expect("Take used after being taken")
    }
}

impl<T> DerefMut for Take<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut().expect("Take used after being taken")
    }
}
