//! Typed messages carried as kernel message words.
//!
//! Every scheduler the layer targets moves `void*`-sized words through its
//! queues. [`Mail`] lets the protocol stack keep its own message type while
//! ports store plain `usize` values.

use alloc::boxed::Box;

/// A value that can travel through a mailbox as one machine word.
pub trait Mail: Send + 'static {
    fn into_word(self) -> usize;

    /// Rebuilds the value from a word.
    ///
    /// # Safety
    ///
    /// `word` must have been produced by [`Mail::into_word`] on the same type,
    /// and each word may be turned back into a value at most once.
    unsafe fn from_word(word: usize) -> Self;
}

impl Mail for usize {
    fn into_word(self) -> usize {
        self
    }

    unsafe fn from_word(word: usize) -> Self {
        word
    }
}

macro_rules! impl_mail_for_int {
    ($($ty:ty),*) => {
        $(
            impl Mail for $ty {
                fn into_word(self) -> usize {
                    self as usize
                }

                unsafe fn from_word(word: usize) -> Self {
                    word as $ty
                }
            }
        )*
    };
}

impl_mail_for_int!(u8, u16, u32);

impl<T: Send + 'static> Mail for Box<T> {
    fn into_word(self) -> usize {
        Box::into_raw(self) as usize
    }

    unsafe fn from_word(word: usize) -> Self {
        // SAFETY: the word came from `Box::into_raw` and is consumed once.
        unsafe { Box::from_raw(word as *mut T) }
    }
}

impl<T: Sync + 'static> Mail for &'static T {
    fn into_word(self) -> usize {
        self as *const T as usize
    }

    unsafe fn from_word(word: usize) -> Self {
        // SAFETY: the word is the address of a `'static` value.
        unsafe { &*(word as *const T) }
    }
}

/// Takes back ownership of a word that a kernel refused to enqueue.
///
/// # Safety
///
/// Same contract as [`Mail::from_word`].
pub unsafe fn reclaim<M: Mail>(word: usize) -> M {
    unsafe { M::from_word(word) }
}
