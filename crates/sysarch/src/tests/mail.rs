use alloc::boxed::Box;

use crate::mail::Mail;

#[test]
fn integers_are_carried_verbatim() {
    let word = 0xBEEFu16.into_word();
    assert_eq!(word, 0xBEEF);
    assert_eq!(unsafe { u16::from_word(word) }, 0xBEEF);
}

#[test]
fn boxed_message_keeps_its_payload() {
    let word = Box::new([1u8, 2, 3]).into_word();
    let back: Box<[u8; 3]> = unsafe { Mail::from_word(word) };
    assert_eq!(*back, [1, 2, 3]);
}

#[test]
fn static_reference_points_at_same_value() {
    static ROUTE: u32 = 0x0A00_0001;
    let word = (&ROUTE).into_word();
    let back: &'static u32 = unsafe { Mail::from_word(word) };
    assert!(core::ptr::eq(back, &ROUTE));
}
