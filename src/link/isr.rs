use super::{CommStats, LinkShared, SharedLink};
use core::cell::RefCell;
use critical_section::Mutex;

/// Used to initialize the global static [`SharedLink`].
///
/// # Returns
/// * An idle link with zeroed counters
///
/// # Example
/// ```rust
/// use thermolink::link::{SharedLink, shared_link_init};
///
/// static LINK: SharedLink = shared_link_init();
/// ```
pub const fn shared_link_init() -> SharedLink {
    Mutex::new(RefCell::new(LinkShared::new()))
}

/// Feeds a received byte to the link.
///
/// # Arguments
/// * The global static [`SharedLink`]
/// * The byte read from the UART data register
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn USART1() {
///     link_on_byte(&LINK, uart_read_byte());
/// }
/// ```
pub fn link_on_byte(shared: &SharedLink, byte: u8) {
    critical_section::with(|cs| shared.borrow(cs).borrow_mut().on_byte(byte));
}

/// Reports that the reply finished transmitting.
///
/// # Arguments
/// * The global static [`SharedLink`]
pub fn link_on_tx_complete(shared: &SharedLink) {
    critical_section::with(|cs| shared.borrow(cs).borrow_mut().on_tx_complete());
}

/// Reports a transport error (framing, overrun, noise).
///
/// # Arguments
/// * The global static [`SharedLink`]
pub fn link_on_error(shared: &SharedLink) {
    critical_section::with(|cs| shared.borrow(cs).borrow_mut().on_error());
}

/// Returns a snapshot of the communication counters.
pub fn link_stats(shared: &SharedLink) -> CommStats {
    critical_section::with(|cs| shared.borrow(cs).borrow().stats())
}

/// Zeroes the communication counters.
pub fn link_reset_stats(shared: &SharedLink) {
    critical_section::with(|cs| shared.borrow(cs).borrow_mut().reset_stats());
}
