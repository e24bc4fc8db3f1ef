/// Declares a static global `LINK` protected by a `critical_section` mutex.
///
/// The interrupt handlers feed it through [`link_rx_byte!`], [`link_tx_complete!`]
/// and [`link_error!`]; the main loop passes `&LINK` to
/// [`Link::poll`](crate::link::Link::poll).
///
/// # Example
/// ```rust
/// thermolink::init_link!();
///
/// fn main() {
///     thermolink::link_rx_byte!(0xAA);
/// }
/// ```
#[macro_export]
macro_rules! init_link {
    () => {
        pub static LINK: $crate::link::SharedLink = $crate::link::shared_link_init();
    };
}

/// Feeds a received byte to the global `LINK`.
///
/// # Arguments
/// - `$byte`: The received byte
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn USART1() {
///     link_rx_byte!(uart_read_byte());
/// }
/// ```
///
/// # Notes
/// - Requires `init_link!` to have been used earlier in the same module.
#[macro_export]
macro_rules! link_rx_byte {
    ( $byte:expr ) => {
        $crate::link::link_on_byte(&LINK, $byte)
    };
}

/// Reports transmit completion to the global `LINK`.
///
/// # Notes
/// - Requires `init_link!` to have been used earlier in the same module.
#[macro_export]
macro_rules! link_tx_complete {
    () => {
        $crate::link::link_on_tx_complete(&LINK)
    };
}

/// Reports a transport error to the global `LINK`.
///
/// # Notes
/// - Requires `init_link!` to have been used earlier in the same module.
#[macro_export]
macro_rules! link_error {
    () => {
        $crate::link::link_on_error(&LINK)
    };
}
