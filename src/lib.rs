//! # thermolink
//!
//! A portable, no_std Rust implementation of the serial protocol spoken by a small
//! temperature sensing and actuation node: a host sends requests over a UART, the node
//! reads its sensor, real-time clock, alarm thresholds and temperature history, drives
//! an indicator LED and a buzzer, and answers in kind.
//!
//! The crate implements the wire protocol engine using:
//! - byte-stuffed framing between `AA 55` / `55 AA` markers
//! - a CRC-32 checked packet header
//! - tag-length-value (TLV) payloads with nested lists
//! - a command dispatcher over `Sensor`, `Clock` and `Actuator` capabilities
//! - an interrupt-safe reception state machine built on `critical-section`
//! - a fixed-capacity temperature history ring buffer
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` and enables the `std` implementations of the dependencies |
//! | `link-isr` (default)  | Exposes the `init_link!`, `link_rx_byte!`, `link_tx_complete!` and `link_error!` macros |
//! | `delay-loop`          | Uses `embedded_hal::delay::DelayNs` to drive [`Link::poll`](link::Link::poll) in a blocking loop |
//! | `defmt-0-3`           | Uses `defmt` logging |
//! | `log`                 | Uses `log` logging |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use thermolink::{init_link, link_rx_byte};
//! use thermolink::command::{CommandDispatcher, Node};
//! use thermolink::link::Link;
//!
//! init_link!();
//!
//! #[interrupt]
//! fn USART1() {
//!     let byte = read_data_register();
//!     link_rx_byte!(byte);
//! }
//!
//! fn main() -> ! {
//!     let dispatcher = CommandDispatcher::new(Node::new(sensor, clock, actuator));
//!     let mut link = Link::new(uart_tx, dispatcher);
//!     loop {
//!         link.poll(&LINK);
//!         link.service(10);
//!         delay.delay_ms(10);
//!     }
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - Only the byte, transmit-complete and error notifications run in interrupt context;
//!   all CRC and TLV work happens in [`Link::poll`](link::Link::poll).
//! - Exactly one frame is in flight at a time. Bytes arriving while a frame is being
//!   processed or answered are dropped.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    while_true
)]
#![warn(
    dead_code,
    unused,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications
)]
#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub use critical_section;
pub use heapless;

#[macro_use]
mod fmt;

pub mod command;
pub mod consts;
pub(crate) mod crc;
pub mod device;
pub mod error;
pub mod framing;
pub mod history;
pub mod link;
pub mod packet;
pub mod tlv;

pub use error::{Error, Result};
