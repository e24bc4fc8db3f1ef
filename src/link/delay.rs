use super::{Link, SharedLink, Transport};
use crate::device::{Actuator, Clock, Sensor};
use embedded_hal::delay::DelayNs;

/// Runs a blocking loop that polls the link and services the actuator.
///
/// This is a simple scheduling loop for firmware with nothing else to do. Reception
/// still happens in interrupt handlers feeding `shared`; the loop only picks up
/// complete frames and answers them.
///
/// # Arguments
/// - `link`: The task side of the link.
/// - `shared`: The state shared with the interrupt handlers.
/// - `delay`: A delay provider implementing `DelayNs`, typically from the HAL.
/// - `period_ms`: The delay between two polls, in milliseconds.
///
/// # Example
/// ```rust,ignore
/// use thermolink::link::{Link, run_poll_loop};
/// let mut link = Link::new(uart_tx, dispatcher);
/// run_poll_loop(&mut link, &LINK, &mut delay, 10);
/// ```
///
/// # Notes
/// - This loop never returns.
/// - Poll errors are dropped; they are already reflected in the link counters.
pub fn run_poll_loop<T, S, C, A, D>(
    link: &mut Link<T, S, C, A>,
    shared: &SharedLink,
    delay: &mut D,
    period_ms: u32,
) -> !
where
    T: Transport,
    S: Sensor,
    C: Clock,
    A: Actuator,
    D: DelayNs,
{
    loop {
        let _ = link.poll(shared);
        link.service(period_ms);
        delay.delay_ms(period_ms);
    }
}
