//! Hardware capabilities used by the command handlers.
//!
//! The node talks to its peripherals only through three traits:
//!
//! - [`Sensor`]: a temperature probe
//! - [`Clock`]: a battery backed real-time clock
//! - [`Actuator`]: the indicator LED and the buzzer
//!
//! Board support code implements them over its own drivers. [`PinActuator`] covers
//! the common case of an LED and a buzzer each wired to a GPIO through
//! `embedded-hal` [`OutputPin`]s.

use embedded_hal::digital::OutputPin;

/// A temperature probe.
pub trait Sensor {
    /// Error returned by a failed read.
    type Error;

    /// Whether the probe is present and able to take a reading.
    fn is_ready(&mut self) -> bool;

    /// Takes a reading in degrees Celsius.
    fn read(&mut self) -> Result<f32, Self::Error>;
}

/// Calendar date as stored by the RTC.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtcDate {
    /// Years since 2000 (0-99)
    pub year: u8,
    /// 1-12
    pub month: u8,
    /// 1-31
    pub day: u8,
    /// 1-7
    pub weekday: u8,
}

impl RtcDate {
    /// Whether every field is within its range.
    pub fn is_valid(&self) -> bool {
        self.year <= 99
            && (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && (1..=7).contains(&self.weekday)
    }
}

/// Time of day as stored by the RTC.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtcTime {
    /// 0-23
    pub hour: u8,
    /// 0-59
    pub minute: u8,
    /// 0-59
    pub second: u8,
}

impl RtcTime {
    /// Whether every field is within its range.
    pub fn is_valid(&self) -> bool {
        self.hour <= 23 && self.minute <= 59 && self.second <= 59
    }
}

/// A real-time clock.
pub trait Clock {
    /// Error returned by a failed RTC access.
    type Error;

    /// Whether the RTC has been brought up and holds a meaningful time.
    fn is_initialized(&self) -> bool;

    /// Reads the current date.
    fn date(&mut self) -> Result<RtcDate, Self::Error>;

    /// Writes the date.
    fn set_date(&mut self, date: RtcDate) -> Result<(), Self::Error>;

    /// Reads the current time of day.
    fn time(&mut self) -> Result<RtcTime, Self::Error>;

    /// Writes the time of day.
    fn set_time(&mut self, time: RtcTime) -> Result<(), Self::Error>;

    /// Seconds since 1970-01-01T00:00:00, or 0 if the clock cannot be read.
    fn unix_timestamp(&mut self) -> u64 {
        if !self.is_initialized() {
            return 0;
        }
        match (self.date(), self.time()) {
            (Ok(date), Ok(time)) => civil_to_unix(date, time),
            _ => 0,
        }
    }
}

/// Converts an RTC date and time (year 2000 + `date.year`) to Unix seconds.
pub fn civil_to_unix(date: RtcDate, time: RtcTime) -> u64 {
    let days = days_from_civil(2000 + date.year as i64, date.month as i64, date.day as i64);
    let secs = days * 86_400 + time.hour as i64 * 3600 + time.minute as i64 * 60 + time.second as i64;
    secs.max(0) as u64
}

// Proleptic Gregorian day count relative to 1970-01-01.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Indicator LED and buzzer.
pub trait Actuator {
    /// Turns the LED on.
    fn led_on(&mut self);
    /// Turns the LED off.
    fn led_off(&mut self);
    /// Whether the LED is on.
    fn led_state(&self) -> bool;
    /// Turns the buzzer on until [`Actuator::buzzer_off`].
    fn buzzer_on(&mut self);
    /// Turns the buzzer off, cancelling any running beep.
    fn buzzer_off(&mut self);
    /// Sounds the buzzer for `duration_ms`. Must not block.
    fn beep(&mut self, duration_ms: u32);
    /// Whether the buzzer is sounding.
    fn buzzer_state(&self) -> bool;
    /// Advances timed outputs by `elapsed_ms`.
    fn service(&mut self, _elapsed_ms: u32) {}
}

/// [`Actuator`] over two GPIO outputs, active high.
///
/// Beeps are timed by [`Actuator::service`], which the link forwards from the
/// poll loop. Pin errors are ignored; the cached state reflects what was requested.
///
/// # Example
///
/// ```rust
/// # use embedded_hal_mock::eh1::digital::{Mock as Pin, State as PinState, Transaction as PinTransaction};
/// use thermolink::device::{Actuator, PinActuator};
///
/// # let led = Pin::new(&[PinTransaction::set(PinState::Low), PinTransaction::set(PinState::High)]);
/// # let buzzer = Pin::new(&[PinTransaction::set(PinState::Low)]);
/// let mut actuator = PinActuator::new(led, buzzer);
/// actuator.led_on();
/// assert!(actuator.led_state());
/// # actuator.led.done();
/// # actuator.buzzer.done();
/// ```
#[derive(Debug)]
pub struct PinActuator<L, B>
where
    L: OutputPin,
    B: OutputPin,
{
    /// LED pin
    pub led: L,
    /// Buzzer pin
    pub buzzer: B,
    led_on: bool,
    buzzer_on: bool,
    beep_remaining_ms: u32,
}

impl<L, B> PinActuator<L, B>
where
    L: OutputPin,
    B: OutputPin,
{
    /// Takes ownership of both pins and drives them low.
    pub fn new(mut led: L, mut buzzer: B) -> Self {
        let _ = led.set_low();
        let _ = buzzer.set_low();
        Self {
            led,
            buzzer,
            led_on: false,
            buzzer_on: false,
            beep_remaining_ms: 0,
        }
    }

    /// Milliseconds left on the running beep, 0 if none.
    pub fn beep_remaining_ms(&self) -> u32 {
        self.beep_remaining_ms
    }

    /// Releases the pins.
    pub fn release(self) -> (L, B) {
        (self.led, self.buzzer)
    }
}

impl<L, B> Actuator for PinActuator<L, B>
where
    L: OutputPin,
    B: OutputPin,
{
    fn led_on(&mut self) {
        let _ = self.led.set_high();
        self.led_on = true;
    }

    fn led_off(&mut self) {
        let _ = self.led.set_low();
        self.led_on = false;
    }

    fn led_state(&self) -> bool {
        self.led_on
    }

    fn buzzer_on(&mut self) {
        self.beep_remaining_ms = 0;
        if !self.buzzer_on {
            let _ = self.buzzer.set_high();
            self.buzzer_on = true;
        }
    }

    fn buzzer_off(&mut self) {
        self.beep_remaining_ms = 0;
        let _ = self.buzzer.set_low();
        self.buzzer_on = false;
    }

    fn beep(&mut self, duration_ms: u32) {
        if duration_ms == 0 {
            return;
        }
        self.buzzer_on();
        self.beep_remaining_ms = duration_ms;
    }

    fn buzzer_state(&self) -> bool {
        self.buzzer_on
    }

    fn service(&mut self, elapsed_ms: u32) {
        if self.beep_remaining_ms == 0 {
            return;
        }
        self.beep_remaining_ms = self.beep_remaining_ms.saturating_sub(elapsed_ms);
        if self.beep_remaining_ms == 0 {
            self.buzzer_off();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    #[test]
    fn test_date_time_validation() {
        assert!(RtcDate { year: 24, month: 2, day: 29, weekday: 4 }.is_valid());
        assert!(!RtcDate { year: 100, month: 1, day: 1, weekday: 1 }.is_valid());
        assert!(!RtcDate { year: 24, month: 13, day: 1, weekday: 1 }.is_valid());
        assert!(!RtcDate { year: 24, month: 1, day: 0, weekday: 1 }.is_valid());
        assert!(!RtcDate { year: 24, month: 1, day: 1, weekday: 8 }.is_valid());
        assert!(RtcTime { hour: 23, minute: 59, second: 59 }.is_valid());
        assert!(!RtcTime { hour: 24, minute: 0, second: 0 }.is_valid());
        assert!(!RtcTime { hour: 0, minute: 60, second: 0 }.is_valid());
    }

    #[test]
    fn test_civil_to_unix() {
        let midnight = RtcTime::default();
        let y2k = RtcDate { year: 0, month: 1, day: 1, weekday: 6 };
        assert_eq!(civil_to_unix(y2k, midnight), 946_684_800);

        let date = RtcDate { year: 24, month: 3, day: 1, weekday: 5 };
        let noon = RtcTime { hour: 12, minute: 0, second: 0 };
        assert_eq!(civil_to_unix(date, noon), 1_709_294_400);

        let date = RtcDate { year: 23, month: 12, day: 31, weekday: 7 };
        let last = RtcTime { hour: 23, minute: 59, second: 59 };
        assert_eq!(civil_to_unix(date, last), 1_704_067_199);
    }

    #[test]
    fn test_pin_actuator_led() {
        let led = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ]);
        let buzzer = PinMock::new(&[PinTransaction::set(PinState::Low)]);
        let mut actuator = PinActuator::new(led, buzzer);

        actuator.led_on();
        assert!(actuator.led_state());
        actuator.led_off();
        assert!(!actuator.led_state());

        actuator.led.done();
        actuator.buzzer.done();
    }

    #[test]
    fn test_pin_actuator_beep_ends_after_duration() {
        let led = PinMock::new(&[PinTransaction::set(PinState::Low)]);
        let buzzer = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ]);
        let mut actuator = PinActuator::new(led, buzzer);

        actuator.beep(1000);
        assert!(actuator.buzzer_state());
        actuator.service(600);
        assert!(actuator.buzzer_state());
        assert_eq!(actuator.beep_remaining_ms(), 400);
        actuator.service(600);
        assert!(!actuator.buzzer_state());
        actuator.service(600);

        let (mut led, mut buzzer) = actuator.release();
        led.done();
        buzzer.done();
    }

    #[test]
    fn test_pin_actuator_continuous_buzzer_ignores_service() {
        let led = PinMock::new(&[PinTransaction::set(PinState::Low)]);
        let buzzer = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let mut actuator = PinActuator::new(led, buzzer);

        actuator.buzzer_on();
        actuator.service(5000);
        assert!(actuator.buzzer_state());

        actuator.led.done();
        actuator.buzzer.done();
    }
}
