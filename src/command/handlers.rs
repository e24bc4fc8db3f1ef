//! One [`Handler`] per [`Instruction`](super::Instruction).
//!
//! Handlers read their arguments from the request's `DA` value and append their
//! output to the response writer. Missing or malformed arguments are reported as
//! [`HandlerError::InvalidParam`]; running out of response space as
//! [`HandlerError::Internal`].

use super::{AlarmConfig, Handler, HandlerError, Node};
use crate::consts::{
    BEEP_DURATION_MS, LOG_CAPACITY, LOG_DEFAULT_WINDOW_SECS, TAG_ALARM_HIGH, TAG_ALARM_ID, TAG_ALARM_LIST,
    TAG_ALARM_LOW, TAG_DAY, TAG_HOUR, TAG_ITEM, TAG_LOG_LIST, TAG_MAX_COUNT, TAG_MINUTE, TAG_MONTH,
    TAG_SECOND, TAG_TEMPERATURE, TAG_TIME_END, TAG_TIME_START, TAG_TIMESTAMP, TAG_WEEKDAY, TAG_YEAR,
};
use crate::device::{Actuator, Clock, RtcDate, RtcTime, Sensor};
use crate::error::Error;
use crate::tlv::{self, RECORD_HEADER_LEN, Tag, TlvWriter};

type HandlerResult = Result<(), HandlerError>;

/// Encoded size of one log list item: `IT{TS u64, "T " f32}`.
const LOG_ITEM_LEN: usize = RECORD_HEADER_LEN + (RECORD_HEADER_LEN + 8) + (RECORD_HEADER_LEN + 4);

fn required<T>(value: crate::Result<T>) -> Result<T, HandlerError> {
    value.map_err(|_| HandlerError::InvalidParam)
}

fn optional<T>(value: crate::Result<T>) -> Result<Option<T>, HandlerError> {
    match value {
        Ok(v) => Ok(Some(v)),
        Err(Error::NotFound) => Ok(None),
        Err(_) => Err(HandlerError::InvalidParam),
    }
}

fn field_u8(data: &[u8], tag: Tag) -> Result<u8, HandlerError> {
    required(tlv::decode_u8(data, tag))
}

/// `ping`: liveness check.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ping;

impl Handler for Ping {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        _node: &mut Node<S, C, A>,
        _request: &[u8],
        _response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        Ok(())
    }
}

/// `temp`: reads the sensor, evaluates the alarms and logs the reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetTemp;

impl Handler for GetTemp {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        node: &mut Node<S, C, A>,
        _request: &[u8],
        response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        if !node.sensor.is_ready() {
            return Err(HandlerError::SensorError);
        }
        let temperature = node.sensor.read().map_err(|_| HandlerError::SensorError)?;
        if !temperature.is_finite() {
            return Err(HandlerError::SensorError);
        }

        node.evaluate_alarms(temperature);
        let timestamp = node.clock.unix_timestamp();
        node.log.push(timestamp, temperature);

        response.f32(TAG_TEMPERATURE, temperature)?;
        Ok(())
    }
}

/// `gdat`: current RTC date.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetDate;

impl Handler for GetDate {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        node: &mut Node<S, C, A>,
        _request: &[u8],
        response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        if !node.clock.is_initialized() {
            return Err(HandlerError::NotInitialized);
        }
        let date = node.clock.date().map_err(|_| HandlerError::NotInitialized)?;
        response.u8(TAG_YEAR, date.year)?;
        response.u8(TAG_MONTH, date.month)?;
        response.u8(TAG_DAY, date.day)?;
        response.u8(TAG_WEEKDAY, date.weekday)?;
        Ok(())
    }
}

/// `gtim`: current RTC time of day.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetTime;

impl Handler for GetTime {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        node: &mut Node<S, C, A>,
        _request: &[u8],
        response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        if !node.clock.is_initialized() {
            return Err(HandlerError::NotInitialized);
        }
        let time = node.clock.time().map_err(|_| HandlerError::NotInitialized)?;
        response.u8(TAG_HOUR, time.hour)?;
        response.u8(TAG_MINUTE, time.minute)?;
        response.u8(TAG_SECOND, time.second)?;
        Ok(())
    }
}

/// `sdat`: sets the RTC date from `YY MM DD WK`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetDate;

impl Handler for SetDate {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        node: &mut Node<S, C, A>,
        request: &[u8],
        _response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        if !node.clock.is_initialized() {
            return Err(HandlerError::NotInitialized);
        }
        let date = RtcDate {
            year: field_u8(request, TAG_YEAR)?,
            month: field_u8(request, TAG_MONTH)?,
            day: field_u8(request, TAG_DAY)?,
            weekday: field_u8(request, TAG_WEEKDAY)?,
        };
        if !date.is_valid() {
            return Err(HandlerError::InvalidParam);
        }
        node.clock.set_date(date).map_err(|_| HandlerError::InvalidParam)
    }
}

/// `stim`: sets the RTC time from `HH MM SS`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetTime;

impl Handler for SetTime {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        node: &mut Node<S, C, A>,
        request: &[u8],
        _response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        if !node.clock.is_initialized() {
            return Err(HandlerError::NotInitialized);
        }
        let time = RtcTime {
            hour: field_u8(request, TAG_HOUR)?,
            minute: field_u8(request, TAG_MINUTE)?,
            second: field_u8(request, TAG_SECOND)?,
        };
        if !time.is_valid() {
            return Err(HandlerError::InvalidParam);
        }
        node.clock.set_time(time).map_err(|_| HandlerError::InvalidParam)
    }
}

/// `galm`: both alarm channels as `AL{IT{ID, L, H}, IT{..}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetAlarms;

impl Handler for GetAlarms {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        node: &mut Node<S, C, A>,
        _request: &[u8],
        response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        let list = response.begin(TAG_ALARM_LIST)?;
        for alarm in node.alarms.iter() {
            let item = response.begin(TAG_ITEM)?;
            response.u8(TAG_ALARM_ID, alarm.id)?;
            response.f32(TAG_ALARM_LOW, alarm.low)?;
            response.f32(TAG_ALARM_HIGH, alarm.high)?;
            response.end(item)?;
        }
        response.end(list)?;
        Ok(())
    }
}

/// `salm`: replaces alarm thresholds from an `AL` list.
///
/// Every `IT` item must carry `ID`, `L` and `H`; items for unknown channels are
/// skipped. Nothing is applied unless the whole list parses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetAlarms;

impl Handler for SetAlarms {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        node: &mut Node<S, C, A>,
        request: &[u8],
        _response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        let list = required(tlv::decode_raw(request, TAG_ALARM_LIST))?;
        let mut alarms = node.alarms;
        for record in tlv::records(list) {
            let record = required(record)?;
            if record.tag != TAG_ITEM {
                continue;
            }
            let config = AlarmConfig {
                id: field_u8(record.value, TAG_ALARM_ID)?,
                low: required(tlv::decode_f32(record.value, TAG_ALARM_LOW))?,
                high: required(tlv::decode_f32(record.value, TAG_ALARM_HIGH))?,
            };
            if !alarms.set(config) {
                debug!("ignoring alarm item for channel {}", config.id);
            }
        }
        node.alarms = alarms;
        Ok(())
    }
}

/// `glog`: logged readings as `LG{IT{TS, "T "}, ..}`, oldest first.
///
/// `T1`/`T2` bound the range (inclusive); `T2` defaults to now and `T1` to one day
/// before `T2`. `MX` caps the count at no more than the log capacity. Items that
/// would not fit in the response are left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetLog;

impl Handler for GetLog {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        node: &mut Node<S, C, A>,
        request: &[u8],
        response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        let start = optional(tlv::decode_u64(request, TAG_TIME_START))?.unwrap_or(0);
        let end = optional(tlv::decode_u64(request, TAG_TIME_END))?.unwrap_or(0);
        let max = optional(tlv::decode_u16(request, TAG_MAX_COUNT))?
            .map_or(LOG_CAPACITY, |mx| (mx as usize).min(LOG_CAPACITY));

        let end = if end == 0 { node.clock.unix_timestamp() } else { end };
        let start = if start == 0 {
            end.saturating_sub(LOG_DEFAULT_WINDOW_SECS)
        } else {
            start
        };

        let list = response.begin(TAG_LOG_LIST)?;
        let mut written = 0usize;
        for entry in node.log.query(start, end, max) {
            if response.remaining() < LOG_ITEM_LEN {
                debug!("log response full after {} items", written);
                break;
            }
            let item = response.begin(TAG_ITEM)?;
            response.u64(TAG_TIMESTAMP, entry.timestamp)?;
            response.f32(TAG_TEMPERATURE, entry.temperature)?;
            response.end(item)?;
            written += 1;
        }
        response.end(list)?;
        trace!("glog {}..{} returned {} items", start, end, written);
        Ok(())
    }
}

/// `sled`: indicator on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetLed;

impl Handler for SetLed {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        node: &mut Node<S, C, A>,
        _request: &[u8],
        _response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        node.actuator.led_on();
        Ok(())
    }
}

/// `rled`: indicator off.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetLed;

impl Handler for ResetLed {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        node: &mut Node<S, C, A>,
        _request: &[u8],
        _response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        node.actuator.led_off();
        Ok(())
    }
}

/// `sbzr`: one timed beep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetBuzzer;

impl Handler for SetBuzzer {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        node: &mut Node<S, C, A>,
        _request: &[u8],
        _response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        node.actuator.beep(BEEP_DURATION_MS);
        Ok(())
    }
}

/// `rbzr`: buzzer off.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetBuzzer;

impl Handler for ResetBuzzer {
    fn handle<S: Sensor, C: Clock, A: Actuator>(
        &self,
        node: &mut Node<S, C, A>,
        _request: &[u8],
        _response: &mut TlvWriter<'_>,
    ) -> HandlerResult {
        node.actuator.buzzer_off();
        Ok(())
    }
}
