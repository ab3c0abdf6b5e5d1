//! Typed wrappers around [`EngineHandle::execute`] for every AT command the
//! driver issues: each is a thin adapter declaring the literal request, its
//! timeout, its buffer-match pattern, and a response parser, so callers get
//! a typed method instead of hand-building `AT` strings.

use std::time::Duration;

use regex::Regex;

use crate::descriptor::CommandDescriptor;
use crate::engine::EngineHandle;
use crate::error::IridiumError;
use crate::tables::{DetachError, LockStatus, RingIndicationStatus};

/// Default per-command timeout for commands that don't need a longer one
/// (network registration, `SBDIX`, etc. override this explicitly).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Structured result of `AT+SBDS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbdStatus {
    pub mo_message_in_buffer: bool,
    pub mo_msn: i32,
    pub mt_message_in_buffer: bool,
    pub mt_msn: i32,
}

/// Structured result of `AT+SBDSX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbdStatusExtended {
    pub mo_message_in_buffer: bool,
    pub mo_msn: i32,
    pub mt_message_in_buffer: bool,
    pub mt_msn: i32,
    pub ring_alert_pending: bool,
    pub messages_waiting: i32,
}

fn buffer_pattern(prefix: &str) -> Regex {
    Regex::new(&format!("^{}", regex::escape(prefix)))
        .expect("an escaped literal prefix is always a valid pattern")
}

/// Find the first line starting with `prefix` and split what follows the
/// first `:` on commas, trimming whitespace from each field.
fn parse_csv_after_prefix<'a>(response: &'a str, prefix: &str) -> Option<Vec<&'a str>> {
    let line = response.lines().find(|l| l.starts_with(prefix))?;
    let data = line.split_once(':')?.1;
    Some(data.split(',').map(str::trim).collect())
}

fn parse_int_field(fields: &[&str], index: usize) -> Result<i32, IridiumError> {
    fields
        .get(index)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            IridiumError::CommandError(format!("expected integer field at index {index}"))
        })
}

impl EngineHandle {
    async fn exec_simple(
        &self,
        request: &str,
        timeout: Option<Duration>,
    ) -> Result<String, IridiumError> {
        self.execute(CommandDescriptor::simple(
            request,
            timeout.unwrap_or(DEFAULT_TIMEOUT),
        ))
        .await
    }

    async fn exec_buffered(
        &self,
        request: &str,
        prefix: &str,
        timeout: Option<Duration>,
    ) -> Result<String, IridiumError> {
        self.execute(CommandDescriptor::with_buffer(
            request,
            timeout.unwrap_or(DEFAULT_TIMEOUT),
            buffer_pattern(prefix),
        ))
        .await
    }

    // ---- passthrough/profile commands --------------------------------

    pub async fn echo_off(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("ATE0", timeout).await.map(drop)
    }

    pub async fn echo_on(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("ATE1", timeout).await.map(drop)
    }

    pub async fn quiet_mode_off(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("ATQ0", timeout).await.map(drop)
    }

    pub async fn verbose_mode_on(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("ATV1", timeout).await.map(drop)
    }

    pub async fn flow_control_enable(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("AT&K3", timeout).await.map(drop)
    }

    pub async fn flow_control_disable(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("AT&K0", timeout).await.map(drop)
    }

    pub async fn factory_restore(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("AT&F", timeout).await.map(drop)
    }

    pub async fn profile_save(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("AT&W0", timeout).await.map(drop)
    }

    pub async fn profile_restore(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("ATZ0", timeout).await.map(drop)
    }

    // ---- identity queries ---------------------------------------------

    pub async fn manufacturer(&self, timeout: Option<Duration>) -> Result<String, IridiumError> {
        self.exec_simple("AT+CGMI", timeout).await
    }

    pub async fn model(&self, timeout: Option<Duration>) -> Result<String, IridiumError> {
        self.exec_simple("AT+CGMM", timeout).await
    }

    /// Firmware/software revision (`AT+CGMR`).
    pub async fn revision(&self, timeout: Option<Duration>) -> Result<String, IridiumError> {
        self.exec_simple("AT+CGMR", timeout).await
    }

    /// IMEI (`AT+CGSN`).
    pub async fn serial_number(&self, timeout: Option<Duration>) -> Result<String, IridiumError> {
        self.exec_simple("AT+CGSN", timeout).await
    }

    // ---- signal quality -------------------------------------------------

    /// Fast, cached signal quality (`AT+CSQF`).
    pub async fn signal_quality_fast(&self, timeout: Option<Duration>) -> Result<u8, IridiumError> {
        let response = self.exec_buffered("AT+CSQF", "+CSQF:", timeout).await?;
        parse_signal_quality(&response, "+CSQF:")
    }

    /// Slow, live signal quality (`AT+CSQ`) — blocks until the modem has
    /// measured the link, so give it a longer timeout than the default.
    pub async fn signal_quality(&self, timeout: Option<Duration>) -> Result<u8, IridiumError> {
        let response = self
            .exec_buffered("AT+CSQ", "+CSQ:", timeout.or(Some(Duration::from_secs(10))))
            .await?;
        parse_signal_quality(&response, "+CSQ:")
    }

    // ---- system time ----------------------------------------------------

    /// Raw hex payload of `AT-MSSTM`, as the wire value un-converted. See
    /// [`decode_msstm_ticks`] for the separate, explicit tick-to-`Duration`
    /// step: the field is easy to mistake for raw milliseconds, but the
    /// vendor manual defines it as a count of 90ms ticks past the Iridium
    /// epoch, so this method deliberately does not pick an interpretation
    /// for the caller.
    pub async fn system_time_raw(&self, timeout: Option<Duration>) -> Result<u32, IridiumError> {
        let response = self.exec_simple("AT-MSSTM", timeout).await?;
        let line = response
            .lines()
            .find(|l| l.starts_with("-MSSTM:"))
            .unwrap_or(response.trim());
        let data = line.split_once(':').map_or(line, |(_, v)| v).trim();
        if data.eq_ignore_ascii_case("no network service") {
            return Err(IridiumError::NoNetworkTime);
        }
        u32::from_str_radix(data.trim_start_matches("0x"), 16)
            .map_err(|_| IridiumError::CommandError(format!("unparsable -MSSTM payload: {data:?}")))
    }

    // ---- network registration -------------------------------------------

    pub async fn registration_auto_enable(
        &self,
        timeout: Option<Duration>,
    ) -> Result<(), IridiumError> {
        self.exec_simple("AT+SBDAREG=1", timeout).await.map(drop)
    }

    pub async fn registration_auto_disable(
        &self,
        timeout: Option<Duration>,
    ) -> Result<(), IridiumError> {
        self.exec_simple("AT+SBDAREG=0", timeout).await.map(drop)
    }

    /// Manually initiate registration (`AT+SBDREG`).
    pub async fn registration_initiate(
        &self,
        timeout: Option<Duration>,
    ) -> Result<(), IridiumError> {
        self.exec_buffered("AT+SBDREG", "+SBDREG:", timeout.or(Some(Duration::from_secs(30))))
            .await
            .map(drop)
    }

    /// `AT+SBDREG?` — registration status as the integer after the
    /// *second* colon-delimited field (`+SBDREG:<status>[,<err>]`).
    ///
    /// Parses the status out of the full `<status>[,<err>]` field rather
    /// than returning that field raw, so callers get the integer status
    /// directly instead of having to split it themselves.
    pub async fn registration_status(&self, timeout: Option<Duration>) -> Result<i32, IridiumError> {
        let response = self.exec_buffered("AT+SBDREG?", "+SBDREG:", timeout).await?;
        let fields = parse_csv_after_prefix(&response, "+SBDREG:").ok_or_else(|| {
            IridiumError::CommandError(format!("no +SBDREG in response: {response:?}"))
        })?;
        parse_int_field(&fields, 0)
    }

    // ---- ring alerts -----------------------------------------------------

    pub async fn ring_alert_enable(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("AT+SBDMTA=1", timeout).await.map(drop)
    }

    pub async fn ring_alert_disable(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("AT+SBDMTA=0", timeout).await.map(drop)
    }

    pub async fn ring_alert_enabled(&self, timeout: Option<Duration>) -> Result<bool, IridiumError> {
        let response = self
            .exec_buffered("AT+SBDMTA?", "+SBDMTA:", timeout)
            .await?;
        let fields = parse_csv_after_prefix(&response, "+SBDMTA:").ok_or_else(|| {
            IridiumError::CommandError(format!("no +SBDMTA in response: {response:?}"))
        })?;
        Ok(parse_int_field(&fields, 0)? != 0)
    }

    /// `AT+CRIS` — ring indication status. When the status comes back
    /// `RingReceived`, the caller should treat this the same as an
    /// unsolicited ring alert (the engine's own `SBDRING` detection handles
    /// the unsolicited case; this covers polling for it instead).
    pub async fn ring_indication_status(
        &self,
        timeout: Option<Duration>,
    ) -> Result<RingIndicationStatus, IridiumError> {
        let response = self.exec_buffered("AT+CRIS", "+CRIS:", timeout).await?;
        let fields = parse_csv_after_prefix(&response, "+CRIS:").ok_or_else(|| {
            IridiumError::CommandError(format!("no +CRIS in response: {response:?}"))
        })?;
        let status = parse_int_field(&fields, 1)?;
        RingIndicationStatus::from_code(status as u8).ok_or_else(|| {
            IridiumError::CommandError(format!("unrecognised ring indication status {status}"))
        })
    }

    // ---- buffer/MSN maintenance -------------------------------------------

    pub async fn clear_mo_buffer(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("AT+SBDD0", timeout).await.map(drop)
    }

    pub async fn clear_mt_buffer(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("AT+SBDD1", timeout).await.map(drop)
    }

    pub async fn clear_both_buffers(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("AT+SBDD2", timeout).await.map(drop)
    }

    /// `AT+SBDC` — reset the MOMSN counter. Note this is the *only*
    /// buffer-maintenance command that resets MOMSN; `SBDD2` does not.
    pub async fn reset_momsn(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple("AT+SBDC", timeout).await.map(drop)
    }

    // ---- status queries -----------------------------------------------------

    pub async fn sbd_status(&self, timeout: Option<Duration>) -> Result<SbdStatus, IridiumError> {
        let response = self.exec_buffered("AT+SBDS", "+SBDS:", timeout).await?;
        let fields = parse_csv_after_prefix(&response, "+SBDS:").ok_or_else(|| {
            IridiumError::CommandError(format!("no +SBDS in response: {response:?}"))
        })?;
        Ok(SbdStatus {
            mo_message_in_buffer: parse_int_field(&fields, 0)? != 0,
            mo_msn: parse_int_field(&fields, 1)?,
            mt_message_in_buffer: parse_int_field(&fields, 2)? != 0,
            mt_msn: parse_int_field(&fields, 3)?,
        })
    }

    pub async fn sbd_status_extended(
        &self,
        timeout: Option<Duration>,
    ) -> Result<SbdStatusExtended, IridiumError> {
        let response = self.exec_buffered("AT+SBDSX", "+SBDSX:", timeout).await?;
        let fields = parse_csv_after_prefix(&response, "+SBDSX:").ok_or_else(|| {
            IridiumError::CommandError(format!("no +SBDSX in response: {response:?}"))
        })?;
        Ok(SbdStatusExtended {
            mo_message_in_buffer: parse_int_field(&fields, 0)? != 0,
            mo_msn: parse_int_field(&fields, 1)?,
            mt_message_in_buffer: parse_int_field(&fields, 2)? != 0,
            mt_msn: parse_int_field(&fields, 3)?,
            ring_alert_pending: parse_int_field(&fields, 4)? != 0,
            messages_waiting: parse_int_field(&fields, 5)?,
        })
    }

    /// `AT+SBDTC` — transfer the MO buffer to the MT buffer, for
    /// loopback testing without a satellite session.
    pub async fn transfer_mo_buffer_to_mt_buffer(
        &self,
        timeout: Option<Duration>,
    ) -> Result<String, IridiumError> {
        self.exec_buffered("AT+SBDTC", "SBDTC:", timeout).await
    }

    pub async fn gateway_type(&self, timeout: Option<Duration>) -> Result<String, IridiumError> {
        let response = self.exec_buffered("AT+SBDGW", "+SBDGW:", timeout).await?;
        Ok(response.trim_start_matches("+SBDGW:").trim().to_string())
    }

    // ---- text buffer ----------------------------------------------------------

    /// `AT+SBDWT=<text>` — write a text message to the MO buffer.
    pub async fn text_write(&self, text: &str, timeout: Option<Duration>) -> Result<(), IridiumError> {
        self.exec_simple(&format!("AT+SBDWT={text}"), timeout)
            .await
            .map(drop)
    }

    /// `AT+SBDRT` — read the MT buffer as text.
    ///
    /// Response shape is `SBDRT:<payload>` on its own line before `OK`.
    /// Some firmware prefixes the payload with a couple of non-standard
    /// bytes the driver does not interpret — only the text after the
    /// `SBDRT:` marker matters.
    pub async fn text_read(&self, timeout: Option<Duration>) -> Result<String, IridiumError> {
        let response = self.exec_buffered("AT+SBDRT", "SBDRT:", timeout).await?;
        Ok(response
            .strip_prefix("SBDRT:")
            .unwrap_or(&response)
            .to_string())
    }

    // ---- session/detach/lock ------------------------------------------------------

    pub async fn detach(&self, timeout: Option<Duration>) -> Result<(), IridiumError> {
        let response = self
            .exec_buffered("AT+SBDDET", "+SBDDET:", timeout.or(Some(Duration::from_secs(30))))
            .await?;
        let fields = parse_csv_after_prefix(&response, "+SBDDET:").ok_or_else(|| {
            IridiumError::CommandError(format!("no +SBDDET in response: {response:?}"))
        })?;
        let status = parse_int_field(&fields, 0)?;
        if status == 0 {
            return Ok(());
        }
        let error_code = fields.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
        Err(IridiumError::CommandError(
            DetachError(error_code).to_string(),
        ))
    }

    /// `AT+CULK=<key>` — unlock the device.
    pub async fn unlock_device(&self, key: &str, timeout: Option<Duration>) -> Result<(), IridiumError> {
        let response = self
            .exec_buffered(&format!("AT+CULK={key}"), "+CULK:", timeout)
            .await?;
        let fields = parse_csv_after_prefix(&response, "+CULK:").unwrap_or_default();
        match fields.first().and_then(|s| s.parse::<u8>().ok()) {
            None | Some(0) => Ok(()),
            Some(1) => Err(IridiumError::Locked),
            Some(2) => Err(IridiumError::PermanentlyLocked),
            Some(_) => Ok(()),
        }
    }

    /// `AT+CULK?` — query lock status.
    pub async fn lock_status(&self, timeout: Option<Duration>) -> Result<LockStatus, IridiumError> {
        let response = self.exec_buffered("AT+CULK?", "+CULK:", timeout).await?;
        let fields = parse_csv_after_prefix(&response, "+CULK:").ok_or_else(|| {
            IridiumError::CommandError(format!("no +CULK in response: {response:?}"))
        })?;
        let code = parse_int_field(&fields, 0)?;
        LockStatus::from_code(code as u8)
            .ok_or_else(|| IridiumError::CommandError(format!("unrecognised lock status {code}")))
    }

    /// `AT+CIER=<mode>,<signal>,<service>,<antenna>` — subscribe/unsubscribe
    /// to indicator event reports. The orchestrator uses this to watch
    /// signal quality during `waitForNetwork` and to clean up afterwards.
    pub async fn indicator_event_reporting(
        &self,
        mode: u8,
        signal: u8,
        service: u8,
        antenna: u8,
        timeout: Option<Duration>,
    ) -> Result<(), IridiumError> {
        self.exec_simple(
            &format!("AT+CIER={mode},{signal},{service},{antenna}"),
            timeout,
        )
        .await
        .map(drop)
    }

    pub async fn indicator_event_reporting_disable(
        &self,
        timeout: Option<Duration>,
    ) -> Result<(), IridiumError> {
        self.indicator_event_reporting(1, 0, 0, 0, timeout).await
    }

    pub async fn indicator_event_reporting_enable_signal(
        &self,
        timeout: Option<Duration>,
    ) -> Result<(), IridiumError> {
        self.indicator_event_reporting(1, 1, 0, 0, timeout).await
    }
}

/// Length of one `-MSSTM` tick per the 9602/9603 vendor manual.
pub const MSSTM_TICK_MILLIS: u64 = 90;

/// The Iridium epoch, `2007-03-08T03:50:35Z`, as Unix seconds.
pub const IRIDIUM_EPOCH_UNIX_SECS: u64 = 1_173_325_835;

/// Convert a raw `-MSSTM` value (as returned by
/// [`EngineHandle::system_time_raw`]) from a tick count into wall-clock
/// time, per the vendor manual's 90ms-tick definition.
///
/// This is a deliberate, separately-callable second step: `raw` is easy to
/// mistake for a millisecond count, so no interpretation is chosen inside
/// [`EngineHandle::system_time_raw`] itself.
#[must_use]
pub fn decode_msstm_ticks(raw: u32) -> std::time::SystemTime {
    let millis_since_epoch = u64::from(raw) * MSSTM_TICK_MILLIS;
    std::time::UNIX_EPOCH
        + Duration::from_secs(IRIDIUM_EPOCH_UNIX_SECS)
        + Duration::from_millis(millis_since_epoch)
}

fn parse_signal_quality(response: &str, prefix: &str) -> Result<u8, IridiumError> {
    let value: u8 = response
        .trim_start_matches(prefix)
        .trim()
        .parse()
        .map_err(|_| IridiumError::CommandError(format!("unparsable signal quality: {response:?}")))?;
    if value > 5 {
        return Err(IridiumError::CommandError(format!(
            "signal quality {value} out of range [0,5]"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sbd_status_fields() {
        let fields = parse_csv_after_prefix("+SBDS: 0, 12, 1, 3\r\nOK", "+SBDS:").unwrap();
        assert_eq!(fields, vec!["0", "12", "1", "3"]);
    }

    #[test]
    fn parses_sbdsx_fields() {
        let fields =
            parse_csv_after_prefix("+SBDSX: 0, 12, 1, 3, 0, 2\r\nOK", "+SBDSX:").unwrap();
        assert_eq!(fields, vec!["0", "12", "1", "3", "0", "2"]);
    }

    #[test]
    fn signal_quality_rejects_out_of_range() {
        assert!(parse_signal_quality("+CSQ:9", "+CSQ:").is_err());
    }

    #[test]
    fn decode_msstm_ticks_at_zero_is_the_iridium_epoch() {
        let decoded = decode_msstm_ticks(0);
        let expected = std::time::UNIX_EPOCH + Duration::from_secs(IRIDIUM_EPOCH_UNIX_SECS);
        assert_eq!(decoded, expected);
    }

    #[test]
    fn decode_msstm_ticks_advances_by_90ms_per_tick() {
        let one_tick = decode_msstm_ticks(1);
        let epoch = decode_msstm_ticks(0);
        assert_eq!(
            one_tick.duration_since(epoch).unwrap(),
            Duration::from_millis(MSSTM_TICK_MILLIS)
        );
    }

    #[test]
    fn signal_quality_parses_in_range() {
        assert_eq!(parse_signal_quality("+CSQ:4", "+CSQ:").unwrap(), 4);
    }
}
