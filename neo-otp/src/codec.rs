//! OTP command payloads
//!
//! Request builders return the CBOR body that follows the command byte;
//! response parsers take the [`WireMap`] handed back by the executor.
//!
//! Request layouts:
//! - Create: `{1: label, 2: type, 3: {1: 4, 3: alg, -1: secret}, 4: digits, 5?: counter, 6?: period}`
//! - Generate: `{1: label, 2?: time step}`
//! - Delete: `{1: label}`
//! - Enumerate: `{1: index, 2?: count}`

use crate::error::{Error, Result};
use crate::types::{Algorithm, DEFAULT_PERIOD, Generator, NewGenerator, OtpType};

use neo_otp_ctap::keys::{enumerate as enum_keys, generate as gen_keys, generator as r#gen, key_material};
use neo_otp_ctap::{MapBuilder, OtpStatus, Value, WireMap};

fn encode(builder: MapBuilder) -> Result<Vec<u8>> {
    builder
        .build()
        .map_err(|e| Error::InvalidParameter(format!("Cannot encode request: {}", e)))
}

/// TOTP time step for `unix_time`
pub fn time_step(unix_time: u64, period: u32) -> u64 {
    unix_time / u64::from(period.max(1))
}

/// Capability probe: count-only Enumerate
pub fn probe_request() -> Result<Vec<u8>> {
    enumerate_request(0, Some(0))
}

/// Enumerate `count` records starting at `index`; `Some(0)` asks for the total only
pub fn enumerate_request(index: u64, count: Option<u64>) -> Result<Vec<u8>> {
    encode(
        MapBuilder::new()
            .insert_uint(enum_keys::INDEX, index)
            .insert_uint_opt(enum_keys::COUNT, count),
    )
}

/// Create a generator; the counter only goes out for HOTP and the period only for TOTP
pub fn create_request(new: &NewGenerator) -> Result<Vec<u8>> {
    let key = MapBuilder::new()
        .insert_uint(key_material::KTY, key_material::KTY_SYMMETRIC)
        .insert_uint(key_material::ALG, new.algorithm.code())
        .insert_bytes(key_material::SECRET, &new.secret)
        .build_value();

    let counter = match new.otp_type {
        OtpType::Hotp => new.counter.map(u64::to_be_bytes),
        OtpType::Totp => None,
    };
    let period = match new.otp_type {
        OtpType::Totp => new.period.map(u64::from),
        OtpType::Hotp => None,
    };

    encode(
        MapBuilder::new()
            .insert_text(r#gen::LABEL, &new.label)
            .insert_uint(r#gen::TYPE, new.otp_type.code())
            .insert_value(r#gen::KEY, key)
            .insert_uint(r#gen::DIGITS, u64::from(new.digits))
            .insert_bytes_opt(r#gen::COUNTER, counter.as_ref().map(|c| c.as_slice()))
            .insert_uint_opt(r#gen::PERIOD, period),
    )
}

/// Generate a code; TOTP carries the time step as 8 big-endian bytes
pub fn generate_request(
    label: &str,
    otp_type: OtpType,
    period: Option<u32>,
    unix_time: u64,
) -> Result<Vec<u8>> {
    let step = match otp_type {
        OtpType::Totp => Some(time_step(unix_time, period.unwrap_or(DEFAULT_PERIOD)).to_be_bytes()),
        OtpType::Hotp => None,
    };

    encode(
        MapBuilder::new()
            .insert_text(gen_keys::LABEL, label)
            .insert_bytes_opt(gen_keys::TIME_COUNTER, step.as_ref().map(|s| s.as_slice())),
    )
}

/// Delete a generator
pub fn delete_request(label: &str) -> Result<Vec<u8>> {
    encode(MapBuilder::new().insert_text(r#gen::LABEL, label))
}

/// Code returned by Generate
pub fn parse_generate_response(reply: &WireMap) -> Result<String> {
    let key = i64::from(gen_keys::RESP_CODE);
    match reply.get_raw(key) {
        Some(Value::Integer(code)) => Ok(code.to_string()),
        Some(_) => reply
            .get_text(key)
            .map_err(|status| Error::malformed("Generate", status)),
        None => Err(Error::malformed("Generate", OtpStatus::InvalidParameter)),
    }
}

/// One Enumerate page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratePage {
    /// Number of generators on the token
    pub total: u64,
    /// Records of this page, in index order
    pub records: Vec<Generator>,
}

/// Parse an Enumerate reply; a count-only reply has no records
pub fn parse_enumerate_response(reply: &WireMap) -> Result<EnumeratePage> {
    let total = reply
        .get_u64(enum_keys::RESP_TOTAL.into())
        .map_err(|status| Error::malformed("Enumerate", status))?;

    let records = reply
        .get_array_or_empty(enum_keys::RESP_RECORDS.into())
        .map_err(|status| Error::malformed("Enumerate", status))?
        .into_iter()
        .map(parse_generator)
        .collect::<Result<Vec<_>>>()?;

    Ok(EnumeratePage { total, records })
}

/// Parse one generator record
///
/// Key 3 is either a bare algorithm code or a key-material map; the counter
/// may come as 8 big-endian bytes or as an integer.
pub fn parse_generator(value: Value) -> Result<Generator> {
    let record = WireMap::from_value(value).map_err(|status| Error::malformed("record", status))?;
    let malformed = |status: OtpStatus| Error::malformed("record", status);

    let label = record.get_text(r#gen::LABEL.into()).map_err(malformed)?;

    let type_code = record.get_u64(r#gen::TYPE.into()).map_err(malformed)?;
    let otp_type = OtpType::from_code(type_code)
        .ok_or_else(|| Error::Communication(format!("Unknown OTP type {} for {}", type_code, label)))?;

    let alg_code = match record.get_raw(r#gen::KEY.into()) {
        Some(Value::Map(_)) => record
            .get_map(r#gen::KEY.into())
            .and_then(|key| key.get_u64(key_material::ALG.into()))
            .map_err(malformed)?,
        _ => record.get_u64(r#gen::KEY.into()).map_err(malformed)?,
    };
    let algorithm = Algorithm::from_code(alg_code)
        .ok_or_else(|| Error::Communication(format!("Unknown algorithm {} for {}", alg_code, label)))?;

    let digits = record.get_u64(r#gen::DIGITS.into()).map_err(malformed)?;
    let digits = u8::try_from(digits).map_err(|_| malformed(OtpStatus::InvalidParameter))?;

    let counter = match record.get_raw(r#gen::COUNTER.into()) {
        None => None,
        Some(Value::Bytes(bytes)) => Some(counter_from_bytes(bytes).ok_or_else(|| malformed(OtpStatus::InvalidParameter))?),
        Some(_) => record.get_u64_opt(r#gen::COUNTER.into()).map_err(malformed)?,
    };

    let period = record
        .get_u64_opt(r#gen::PERIOD.into())
        .map_err(malformed)?
        .map(|p| u32::try_from(p).map_err(|_| malformed(OtpStatus::InvalidParameter)))
        .transpose()?;

    let (counter, period) = match otp_type {
        OtpType::Hotp => (counter, None),
        OtpType::Totp => (None, Some(period.unwrap_or(DEFAULT_PERIOD))),
    };

    Ok(Generator {
        label,
        otp_type,
        algorithm,
        digits,
        counter,
        period,
    })
}

/// Big-endian counter of at most 8 bytes
fn counter_from_bytes(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}
