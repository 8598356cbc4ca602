use std::time::{SystemTime, UNIX_EPOCH};

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::BigNum;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rand::rand_bytes;
use openssl::rsa::Rsa;
use openssl::x509::{X509Name, X509NameBuilder};

use crate::error::CertResult;

pub(crate) const X509_VERSION_3: i32 = 2;
pub(crate) const RSA_KEY_BITS: u32 = 2048;
pub(crate) const SUBJECT_COUNTRY: &str = "US";

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
pub(crate) const CERT_LIFETIME_DAYS: i64 = 10 * 365;

pub(crate) fn generate_rsa_key() -> CertResult<PKey<Private>> {
    let rsa = Rsa::generate(RSA_KEY_BITS)?;
    Ok(PKey::from_rsa(rsa)?)
}

pub(crate) fn serial_number(serial: u64) -> CertResult<Asn1Integer> {
    let serial = BigNum::from_slice(&serial.to_be_bytes())?;
    Ok(serial.to_asn1_integer()?)
}

/// Returns `[now - backdate_days, now + CERT_LIFETIME_DAYS]`.
pub(crate) fn validity_window(backdate_days: i64) -> CertResult<(Asn1Time, Asn1Time)> {
    validity_window_at(SystemTime::now(), backdate_days)
}

pub(crate) fn validity_window_at(
    now: SystemTime,
    backdate_days: i64,
) -> CertResult<(Asn1Time, Asn1Time)> {
    let now = now.duration_since(UNIX_EPOCH)?.as_secs() as i64;
    let not_before = Asn1Time::from_unix((now - backdate_days * SECONDS_PER_DAY) as _)?;
    let not_after = Asn1Time::from_unix((now + CERT_LIFETIME_DAYS * SECONDS_PER_DAY) as _)?;
    Ok((not_before, not_after))
}

pub(crate) fn subject_name(organization: &str, common_name: Option<&str>) -> CertResult<X509Name> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COUNTRYNAME, SUBJECT_COUNTRY)?;
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, organization)?;
    if let Some(common_name) = common_name {
        name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    }
    Ok(name.build())
}

pub(crate) fn random_hex(byte_len: usize) -> CertResult<String> {
    let mut bytes = vec![0u8; byte_len];
    rand_bytes(&mut bytes)?;
    Ok(bytes.iter().map(|byte| format!("{byte:02x}")).collect())
}
