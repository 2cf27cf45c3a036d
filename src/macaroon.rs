// ABOUTME: Decoder for delegated-authorization macaroons held in the account store
// ABOUTME: Accepts JSON v1, JSON v2 and base64 binary v2; serializes as JSON v2

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

const SIGNATURE_LEN: usize = 32;
const BINARY_VERSION_2: u8 = 2;

const FIELD_EOS: u64 = 0;
const FIELD_LOCATION: u64 = 1;
const FIELD_IDENTIFIER: u64 = 2;
const FIELD_VERIFICATION_ID: u64 = 4;
const FIELD_SIGNATURE: u64 = 6;

#[derive(Debug, Error)]
pub enum MacaroonError {
    #[error("malformed macaroon JSON")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 in macaroon")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid hex signature")]
    Hex(#[from] hex::FromHexError),
    #[error("unsupported binary macaroon version {0}")]
    UnsupportedVersion(u8),
    #[error("macaroon data is truncated")]
    Truncated,
    #[error("unexpected field type {found} (expected {expected})")]
    UnexpectedField { expected: u64, found: u64 },
    #[error("macaroon has no identifier")]
    MissingIdentifier,
    #[error("macaroon has no signature")]
    MissingSignature,
    #[error("signature is {0} bytes, expected 32")]
    InvalidSignatureLength(usize),
    #[error("macaroon location is not valid UTF-8")]
    InvalidUtf8,
    #[error("{0} unexpected bytes after macaroon")]
    TrailingData(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caveat {
    pub id: Vec<u8>,
    /// Set only on third-party caveats.
    pub verification_id: Option<Vec<u8>>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macaroon {
    location: String,
    identifier: Vec<u8>,
    caveats: Vec<Caveat>,
    signature: [u8; SIGNATURE_LEN],
}

/// A root macaroon followed by its bound discharges.
pub type MacaroonSlice = Vec<Macaroon>;

impl Macaroon {
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    pub fn caveats(&self) -> &[Caveat] {
        &self.caveats
    }

    pub fn signature(&self) -> &[u8; SIGNATURE_LEN] {
        &self.signature
    }

    /// Decode a macaroon in whichever serialized form the store holds.
    ///
    /// Text starting with `{` is JSON (v1 or v2); anything else is taken as
    /// base64-encoded binary v2.
    pub fn decode(serialized: &str) -> Result<Self, MacaroonError> {
        let trimmed = serialized.trim();
        if trimmed.starts_with('{') {
            return Self::from_json(trimmed);
        }
        let bytes = decode_base64(trimmed)?;
        Self::from_binary(&bytes)
    }

    pub fn from_json(json: &str) -> Result<Self, MacaroonError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.get("identifier").is_some() || value.get("signature").is_some() {
            let v1: JsonV1 = serde_json::from_value(value)?;
            v1.into_macaroon()
        } else {
            let v2: JsonV2 = serde_json::from_value(value)?;
            v2.into_macaroon()
        }
    }

    pub fn from_binary(data: &[u8]) -> Result<Self, MacaroonError> {
        let (&version, rest) = data.split_first().ok_or(MacaroonError::Truncated)?;
        if version != BINARY_VERSION_2 {
            return Err(MacaroonError::UnsupportedVersion(version));
        }

        let mut reader = PacketReader { data: rest };

        let mut location = String::new();
        let mut field = reader.read_field()?;
        if field.kind == FIELD_LOCATION {
            location = utf8(field.data)?;
            field = reader.read_field()?;
        }
        if field.kind != FIELD_IDENTIFIER {
            return Err(MacaroonError::MissingIdentifier);
        }
        let identifier = field.data.to_vec();
        reader.expect_eos()?;

        let mut caveats = Vec::new();
        loop {
            let mut field = reader.read_field()?;
            if field.kind == FIELD_EOS {
                break;
            }
            let mut caveat_location = None;
            if field.kind == FIELD_LOCATION {
                caveat_location = Some(utf8(field.data)?);
                field = reader.read_field()?;
            }
            if field.kind != FIELD_IDENTIFIER {
                return Err(MacaroonError::UnexpectedField {
                    expected: FIELD_IDENTIFIER,
                    found: field.kind,
                });
            }
            let id = field.data.to_vec();

            let mut verification_id = None;
            let mut field = reader.read_field()?;
            if field.kind == FIELD_VERIFICATION_ID {
                verification_id = Some(field.data.to_vec());
                field = reader.read_field()?;
            }
            if field.kind != FIELD_EOS {
                return Err(MacaroonError::UnexpectedField {
                    expected: FIELD_EOS,
                    found: field.kind,
                });
            }
            caveats.push(Caveat {
                id,
                verification_id,
                location: caveat_location,
            });
        }

        let field = reader.read_field()?;
        if field.kind != FIELD_SIGNATURE {
            return Err(MacaroonError::UnexpectedField {
                expected: FIELD_SIGNATURE,
                found: field.kind,
            });
        }
        let signature = signature_from(field.data)?;

        if !reader.data.is_empty() {
            return Err(MacaroonError::TrailingData(reader.data.len()));
        }

        Ok(Self {
            location,
            identifier,
            caveats,
            signature,
        })
    }
}

/// Macaroons for a login from a stored token field.
///
/// A missing or blank field means no macaroons; otherwise the token becomes
/// a single slice holding just that macaroon.
pub fn stored_slices(token: Option<&str>) -> Result<Vec<MacaroonSlice>, MacaroonError> {
    match token {
        Some(serialized) if !serialized.trim().is_empty() => {
            Ok(vec![vec![Macaroon::decode(serialized)?]])
        }
        _ => Ok(Vec::new()),
    }
}

struct Field<'a> {
    kind: u64,
    data: &'a [u8],
}

struct PacketReader<'a> {
    data: &'a [u8],
}

impl<'a> PacketReader<'a> {
    fn read_uvarint(&mut self) -> Result<u64, MacaroonError> {
        let data = self.data;
        let mut value: u64 = 0;
        for (i, &byte) in data.iter().enumerate().take(10) {
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                self.data = &data[i + 1..];
                return Ok(value);
            }
        }
        Err(MacaroonError::Truncated)
    }

    /// EOS is a bare type byte; every other field carries a length and payload.
    fn read_field(&mut self) -> Result<Field<'a>, MacaroonError> {
        let kind = self.read_uvarint()?;
        if kind == FIELD_EOS {
            return Ok(Field { kind, data: &[] });
        }
        let len = usize::try_from(self.read_uvarint()?).map_err(|_| MacaroonError::Truncated)?;
        let data = self.data;
        if len > data.len() {
            return Err(MacaroonError::Truncated);
        }
        let (payload, rest) = data.split_at(len);
        self.data = rest;
        Ok(Field {
            kind,
            data: payload,
        })
    }

    fn expect_eos(&mut self) -> Result<(), MacaroonError> {
        let field = self.read_field()?;
        if field.kind != FIELD_EOS {
            return Err(MacaroonError::UnexpectedField {
                expected: FIELD_EOS,
                found: field.kind,
            });
        }
        Ok(())
    }
}

fn utf8(data: &[u8]) -> Result<String, MacaroonError> {
    String::from_utf8(data.to_vec()).map_err(|_| MacaroonError::InvalidUtf8)
}

fn signature_from(data: &[u8]) -> Result<[u8; SIGNATURE_LEN], MacaroonError> {
    data.try_into()
        .map_err(|_| MacaroonError::InvalidSignatureLength(data.len()))
}

/// Base64 in the wild comes padded or not, in either alphabet.
fn decode_base64(s: &str) -> Result<Vec<u8>, MacaroonError> {
    let unpadded = s.trim_end_matches('=');
    let bytes = if unpadded.contains(['+', '/']) {
        STANDARD_NO_PAD.decode(unpadded)?
    } else {
        URL_SAFE_NO_PAD.decode(unpadded)?
    };
    Ok(bytes)
}

#[derive(Deserialize)]
struct JsonV1 {
    #[serde(default)]
    location: String,
    identifier: Option<String>,
    signature: Option<String>,
    #[serde(default)]
    caveats: Option<Vec<CaveatJsonV1>>,
}

#[derive(Deserialize)]
struct CaveatJsonV1 {
    cid: String,
    #[serde(default)]
    vid: Option<String>,
    #[serde(default)]
    cl: Option<String>,
}

impl JsonV1 {
    fn into_macaroon(self) -> Result<Macaroon, MacaroonError> {
        let identifier = self.identifier.ok_or(MacaroonError::MissingIdentifier)?;
        let signature = hex::decode(self.signature.ok_or(MacaroonError::MissingSignature)?)?;

        let caveats = self
            .caveats
            .unwrap_or_default()
            .into_iter()
            .map(|c| {
                Ok(Caveat {
                    id: c.cid.into_bytes(),
                    verification_id: c
                        .vid
                        .filter(|v| !v.is_empty())
                        .map(|v| decode_base64(&v))
                        .transpose()?,
                    location: c.cl.filter(|l| !l.is_empty()),
                })
            })
            .collect::<Result<Vec<_>, MacaroonError>>()?;

        Ok(Macaroon {
            location: self.location,
            identifier: identifier.into_bytes(),
            caveats,
            signature: signature_from(&signature)?,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct JsonV2 {
    #[serde(rename = "c", default, skip_serializing_if = "Vec::is_empty")]
    caveats: Vec<CaveatJsonV2>,
    #[serde(rename = "l", default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    identifier: Option<String>,
    #[serde(rename = "i64", default, skip_serializing_if = "Option::is_none")]
    identifier64: Option<String>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    #[serde(rename = "s64", default, skip_serializing_if = "Option::is_none")]
    signature64: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct CaveatJsonV2 {
    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    identifier: Option<String>,
    #[serde(rename = "i64", default, skip_serializing_if = "Option::is_none")]
    identifier64: Option<String>,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    verification_id: Option<String>,
    #[serde(rename = "v64", default, skip_serializing_if = "Option::is_none")]
    verification_id64: Option<String>,
    #[serde(rename = "l", default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

/// v2 JSON stores each binary field either as text (`i`) or base64 (`i64`).
fn text_or_base64(
    text: Option<String>,
    encoded: Option<String>,
) -> Result<Option<Vec<u8>>, MacaroonError> {
    match (text, encoded) {
        (Some(text), _) => Ok(Some(text.into_bytes())),
        (None, Some(encoded)) => Ok(Some(decode_base64(&encoded)?)),
        (None, None) => Ok(None),
    }
}

/// Inverse of `text_or_base64`: text when the bytes are UTF-8, base64 otherwise.
fn split_text_or_base64(bytes: &[u8]) -> (Option<String>, Option<String>) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (Some(text.to_string()), None),
        Err(_) => (None, Some(URL_SAFE_NO_PAD.encode(bytes))),
    }
}

impl JsonV2 {
    fn into_macaroon(self) -> Result<Macaroon, MacaroonError> {
        let identifier = text_or_base64(self.identifier, self.identifier64)?
            .ok_or(MacaroonError::MissingIdentifier)?;
        let signature = text_or_base64(self.signature, self.signature64)?
            .ok_or(MacaroonError::MissingSignature)?;

        let caveats = self
            .caveats
            .into_iter()
            .map(|c| {
                Ok(Caveat {
                    id: text_or_base64(c.identifier, c.identifier64)?
                        .ok_or(MacaroonError::MissingIdentifier)?,
                    verification_id: text_or_base64(c.verification_id, c.verification_id64)?,
                    location: c.location,
                })
            })
            .collect::<Result<Vec<_>, MacaroonError>>()?;

        Ok(Macaroon {
            location: self.location.unwrap_or_default(),
            identifier,
            caveats,
            signature: signature_from(&signature)?,
        })
    }

    fn from_macaroon(m: &Macaroon) -> Self {
        let (identifier, identifier64) = split_text_or_base64(&m.identifier);
        let caveats = m
            .caveats
            .iter()
            .map(|c| {
                let (identifier, identifier64) = split_text_or_base64(&c.id);
                CaveatJsonV2 {
                    identifier,
                    identifier64,
                    verification_id: None,
                    verification_id64: c.verification_id.as_ref().map(|v| URL_SAFE_NO_PAD.encode(v)),
                    location: c.location.clone(),
                }
            })
            .collect();

        Self {
            caveats,
            location: Some(m.location.clone()).filter(|l| !l.is_empty()),
            identifier,
            identifier64,
            signature: None,
            signature64: Some(URL_SAFE_NO_PAD.encode(m.signature)),
        }
    }
}

impl Serialize for Macaroon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        JsonV2::from_macaroon(self).serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIG_HEX: &str = "e3d9e02908526c4c0039ae15114115d97fdd68bf2ba379b342aaf0f617d0552f";

    fn field(kind: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![kind, payload.len() as u8];
        out.extend_from_slice(payload);
        out
    }

    fn sample_binary() -> Vec<u8> {
        let mut data = vec![BINARY_VERSION_2];
        data.extend(field(1, b"http://example.org/"));
        data.extend(field(2, b"keyid"));
        data.push(0);
        // first-party caveat
        data.extend(field(2, b"account = 3735928559"));
        data.push(0);
        // third-party caveat
        data.extend(field(1, b"https://auth.example.org"));
        data.extend(field(2, b"third-party-id"));
        data.extend(field(4, &[0xff, 0x00, 0x10]));
        data.push(0);
        data.push(0);
        data.extend(field(6, &hex::decode(SIG_HEX).unwrap()));
        data
    }

    #[test]
    fn test_decode_json_v1() {
        let json = format!(
            r#"{{"caveats":[{{"cid":"declared username admin"}}],"location":"juju model 1","identifier":"abc123","signature":"{SIG_HEX}"}}"#
        );
        let mac = Macaroon::decode(&json).unwrap();
        assert_eq!(mac.location(), "juju model 1");
        assert_eq!(mac.identifier(), b"abc123");
        assert_eq!(mac.caveats().len(), 1);
        assert!(mac.caveats()[0].verification_id.is_none());
        assert_eq!(hex::encode(mac.signature()), SIG_HEX);
    }

    #[test]
    fn test_decode_json_v1_third_party_caveat() {
        let json = format!(
            r#"{{"caveats":[{{"cid":"need-login","vid":"AQID","cl":"https://idm"}}],"location":"","identifier":"x","signature":"{SIG_HEX}"}}"#
        );
        let mac = Macaroon::decode(&json).unwrap();
        let caveat = &mac.caveats()[0];
        assert!(caveat.verification_id.is_some());
        assert_eq!(caveat.verification_id.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(caveat.location.as_deref(), Some("https://idm"));
    }

    #[test]
    fn test_decode_json_v2() {
        let sig = URL_SAFE_NO_PAD.encode(hex::decode(SIG_HEX).unwrap());
        let json = format!(r#"{{"c":[{{"i":"time-before 2030"}}],"l":"loc","i64":"AAEC","s64":"{sig}"}}"#);
        let mac = Macaroon::decode(&json).unwrap();
        assert_eq!(mac.location(), "loc");
        assert_eq!(mac.identifier(), &[0u8, 1, 2]);
        assert_eq!(mac.caveats()[0].id, b"time-before 2030");
    }

    #[test]
    fn test_decode_binary_v2_both_alphabets() {
        let data = sample_binary();
        for encoded in [
            URL_SAFE_NO_PAD.encode(&data),
            base64::engine::general_purpose::STANDARD.encode(&data),
        ] {
            let mac = Macaroon::decode(&encoded).unwrap();
            assert_eq!(mac.location(), "http://example.org/");
            assert_eq!(mac.identifier(), b"keyid");
            assert_eq!(mac.caveats().len(), 2);
            assert!(mac.caveats()[0].verification_id.is_none());
            assert_eq!(
                mac.caveats()[1].location.as_deref(),
                Some("https://auth.example.org")
            );
            assert_eq!(
                mac.caveats()[1].verification_id.as_deref(),
                Some(&[0xffu8, 0x00, 0x10][..])
            );
        }
    }

    #[test]
    fn test_binary_errors() {
        assert!(matches!(
            Macaroon::from_binary(&[]),
            Err(MacaroonError::Truncated)
        ));
        assert!(matches!(
            Macaroon::from_binary(&[1, 2, 3]),
            Err(MacaroonError::UnsupportedVersion(1))
        ));

        let data = sample_binary();
        assert!(matches!(
            Macaroon::from_binary(&data[..data.len() - 4]),
            Err(MacaroonError::Truncated)
        ));

        let mut trailing = data.clone();
        trailing.push(0);
        assert!(matches!(
            Macaroon::from_binary(&trailing),
            Err(MacaroonError::TrailingData(1))
        ));

        let mut short_sig = vec![BINARY_VERSION_2];
        short_sig.extend(field(2, b"id"));
        short_sig.extend([0, 0]);
        short_sig.extend(field(6, &[1, 2, 3]));
        assert!(matches!(
            Macaroon::from_binary(&short_sig),
            Err(MacaroonError::InvalidSignatureLength(3))
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Macaroon::decode("{not json"),
            Err(MacaroonError::Json(_))
        ));
        assert!(matches!(
            Macaroon::decode("!!!"),
            Err(MacaroonError::Base64(_))
        ));
        assert!(matches!(
            Macaroon::decode(r#"{"identifier":"x","signature":"zz"}"#),
            Err(MacaroonError::Hex(_))
        ));
        assert!(matches!(
            Macaroon::decode(&format!(r#"{{"location":"l","signature":"{SIG_HEX}"}}"#)),
            Err(MacaroonError::MissingIdentifier)
        ));
    }

    #[test]
    fn test_serializes_as_json_v2() {
        let mac = Macaroon::decode(&URL_SAFE_NO_PAD.encode(sample_binary())).unwrap();
        let value = serde_json::to_value(&mac).unwrap();
        assert_eq!(value["l"], "http://example.org/");
        assert_eq!(value["i"], "keyid");
        assert_eq!(value["c"][1]["v64"], "_wAQ");
        assert!(value.get("signature").is_none());

        let back = Macaroon::from_json(&value.to_string()).unwrap();
        assert_eq!(back, mac);
    }

    #[test]
    fn test_stored_slices() {
        assert!(stored_slices(None).unwrap().is_empty());
        assert!(stored_slices(Some("")).unwrap().is_empty());
        assert!(stored_slices(Some(" \n")).unwrap().is_empty());

        let json = format!(r#"{{"location":"c","identifier":"id","signature":"{SIG_HEX}"}}"#);
        let slices = stored_slices(Some(&json)).unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].len(), 1);
        assert_eq!(slices[0][0].identifier(), b"id");

        assert!(stored_slices(Some("{}")).is_err());
    }
}
