//! Binary codec for [`Apdu`] values.
//!
//! The codec turns APDUs into `bincode` payloads and back. Framing (the length
//! prefix that delimits payloads on the stream) belongs to
//! [`transport`](crate::transport); this module only sees complete payloads.

use bincode::{
    Encode,
    config::{self, Config},
    error::{DecodeError, EncodeError},
};
use thiserror::Error;

use crate::{apdu::Apdu, transport};

/// Upper bound on any single decoded value, matching the largest frame the
/// transport will hand us.
const CODEC_LIMIT: usize = 64 * 1024 * 1024;

/// Errors raised while encoding or decoding APDUs.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload is not a valid APDU.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    /// The APDU could not be serialised.
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),
    /// The payload decoded but bytes were left over.
    #[error("{0} trailing bytes after apdu")]
    TrailingBytes(usize),
    /// The encoded APDU does not fit a frame.
    #[error("encoded apdu too large for a frame")]
    FrameTooLarge,
}

fn wire_config() -> impl Config {
    config::standard()
        .with_big_endian()
        .with_limit::<CODEC_LIMIT>()
}

/// Decode a complete payload into an APDU.
///
/// # Errors
/// Returns [`CodecError::Decode`] for malformed payloads and
/// [`CodecError::TrailingBytes`] when the payload holds more than one value.
#[must_use = "handle the result"]
pub fn decode(payload: &[u8]) -> Result<Apdu, CodecError> {
    let (apdu, used) = bincode::decode_from_slice::<Apdu, _>(payload, wire_config())?;
    if used != payload.len() {
        return Err(CodecError::TrailingBytes(payload.len() - used));
    }
    Ok(apdu)
}

/// Encode an APDU into a payload without framing.
///
/// # Errors
/// Returns [`CodecError::Encode`] if serialisation fails.
#[must_use = "handle the result"]
pub fn encode(apdu: &Apdu) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::encode_to_vec(apdu, wire_config())?)
}

/// Encode an APDU and prepend the transport length prefix.
///
/// # Errors
/// Returns [`CodecError::Encode`] if serialisation fails or
/// [`CodecError::FrameTooLarge`] if the payload cannot be framed.
#[must_use = "handle the result"]
pub fn encode_frame(apdu: &Apdu) -> Result<Vec<u8>, CodecError> {
    let payload = encode(apdu)?;
    transport::frame_payload(&payload).map_err(|_| CodecError::FrameTooLarge)
}

/// Number of bytes `value` occupies once encoded.
///
/// The record packer uses this to measure records against the negotiated
/// message size before committing them to a response.
///
/// # Errors
/// Returns [`CodecError::Encode`] if serialisation fails.
#[must_use = "handle the result"]
pub fn encoded_len<T: Encode>(value: &T) -> Result<usize, CodecError> {
    Ok(bincode::encode_to_vec(value, wire_config())?.len())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::apdu::{Close, CloseReason, InitRequest, Query, SearchRequest};

    fn search(query: Query) -> Apdu {
        Apdu::SearchRequest(SearchRequest {
            reference_id: Some(b"ref-1".to_vec()),
            small_set_upper_bound: 0,
            large_set_lower_bound: 1,
            medium_set_present_number: 0,
            replace_indicator: true,
            result_set_name: "default".to_owned(),
            database_names: vec!["Default".to_owned()],
            small_set_element_set: None,
            medium_set_element_set: None,
            preferred_record_syntax: None,
            query,
        })
    }

    #[rstest]
    #[case(Apdu::InitRequest(InitRequest::default()))]
    #[case(Apdu::Close(Close::new(CloseReason::Finished)))]
    #[case(search(Query::Prefix("@attr 1=4 water".to_owned())))]
    fn decodes_what_it_encodes(#[case] apdu: Apdu) {
        let bytes = encode(&apdu).expect("encode");
        assert_eq!(decode(&bytes).expect("decode"), apdu);
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode(&Apdu::Close(Close::new(CloseReason::Finished))).expect("encode");
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(CodecError::TrailingBytes(1))));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode(&[0xff, 0xff, 0xff]), Err(CodecError::Decode(_))));
    }

    #[test]
    fn frame_carries_length_prefix() {
        let apdu = Apdu::Close(Close::new(CloseReason::Shutdown));
        let payload = encode(&apdu).expect("encode");
        let frame = encode_frame(&apdu).expect("frame");
        assert_eq!(frame.len(), payload.len() + transport::FRAME_PREFIX_LEN);
        assert_eq!(frame.get(transport::FRAME_PREFIX_LEN..), Some(payload.as_slice()));
    }

    #[test]
    fn encoded_len_matches_encoding() {
        let apdu = search(Query::Keyword("fish and chips".to_owned()));
        assert_eq!(
            encoded_len(&apdu).expect("len"),
            encode(&apdu).expect("encode").len()
        );
    }
}
