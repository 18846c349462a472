// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Frame encoding and the shared length-prefixed transport framing.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::event::EventFrame;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode frame: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode an RPC message as a tagged record with named fields.
pub fn encode<T: Serialize>(msg: &T) -> Result<Bytes, WireError> {
    Ok(Bytes::from(rmp_serde::to_vec_named(msg)?))
}

/// Decode an RPC message. Accepts both named-field and positional encodings.
pub fn decode<T: DeserializeOwned>(buf: &[u8]) -> Result<T, WireError> {
    Ok(rmp_serde::from_slice(buf)?)
}

/// Encode an event frame positionally (a 3-element array).
pub fn encode_event(frame: &EventFrame) -> Result<Bytes, WireError> {
    Ok(Bytes::from(rmp_serde::to_vec(frame)?))
}

pub fn decode_event(buf: &[u8]) -> Result<EventFrame, WireError> {
    Ok(rmp_serde::from_slice(buf)?)
}

/// Wrap a byte stream in the length-prefixed framing every transport in the
/// system uses. One framed item = one message.
pub fn framed<T>(io: T) -> Framed<T, LengthDelimitedCodec>
where
    T: AsyncRead + AsyncWrite,
{
    Framed::new(io, LengthDelimitedCodec::new())
}
