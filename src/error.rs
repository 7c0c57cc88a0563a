/*
 *  Copyright (C) 2025 Michael Bachmann
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU Affero General Public License for more details.
 *
 *  You should have received a copy of the GNU Affero General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Error taxonomy for the codec, SGL, RIFF framer and media bridge.
//!
//! Per-subsystem "internal" errors are boxed into the bridge-facing
//! `BridgeError`, which in turn composes into the top-level `CdiError`, the
//! same layering `aes67-rs` uses for its sender/receiver/vsc errors.

use miette::Diagnostic;
use std::io;
use thiserror::Error;

/// Status codes returned from the public codec/bridge surface (`spec` §6-7).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    #[error("ok")]
    Ok,
    #[error("invalid payload")]
    InvalidPayload,
    #[error("payload decoded with per-packet parity/checksum errors")]
    RxPayloadError,
    #[error("fatal error")]
    Fatal,
}

/// Errors raised by `anc::packetize`/`anc::unpacketize`.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum AncError {
    #[error("destination buffer too small: needed {needed}, had {available}")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("data_count {0} exceeds 255")]
    DataCountTooLarge(u8),
    #[error("encode error: {0}")]
    EncodeError(String),
    #[error("truncated payload: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("payload size {0} is not a multiple of 4 bytes")]
    Misaligned(usize),
    #[error("received FieldKind::Invalid in payload header")]
    InvalidFieldKind,
    #[error("unsupported wire format version {0}")]
    UnsupportedVersion(u8),
}

impl AncError {
    /// Maps an encode/structural codec error onto the public `Status` taxonomy.
    pub fn status(&self) -> Status {
        Status::InvalidPayload
    }
}

pub type AncResult<T> = Result<T, AncError>;

/// Errors raised by the RIFF reader/writer.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum RiffError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("missing or invalid RIFF marker")]
    BadRiffMarker,
    #[error("missing or invalid form type, expected \"CDI \"")]
    BadFormType,
    #[error("unexpected FOURCC {found:?}, expected \"ANC \"")]
    UnexpectedFourCc { found: [u8; 4] },
    #[error("chunk payload size {size} exceeds max_payload_size {max}")]
    PayloadTooLarge { size: u32, max: u32 },
    #[error("truncated chunk header")]
    TruncatedHeader,
}

impl From<io::Error> for RiffError {
    fn from(e: io::Error) -> Self {
        RiffError::Io(e.to_string())
    }
}

pub type RiffResult<T> = Result<T, RiffError>;

/// Internal errors of the frame pool.
#[derive(Error, Debug, Diagnostic, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool exhausted: all {capacity} slots in use")]
    Exhausted { capacity: usize },
}

/// Internal errors of the bounded payload/callback FIFOs.
#[derive(Error, Debug, Diagnostic, Clone, Copy, PartialEq, Eq)]
pub enum FifoError {
    #[error("write attempted on a FIFO after shutdown")]
    WriteAfterShutdown,
    #[error("FIFO read timed out")]
    TimedOut,
    #[error("FIFO is closed")]
    Closed,
}

/// Internal errors of the format converters.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("unsupported pixel layout FOURCC {0:?}")]
    UnsupportedPixelLayout([u8; 4]),
    #[error("unsupported bit depth {0}, only 8 and 10 bit are supported")]
    UnsupportedBitDepth(u8),
    #[error("unsupported sample rate {0}")]
    UnsupportedSampleRate(u32),
    #[error("unsupported channel count {0} for baseline channel grouping")]
    UnsupportedChannelGrouping(u16),
}

impl ConvertError {
    pub fn status(&self) -> Status {
        Status::InvalidPayload
    }
}

pub type ConvertResult<T> = Result<T, ConvertError>;

/// Internal errors of `bridge::config`.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(String),
    #[error("{0}")]
    Convert(#[from] ConvertError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Yaml(e.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Internal errors of the bridge receive worker, transmit driver and callbacks.
#[derive(Error, Debug, Diagnostic)]
pub enum BridgeInternalError {
    #[error("frame pool exhausted")]
    PoolExhausted(#[from] PoolError),
    #[error("FIFO error: {0}")]
    Fifo(#[from] FifoError),
    #[error("format conversion error: {0}")]
    Convert(#[from] ConvertError),
    #[error("ancillary codec error: {0}")]
    Anc(#[from] AncError),
    #[error("connection lost")]
    ConnectionLost,
    #[error("fatal internal invariant violated: {0}")]
    Fatal(String),
}

impl BridgeInternalError {
    pub fn status(&self) -> Status {
        match self {
            BridgeInternalError::PoolExhausted(_) | BridgeInternalError::Fatal(_) => Status::Fatal,
            BridgeInternalError::ConnectionLost => Status::Fatal,
            BridgeInternalError::Fifo(_) => Status::Fatal,
            BridgeInternalError::Convert(_) | BridgeInternalError::Anc(_) => {
                Status::InvalidPayload
            }
        }
    }
}

pub type BridgeInternalResult<T> = Result<T, BridgeInternalError>;

/// Top-level crate error, the boundary surfaced to the CLI front door.
#[derive(Error, Debug, Diagnostic)]
pub enum CdiError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Riff(#[from] RiffError),
    #[error("{0}")]
    Anc(#[from] AncError),
    #[error(transparent)]
    Bridge(#[from] Box<BridgeInternalError>),
    #[error("general error: {0}")]
    Other(String),
}

impl From<BridgeInternalError> for CdiError {
    fn from(e: BridgeInternalError) -> Self {
        CdiError::Bridge(Box::new(e))
    }
}

pub type CdiResult<T> = Result<T, CdiError>;
