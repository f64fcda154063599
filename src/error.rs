#![allow(dead_code)] // Some variants are reserved for adapter backends.

//! Unified error types for the HaloTerm firmware.
//!
//! A single `Error` enum that every subsystem can convert into. Per the
//! error-handling contract, no error crosses a component boundary: each
//! component logs and degrades, so these types mostly travel within a
//! module and into log lines. All variants are `Copy`-cheap or carry a
//! `&'static str` so they can be formatted without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The message bus rejected an operation.
    Bus(BusError),
    /// The WebSocket transport failed.
    Transport(TransportError),
    /// The layout engine rejected an input.
    Ui(UiError),
    /// An audio codec operation failed.
    Codec(CodecError),
    /// A sensor could not be initialised or read.
    Sensor(SensorError),
    /// Peripheral or subsystem initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Ui(e) => write!(f, "ui: {e}"),
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The subscription table is full (bounded at 15 entries).
    TableFull,
    /// Incoming frame was not a JSON object with a string `topic`.
    BadEnvelope,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableFull => write!(f, "subscription table full"),
            Self::BadEnvelope => write!(f, "malformed envelope"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The link is down; the outbound frame was dropped.
    Disconnected,
    /// The reassembly buffer could not be allocated.
    NoMemory,
    /// The underlying client could not be created or started.
    ClientInit,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "link disconnected"),
            Self::NoMemory => write!(f, "no memory for RX buffer"),
            Self::ClientInit => write!(f, "client init failed"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Layout engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiError {
    /// Layout or update JSON failed to parse.
    ParseFailed,
    /// A node was missing its required `type` field.
    MissingType,
    /// An update was missing its required `id` field.
    MissingId,
    /// `find_by_id` found no widget for the addressed ID.
    UnknownId,
    /// The ID registry is full; further IDs are not addressable.
    RegistryFull,
    /// Both spin animation slots are occupied.
    SpinSlotsFull,
    /// A bulk pixel buffer could not be allocated.
    NoMemory,
}

impl fmt::Display for UiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseFailed => write!(f, "JSON parse failed"),
            Self::MissingType => write!(f, "node missing 'type'"),
            Self::MissingId => write!(f, "update missing 'id'"),
            Self::UnknownId => write!(f, "no widget for id"),
            Self::RegistryFull => write!(f, "ID registry full"),
            Self::SpinSlotsFull => write!(f, "spin slots exhausted"),
            Self::NoMemory => write!(f, "pixel buffer alloc failed"),
        }
    }
}

impl From<UiError> for Error {
    fn from(e: UiError) -> Self {
        Self::Ui(e)
    }
}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The codec device could not be opened.
    OpenFailed,
    /// A blocking read from the microphone failed.
    ReadFailed,
    /// A blocking write to the speaker failed.
    WriteFailed,
    /// The Base64 payload could not be decoded.
    DecodeFailed,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "device open failed"),
            Self::ReadFailed => write!(f, "I2S read failed"),
            Self::WriteFailed => write!(f, "I2S write failed"),
            Self::DecodeFailed => write!(f, "base64 decode failed"),
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The accelerometer did not respond during init.
    InitFailed,
    /// An I2C read returned an error.
    ReadFailed,
    /// The sample was not ready yet.
    NotReady,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed => write!(f, "accelerometer init failed"),
            Self::ReadFailed => write!(f, "accelerometer read failed"),
            Self::NotReady => write!(f, "sample not ready"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
