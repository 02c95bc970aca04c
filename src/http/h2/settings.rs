//! HTTP/2 SETTINGS parameters
//!
//! Identifiers from RFC 7540 Section 6.5.2 and parsing of a SETTINGS payload
//! into its (identifier, value) pairs.

use super::error::{Error, Result};
use std::fmt;

/// HTTP/2 settings parameters (RFC 7540 Section 6.5.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SettingsParameter {
    /// SETTINGS_HEADER_TABLE_SIZE (0x1)
    HeaderTableSize = 0x1,
    /// SETTINGS_ENABLE_PUSH (0x2)
    EnablePush = 0x2,
    /// SETTINGS_MAX_CONCURRENT_STREAMS (0x3)
    MaxConcurrentStreams = 0x3,
    /// SETTINGS_INITIAL_WINDOW_SIZE (0x4)
    InitialWindowSize = 0x4,
    /// SETTINGS_MAX_FRAME_SIZE (0x5)
    MaxFrameSize = 0x5,
    /// SETTINGS_MAX_HEADER_LIST_SIZE (0x6)
    MaxHeaderListSize = 0x6,
    /// SETTINGS_ENABLE_CONNECT_PROTOCOL (0x8) - RFC 8441
    EnableConnectProtocol = 0x8,
    /// SETTINGS_NO_RFC7540_PRIORITIES (0x9) - RFC 9218
    NoRfc7540Priorities = 0x9,
}

impl SettingsParameter {
    /// Convert to u16
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Create from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1 => Some(SettingsParameter::HeaderTableSize),
            0x2 => Some(SettingsParameter::EnablePush),
            0x3 => Some(SettingsParameter::MaxConcurrentStreams),
            0x4 => Some(SettingsParameter::InitialWindowSize),
            0x5 => Some(SettingsParameter::MaxFrameSize),
            0x6 => Some(SettingsParameter::MaxHeaderListSize),
            0x8 => Some(SettingsParameter::EnableConnectProtocol),
            0x9 => Some(SettingsParameter::NoRfc7540Priorities),
            _ => None,
        }
    }

    /// Get parameter name
    pub fn name(&self) -> &'static str {
        match self {
            SettingsParameter::HeaderTableSize => "HEADER_TABLE_SIZE",
            SettingsParameter::EnablePush => "ENABLE_PUSH",
            SettingsParameter::MaxConcurrentStreams => "MAX_CONCURRENT_STREAMS",
            SettingsParameter::InitialWindowSize => "INITIAL_WINDOW_SIZE",
            SettingsParameter::MaxFrameSize => "MAX_FRAME_SIZE",
            SettingsParameter::MaxHeaderListSize => "MAX_HEADER_LIST_SIZE",
            SettingsParameter::EnableConnectProtocol => "ENABLE_CONNECT_PROTOCOL",
            SettingsParameter::NoRfc7540Priorities => "NO_RFC7540_PRIORITIES",
        }
    }
}

impl fmt::Display for SettingsParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u16())
    }
}

/// Split a SETTINGS payload into (identifier, value) pairs
///
/// Unknown identifiers are kept; receivers must ignore them, but a
/// diagnostic still wants to see them.
pub fn parse_settings(payload: &[u8]) -> Result<Vec<(u16, u32)>> {
    if payload.len() % 6 != 0 {
        return Err(Error::FrameSize(format!(
            "SETTINGS payload length {} is not a multiple of 6",
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(6)
        .map(|entry| {
            let id = u16::from_be_bytes([entry[0], entry[1]]);
            let value = u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]);
            (id, value)
        })
        .collect())
}

/// Render a list of settings as `NAME=value` pairs
pub fn describe_settings(params: &[(u16, u32)]) -> String {
    params
        .iter()
        .map(|(id, value)| match SettingsParameter::from_u16(*id) {
            Some(param) => format!("{}={}", param.name(), value),
            None => format!("0x{:x}={}", id, value),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
