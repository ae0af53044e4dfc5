use crate::codec::{Result, ZmtpError};

/// ZMTP Greeting is always exactly 64 bytes
pub const GREETING_SIZE: usize = 64;

const SIGNATURE_HEAD: u8 = 0xFF;
const SIGNATURE_TAIL: u8 = 0x7F;

/// Version we announce (ZMTP 3.0, so peers send subscriptions as messages)
const VERSION_MAJOR: u8 = 3;
const VERSION_MINOR: u8 = 0;

/// Parsed greeting information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZmtpGreeting {
    pub major: u8,
    pub minor: u8,
    pub mechanism: String,
    pub as_server: bool,
}

impl ZmtpGreeting {
    /// Build our NULL-mechanism greeting.
    ///
    /// Layout (ZMTP 3.x):
    /// ```text
    /// [0]      0xFF
    /// [1..9]   Padding
    /// [9]      0x7F
    /// [10]     Major version
    /// [11]     Minor version
    /// [12..32] Mechanism (ASCII, null-padded)
    /// [32]     As-Server flag
    /// [33..64] Padding
    /// ```
    pub fn encode(as_server: bool) -> [u8; GREETING_SIZE] {
        let mut g = [0u8; GREETING_SIZE];
        g[0] = SIGNATURE_HEAD;
        g[9] = SIGNATURE_TAIL;
        g[10] = VERSION_MAJOR;
        g[11] = VERSION_MINOR;
        g[12..16].copy_from_slice(b"NULL");
        g[32] = u8::from(as_server);
        g
    }

    /// Parse a peer greeting. Any 3.x version is accepted; only the NULL
    /// mechanism is supported.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < GREETING_SIZE {
            return Err(ZmtpError::Protocol("short greeting"));
        }
        if src[0] != SIGNATURE_HEAD || src[9] != SIGNATURE_TAIL {
            return Err(ZmtpError::Protocol("bad greeting signature"));
        }

        let major = src[10];
        if major < 3 {
            return Err(ZmtpError::Protocol("ZMTP version below 3.0"));
        }

        let mechanism = std::str::from_utf8(&src[12..32])
            .map_err(|_| ZmtpError::Protocol("mechanism is not ASCII"))?
            .trim_matches(char::from(0))
            .to_string();

        if mechanism != "NULL" {
            return Err(ZmtpError::Protocol("unsupported security mechanism"));
        }

        Ok(Self {
            major,
            minor: src[11],
            mechanism,
            as_server: (src[32] & 0x01) != 0,
        })
    }
}
